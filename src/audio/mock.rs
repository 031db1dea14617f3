// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::HashMap, fmt, sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{EventSender, LifecycleEvent, LifecycleKind, PlayableHandle, PlaybackError};
use crate::registry::SampleDescriptor;

/// Playback state recorded for a single mock channel.
#[derive(Default)]
struct ChannelState {
    playing: bool,
    generation: u64,
    opened: u32,
    plays: u32,
    pauses: u32,
    resets: u32,
    refuse_start: Option<String>,
    refuse_stop: bool,
    events: Option<EventSender>,
}

impl ChannelState {
    fn emit(&self, sample_id: &str, generation: u64, kind: LifecycleKind) {
        if let Some(events) = &self.events {
            let _ = events.send(LifecycleEvent::new(sample_id, generation, kind));
        }
    }
}

/// A mock device. Doesn't actually play anything, but records every request
/// and reports lifecycle events the way a real device would.
#[derive(Clone)]
pub struct Device {
    name: String,
    /// If set, playback "ends" on its own after this long.
    clip_length: Option<Duration>,
    channels: Arc<Mutex<HashMap<String, Arc<Mutex<ChannelState>>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            clip_length: None,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Makes every started clip end by itself after the given duration.
    pub fn with_clip_length(mut self, clip_length: Option<Duration>) -> Device {
        self.clip_length = clip_length;
        self
    }

    /// Makes start requests for the sample fail with the given reason.
    pub fn refuse_start(&self, sample_id: &str, reason: &str) {
        self.state(sample_id).lock().refuse_start = Some(reason.to_string());
    }

    /// Makes pause and reset requests for the sample fail.
    pub fn refuse_stop(&self, sample_id: &str) {
        self.state(sample_id).lock().refuse_stop = true;
    }

    /// Returns a probe for inspecting and driving the sample's channel.
    pub fn probe(&self, sample_id: &str) -> Probe {
        Probe {
            sample_id: sample_id.to_string(),
            state: self.state(sample_id),
        }
    }

    fn state(&self, sample_id: &str) -> Arc<Mutex<ChannelState>> {
        self.channels
            .lock()
            .entry(sample_id.to_string())
            .or_default()
            .clone()
    }
}

impl super::Device for Device {
    fn open(&self, sample: &SampleDescriptor, events: EventSender) -> Box<dyn PlayableHandle> {
        let state = self.state(sample.id());
        {
            let mut state = state.lock();
            state.opened += 1;
            state.events = Some(events);
        }

        info!(
            device = self.name,
            sample = sample.id(),
            source = sample.source(),
            "Opened mock handle."
        );

        Box::new(Handle {
            sample_id: sample.id().to_string(),
            clip_length: self.clip_length,
            state,
        })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// A handle opened on the mock device.
struct Handle {
    sample_id: String,
    clip_length: Option<Duration>,
    state: Arc<Mutex<ChannelState>>,
}

impl PlayableHandle for Handle {
    fn play(&mut self, generation: u64) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.refuse_start {
            return Err(PlaybackError::Refused(reason.clone()));
        }

        state.playing = true;
        state.generation = generation;
        state.plays += 1;
        state.emit(&self.sample_id, generation, LifecycleKind::Started);
        drop(state);

        if let Some(clip_length) = self.clip_length {
            let state = self.state.clone();
            let sample_id = self.sample_id.clone();
            thread::spawn(move || {
                thread::sleep(clip_length);
                let mut state = state.lock();
                if state.playing && state.generation == generation {
                    state.playing = false;
                    state.emit(&sample_id, generation, LifecycleKind::Ended);
                    debug!(sample = sample_id, generation, "Mock clip finished.");
                }
            });
        }

        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        if state.refuse_stop {
            return Err(PlaybackError::Refused("pause refused".to_string()));
        }
        state.playing = false;
        state.pauses += 1;
        Ok(())
    }

    fn reset_position(&mut self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        if state.refuse_stop {
            return Err(PlaybackError::Refused("reset refused".to_string()));
        }
        state.resets += 1;
        Ok(())
    }
}

/// Inspects and drives a single mock channel.
pub struct Probe {
    sample_id: String,
    state: Arc<Mutex<ChannelState>>,
}

impl Probe {
    /// Returns true if the channel is currently playing.
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// The generation of the most recent successful start.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// How many times a handle was opened for this sample.
    pub fn opened(&self) -> u32 {
        self.state.lock().opened
    }

    /// How many start requests succeeded.
    pub fn plays(&self) -> u32 {
        self.state.lock().plays
    }

    /// How many pause requests succeeded.
    pub fn pauses(&self) -> u32 {
        self.state.lock().pauses
    }

    /// How many reset requests succeeded.
    pub fn resets(&self) -> u32 {
        self.state.lock().resets
    }

    /// Ends the current playback as if the clip ran out.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        let generation = state.generation;
        state.emit(&self.sample_id, generation, LifecycleKind::Ended);
    }

    /// Reports a runtime error for the current playback.
    pub fn error(&self, detail: &str) {
        let state = self.state.lock();
        state.emit(
            &self.sample_id,
            state.generation,
            LifecycleKind::Errored(detail.to_string()),
        );
    }

    /// Reports a stall for the current playback.
    pub fn stall(&self) {
        let state = self.state.lock();
        state.emit(&self.sample_id, state.generation, LifecycleKind::Stalled);
    }

    /// Emits an arbitrary event, e.g. one carrying a stale generation.
    pub fn emit(&self, generation: u64, kind: LifecycleKind) {
        self.state.lock().emit(&self.sample_id, generation, kind);
    }
}
