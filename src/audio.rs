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
use std::{error::Error, fmt, sync::Arc};

use crate::config;
use crate::registry::SampleDescriptor;

pub mod cpal;
pub mod loader;
pub mod mixer;
pub mod mock;

/// Posts lifecycle events from the playback subsystem to the channel manager.
pub type EventSender = crossbeam_channel::Sender<LifecycleEvent>;

/// Receives lifecycle events on the channel manager's thread.
pub type EventReceiver = crossbeam_channel::Receiver<LifecycleEvent>;

/// What happened to a playable handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleKind {
    /// Audible playback began.
    Started,
    /// Playback reached the end of the clip.
    Ended,
    /// The subsystem hit a load or decode error.
    Errored(String),
    /// The subsystem is unable to keep up with playback.
    Stalled,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleKind::Started => write!(f, "started"),
            LifecycleKind::Ended => write!(f, "ended"),
            LifecycleKind::Errored(detail) => write!(f, "errored ({})", detail),
            LifecycleKind::Stalled => write!(f, "stalled"),
        }
    }
}

/// A lifecycle event emitted by a playable handle.
///
/// The generation is the one passed to the [`PlayableHandle::play`] call that
/// produced the event, which lets the receiver discard events from superseded
/// playbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub sample_id: String,
    pub generation: u64,
    pub kind: LifecycleKind,
}

impl LifecycleEvent {
    pub fn new(sample_id: &str, generation: u64, kind: LifecycleKind) -> LifecycleEvent {
        LifecycleEvent {
            sample_id: sample_id.to_string(),
            generation,
            kind,
        }
    }
}

/// Failures reported by a playable handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("unable to load {source_path}: {reason}")]
    Load { source_path: String, reason: String },

    #[error("output stream unavailable: {0}")]
    Stream(String),

    #[error("playback refused: {0}")]
    Refused(String),
}

/// A per-sample resource that can be started, paused and rewound.
///
/// Start and stop requests complete asynchronously: the handle reports the
/// outcome through the event sender it was opened with.
pub trait PlayableHandle: Send {
    /// Requests playback from the current position. Events produced by this
    /// playback carry the given generation.
    fn play(&mut self, generation: u64) -> Result<(), PlaybackError>;

    /// Pauses playback, keeping the current position.
    fn pause(&mut self) -> Result<(), PlaybackError>;

    /// Moves the playback position back to the start of the clip.
    fn reset_position(&mut self) -> Result<(), PlaybackError>;
}

/// A playback subsystem that can open handles for samples.
pub trait Device: fmt::Display + Send + Sync {
    /// Opens a handle bound to the sample's source. Load failures are not
    /// returned here; they surface as an `Errored` event and as start
    /// failures on the returned handle.
    fn open(&self, sample: &SampleDescriptor, events: EventSender) -> Box<dyn PlayableHandle>;
}

/// Lists the output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device described by the audio configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(
            mock::Device::get(device).with_clip_length(config.mock_clip_length()?),
        ));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
