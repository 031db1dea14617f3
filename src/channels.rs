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

//! Single-playback channel management.
//!
//! The [`ChannelManager`] owns one playable handle per sample and guarantees
//! that starting a sample stops every other one. The set of samples that are
//! currently playing is published through a watch channel so that a front
//! end can observe it instead of sharing mutable state.
//!
//! Every stop or start bumps the channel's generation. Handles tag their
//! lifecycle events with the generation they were started with, so events
//! from a superseded playback are recognised and dropped no matter how late
//! the playback subsystem delivers them.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::audio::{
    Device, EventReceiver, EventSender, LifecycleEvent, LifecycleKind, PlayableHandle,
    PlaybackError,
};
use crate::registry::Registry;

/// Number of undelivered reports kept for slow subscribers.
const REPORT_CAPACITY: usize = 64;


/// The set of sample ids currently considered playing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveSet(BTreeSet<String>);

impl ActiveSet {
    /// An active set containing exactly the given id.
    pub fn only(id: &str) -> ActiveSet {
        ActiveSet(BTreeSet::from([id.to_string()]))
    }

    /// Returns true if the given id is active.
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// The number of active ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is playing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the active ids in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for ActiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "}}")
    }
}

/// A fault reported by a handle after playback started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeFault {
    Errored(String),
    Stalled,
}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFault::Errored(detail) => write!(f, "error: {}", detail),
            RuntimeFault::Stalled => write!(f, "stalled"),
        }
    }
}

/// Errors raised or reported by the channel manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("unknown sample {0}")]
    UnknownSample(String),

    #[error("playback of {id} failed to start: {source}")]
    PlaybackStartFailed {
        id: String,
        #[source]
        source: PlaybackError,
    },

    #[error("playback of {id} reported {fault}")]
    PlaybackRuntimeError { id: String, fault: RuntimeFault },
}

/// The result of a play request that named a known sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The start request was accepted by the playback subsystem.
    Started,
    /// The playback subsystem refused to start. Already reported.
    StartFailed(ChannelError),
}

/// A sample's playable handle and the generation of its latest stop or start.
struct Channel {
    handle: Box<dyn PlayableHandle>,
    generation: u64,
}

impl Channel {
    /// Pauses and rewinds the channel. Failures are expected for channels that
    /// never started and are ignored.
    fn stop(&mut self, id: &str) {
        self.generation += 1;
        if let Err(e) = self.handle.pause() {
            debug!(sample = id, err = %e, "Ignoring pause failure.");
        }
        if let Err(e) = self.handle.reset_position() {
            debug!(sample = id, err = %e, "Ignoring reset failure.");
        }
    }
}

/// Enforces that at most one sample plays at a time.
pub struct ChannelManager {
    registry: Arc<Registry>,
    device: Arc<dyn Device>,
    channels: HashMap<String, Channel>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    active: watch::Sender<ActiveSet>,
    reports: broadcast::Sender<ChannelError>,
}

impl ChannelManager {
    /// Creates a channel manager. No handles are opened until they're needed
    /// or [`ChannelManager::preload_all`] is called.
    pub fn new(registry: Arc<Registry>, device: Arc<dyn Device>) -> ChannelManager {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (active, _) = watch::channel(ActiveSet::default());
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);

        ChannelManager {
            registry,
            device,
            channels: HashMap::new(),
            events_tx,
            events_rx,
            active,
            reports,
        }
    }

    /// The registry this manager plays from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Opens the handle for the sample if it isn't open already.
    pub fn ensure_handle(&mut self, id: &str) -> Result<&mut dyn PlayableHandle, ChannelError> {
        Ok(self.channel(id)?.handle.as_mut())
    }

    /// Opens handles for every sample in the registry.
    pub fn preload_all(&mut self) {
        let registry = self.registry.clone();
        for sample in registry.all() {
            // Every id comes from the registry, so this can't fail.
            let _ = self.channel(sample.id());
        }
        info!(samples = self.channels.len(), "Preloaded all samples.");
    }

    /// Starts the sample from the beginning, stopping everything else first.
    ///
    /// Only an unknown sample is returned as an error. A start failure is
    /// reported to subscribers and returned as [`PlayOutcome::StartFailed`].
    pub fn play(&mut self, id: &str) -> Result<PlayOutcome, ChannelError> {
        self.channel(id)?;

        for (other_id, channel) in self.channels.iter_mut() {
            if other_id != id {
                channel.stop(other_id);
            }
        }

        let Some(channel) = self.channels.get_mut(id) else {
            return Err(ChannelError::UnknownSample(id.to_string()));
        };
        channel.stop(id);
        let generation = channel.generation;

        match channel.handle.play(generation) {
            Ok(()) => {
                debug!(sample = id, generation, "Requested playback.");
                self.set_active(ActiveSet::only(id));
                Ok(PlayOutcome::Started)
            }
            Err(e) => {
                // Every channel was just stopped, so nothing is playing.
                self.set_active(ActiveSet::default());
                let error = ChannelError::PlaybackStartFailed {
                    id: id.to_string(),
                    source: e,
                };
                self.report(error.clone());
                Ok(PlayOutcome::StartFailed(error))
            }
        }
    }

    /// Stops every channel and clears the active set.
    pub fn stop_all(&mut self) {
        for (id, channel) in self.channels.iter_mut() {
            channel.stop(id);
        }
        self.set_active(ActiveSet::default());
    }

    /// Applies a single lifecycle event.
    pub fn apply(&mut self, event: LifecycleEvent) {
        let Some(channel) = self.channels.get(&event.sample_id) else {
            warn!(sample = event.sample_id, "Event for a sample with no handle.");
            return;
        };

        if event.generation != channel.generation {
            debug!(
                sample = event.sample_id,
                event_generation = event.generation,
                current_generation = channel.generation,
                kind = %event.kind,
                "Dropping stale event."
            );
            return;
        }

        match event.kind {
            LifecycleKind::Started => self.set_active(ActiveSet::only(&event.sample_id)),
            LifecycleKind::Ended => {
                self.active.send_if_modified(|active| active.0.remove(&event.sample_id));
            }
            LifecycleKind::Errored(detail) => self.report(ChannelError::PlaybackRuntimeError {
                id: event.sample_id,
                fault: RuntimeFault::Errored(detail),
            }),
            LifecycleKind::Stalled => self.report(ChannelError::PlaybackRuntimeError {
                id: event.sample_id,
                fault: RuntimeFault::Stalled,
            }),
        }
    }

    /// Applies every event that is already queued. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Applies events until none arrive for the given quiet period.
    pub fn settle(&mut self, quiet: Duration) -> usize {
        let mut applied = 0;
        loop {
            match self.events_rx.recv_timeout(quiet) {
                Ok(event) => {
                    self.apply(event);
                    applied += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return applied
                }
            }
        }
    }

    /// The queue lifecycle events arrive on, for use in select loops. Received
    /// events must be passed to [`ChannelManager::apply`].
    pub fn events(&self) -> &EventReceiver {
        &self.events_rx
    }

    /// A snapshot of the active set.
    pub fn active(&self) -> ActiveSet {
        self.active.borrow().clone()
    }

    /// Subscribes to changes of the active set.
    pub fn subscribe(&self) -> watch::Receiver<ActiveSet> {
        self.active.subscribe()
    }

    /// Subscribes to start failures and runtime faults.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<ChannelError> {
        self.reports.subscribe()
    }

    fn channel(&mut self, id: &str) -> Result<&mut Channel, ChannelError> {
        let sample = self
            .registry
            .by_id(id)
            .map_err(|_| ChannelError::UnknownSample(id.to_string()))?;

        if !self.channels.contains_key(id) {
            let handle = self.device.open(sample, self.events_tx.clone());
            debug!(sample = id, device = %self.device, "Opened handle.");
            self.channels.insert(
                id.to_string(),
                Channel {
                    handle,
                    generation: 0,
                },
            );
        }

        self.channels
            .get_mut(id)
            .ok_or_else(|| ChannelError::UnknownSample(id.to_string()))
    }

    fn set_active(&self, next: ActiveSet) {
        self.active.send_if_modified(|active| {
            if *active == next {
                return false;
            }
            *active = next;
            true
        });
    }

    fn report(&self, error: ChannelError) {
        warn!(err = %error, "Playback problem.");
        // No subscribers is fine; the warning above is the report.
        let _ = self.reports.send(error);
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("samples", &self.registry.len())
            .field("open_channels", &self.channels.len())
            .field("active", &*self.active.borrow())
            .finish()
    }
}
