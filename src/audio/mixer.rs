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
//! Mixing of decoded clips into the output buffer.
//!
//! Each opened sample owns a [`Voice`]. The mixer renders every playing voice
//! on the audio thread and reports the start and end of playback through the
//! voice's event sender, so the lifecycle events reflect what was actually
//! written to the output.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::loader::LoadedSample;
use super::{EventSender, LifecycleEvent, LifecycleKind};

#[derive(Debug, Default)]
struct VoiceState {
    playing: bool,
    /// Next frame to render.
    position: usize,
    generation: u64,
    /// Whether Started has been sent for the current generation.
    announced: bool,
}

/// Playback state of a single clip.
pub struct Voice {
    sample_id: String,
    clip: LoadedSample,
    events: EventSender,
    state: Mutex<VoiceState>,
}

impl Voice {
    pub fn new(sample_id: &str, clip: LoadedSample, events: EventSender) -> Voice {
        Voice {
            sample_id: sample_id.to_string(),
            clip,
            events,
            state: Mutex::new(VoiceState::default()),
        }
    }

    /// Resumes rendering from the current position under the given generation.
    pub fn play(&self, generation: u64) {
        let mut state = self.state.lock();
        state.generation = generation;
        state.announced = false;
        state.playing = true;
    }

    pub fn pause(&self) {
        self.state.lock().playing = false;
    }

    pub fn reset(&self) {
        self.state.lock().position = 0;
    }

    /// Returns true if the voice is playing.
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Adds the voice's next frames into the interleaved output buffer.
    fn render(&self, output: &mut [f32], channels: usize) {
        let mut state = self.state.lock();
        if !state.playing {
            return;
        }
        if !state.announced {
            state.announced = true;
            self.emit(state.generation, LifecycleKind::Started);
        }

        let samples = self.clip.samples();
        let start = (state.position * channels).min(samples.len());
        let available = samples.len().saturating_sub(start);
        let count = available.min(output.len());
        for (out, sample) in output[..count].iter_mut().zip(&samples[start..start + count]) {
            *out += sample;
        }
        state.position += count / channels;

        if state.position >= self.clip.frames() {
            state.playing = false;
            self.emit(state.generation, LifecycleKind::Ended);
        }
    }

    /// Sends an event for the current generation if the voice is playing.
    fn report(&self, kind: LifecycleKind) {
        let state = self.state.lock();
        if state.playing {
            self.emit(state.generation, kind);
        }
    }

    /// Stops the voice after an unrecoverable output fault, reporting the
    /// fault and then the end of playback.
    fn fail(&self, kind: LifecycleKind) {
        let mut state = self.state.lock();
        if state.playing {
            state.playing = false;
            self.emit(state.generation, kind);
            self.emit(state.generation, LifecycleKind::Ended);
        }
    }

    fn emit(&self, generation: u64, kind: LifecycleKind) {
        // The manager may be gone during shutdown.
        let _ = self
            .events
            .send(LifecycleEvent::new(&self.sample_id, generation, kind));
    }
}

/// Mixes every voice into the output stream.
#[derive(Clone)]
pub struct AudioMixer {
    voices: Arc<RwLock<Vec<Arc<Voice>>>>,
    channels: u16,
    sample_rate: u32,
}

impl AudioMixer {
    /// Creates a mixer for the given output layout.
    pub fn new(channels: u16, sample_rate: u32) -> AudioMixer {
        AudioMixer {
            voices: Arc::new(RwLock::new(Vec::new())),
            channels,
            sample_rate,
        }
    }

    /// Registers a voice. It stays silent until it's played.
    pub fn add_voice(&self, voice: Arc<Voice>) {
        debug!(sample = voice.sample_id, "Added voice to mixer.");
        self.voices.write().push(voice);
    }

    /// Fills the interleaved output buffer with the mix of all playing voices.
    pub fn render(&self, output: &mut [f32]) {
        output.fill(0.0);
        let channels = usize::from(self.channels.max(1));
        for voice in self.voices.read().iter() {
            voice.render(output, channels);
        }
    }

    /// Reports a problem with the output to every playing voice.
    pub fn report_playing(&self, kind: LifecycleKind) {
        for voice in self.voices.read().iter() {
            voice.report(kind.clone());
        }
    }

    /// Stops every playing voice after the output is lost. Each one reports
    /// the fault followed by Ended, since it will never render again.
    pub fn fail_playing(&self, kind: LifecycleKind) {
        for voice in self.voices.read().iter() {
            voice.fail(kind.clone());
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::loader::SampleLoader;
    use crate::audio::EventReceiver;
    use crate::testutil::write_wav;

    fn clip(frames: usize) -> LoadedSample {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, &[vec![16384; frames], vec![-16384; frames]], 48000).unwrap();
        SampleLoader::new(48000, 2).load(&path).unwrap()
    }

    fn voice(id: &str, frames: usize) -> (Arc<Voice>, EventReceiver) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Voice::new(id, clip(frames), tx)), rx)
    }

    #[test]
    fn test_paused_voice_is_silent() {
        let mixer = AudioMixer::new(2, 48000);
        let (voice, rx) = voice("a", 8);
        mixer.add_voice(voice);

        let mut output = vec![1.0; 8];
        mixer.render(&mut output);

        assert!(output.iter().all(|s| *s == 0.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_render_announces_and_ends() {
        let mixer = AudioMixer::new(2, 48000);
        let (voice, rx) = voice("a", 6);
        mixer.add_voice(voice.clone());
        voice.play(3);

        let mut output = vec![0.0; 8];
        mixer.render(&mut output);
        assert_eq!(output, vec![0.5, -0.5, 0.5, -0.5, 0.5, -0.5, 0.5, -0.5]);
        assert_eq!(
            rx.try_recv().unwrap(),
            LifecycleEvent::new("a", 3, LifecycleKind::Started)
        );
        assert!(rx.try_recv().is_err());

        mixer.render(&mut output);
        assert_eq!(output, vec![0.5, -0.5, 0.5, -0.5, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(
            rx.try_recv().unwrap(),
            LifecycleEvent::new("a", 3, LifecycleKind::Ended)
        );
        assert!(!voice.is_playing());

        mixer.render(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_pause_keeps_position_and_reset_rewinds() {
        let mixer = AudioMixer::new(2, 48000);
        let (voice, rx) = voice("a", 4);
        mixer.add_voice(voice.clone());

        voice.play(1);
        let mut output = vec![0.0; 4];
        mixer.render(&mut output);
        voice.pause();
        mixer.render(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));

        voice.reset();
        voice.play(2);
        let mut output = vec![0.0; 8];
        mixer.render(&mut output);

        // The full clip plays again after the rewind.
        assert!(output.iter().all(|s| *s != 0.0));
        let events: Vec<(u64, LifecycleKind)> = rx
            .try_iter()
            .map(|event| (event.generation, event.kind))
            .collect();
        assert_eq!(
            events,
            vec![
                (1, LifecycleKind::Started),
                (2, LifecycleKind::Started),
                (2, LifecycleKind::Ended),
            ]
        );
    }

    #[test]
    fn test_voices_are_summed() {
        let mixer = AudioMixer::new(2, 48000);
        let (a, _rx_a) = voice("a", 4);
        let (b, _rx_b) = voice("b", 4);
        mixer.add_voice(a.clone());
        mixer.add_voice(b.clone());
        a.play(1);
        b.play(1);

        let mut output = vec![0.0; 2];
        mixer.render(&mut output);
        assert_eq!(output, vec![1.0, -1.0]);
    }

    #[test]
    fn test_report_playing_only_reaches_playing_voices() {
        let mixer = AudioMixer::new(2, 48000);
        let (a, rx_a) = voice("a", 4);
        let (b, rx_b) = voice("b", 4);
        mixer.add_voice(a.clone());
        mixer.add_voice(b);
        a.play(5);

        mixer.report_playing(LifecycleKind::Stalled);

        assert_eq!(
            rx_a.try_recv().unwrap(),
            LifecycleEvent::new("a", 5, LifecycleKind::Stalled)
        );
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_fail_playing_ends_voices() {
        let mixer = AudioMixer::new(2, 48000);
        let (a, rx_a) = voice("a", 8);
        let (b, rx_b) = voice("b", 8);
        mixer.add_voice(a.clone());
        mixer.add_voice(b.clone());
        a.play(2);

        let mut output = vec![0.0; 4];
        mixer.render(&mut output);
        mixer.fail_playing(LifecycleKind::Errored("device not available".to_string()));

        let events: Vec<LifecycleKind> = rx_a.try_iter().map(|event| event.kind).collect();
        assert_eq!(
            events,
            vec![
                LifecycleKind::Started,
                LifecycleKind::Errored("device not available".to_string()),
                LifecycleKind::Ended,
            ]
        );
        assert!(!a.is_playing());
        assert!(rx_b.try_recv().is_err());
        assert!(!b.is_playing());

        // Nothing further is rendered or reported.
        mixer.render(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
        assert!(rx_a.try_recv().is_err());
    }
}
