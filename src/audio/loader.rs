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
//! Decoding of clips into memory.
//!
//! Clips are short, so each one is decoded completely when its handle is
//! opened, converted to the output sample rate and channel layout, and
//! cached by path so that samples sharing a file share one buffer.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Errors encountered while loading a clip.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to open file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to decode: {0}")]
    Decode(#[from] SymphoniaError),

    #[error("no playable track")]
    NoTrack,

    #[error("track has no sample rate")]
    MissingSampleRate,

    #[error("track has no channel layout")]
    MissingChannels,

    #[error("cannot map {file_channels} channels to {output_channels}")]
    UnsupportedChannels {
        file_channels: usize,
        output_channels: usize,
    },
}

/// A clip decoded into interleaved f32 samples at the output format.
#[derive(Clone, Debug)]
pub struct LoadedSample {
    data: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

impl LoadedSample {
    /// The interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    #[cfg(test)]
    fn channels(&self) -> u16 {
        self.channels
    }

    /// The number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / usize::from(self.channels.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Loads and caches clips for a fixed output format.
pub struct SampleLoader {
    cache: HashMap<PathBuf, LoadedSample>,
    sample_rate: u32,
    channels: u16,
}

impl SampleLoader {
    /// Creates a loader producing samples at the given rate and channel count.
    pub fn new(sample_rate: u32, channels: u16) -> SampleLoader {
        SampleLoader {
            cache: HashMap::new(),
            sample_rate,
            channels,
        }
    }

    /// Loads the clip at the path, returning the cached copy if there is one.
    pub fn load(&mut self, path: &Path) -> Result<LoadedSample, LoadError> {
        if let Some(sample) = self.cache.get(path) {
            debug!(path = ?path, "Using cached sample.");
            return Ok(sample.clone());
        }

        let (decoded, file_channels, file_rate) = decode(path)?;
        let mapped = map_channels(decoded, file_channels, usize::from(self.channels))?;
        let samples = if file_rate != self.sample_rate {
            debug!(
                path = ?path,
                source_rate = file_rate,
                target_rate = self.sample_rate,
                "Transcoding sample."
            );
            transcode(&mapped, usize::from(self.channels), file_rate, self.sample_rate)
        } else {
            mapped
        };

        let loaded = LoadedSample {
            data: Arc::new(samples),
            channels: self.channels,
            sample_rate: self.sample_rate,
        };
        info!(
            path = ?path,
            channels = loaded.channels,
            sample_rate = loaded.sample_rate,
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample loaded."
        );

        self.cache.insert(path.to_path_buf(), loaded.clone());
        Ok(loaded)
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("cached_samples", &self.cache.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Decodes the default track of the file into interleaved samples. Returns the
/// samples, the channel count and the sample rate.
fn decode(path: &Path) -> Result<(Vec<f32>, usize, u32), LoadError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(LoadError::NoTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(LoadError::MissingSampleRate)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(LoadError::MissingChannels)?
        .count();
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(buffer) => {
                let spec = *buffer.spec();
                let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
                interleaved.copy_interleaved_ref(buffer);
                samples.extend_from_slice(interleaved.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(path = ?path, err = e, "Skipping undecodable packet.");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok((samples, channels, sample_rate))
}

/// Maps interleaved samples between channel layouts. Mono is spread to every
/// output channel and anything is averaged down to mono.
pub fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    output_channels: usize,
) -> Result<Vec<f32>, LoadError> {
    if file_channels == output_channels {
        return Ok(samples);
    }

    match (file_channels, output_channels) {
        (1, n) if n > 1 => Ok(samples
            .into_iter()
            .flat_map(|sample| std::iter::repeat(sample).take(n))
            .collect()),
        (n, 1) if n > 1 => Ok(samples
            .chunks_exact(n)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect()),
        _ => Err(LoadError::UnsupportedChannels {
            file_channels,
            output_channels,
        }),
    }
}

/// Converts interleaved samples between sample rates with linear interpolation.
fn transcode(samples: &[f32], channels: usize, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_load_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, &[vec![0, 8192, 16384, -16384], vec![0, -8192, -16384, 16384]], 48000)
            .unwrap();

        let mut loader = SampleLoader::new(48000, 2);
        let sample = loader.load(&path).unwrap();

        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.frames(), 4);
        let expected = [0.0, 0.0, 0.25, -0.25, 0.5, -0.5, -0.5, 0.5];
        for (actual, expected) in sample.samples().iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-3, "{} != {}", actual, expected);
        }
    }

    #[test]
    fn test_load_mono_as_stereo_with_transcode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, &[vec![1000; 22050]], 22050).unwrap();

        let mut loader = SampleLoader::new(44100, 2);
        let sample = loader.load(&path).unwrap();

        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.frames(), 44100);
        assert_eq!(sample.duration(), Duration::from_secs(1));
        let level = 1000.0 / 32768.0;
        assert!(sample
            .samples()
            .iter()
            .all(|s| (s - level).abs() < 1e-3));
    }

    #[test]
    fn test_load_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, &[vec![0; 100]], 48000).unwrap();

        let mut loader = SampleLoader::new(48000, 1);
        let first = loader.load(&path).unwrap();
        let second = loader.load(&path).unwrap();

        assert!(Arc::ptr_eq(&first.data, &second.data));
        assert_eq!(loader.cached(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let mut loader = SampleLoader::new(48000, 2);
        let result = loader.load(Path::new("/nonexistent/clip.wav"));
        assert!(matches!(result, Err(LoadError::Io(_))));
        assert_eq!(loader.cached(), 0);
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"this is not audio").unwrap();

        let mut loader = SampleLoader::new(48000, 2);
        assert!(loader.load(&path).is_err());
    }

    #[test]
    fn test_map_channels() {
        assert_eq!(
            map_channels(vec![0.1, 0.2], 1, 2).unwrap(),
            vec![0.1, 0.1, 0.2, 0.2]
        );
        assert_eq!(
            map_channels(vec![0.25, 0.75, -1.0, 1.0], 2, 1).unwrap(),
            vec![0.5, 0.0]
        );
        assert_eq!(map_channels(vec![0.5; 4], 2, 2).unwrap(), vec![0.5; 4]);
        assert!(matches!(
            map_channels(vec![0.0; 6], 3, 2),
            Err(LoadError::UnsupportedChannels {
                file_channels: 3,
                output_channels: 2
            })
        ));
    }

    #[test]
    fn test_transcode_stereo() {
        let source = vec![1.0f32, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let result = transcode(&source, 2, 44100, 48000);

        assert_eq!(result.len() % 2, 0);
        assert!(result.len() >= source.len());
        assert!((result[0] - 1.0).abs() < 0.1);
        assert!((result[1] + 1.0).abs() < 0.1);
    }

    #[test]
    fn test_transcode_downsample_halves_frames() {
        let source: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let result = transcode(&source, 1, 48000, 24000);
        assert_eq!(result, vec![0.0, 2.0, 4.0, 6.0]);
    }
}
