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
use std::{
    error::Error,
    fs::File,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Polls the predicate until it returns true, panicking with the given
/// message if it doesn't within a few seconds.
pub fn eventually<F>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let mut tick = Duration::from_millis(5);
    let timeout = Duration::from_secs(5);
    let max_tick = Duration::from_millis(50);

    loop {
        if predicate() {
            return;
        }
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }

        thread::sleep(tick);
        tick = std::cmp::min(tick * 2, max_tick);
    }
}

/// Writes a 16 bit PCM WAV file. Each inner vector holds one channel; the
/// channels are interleaved on write.
pub fn write_wav(path: &Path, channels: &[Vec<i16>], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let num_channels = channels.len();
    assert!(num_channels > 0, "At least one channel is required");
    let frames = channels[0].len();
    assert!(
        channels.iter().all(|channel| channel.len() == frames),
        "Channels must be the same length"
    );

    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}
