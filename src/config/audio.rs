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
use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;

const DEFAULT_DEVICE: &str = "default";

/// When playable handles are opened.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Preload {
    /// Every sample is opened when the board starts.
    #[default]
    Eager,
    /// Samples are opened on first play.
    Lazy,
}

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Audio {
    /// The output device. "default" picks the host's default output, names
    /// starting with "mock" select the mock device.
    #[serde(default = "default_device")]
    device: String,

    /// Output sample rate in Hz. Defaults to the device's preferred rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,

    /// Clip length reported by the mock device, e.g. "2s".
    #[serde(skip_serializing_if = "Option::is_none")]
    mock_clip_length: Option<String>,

    #[serde(default)]
    preload: Preload,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

impl Default for Audio {
    fn default() -> Audio {
        Audio::new(DEFAULT_DEVICE)
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            mock_clip_length: None,
            preload: Preload::default(),
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the configured output sample rate, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Returns how long mock clips play for. None means they play until
    /// they're stopped.
    pub fn mock_clip_length(&self) -> Result<Option<Duration>, ConfigError> {
        self.mock_clip_length
            .as_ref()
            .map(|value| {
                DurationString::from_string(value.clone())
                    .map(Duration::from)
                    .map_err(|_| ConfigError::InvalidDuration {
                        field: "audio.mock_clip_length",
                        value: value.clone(),
                    })
            })
            .transpose()
    }

    /// Returns the preload policy.
    pub fn preload(&self) -> Preload {
        self.preload
    }

    /// Checks the values that can't be validated during deserialization.
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == Some(0) {
            return Err(ConfigError::Invalid(
                "audio.sample_rate must be positive".to_string(),
            ));
        }
        self.mock_clip_length()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Audio {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let audio = parse("preload: eager");
        assert_eq!(audio.device(), "default");
        assert_eq!(audio.sample_rate(), None);
        assert_eq!(audio.mock_clip_length().unwrap(), None);
        assert_eq!(audio.preload(), Preload::Eager);
    }

    #[test]
    fn test_full() {
        let audio = parse(
            r#"
            device: mock-device
            sample_rate: 48000
            mock_clip_length: 1500ms
            preload: lazy
            "#,
        );
        assert_eq!(audio.device(), "mock-device");
        assert_eq!(audio.sample_rate(), Some(48000));
        assert_eq!(
            audio.mock_clip_length().unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(audio.preload(), Preload::Lazy);
        assert!(audio.validate().is_ok());
    }

    #[test]
    fn test_invalid_clip_length() {
        let audio = parse("mock_clip_length: forever");
        assert!(matches!(
            audio.validate(),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_zero_sample_rate() {
        let audio = parse("sample_rate: 0");
        assert!(matches!(audio.validate(), Err(ConfigError::Invalid(_))));
    }
}
