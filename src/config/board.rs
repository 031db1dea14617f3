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
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audio::Audio;
use super::error::ConfigError;
use crate::registry::{Registry, SampleDescriptor};

/// Prefix of environment variables that override board settings, e.g.
/// `SOUNDBOARD_AUDIO__DEVICE=mock`.
const ENV_PREFIX: &str = "SOUNDBOARD";

/// A YAML representation of a soundboard.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Board {
    /// The title shown above the tiles.
    title: String,

    /// Optional line shown under the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tagline: Option<String>,

    #[serde(default)]
    audio: Audio,

    /// The tiles, in display order.
    samples: Vec<SampleDescriptor>,

    /// Directory relative sources are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Board {
    /// Creates a new board configuration.
    pub fn new(title: &str, audio: Audio, samples: Vec<SampleDescriptor>) -> Board {
        Board {
            title: title.to_string(),
            tagline: None,
            audio,
            samples,
            base_dir: PathBuf::new(),
        }
    }

    /// Parses a board from a YAML file. Environment variables prefixed with
    /// `SOUNDBOARD_` override values from the file.
    pub fn deserialize(path: &Path) -> Result<Board, ConfigError> {
        let mut board = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Board>()?;

        board.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        board.audio.validate()?;
        info!(
            path = ?path,
            title = board.title,
            samples = board.samples.len(),
            "Loaded board."
        );

        Ok(board)
    }

    /// Serialize and save the board to a file at the given path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = serde_yml::to_string(self)?;
        fs::write(path, serialized)?;
        info!(path = ?path, "Saved board.");
        Ok(())
    }

    /// Gets the title of the board.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tagline(&self) -> Option<&str> {
        self.tagline.as_deref()
    }

    /// Gets the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Gets the samples as written in the file.
    pub fn samples(&self) -> &[SampleDescriptor] {
        &self.samples
    }

    /// Builds the registry, resolving relative sources against the directory
    /// the board was loaded from.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        let samples = self
            .samples
            .iter()
            .map(|sample| {
                let source = Path::new(sample.source());
                let resolved = if source.is_absolute() {
                    source.to_path_buf()
                } else {
                    self.base_dir.join(source)
                };
                SampleDescriptor::new(
                    sample.id(),
                    sample.label(),
                    &resolved.to_string_lossy(),
                )
            })
            .collect();

        Ok(Registry::new(samples)?)
    }
}

/// The board written by `soundboard init`.
pub fn default_board() -> Board {
    let samples = [
        ("lugnt", "Amen de e lugnt", "amen-de-e-lugnt.mp3"),
        ("du", "De e du ju", "de-e-du-ju.mp3"),
        ("groggdags", "Det är groggdags", "det-ar-groggdags.mp3"),
        ("helvete", "Far åt helvete", "far-at-helvete.mp3"),
        ("gris", "Grisajävel", "grisajavel.mp3"),
        ("vakna", "Jonas vakna!", "jonas-vakna.mp3"),
        ("luffare", "Luffarjävel", "luffarjavel.mp3"),
        ("tack", "Tack", "tack.mp3"),
        ("tommen", "Tommen opp", "tommen-opp.mp3"),
        ("tony", "Tony!", "tony.mp3"),
        ("klunka", "Nån skrev klunka", "skrev-klunka.mp3"),
        ("vrala", "Sitta å vråla", "sitta-a-vrala.mp3"),
    ]
    .into_iter()
    .map(|(id, label, file)| SampleDescriptor::new(id, label, &format!("sounds/{}", file)))
    .collect();

    Board::new("Tony!", Audio::default(), samples)
}
