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
use crate::registry::RegistryError;

/// Typed error for board load, validation and save failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid sample list: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid duration for {field}: {value}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unable to serialize board: {0}")]
    Serialize(#[from] serde_yml::Error),

    #[error("Unable to write board: {0}")]
    Io(#[from] std::io::Error),
}
