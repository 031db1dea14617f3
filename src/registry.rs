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

//! The sample registry: the fixed, ordered set of clips a board can play.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Describes a single playable clip.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SampleDescriptor {
    /// Stable key for the sample. Unique within a registry.
    id: String,
    /// Display text for the tile.
    label: String,
    /// Location of the audio asset.
    source: String,
}

impl SampleDescriptor {
    /// Creates a new sample descriptor.
    pub fn new(id: &str, label: &str, source: &str) -> SampleDescriptor {
        SampleDescriptor {
            id: id.to_string(),
            label: label.to_string(),
            source: source.to_string(),
        }
    }

    /// Gets the id of the sample.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the display label of the sample.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Gets the location of the audio asset.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for SampleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.label, self.id, self.source)
    }
}

/// Errors raised while building or querying a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("sample at position {0} has an empty id")]
    EmptyId(usize),

    #[error("sample id {0} is defined more than once")]
    DuplicateId(String),

    #[error("no sample with id {0}")]
    NotFound(String),
}

/// An immutable, ordered list of samples with lookup by id.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    samples: Vec<SampleDescriptor>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Builds a registry from the given descriptors, preserving their order.
    pub fn new(samples: Vec<SampleDescriptor>) -> Result<Registry, RegistryError> {
        let mut index = HashMap::with_capacity(samples.len());
        for (position, sample) in samples.iter().enumerate() {
            if sample.id.is_empty() {
                return Err(RegistryError::EmptyId(position));
            }
            if index.insert(sample.id.clone(), position).is_some() {
                return Err(RegistryError::DuplicateId(sample.id.clone()));
            }
        }

        Ok(Registry { samples, index })
    }

    /// All samples in configuration order.
    pub fn all(&self) -> &[SampleDescriptor] {
        &self.samples
    }

    /// Looks up a sample by id.
    pub fn by_id(&self, id: &str) -> Result<&SampleDescriptor, RegistryError> {
        self.index
            .get(id)
            .map(|position| &self.samples[*position])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Returns true if the registry has a sample with the given id.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// The number of samples in the registry.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the registry has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(vec![
            SampleDescriptor::new("tack", "Tack", "sounds/tack.mp3"),
            SampleDescriptor::new("tony", "Tony!", "sounds/tony.mp3"),
            SampleDescriptor::new("gris", "Grisajävel", "sounds/grisajavel.mp3"),
        ])
        .expect("valid registry")
    }

    #[test]
    fn test_all_preserves_order() {
        let registry = registry();
        let ids: Vec<&str> = registry.all().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["tack", "tony", "gris"]);
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_by_id() {
        let registry = registry();
        let sample = registry.by_id("tony").unwrap();
        assert_eq!(sample.label(), "Tony!");
        assert_eq!(sample.source(), "sounds/tony.mp3");
        assert!(registry.contains("gris"));
    }

    #[test]
    fn test_by_id_not_found() {
        let registry = registry();
        assert_eq!(
            registry.by_id("nope"),
            Err(RegistryError::NotFound("nope".to_string()))
        );
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = Registry::new(vec![
            SampleDescriptor::new("a", "A", "a.wav"),
            SampleDescriptor::new("a", "Also A", "a2.wav"),
        ]);
        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateId("a".to_string())
        );
    }

    #[test]
    fn test_empty_id_rejected() {
        let result = Registry::new(vec![
            SampleDescriptor::new("a", "A", "a.wav"),
            SampleDescriptor::new("", "Nameless", "b.wav"),
        ]);
        assert_eq!(result.unwrap_err(), RegistryError::EmptyId(1));
    }

    #[test]
    fn test_empty_registry() {
        let registry = Registry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.all().is_empty());
    }
}
