//! The desired-state aggregate.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::container::ContainerSpec;
use crate::error::ModelError;
use crate::fingerprint::Fingerprint;
use crate::network::NetworkSpec;
use crate::volume::VolumeSpec;

/// Everything a configuration document declares.
///
/// Produced once per configuration load. Maps are ordered so every
/// reconciler visits resources in the same order on every pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DesiredState {
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    #[serde(default)]
    pub networks: BTreeMap<String, NetworkSpec>,

    #[serde(default)]
    pub containers: BTreeMap<String, ContainerSpec>,
}

/// Resource counts for a loaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSummary {
    pub volumes: usize,
    pub networks: usize,
    pub containers: usize,
}

impl DesiredState {
    /// Parse and validate a JSON configuration document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        let state: DesiredState = serde_json::from_slice(bytes)?;
        state.validate()?;
        Ok(state)
    }

    /// Check names and required fields.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for (index, volume) in self.volumes.iter().enumerate() {
            if volume.name.is_empty() {
                return Err(ModelError::UnnamedVolume { index });
            }
            if !seen.insert(volume.name.as_str()) {
                return Err(ModelError::DuplicateVolume(volume.name.clone()));
            }
        }

        if self.networks.keys().any(|name| name.is_empty()) {
            return Err(ModelError::EmptyNetworkName);
        }

        for (name, container) in &self.containers {
            validate_container_name(name)?;
            if container.image().trim().is_empty() {
                return Err(ModelError::MissingImage(name.clone()));
            }
        }

        Ok(())
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            volumes: self.volumes.len(),
            networks: self.networks.len(),
            containers: self.containers.len(),
        }
    }

    /// Content hash used to tell whether a reloaded document changed.
    pub fn fingerprint(&self) -> Fingerprint {
        match serde_json::to_value(self) {
            Ok(value) => Fingerprint::from_json(&value),
            // All map keys are strings, so this only fails on a serializer bug.
            Err(_) => Fingerprint::from_json(&serde_json::Value::Null),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty() && self.networks.is_empty() && self.containers.is_empty()
    }
}

/// Container names follow the runtime grammar `[a-zA-Z0-9][a-zA-Z0-9_.-]+`.
fn validate_container_name(name: &str) -> Result<(), ModelError> {
    let invalid = |reason| ModelError::InvalidContainerName {
        name: name.to_string(),
        reason,
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("name is empty")),
        Some(first) if !first.is_ascii_alphanumeric() => {
            return Err(invalid("must start with a letter or digit"));
        }
        Some(_) => {}
    }

    let rest = chars.as_str();
    if rest.is_empty() {
        return Err(invalid("must be at least two characters"));
    }
    if rest
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(invalid("only letters, digits, '_', '.' and '-' are allowed"));
    }

    Ok(())
}
