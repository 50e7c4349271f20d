//! Volume declarations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named volume to create on the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeSpec {
    /// Volume name (identity).
    #[serde(default)]
    pub name: String,

    /// Volume driver.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Driver-specific options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub driver_opts: BTreeMap<String, String>,

    /// User-defined labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_driver() -> String {
    "local".to_string()
}

impl VolumeSpec {
    /// Create a local volume with no labels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: default_driver(),
            driver_opts: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}
