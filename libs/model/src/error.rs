//! Error types for the desired-state model.

use thiserror::Error;

/// Errors produced while parsing or validating a configuration document.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The document is not valid JSON or does not match the model.
    #[error("config_parse_failed: {0}")]
    Parse(#[from] serde_json::Error),

    /// A volume was declared without a name.
    #[error("volume at index {index} has no name")]
    UnnamedVolume { index: usize },

    /// The same volume name was declared twice.
    #[error("duplicate volume name: {0}")]
    DuplicateVolume(String),

    /// A network was declared with an empty name.
    #[error("network name must not be empty")]
    EmptyNetworkName,

    /// A container name is not a valid runtime display name.
    #[error("invalid container name {name:?}: {reason}")]
    InvalidContainerName { name: String, reason: &'static str },

    /// A container does not reference an image.
    #[error("container {0} has no image")]
    MissingImage(String),
}

impl ModelError {
    /// Short reason code for logging.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ModelError::Parse(_) => "config_parse_failed",
            ModelError::UnnamedVolume { .. } => "unnamed_volume",
            ModelError::DuplicateVolume(_) => "duplicate_volume",
            ModelError::EmptyNetworkName => "empty_network_name",
            ModelError::InvalidContainerName { .. } => "invalid_container_name",
            ModelError::MissingImage(_) => "missing_image",
        }
    }
}
