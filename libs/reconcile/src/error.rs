//! Error types for runtime calls and reconciliation.

use thiserror::Error;

/// Errors returned by a `ContainerRuntime` implementation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime could not be reached or the connection failed mid-call.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The runtime answered with a non-success status.
    #[error("runtime API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The runtime's response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be built from the given arguments.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RuntimeError {
    /// Build an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        RuntimeError::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP-style status if the runtime answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RuntimeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Decode(err.to_string())
    }
}

/// Errors that abort a reconciler.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("create volume {name}: {source}")]
    CreateVolume { name: String, source: RuntimeError },

    #[error("list networks: {0}")]
    ListNetworks(#[source] RuntimeError),

    #[error("create network {name}: {source}")]
    CreateNetwork { name: String, source: RuntimeError },

    #[error("list containers: {0}")]
    ListContainers(#[source] RuntimeError),

    /// The pull request or its progress stream failed.
    #[error("pull image {image}: {source}")]
    PullImage { image: String, source: RuntimeError },

    /// The runtime reported a pull failure inside the progress stream.
    #[error("pull image {image}: {detail}")]
    PullProgress { image: String, detail: String },

    #[error("create container {name}: {source}")]
    CreateContainer { name: String, source: RuntimeError },

    #[error("start container {name} ({id}): {source}")]
    StartContainer {
        name: String,
        id: String,
        source: RuntimeError,
    },
}

impl ReconcileError {
    /// Short reason code for logging.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ReconcileError::CreateVolume { .. } => "volume_create_failed",
            ReconcileError::ListNetworks(_) => "network_list_failed",
            ReconcileError::CreateNetwork { .. } => "network_create_failed",
            ReconcileError::ListContainers(_) => "container_list_failed",
            ReconcileError::PullImage { .. } | ReconcileError::PullProgress { .. } => {
                "image_pull_failed"
            }
            ReconcileError::CreateContainer { .. } => "container_create_failed",
            ReconcileError::StartContainer { .. } => "container_start_failed",
        }
    }
}
