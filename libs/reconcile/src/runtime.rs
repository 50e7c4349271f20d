//! Container runtime interface and observed-state types.
//!
//! The runtime interface abstracts the resource operations the reconcilers
//! need: volume, network and container CRUD plus image pulls. The agent
//! implements it against the Docker Engine API; `MockRuntime` implements it
//! in memory for tests.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use iot_model::{ContainerSpec, NetworkSpec, VolumeSpec};
use serde::{Deserialize, Deserializer};

use crate::error::RuntimeError;
use crate::names::display_name;

/// Raw bytes of an image pull's newline-delimited progress records.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<Bytes, RuntimeError>> + Send>>;

/// Container runtime interface.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a volume; returns the volume name reported by the runtime.
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<String, RuntimeError>;

    /// List all networks.
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError>;

    /// Create a network with the given name.
    async fn create_network(
        &self,
        name: &str,
        spec: &NetworkSpec,
    ) -> Result<CreatedNetwork, RuntimeError>;

    /// Start pulling an image; the returned stream ends when the pull does.
    async fn pull_image(&self, image: &str) -> Result<ProgressStream, RuntimeError>;

    /// List containers, optionally including stopped ones.
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Stop a container, giving it `timeout` to exit before it is killed.
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    /// Create a container from its three option bundles under `name`.
    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<CreatedContainer, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;
}

/// A network as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

/// Lifecycle state of a listed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Created => write!(f, "created"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Paused => write!(f, "paused"),
            ContainerState::Restarting => write!(f, "restarting"),
            ContainerState::Removing => write!(f, "removing"),
            ContainerState::Exited => write!(f, "exited"),
            ContainerState::Dead => write!(f, "dead"),
            ContainerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// A container as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,

    /// Raw names, each prefixed with the name separator.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub names: Vec<String>,

    pub state: ContainerState,
}

impl ContainerSummary {
    /// The container's own display name (first listed name).
    pub fn primary_name(&self) -> Option<&str> {
        self.names.first().and_then(|raw| display_name(raw))
    }

    /// Every parseable display name of this container.
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().filter_map(|raw| display_name(raw))
    }
}

/// Result of a network create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatedNetwork {
    pub id: String,

    #[serde(default)]
    pub warning: Option<String>,
}

/// Result of a container create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatedContainer {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub warnings: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
