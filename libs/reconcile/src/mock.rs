//! In-memory runtime for tests and dry runs.
//!
//! `MockRuntime` keeps a small model of volumes, networks and containers,
//! records every call in order, and can be told to fail specific calls.
//! Creates and removals update the model, so a second pass observes what the
//! first one did.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use iot_model::{ContainerSpec, NetworkSpec, VolumeSpec};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RuntimeError;
use crate::names::listed_name;
use crate::runtime::{
    ContainerRuntime, ContainerState, ContainerSummary, CreatedContainer, CreatedNetwork,
    NetworkSummary, ProgressStream,
};

/// A recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    CreateVolume(String),
    ListNetworks,
    CreateNetwork(String),
    PullImage(String),
    ListContainers { include_stopped: bool },
    StopContainer { id: String, timeout: Duration },
    RemoveContainer { id: String, force: bool },
    CreateContainer(String),
    StartContainer(String),
}

impl RuntimeCall {
    /// Whether the call changes runtime state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            RuntimeCall::ListNetworks | RuntimeCall::ListContainers { .. }
        )
    }
}

/// A call that the mock should fail with a runtime API error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// By volume name.
    CreateVolume(String),
    ListNetworks,
    /// By network name.
    CreateNetwork(String),
    /// By image reference.
    PullImage(String),
    ListContainers,
    /// By container id.
    StopContainer(String),
    /// By container id.
    RemoveContainer(String),
    /// By container name.
    CreateContainer(String),
    /// By container id.
    StartContainer(String),
}

#[derive(Debug, Default)]
struct MockState {
    volumes: BTreeSet<String>,
    networks: Vec<NetworkSummary>,
    containers: Vec<ContainerSummary>,
    calls: Vec<RuntimeCall>,
    /// Status returned by each failing call.
    failures: HashMap<FailPoint, u16>,
    pull_output: Option<Vec<&'static str>>,
}

impl MockState {
    fn check(&self, point: FailPoint) -> Result<(), RuntimeError> {
        if let Some(&status) = self.failures.get(&point) {
            return Err(RuntimeError::api(status, format!("mock failure: {point:?}")));
        }
        Ok(())
    }

    fn container_mut(&mut self, id: &str) -> Result<&mut ContainerSummary, RuntimeError> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::api(404, format!("No such container: {id}")))
    }
}

/// In-memory container runtime.
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing network.
    pub fn with_network(mut self, name: &str) -> Self {
        self.state.get_mut().networks.push(NetworkSummary {
            id: format!("{name}-id"),
            name: name.to_string(),
        });
        self
    }

    /// Pre-existing container listed under a single name.
    pub fn with_container(self, id: &str, name: &str, state: ContainerState) -> Self {
        let listed = listed_name(name);
        self.with_container_names(id, &[listed.as_str()], state)
    }

    /// Pre-existing container with raw listed names.
    pub fn with_container_names(mut self, id: &str, names: &[&str], state: ContainerState) -> Self {
        self.state.get_mut().containers.push(ContainerSummary {
            id: id.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            state,
        });
        self
    }

    pub fn with_failure(self, point: FailPoint) -> Self {
        self.with_failure_status(point, 500)
    }

    /// Fail a call with a specific API status.
    pub fn with_failure_status(mut self, point: FailPoint, status: u16) -> Self {
        self.state.get_mut().failures.insert(point, status);
        self
    }

    /// Raw chunks returned by every pull instead of the default two records.
    pub fn with_pull_output(mut self, chunks: Vec<&'static str>) -> Self {
        self.state.get_mut().pull_output = Some(chunks);
        self
    }

    /// Fail (or stop failing) a call from now on.
    pub async fn set_failure(&self, point: FailPoint, enabled: bool) {
        let mut state = self.state.lock().await;
        if enabled {
            state.failures.insert(point, 500);
        } else {
            state.failures.remove(&point);
        }
    }

    /// Every call so far, in order.
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn mutating_calls(&self) -> Vec<RuntimeCall> {
        self.calls()
            .await
            .into_iter()
            .filter(RuntimeCall::is_mutating)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Primary display names of the current containers.
    pub async fn container_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .containers
            .iter()
            .filter_map(|c| c.primary_name().map(str::to_string))
            .collect()
    }

    pub async fn container_state(&self, name: &str) -> Option<ContainerState> {
        self.state
            .lock()
            .await
            .containers
            .iter()
            .find(|c| c.primary_name() == Some(name))
            .map(|c| c.state)
    }

    pub async fn volume_names(&self) -> Vec<String> {
        self.state.lock().await.volumes.iter().cloned().collect()
    }

    pub async fn network_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .networks
            .iter()
            .map(|n| n.name.clone())
            .collect()
    }

    /// Simulate an operator (or crash) deleting a container out of band.
    pub async fn forget_container(&self, name: &str) {
        self.state
            .lock()
            .await
            .containers
            .retain(|c| c.primary_name() != Some(name));
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::CreateVolume(spec.name.clone()));
        state.check(FailPoint::CreateVolume(spec.name.clone()))?;

        debug!(volume = %spec.name, "[MOCK] Creating volume");
        state.volumes.insert(spec.name.clone());
        Ok(spec.name.clone())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::ListNetworks);
        state.check(FailPoint::ListNetworks)?;
        Ok(state.networks.clone())
    }

    async fn create_network(
        &self,
        name: &str,
        _spec: &NetworkSpec,
    ) -> Result<CreatedNetwork, RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::CreateNetwork(name.to_string()));
        state.check(FailPoint::CreateNetwork(name.to_string()))?;

        debug!(network = %name, "[MOCK] Creating network");
        let id = format!("{name}-id");
        state.networks.push(NetworkSummary {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(CreatedNetwork { id, warning: None })
    }

    async fn pull_image(&self, image: &str) -> Result<ProgressStream, RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::PullImage(image.to_string()));
        state.check(FailPoint::PullImage(image.to_string()))?;

        let chunks: Vec<Bytes> = match &state.pull_output {
            Some(chunks) => chunks
                .iter()
                .copied()
                .map(|c| Bytes::from_static(c.as_bytes()))
                .collect(),
            None => vec![
                Bytes::from(format!("{{\"status\":\"Pulling from {image}\"}}\n")),
                Bytes::from(format!(
                    "{{\"status\":\"Status: Downloaded newer image for {image}\"}}\n"
                )),
            ],
        };
        Ok(Box::pin(tokio_stream::iter(chunks.into_iter().map(Ok))))
    }

    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RuntimeCall::ListContainers { include_stopped });
        state.check(FailPoint::ListContainers)?;

        Ok(state
            .containers
            .iter()
            .filter(|c| include_stopped || c.state.is_running())
            .cloned()
            .collect())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::StopContainer {
            id: id.to_string(),
            timeout,
        });
        state.check(FailPoint::StopContainer(id.to_string()))?;

        debug!(id, timeout_secs = timeout.as_secs(), "[MOCK] Stopping container");
        state.container_mut(id)?.state = ContainerState::Exited;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::RemoveContainer {
            id: id.to_string(),
            force,
        });
        state.check(FailPoint::RemoveContainer(id.to_string()))?;

        if state.container_mut(id)?.state.is_running() && !force {
            return Err(RuntimeError::api(
                409,
                format!("cannot remove running container {id}"),
            ));
        }
        debug!(id, "[MOCK] Removing container");
        state.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        _spec: &ContainerSpec,
    ) -> Result<CreatedContainer, RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::CreateContainer(name.to_string()));
        state.check(FailPoint::CreateContainer(name.to_string()))?;

        if state.containers.iter().any(|c| c.primary_name() == Some(name)) {
            return Err(RuntimeError::api(
                409,
                format!("container name {} is already in use", listed_name(name)),
            ));
        }

        debug!(container = %name, "[MOCK] Creating container");
        let id = format!("{name}-id");
        state.containers.push(ContainerSummary {
            id: id.clone(),
            names: vec![listed_name(name)],
            state: ContainerState::Created,
        });
        Ok(CreatedContainer {
            id,
            warnings: Vec::new(),
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().await;
        state.calls.push(RuntimeCall::StartContainer(id.to_string()));
        state.check(FailPoint::StartContainer(id.to_string()))?;

        debug!(id, "[MOCK] Starting container");
        state.container_mut(id)?.state = ContainerState::Running;
        Ok(())
    }
}
