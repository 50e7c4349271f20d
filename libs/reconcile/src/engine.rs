//! The reconciler and a full pass.

use std::sync::Arc;
use std::time::Duration;

use iot_model::DesiredState;
use tracing::{debug, info};

use crate::containers::{CreationReport, RemovalReport};
use crate::error::ReconcileError;
use crate::networks::NetworkReport;
use crate::runtime::ContainerRuntime;

/// Default grace period given to a running container before it is killed.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// What the Network reconciler does when a declared name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkPolicy {
    /// Skip that network and keep going.
    #[default]
    PerNetwork,

    /// Stop the reconciler at the first existing name, leaving any later
    /// networks uncreated for this pass.
    LegacyShortCircuit,
}

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Grace period passed to the runtime when stopping a container.
    pub stop_timeout: Duration,

    pub network_policy: NetworkPolicy,

    /// Pull a container's image before creating it.
    pub pull_images: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            network_policy: NetworkPolicy::default(),
            pull_images: true,
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub volumes_created: usize,
    pub networks: NetworkReport,
    /// `None` when Container-Removal was not part of the pass.
    pub removal: Option<RemovalReport>,
    pub creation: CreationReport,
}

/// Drives a container runtime toward a desired state.
///
/// The reconciler holds no state between calls: every reconciler lists what
/// it needs from the runtime when it starts.
pub struct Reconciler {
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: ReconcilerConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run Volume, Network, Container-Removal (when `include_removal`) and
    /// Container-Creation in order, stopping at the first aborting error.
    pub async fn run_pass(
        &self,
        desired: &DesiredState,
        include_removal: bool,
    ) -> Result<PassReport, ReconcileError> {
        self.run_pass_with(desired, include_removal, || {}).await
    }

    /// Like [`run_pass`](Self::run_pass), calling `on_removed` as soon as
    /// Container-Removal has completed, even if a later reconciler aborts.
    pub async fn run_pass_with<F>(
        &self,
        desired: &DesiredState,
        include_removal: bool,
        on_removed: F,
    ) -> Result<PassReport, ReconcileError>
    where
        F: FnOnce() + Send,
    {
        debug!(include_removal, "Starting reconciliation pass");

        let volumes_created = self.reconcile_volumes(desired).await?;
        let networks = self.reconcile_networks(desired).await?;
        let removal = if include_removal {
            let report = self.remove_containers(desired).await?;
            on_removed();
            Some(report)
        } else {
            None
        };
        let creation = self.create_containers(desired).await?;

        let report = PassReport {
            volumes_created,
            networks,
            removal,
            creation,
        };

        info!(
            volumes_created = report.volumes_created,
            networks_created = report.networks.created.len(),
            containers_removed = report.removal.as_ref().map_or(0, |r| r.removed.len()),
            containers_created = report.creation.created.len(),
            containers_skipped = report.creation.skipped.len(),
            "Reconciliation pass complete"
        );

        Ok(report)
    }
}
