//! Network reconciler.
//!
//! Networks are matched against the runtime by name. What happens on a match
//! depends on the configured `NetworkPolicy`.

use iot_model::DesiredState;
use tracing::{info, warn};

use crate::engine::{NetworkPolicy, Reconciler};
use crate::error::ReconcileError;

/// Outcome of the Network reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
    /// Set when `LegacyShortCircuit` ended the reconciler early.
    pub short_circuited: bool,
}

impl Reconciler {
    /// Create every declared network that the runtime does not list yet.
    pub async fn reconcile_networks(
        &self,
        desired: &DesiredState,
    ) -> Result<NetworkReport, ReconcileError> {
        let mut report = NetworkReport::default();

        let existing = self.runtime.list_networks().await.map_err(|e| {
            warn!(error = %e, "Network list failed");
            ReconcileError::ListNetworks(e)
        })?;

        for (name, spec) in &desired.networks {
            if existing.iter().any(|net| &net.name == name) {
                warn!(network = %name, "Network create: nothing to do, already exists");
                report.skipped.push(name.clone());

                if self.config.network_policy == NetworkPolicy::LegacyShortCircuit {
                    report.short_circuited = true;
                    return Ok(report);
                }
                continue;
            }

            info!(network = %name, driver = %spec.driver_name(), "Creating network");
            let created = self
                .runtime
                .create_network(name, spec)
                .await
                .map_err(|source| {
                    warn!(network = %name, error = %source, "Network create failed");
                    ReconcileError::CreateNetwork {
                        name: name.clone(),
                        source,
                    }
                })?;

            match created.warning.as_deref().filter(|w| !w.is_empty()) {
                Some(warning) => {
                    warn!(network = %name, id = %created.id, warning, "Network created with warning")
                }
                None => info!(network = %name, id = %created.id, "Network created"),
            }
            report.created.push(name.clone());
        }

        Ok(report)
    }
}
