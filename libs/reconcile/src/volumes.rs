//! Volume reconciler.
//!
//! Volumes are created unconditionally. The runtime treats a create for an
//! existing name as a no-op returning the existing volume, so no listing is
//! done first.

use iot_model::DesiredState;
use tracing::{info, warn};

use crate::engine::Reconciler;
use crate::error::ReconcileError;

impl Reconciler {
    /// Create every declared volume; returns how many creates succeeded.
    ///
    /// The first failure aborts the remaining volumes. Volumes created
    /// before the failure are left in place.
    pub async fn reconcile_volumes(&self, desired: &DesiredState) -> Result<usize, ReconcileError> {
        let mut created = 0;

        for volume in &desired.volumes {
            match self.runtime.create_volume(volume).await {
                Ok(name) => {
                    info!(volume = %name, driver = %volume.driver, "Volume created");
                    created += 1;
                }
                Err(source) => {
                    warn!(volume = %volume.name, error = %source, "Volume create failed");
                    return Err(ReconcileError::CreateVolume {
                        name: volume.name.clone(),
                        source,
                    });
                }
            }
        }

        Ok(created)
    }
}
