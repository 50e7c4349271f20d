//! Container-Removal and Container-Creation reconcilers.
//!
//! Removal clears every declared name from the runtime so creation starts
//! from a clean slate for that name. Creation only ever creates containers
//! whose name is not listed; an existing container is never updated in place.

use std::collections::HashSet;

use iot_model::{ContainerSpec, DesiredState};
use tracing::{error, info, warn};

use crate::engine::Reconciler;
use crate::error::ReconcileError;
use crate::progress::consume_pull_progress;
use crate::runtime::CreatedContainer;

/// Outcome of the Container-Removal reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub stopped: Vec<String>,
    pub removed: Vec<String>,
    /// Containers whose stop or remove failed; they were left in place.
    pub failed: Vec<String>,
}

/// Outcome of the Container-Creation reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

impl Reconciler {
    /// Stop and force-remove every runtime container with a declared name.
    ///
    /// Only the initial listing can fail this reconciler. A container that
    /// fails to stop is not removed; a failed stop or remove is logged and the
    /// next container is processed. A container that disappears between the
    /// listing and the stop or remove (404) counts as removed.
    pub async fn remove_containers(
        &self,
        desired: &DesiredState,
    ) -> Result<RemovalReport, ReconcileError> {
        let existing = self.runtime.list_containers(true).await.map_err(|e| {
            error!(error = %e, "Container list for stop and remove failed");
            ReconcileError::ListContainers(e)
        })?;

        let mut report = RemovalReport::default();

        for container in &existing {
            let Some(name) = container.primary_name() else {
                continue;
            };
            if !desired.containers.contains_key(name) {
                continue;
            }

            info!(container = %name, id = %container.id, state = %container.state, "Found declared container");

            if container.state.is_running() {
                if let Err(e) = self
                    .runtime
                    .stop_container(&container.id, self.config.stop_timeout)
                    .await
                {
                    if e.is_not_found() {
                        info!(container = %name, id = %container.id, "Container already removed");
                        report.removed.push(name.to_string());
                    } else {
                        error!(container = %name, id = %container.id, error = %e, "Container stop failed");
                        report.failed.push(name.to_string());
                    }
                    continue;
                }
                info!(container = %name, "Stopped container");
                report.stopped.push(name.to_string());
            }

            if let Err(e) = self.runtime.remove_container(&container.id, true).await {
                if !e.is_not_found() {
                    error!(container = %name, id = %container.id, error = %e, "Container remove failed");
                    report.failed.push(name.to_string());
                    continue;
                }
                info!(container = %name, id = %container.id, "Container already removed");
            } else {
                info!(container = %name, "Removed container");
            }
            report.removed.push(name.to_string());
        }

        Ok(report)
    }

    /// Create and start every declared container whose name is not listed.
    ///
    /// The first pull, create or start failure aborts the remaining
    /// containers.
    pub async fn create_containers(
        &self,
        desired: &DesiredState,
    ) -> Result<CreationReport, ReconcileError> {
        let existing = self.runtime.list_containers(true).await.map_err(|e| {
            error!(error = %e, "Container list failed");
            ReconcileError::ListContainers(e)
        })?;

        let mut names = HashSet::new();
        for container in &existing {
            info!(id = %container.id, state = %container.state, names = ?container.names, "Found container");
            names.extend(container.display_names().map(str::to_string));
        }

        let mut report = CreationReport::default();

        for (name, spec) in &desired.containers {
            if names.contains(name) {
                warn!(container = %name, "Create container found existing container, nothing to do");
                report.skipped.push(name.clone());
                continue;
            }

            self.create_and_start(name, spec).await?;
            report.created.push(name.clone());
        }

        Ok(report)
    }

    async fn create_and_start(&self, name: &str, spec: &ContainerSpec) -> Result<(), ReconcileError> {
        if self.config.pull_images {
            self.pull_image(spec.image()).await?;
        }

        info!(container = %name, image = %spec.image(), "Creating container");
        let CreatedContainer { id, warnings } = self
            .runtime
            .create_container(name, spec)
            .await
            .map_err(|source| {
                if source.is_conflict() {
                    warn!(container = %name, error = %source, "Container name is held by an unlisted container");
                } else {
                    warn!(container = %name, error = %source, "Create container failed");
                }
                ReconcileError::CreateContainer {
                    name: name.to_string(),
                    source,
                }
            })?;
        info!(container = %name, id = %id, warnings = ?warnings, "Created container");

        info!(container = %name, id = %id, "Starting container");
        self.runtime.start_container(&id).await.map_err(|source| {
            warn!(container = %name, id = %id, error = %source, "Container start failed");
            ReconcileError::StartContainer {
                name: name.to_string(),
                id: id.clone(),
                source,
            }
        })?;

        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), ReconcileError> {
        info!(image, "Pulling image");
        let stream = self
            .runtime
            .pull_image(image)
            .await
            .map_err(|source| ReconcileError::PullImage {
                image: image.to_string(),
                source,
            })?;
        let records = consume_pull_progress(image, stream).await?;
        info!(image, records, "Image pull complete");
        Ok(())
    }
}
