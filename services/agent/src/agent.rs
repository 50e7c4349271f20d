//! Poll loop for converging the runtime toward the configured document.
//!
//! The agent:
//! - Loads the document once at startup (fatal on failure)
//! - Runs a pass immediately, then once per poll interval
//! - Reloads the document before every later pass, keeping the last good
//!   one when a reload fails

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use iot_model::{DesiredState, Fingerprint};
use iot_reconcile::{ContainerRuntime, PassReport, ReconcileError, Reconciler};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, RemovalPolicy};
use crate::source::ConfigSource;

/// Agent loop configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Interval between passes.
    pub poll_interval: Duration,

    pub removal_policy: RemovalPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            removal_policy: RemovalPolicy::OnChange,
        }
    }
}

impl From<&Config> for AgentConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            removal_policy: config.removal_policy,
        }
    }
}

/// Reconciles the runtime against the configured document until shutdown.
pub struct Agent {
    source: ConfigSource,
    reconciler: Reconciler,
    config: AgentConfig,

    /// Last document that loaded successfully.
    desired: DesiredState,

    /// Fingerprint of the last document a pass fully applied.
    last_applied: Option<Fingerprint>,

    /// Fingerprint of the last document Container-Removal completed for.
    removed_for: Option<Fingerprint>,
}

impl Agent {
    /// Load the document and build the agent.
    ///
    /// Any failure here is fatal; no pass runs against an unknown document.
    pub async fn bootstrap(
        source: ConfigSource,
        runtime: Arc<dyn ContainerRuntime>,
        settings: &Config,
    ) -> Result<Self> {
        let desired = source
            .load()
            .await
            .context("Failed to load initial configuration")?;

        Ok(Self::new(
            source,
            Reconciler::new(runtime, settings.reconciler_config()),
            AgentConfig::from(settings),
            desired,
        ))
    }

    /// Create an agent from an already loaded document.
    pub fn new(
        source: ConfigSource,
        reconciler: Reconciler,
        config: AgentConfig,
        desired: DesiredState,
    ) -> Self {
        Self {
            source,
            reconciler,
            config,
            desired,
            last_applied: None,
            removed_for: None,
        }
    }

    /// The document the next pass will use.
    pub fn desired(&self) -> &DesiredState {
        &self.desired
    }

    pub fn last_applied(&self) -> Option<&Fingerprint> {
        self.last_applied.as_ref()
    }

    /// Run the poll loop until shutdown.
    ///
    /// Passes run inline, so a pass never overlaps another one; shutdown is
    /// observed between passes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            removal_policy = ?self.config.removal_policy,
            "Starting agent loop"
        );

        let first = self.reconcile().await;
        log_pass(first);

        let poll = self.config.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + poll, poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let result = self.run_pass().await;
                    log_pass(result);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Agent shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Reload the document, then reconcile against it.
    pub async fn run_pass(&mut self) -> Result<PassReport, ReconcileError> {
        self.refresh().await;
        self.reconcile().await
    }

    /// Replace the desired state with a freshly loaded document.
    ///
    /// Returns whether the reload succeeded.
    pub async fn refresh(&mut self) -> bool {
        match self.source.load().await {
            Ok(desired) => {
                self.desired = desired;
                true
            }
            Err(e) => {
                warn!(
                    source = %self.source.locator(),
                    error = ?e,
                    "Configuration reload failed, keeping last good configuration"
                );
                false
            }
        }
    }

    /// Run one pass against the current desired state.
    pub async fn reconcile(&mut self) -> Result<PassReport, ReconcileError> {
        let fingerprint = self.desired.fingerprint();
        let include_removal = self.should_remove(&fingerprint);
        debug!(%fingerprint, include_removal, "Reconciling");

        let removed_for = &mut self.removed_for;
        let removed = fingerprint.clone();
        let report = self
            .reconciler
            .run_pass_with(&self.desired, include_removal, move || {
                *removed_for = Some(removed);
            })
            .await?;

        if self.last_applied.as_ref() != Some(&fingerprint) {
            info!(%fingerprint, "Configuration applied");
            self.last_applied = Some(fingerprint);
        }
        Ok(report)
    }

    fn should_remove(&self, fingerprint: &Fingerprint) -> bool {
        match self.config.removal_policy {
            RemovalPolicy::EveryPass => true,
            RemovalPolicy::OnChange => self.removed_for.as_ref() != Some(fingerprint),
        }
    }
}

fn log_pass(result: Result<PassReport, ReconcileError>) {
    if let Err(e) = result {
        error!(
            reason = e.reason_code(),
            error = %e,
            "Reconciliation pass failed, will retry at next interval"
        );
    }
}
