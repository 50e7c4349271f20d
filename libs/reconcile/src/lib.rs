//! Reconciliation engine for the iot-agent.
//!
//! This library drives a container runtime toward the state declared in a
//! configuration document. Key concepts:
//!
//! - **Desired state**: the parsed document (`iot_model::DesiredState`).
//! - **Observed state**: a snapshot listed from the runtime at the start of
//!   each reconciler, never kept across passes.
//! - **Pass**: one run of the Volume, Network, Container-Removal and
//!   Container-Creation reconcilers, in that order.
//!
//! # Invariants
//!
//! - Reconcilers only borrow the desired state
//! - Every runtime call is a single attempt; nothing is retried within a pass
//! - A pass over an unchanged document and an already converged runtime
//!   issues no mutating calls, as long as the caller skips Container-Removal
//!
//! # Error policy
//!
//! Volume, Network and Container-Creation failures abort the pass and are
//! returned. Per-container stop/remove failures are logged and skipped.

mod containers;
mod engine;
mod error;
pub mod mock;
pub mod names;
mod networks;
pub mod progress;
mod runtime;
mod volumes;

pub use containers::{CreationReport, RemovalReport};
pub use engine::{NetworkPolicy, PassReport, Reconciler, ReconcilerConfig, DEFAULT_STOP_TIMEOUT};
pub use error::{ReconcileError, RuntimeError};
pub use mock::{FailPoint, MockRuntime, RuntimeCall};
pub use networks::NetworkReport;
pub use runtime::{
    ContainerRuntime, ContainerState, ContainerSummary, CreatedContainer, CreatedNetwork,
    NetworkSummary, ProgressStream,
};
