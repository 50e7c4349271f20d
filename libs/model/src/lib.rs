//! # iot-model
//!
//! Desired-state document model for the iot-agent.
//!
//! A configuration document declares three kinds of runtime resources:
//! - Volumes (`Volumes`, a list identified by name)
//! - Networks (`Networks`, a map keyed by network name)
//! - Containers (`Containers`, a map keyed by container name)
//!
//! Field names follow the container runtime's API (PascalCase) so a document
//! can be written directly against the Docker Engine API reference. Fields the
//! model does not type explicitly are carried through to the runtime verbatim.
//!
//! ## Invariants
//!
//! - Every resource is identified by its name
//! - Container names are unique and valid runtime display names
//! - A parsed `DesiredState` is immutable; reconcilers only ever borrow it

mod container;
mod desired;
mod error;
mod fingerprint;
mod network;
mod volume;

pub use container::*;
pub use desired::{DesiredState, StateSummary};
pub use error::ModelError;
pub use fingerprint::Fingerprint;
pub use network::*;
pub use volume::VolumeSpec;
