//! iot-agent Library
//!
//! The agent runs on a single IoT host next to its container runtime. It reads
//! a desired-state document from a file or URL and converges the runtime to
//! match it by creating volumes, networks and containers.
//!
//! ## Modules
//!
//! - `agent`: Poll loop and removal policy
//! - `config`: Environment-driven configuration
//! - `docker`: Docker Engine API client over the daemon's Unix socket
//! - `source`: Document loading from `file://` and `http(s)://` locators

pub mod agent;
pub mod config;
pub mod docker;
pub mod source;

pub use agent::{Agent, AgentConfig};
pub use config::{Config, LogFormat, RemovalPolicy};
pub use docker::DockerClient;
pub use source::{ConfigLocator, ConfigSource};
