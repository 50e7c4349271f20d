//! Configuration for the agent.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use iot_reconcile::{NetworkPolicy, ReconcilerConfig};

use crate::source::ConfigLocator;

const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
const DEFAULT_API_VERSION: &str = "1.35";

/// When Container-Removal is part of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// On the first pass and whenever the document changes.
    #[default]
    OnChange,

    /// On every pass.
    EveryPass,
}

impl FromStr for RemovalPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "on-change" => Ok(Self::OnChange),
            "every-pass" => Ok(Self::EveryPass),
            other => bail!("unknown removal policy {other:?} (expected on-change or every-pass)"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => bail!("unknown log format {other:?} (expected json or pretty)"),
        }
    }
}

/// Agent configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the desired-state document lives.
    pub source: ConfigLocator,

    /// Time between passes.
    pub poll_interval: Duration,

    /// Docker Engine API socket.
    pub docker_socket: PathBuf,

    /// Docker Engine API version used as the path prefix.
    pub docker_api_version: String,

    /// Grace period for stopping a container.
    pub stop_timeout: Duration,

    /// Restore the legacy network early return.
    pub network_short_circuit: bool,

    pub removal_policy: RemovalPolicy,

    /// Pull images before creating containers.
    pub pull_images: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg_url = lookup("AGENT_CFG_URL")
            .filter(|v| !v.is_empty())
            .context("Missing AGENT_CFG_URL. Set it to a file://, http:// or https:// location.")?;
        let source = ConfigLocator::parse(&cfg_url).context("AGENT_CFG_URL is invalid.")?;

        let poll_secs: u64 = parse_var(&lookup, "AGENT_POLL_SECS")
            .context("AGENT_POLL_SECS must be an integer (seconds).")?
            .unwrap_or(30);
        let poll_interval = Duration::from_secs(poll_secs.max(1));

        let docker_socket = match lookup("DOCKER_HOST").filter(|v| !v.is_empty()) {
            Some(host) => parse_docker_host(&host).context("DOCKER_HOST is invalid.")?,
            None => PathBuf::from(DEFAULT_DOCKER_SOCKET),
        };

        let docker_api_version = lookup("DOCKER_API_VERSION")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let stop_timeout_secs: u64 = parse_var(&lookup, "AGENT_STOP_TIMEOUT_SECS")
            .context("AGENT_STOP_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(30);

        let network_short_circuit = parse_flag(&lookup, "AGENT_NETWORK_SHORT_CIRCUIT")?
            .unwrap_or(false);

        let removal_policy: RemovalPolicy =
            parse_var(&lookup, "AGENT_REMOVAL_POLICY")?.unwrap_or_default();

        let pull_images = parse_flag(&lookup, "AGENT_PULL_IMAGES")?.unwrap_or(true);

        let log_level = lookup("AGENT_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let log_format: LogFormat =
            parse_var(&lookup, "AGENT_LOG_FORMAT")?.unwrap_or_default();

        Ok(Self {
            source,
            poll_interval,
            docker_socket,
            docker_api_version,
            stop_timeout: Duration::from_secs(stop_timeout_secs),
            network_short_circuit,
            removal_policy,
            pull_images,
            log_level,
            log_format,
        })
    }

    /// Settings for the reconciliation engine.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            stop_timeout: self.stop_timeout,
            network_policy: if self.network_short_circuit {
                NetworkPolicy::LegacyShortCircuit
            } else {
                NetworkPolicy::PerNetwork
            },
            pull_images: self.pull_images,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key}={v:?}: {e}"))
        })
        .transpose()
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .map(|v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => bail!("{key} must be a boolean, got {v:?}"),
        })
        .transpose()
}

/// Resolve `DOCKER_HOST` to a Unix socket path.
fn parse_docker_host(host: &str) -> Result<PathBuf> {
    if let Some(path) = host.strip_prefix("unix://") {
        if path.is_empty() {
            bail!("{host:?} has no socket path");
        }
        return Ok(PathBuf::from(path));
    }
    if host.starts_with('/') {
        return Ok(PathBuf::from(host));
    }
    bail!("{host:?} is not a unix socket; only unix:// hosts are supported")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("AGENT_CFG_URL", "file:///etc/agent.json")]))
            .unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.docker_socket, PathBuf::from("/var/run/docker.sock"));
        assert_eq!(config.docker_api_version, "1.35");
        assert_eq!(config.stop_timeout, Duration::from_secs(30));
        assert!(!config.network_short_circuit);
        assert_eq!(config.removal_policy, RemovalPolicy::OnChange);
        assert!(config.pull_images);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);

        let reconciler = config.reconciler_config();
        assert_eq!(reconciler.network_policy, NetworkPolicy::PerNetwork);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("AGENT_CFG_URL", "http://config.local/agent.json"),
            ("AGENT_POLL_SECS", "0"),
            ("DOCKER_HOST", "unix:///run/user/1000/docker.sock"),
            ("DOCKER_API_VERSION", "1.41"),
            ("AGENT_STOP_TIMEOUT_SECS", "5"),
            ("AGENT_NETWORK_SHORT_CIRCUIT", "true"),
            ("AGENT_REMOVAL_POLICY", "every-pass"),
            ("AGENT_PULL_IMAGES", "0"),
            ("AGENT_LOG_FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(
            config.docker_socket,
            PathBuf::from("/run/user/1000/docker.sock")
        );
        assert_eq!(config.docker_api_version, "1.41");
        assert_eq!(config.removal_policy, RemovalPolicy::EveryPass);
        assert!(!config.pull_images);
        assert_eq!(config.log_format, LogFormat::Pretty);

        let reconciler = config.reconciler_config();
        assert_eq!(reconciler.stop_timeout, Duration::from_secs(5));
        assert_eq!(reconciler.network_policy, NetworkPolicy::LegacyShortCircuit);
        assert!(!reconciler.pull_images);
    }

    #[test]
    fn test_missing_cfg_url() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("AGENT_CFG_URL"));
    }

    #[test]
    fn test_malformed_values() {
        for (key, value) in [
            ("AGENT_POLL_SECS", "soon"),
            ("AGENT_STOP_TIMEOUT_SECS", "-1"),
            ("AGENT_NETWORK_SHORT_CIRCUIT", "maybe"),
            ("AGENT_REMOVAL_POLICY", "never"),
            ("AGENT_LOG_FORMAT", "xml"),
            ("DOCKER_HOST", "tcp://127.0.0.1:2375"),
        ] {
            let result = Config::from_lookup(lookup(&[
                ("AGENT_CFG_URL", "file:///etc/agent.json"),
                (key, value),
            ]));
            assert!(result.is_err(), "{key}={value} should be rejected");
        }
    }

    #[test]
    fn test_parse_docker_host() {
        assert_eq!(
            parse_docker_host("unix:///var/run/docker.sock").unwrap(),
            PathBuf::from("/var/run/docker.sock")
        );
        assert_eq!(
            parse_docker_host("/tmp/docker.sock").unwrap(),
            PathBuf::from("/tmp/docker.sock")
        );
        assert!(parse_docker_host("unix://").is_err());
    }
}
