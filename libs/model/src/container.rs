//! Container declarations.
//!
//! A container spec is three option bundles mirroring the runtime's create
//! parameters: `Config` (what to run), `HostConfig` (how the host runs it)
//! and `NetworkingConfig` (which networks it joins). The fields the agent
//! reasons about are typed; everything else in a bundle is kept in `extra`
//! and forwarded to the runtime untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A container to create and start on the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    /// Runtime config (image, command, environment).
    pub config: RuntimeConfig,

    /// Host config (ports, privileges, restart and log policy).
    #[serde(default)]
    pub host_config: HostConfig,

    /// Network endpoint attachments.
    #[serde(default)]
    pub networking_config: NetworkingConfig,
}

impl ContainerSpec {
    /// Create a spec running the given image with default host and network config.
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            config: RuntimeConfig {
                image: image.into(),
                ..RuntimeConfig::default()
            },
            host_config: HostConfig::default(),
            networking_config: NetworkingConfig::default(),
        }
    }

    /// Image reference.
    pub fn image(&self) -> &str {
        &self.config.image
    }
}

/// Marker for the runtime's `{}` set members (e.g. exposed ports).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyObject {}

/// What to run inside the container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuntimeConfig {
    /// Image reference (`repo[:tag]` or `repo@digest`).
    #[serde(default)]
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,

    /// Environment as `KEY=value` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Exposed ports keyed by `port/proto`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, EmptyObject>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<bool>,

    /// Remaining runtime fields, forwarded verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How the host runs the container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    /// Bind mounts as `source:target[:mode]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,

    /// Published ports keyed by `port/proto`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,

    #[serde(default)]
    pub privileged: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_config: Option<LogConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    /// Remaining host fields, forwarded verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A host address published for a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<String>,
}

/// Restart behavior enforced by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    #[serde(default)]
    pub name: RestartPolicyName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_retry_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicyName {
    #[default]
    #[serde(alias = "")]
    No,
    Always,
    UnlessStopped,
    OnFailure,
}

/// Log driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogConfig {
    /// Log driver name (json-file, syslog, none, ...).
    #[serde(rename = "Type")]
    pub driver: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// Network endpoints the container attaches to at create time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkingConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints_config: BTreeMap<String, EndpointSettings>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Settings for one network endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointSettings {
    #[serde(default, rename = "IPAMConfig", skip_serializing_if = "Option::is_none")]
    pub ipam_config: Option<EndpointIpamConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Static addresses requested for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointIpamConfig {
    #[serde(default, rename = "IPv4Address", skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,

    #[serde(default, rename = "IPv6Address", skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEB: &str = r#"{
        "Config": {
            "Image": "nginx:1.25",
            "Cmd": ["nginx", "-g", "daemon off;"],
            "Env": ["MODE=edge"],
            "ExposedPorts": {"80/tcp": {}},
            "StopSignal": "SIGQUIT"
        },
        "HostConfig": {
            "PortBindings": {"80/tcp": [{"HostIp": "0.0.0.0", "HostPort": "8080"}]},
            "Privileged": true,
            "RestartPolicy": {"Name": "unless-stopped"},
            "LogConfig": {"Type": "json-file", "Config": {"max-size": "10m"}},
            "ShmSize": 67108864
        },
        "NetworkingConfig": {
            "EndpointsConfig": {
                "net-a": {"IPAMConfig": {"IPv4Address": "10.0.0.10"}, "Aliases": ["web"]}
            }
        }
    }"#;

    #[test]
    fn test_container_deserialization() {
        let spec: ContainerSpec = serde_json::from_str(WEB).unwrap();
        assert_eq!(spec.image(), "nginx:1.25");
        assert!(spec.host_config.privileged);
        assert_eq!(
            spec.host_config.restart_policy.as_ref().unwrap().name,
            RestartPolicyName::UnlessStopped
        );
        assert_eq!(spec.host_config.log_config.as_ref().unwrap().driver, "json-file");
        let binding = &spec.host_config.port_bindings["80/tcp"][0];
        assert_eq!(binding.host_port.as_deref(), Some("8080"));
        let endpoint = &spec.networking_config.endpoints_config["net-a"];
        assert_eq!(
            endpoint.ipam_config.as_ref().unwrap().ipv4_address.as_deref(),
            Some("10.0.0.10")
        );
    }

    #[test]
    fn test_untyped_fields_are_forwarded() {
        let spec: ContainerSpec = serde_json::from_str(WEB).unwrap();
        assert_eq!(spec.config.extra["StopSignal"], "SIGQUIT");

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["Config"]["StopSignal"], "SIGQUIT");
        assert_eq!(json["HostConfig"]["ShmSize"], 67108864);
        assert_eq!(json["Config"]["ExposedPorts"]["80/tcp"], serde_json::json!({}));
    }

    #[test]
    fn test_empty_restart_policy_name_means_no() {
        let policy: RestartPolicy = serde_json::from_str(r#"{"Name": ""}"#).unwrap();
        assert_eq!(policy.name, RestartPolicyName::No);
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"{"Name":"no"}"#);
    }

    #[test]
    fn test_host_and_network_config_are_optional() {
        let spec: ContainerSpec =
            serde_json::from_str(r#"{"Config": {"Image": "busybox"}}"#).unwrap();
        assert_eq!(spec, ContainerSpec::from_image("busybox"));
    }
}
