//! Network declarations.
//!
//! A network is keyed by name in the document; the `NetworkSpec` carries the
//! driver and addressing parameters passed to the runtime on create.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A network to create on the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSpec {
    /// Network driver (bridge, overlay, macvlan, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    /// Ask the runtime to reject a network with a duplicate name.
    #[serde(default)]
    pub check_duplicate: bool,

    /// Enable IPv6 on the network.
    #[serde(default, rename = "EnableIPv6")]
    pub enable_ipv6: bool,

    /// Restrict external access to the network.
    #[serde(default)]
    pub internal: bool,

    /// Allow standalone containers to attach.
    #[serde(default)]
    pub attachable: bool,

    /// IP address management.
    #[serde(default, rename = "IPAM", skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,

    /// Driver-specific options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    /// User-defined labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl NetworkSpec {
    /// Create a network spec for the given driver.
    pub fn with_driver(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            ..Self::default()
        }
    }

    /// Add a subnet to the IPAM configuration.
    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        let ipam = self.ipam.get_or_insert_with(Ipam::default);
        ipam.config.push(IpamPool {
            subnet: Some(subnet.into()),
            ..IpamPool::default()
        });
        self
    }

    /// Driver name for logging.
    pub fn driver_name(&self) -> &str {
        self.driver.as_deref().unwrap_or("default")
    }
}

/// IPAM configuration of a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipam {
    /// IPAM driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    /// Address pools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<IpamPool>,

    /// Driver-specific options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// One subnet/range/gateway tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamPool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,

    #[serde(default, rename = "IPRange", skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}
