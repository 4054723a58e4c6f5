//! Ambari REST resources. Ambari wraps every entity in a capitalised
//! envelope key (`Clusters`, `Hosts`, `HostRoles`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbariList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterItem {
    #[serde(rename = "Clusters")]
    pub cluster: ClusterInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackVersionItem {
    #[serde(rename = "ClusterStackVersions")]
    pub stack_version: StackVersion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackVersion {
    pub stack: String,
    pub version: String,
    /// Numeric id on most Ambari releases, string on a few.
    #[serde(default)]
    pub repository_version: serde_json::Value,
    pub state: Option<String>,
}

impl StackVersion {
    /// `HDP` + `3.1` -> `HDP3.1`, matching what the Ambari UI shows.
    pub fn label(&self) -> String {
        format!("{}{}", self.stack, self.version)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceItem {
    #[serde(rename = "ServiceInfo")]
    pub service_info: ServiceInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_name: String,
    pub cluster_name: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostItem {
    #[serde(rename = "Hosts")]
    pub host: HostInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub host_name: String,
    pub ip: Option<String>,
    pub os_type: Option<String>,
    pub cpu_count: Option<u64>,
    /// Kilobytes.
    pub total_mem: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostComponentItem {
    #[serde(rename = "HostRoles")]
    pub host_role: HostRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostRole {
    pub component_name: String,
    pub host_name: Option<String>,
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootServiceComponentItem {
    #[serde(rename = "RootServiceComponents")]
    pub component: RootServiceComponent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootServiceComponent {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}
