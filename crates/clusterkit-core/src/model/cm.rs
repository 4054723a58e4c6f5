//! Cloudera Manager REST resources.
//!
//! Only the fields the tools read are modelled; everything else in the
//! responses is ignored on deserialization.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ROLE_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-[0-9a-fA-F]{32}$").unwrap());

/// Generic `{"items": [...]}` envelope returned by list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for ApiList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClusterRef {
    pub cluster_name: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHostRef {
    pub host_id: String,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRoleRef {
    pub cluster_name: Option<String>,
    pub service_name: String,
    pub role_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiParcel {
    pub product: String,
    pub version: String,
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCluster {
    pub name: String,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub full_version: Option<String>,
    pub cluster_type: Option<String>,
    #[serde(default)]
    pub services: Vec<ApiService>,
    #[serde(default)]
    pub parcels: Vec<ApiParcel>,
}

impl ApiCluster {
    /// Display name when set, otherwise the internal name. Most endpoints
    /// accept either; reports use this one.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn service_of_type(&self, service_type: &str) -> Option<&ApiService> {
        self.services.iter().find(|s| s.service_type == service_type)
    }

    /// Version of the activated CDH parcel, if any.
    pub fn activated_cdh_version(&self) -> Option<&str> {
        self.parcels
            .iter()
            .find(|p| p.product == "CDH" && p.stage.as_deref() == Some("ACTIVATED"))
            .map(|p| p.version.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiService {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub display_name: Option<String>,
    pub service_state: Option<String>,
    pub health_summary: Option<String>,
    pub cluster_ref: Option<ApiClusterRef>,
    #[serde(default)]
    pub roles: Vec<ApiRole>,
    #[serde(default)]
    pub role_config_groups: Vec<ApiRoleConfigGroup>,
}

impl ApiService {
    pub fn is_healthy(&self) -> bool {
        self.health_summary.as_deref() == Some("GOOD")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRole {
    pub name: String,
    #[serde(rename = "type")]
    pub role_type: String,
    pub host_ref: ApiHostRef,
    pub health_summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRoleConfigGroup {
    pub name: String,
    pub role_type: String,
    pub display_name: Option<String>,
    pub base: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHost {
    pub host_id: String,
    pub hostname: String,
    pub ip_address: Option<String>,
    pub rack_id: Option<String>,
    pub num_cores: Option<u64>,
    pub num_physical_cores: Option<u64>,
    pub total_phys_mem_bytes: Option<u64>,
    pub health_summary: Option<String>,
    pub cluster_ref: Option<ApiClusterRef>,
    #[serde(default)]
    pub role_refs: Vec<ApiRoleRef>,
}

impl ApiHost {
    /// Physical memory in decimal gigabytes.
    pub fn memory_gb(&self) -> f64 {
        self.total_phys_mem_bytes.unwrap_or(0) as f64 / 1e9
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_ref.as_ref().map(|c| c.cluster_name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
}

impl ApiConfig {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            default: None,
            sensitive: None,
        }
    }

    /// Explicit value, falling back to the default for `view=FULL` listings.
    pub fn effective_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .filter(|v| !v.is_empty())
            .or(self.default.as_deref())
    }
}

pub fn find_config<'a>(items: &'a [ApiConfig], name: &str) -> Option<&'a ApiConfig> {
    items.iter().find(|c| c.name == name)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeployment {
    pub timestamp: Option<String>,
    #[serde(default)]
    pub clusters: Vec<ApiCluster>,
    #[serde(default)]
    pub hosts: Vec<ApiHost>,
}

impl ApiDeployment {
    /// host id -> hostname
    pub fn host_names(&self) -> BTreeMap<&str, &str> {
        self.hosts
            .iter()
            .map(|h| (h.host_id.as_str(), h.hostname.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKerberosInfo {
    pub kerberized: Option<bool>,
    pub kdc_type: Option<String>,
    pub kdc_host: Option<String>,
    pub kerberos_realm: Option<String>,
    pub admin_host: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVersionInfo {
    pub version: Option<String>,
    pub build_user: Option<String>,
    pub build_timestamp: Option<String>,
    pub git_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScmDbInfo {
    pub scm_db_type: Option<String>,
    pub embedded_db_used: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCommand {
    pub id: u64,
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
    pub success: Option<bool>,
    pub result_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCollectDiagnosticDataArguments {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTimeSeriesResponse {
    #[serde(default)]
    pub time_series: Vec<ApiTimeSeries>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiTimeSeries {
    pub metadata: ApiTimeSeriesMetadata,
    #[serde(default)]
    pub data: Vec<ApiTimeSeriesData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTimeSeriesMetadata {
    pub metric_name: String,
    pub entity_name: Option<String>,
    pub alias: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub unit_numerators: Vec<String>,
    #[serde(default)]
    pub unit_denominators: Vec<String>,
}

impl ApiTimeSeriesMetadata {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn unit(&self) -> &str {
        self.unit_numerators.first().map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTimeSeriesData {
    pub timestamp: String,
    #[serde(default)]
    pub value: f64,
    #[serde(rename = "type")]
    pub data_type: Option<String>,
    pub aggregate_statistics: Option<ApiAggregateStatistics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAggregateStatistics {
    pub sample_time: Option<String>,
    pub sample_value: Option<f64>,
    pub count: Option<u64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

/// Turn `hdfs-DATANODE-3f1c...` into `hdfs DATANODE`.
///
/// CM role names end in a 32-character hex hash which carries no
/// information for inventories.
pub fn clean_role_name(role_name: &str) -> String {
    ROLE_HASH_RE
        .replace(role_name, "")
        .replace(['-', '_'], " ")
}

/// Directory-safe form of a cluster display name (`Cluster 1` -> `Cluster_1`).
pub fn sanitize_name(name: &str) -> String {
    name.replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_role_name() {
        assert_eq!(
            clean_role_name("hdfs-DATANODE-0a1b2c3d4e5f60718293a4b5c6d7e8f9"),
            "hdfs DATANODE"
        );
        assert_eq!(clean_role_name("hue-HUE_SERVER"), "hue HUE SERVER");
        // a short suffix is not a role hash
        assert_eq!(clean_role_name("yarn-NODEMANAGER-1"), "yarn NODEMANAGER 1");
    }

    #[test]
    fn test_deserialize_host() {
        let json = r#"{
            "hostId": "abc-123",
            "hostname": "worker1.example.com",
            "ipAddress": "10.0.0.5",
            "numCores": 16,
            "numPhysicalCores": 8,
            "totalPhysMemBytes": 134217728000,
            "clusterRef": {"clusterName": "cluster"},
            "roleRefs": [
                {"clusterName": "cluster", "serviceName": "hdfs", "roleName": "hdfs-DATANODE-0a1b2c3d4e5f60718293a4b5c6d7e8f9"}
            ],
            "commissionState": "COMMISSIONED"
        }"#;
        let host: ApiHost = serde_json::from_str(json).unwrap();
        assert_eq!(host.hostname, "worker1.example.com");
        assert_eq!(host.num_cores, Some(16));
        assert_eq!(host.cluster_name(), Some("cluster"));
        assert_eq!(host.role_refs.len(), 1);
        assert!((host.memory_gb() - 134.2).abs() < 0.1);
    }

    #[test]
    fn test_effective_value_falls_back_to_default() {
        let config = ApiConfig {
            name: "spark_history_log_dir".to_string(),
            value: None,
            default: Some("/user/spark/applicationHistory".to_string()),
            sensitive: Some(false),
        };
        assert_eq!(config.effective_value(), Some("/user/spark/applicationHistory"));
        let explicit = ApiConfig::new("spark_history_log_dir", "/custom");
        assert_eq!(explicit.effective_value(), Some("/custom"));
    }

    #[test]
    fn test_activated_cdh_version() {
        let cluster = ApiCluster {
            name: "cluster".to_string(),
            parcels: vec![
                ApiParcel {
                    product: "CDH".to_string(),
                    version: "6.3.3".to_string(),
                    stage: Some("DISTRIBUTED".to_string()),
                },
                ApiParcel {
                    product: "CDH".to_string(),
                    version: "7.1.7".to_string(),
                    stage: Some("ACTIVATED".to_string()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(cluster.activated_cdh_version(), Some("7.1.7"));
        assert_eq!(cluster.label(), "cluster");
    }

    #[test]
    fn test_deserialize_time_series() {
        let json = r#"{"items": [{"timeSeries": [{
            "metadata": {"metricName": "dfs_capacity", "entityName": "hdfs",
                         "attributes": {"clusterDisplayName": "Cluster 1"},
                         "unitNumerators": ["bytes"]},
            "data": [{"timestamp": "2022-01-01T00:00:00.000Z", "value": 1000.0, "type": "CALCULATED",
                      "aggregateStatistics": {"min": 1.0, "max": 3.0, "mean": 2.0, "count": 3}}]
        }]}]}"#;
        let list: ApiList<ApiTimeSeriesResponse> = serde_json::from_str(json).unwrap();
        let series = &list.items[0].time_series[0];
        assert_eq!(series.metadata.unit(), "bytes");
        assert_eq!(series.metadata.attribute("clusterDisplayName"), Some("Cluster 1"));
        let stats = series.data[0].aggregate_statistics.as_ref().unwrap();
        assert_eq!(stats.mean, Some(2.0));
    }
}
