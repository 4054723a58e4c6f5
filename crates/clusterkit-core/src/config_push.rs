//! Push service and role-config-group parameters from a cluster template to
//! Cloudera Manager.
//!
//! The template has the shape of a CM cluster export:
//!
//! ```json
//! {"services": [{"refName": "hive",
//!   "serviceConfigs": [{"name": "hive_metastore_database_host", "value": "db1"}],
//!   "roleConfigGroups": [{"refName": "hive-HIVESERVER2-BASE",
//!                         "configs": [{"name": "hs2_max_heap", "value": "4096"}]}]}]}
//! ```

use crate::model::cm::ApiConfig;
use crate::providers::cloudera::CmClient;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigTemplate {
    #[serde(default)]
    pub services: Vec<TemplateService>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateService {
    pub ref_name: String,
    #[serde(default)]
    pub service_configs: Option<Vec<TemplateConfig>>,
    #[serde(default)]
    pub role_config_groups: Option<Vec<TemplateRoleConfigGroup>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRoleConfigGroup {
    pub ref_name: String,
    #[serde(default)]
    pub configs: Option<Vec<TemplateConfig>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl TemplateConfig {
    /// Entries without a `value` (or with `null`) are variables the export
    /// left for the user and are not pushed.
    fn to_api_config(&self) -> Option<ApiConfig> {
        let value = match self.value.as_ref()? {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some(ApiConfig::new(&self.name, value))
    }
}

/// One config update call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigUpdate {
    pub service: String,
    pub role_config_group: Option<String>,
    pub message: String,
    pub configs: Vec<ApiConfig>,
}

impl ConfigUpdate {
    fn new(service: &str, role_config_group: Option<&str>, configs: Vec<ApiConfig>) -> Self {
        Self {
            service: service.to_string(),
            role_config_group: role_config_group.map(str::to_string),
            message: update_message(service, role_config_group),
            configs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PushResult {
    pub update: ConfigUpdate,
    pub success: bool,
    pub error: Option<String>,
}

pub fn update_message(service: &str, role_config_group: Option<&str>) -> String {
    match role_config_group {
        Some(rcg) => format!(
            "Updating parameter(s) for {} and role config group {}",
            service, rcg
        ),
        None => format!("Updating parameter(s) for {}", service),
    }
}

impl ConfigTemplate {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template '{}'", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid template '{}'", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Updates in template order: per service, the service-level update
    /// first, then one per role config group.
    pub fn updates(&self) -> Vec<ConfigUpdate> {
        let mut updates = Vec::new();
        for service in &self.services {
            if let Some(configs) = &service.service_configs {
                let configs: Vec<ApiConfig> =
                    configs.iter().filter_map(TemplateConfig::to_api_config).collect();
                if configs.is_empty() {
                    debug!(service = %service.ref_name, "no service configs to update");
                } else {
                    updates.push(ConfigUpdate::new(&service.ref_name, None, configs));
                }
            }
            for rcg in service.role_config_groups.iter().flatten() {
                let Some(configs) = &rcg.configs else {
                    continue;
                };
                let configs: Vec<ApiConfig> =
                    configs.iter().filter_map(TemplateConfig::to_api_config).collect();
                if !configs.is_empty() {
                    updates.push(ConfigUpdate::new(
                        &service.ref_name,
                        Some(&rcg.ref_name),
                        configs,
                    ));
                }
            }
        }
        updates
    }
}

/// Apply every update; a rejected update is logged and the rest continue.
/// With `dry_run` nothing is sent and every update reports success.
pub async fn push(
    cm: &CmClient,
    cluster: &str,
    updates: Vec<ConfigUpdate>,
    dry_run: bool,
) -> Vec<PushResult> {
    let mut results = Vec::with_capacity(updates.len());
    for update in updates {
        info!(message = %update.message, configs = update.configs.len(), dry_run);
        for config in &update.configs {
            debug!(name = %config.name, "setting property");
        }
        let outcome = if dry_run {
            Ok(())
        } else {
            match &update.role_config_group {
                Some(rcg) => cm
                    .update_role_config_group_config(
                        cluster,
                        &update.service,
                        rcg,
                        &update.message,
                        &update.configs,
                    )
                    .await
                    .map(|_| ()),
                None => cm
                    .update_service_config(cluster, &update.service, &update.message, &update.configs)
                    .await
                    .map(|_| ()),
            }
        };
        let error = match outcome {
            Ok(()) => None,
            Err(e) => {
                error!(service = %update.service, error = %e, "config update failed");
                Some(e.to_string())
            }
        };
        results.push(PushResult {
            success: error.is_none(),
            error,
            update,
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"{
        "cdhVersion": "7.1.7",
        "services": [
            {
                "refName": "hive",
                "serviceType": "HIVE",
                "serviceConfigs": [
                    {"name": "hive_metastore_database_host", "value": "db1.example.com"},
                    {"name": "hive_metastore_database_password", "variable": "hive-pw"}
                ],
                "roleConfigGroups": [
                    {"refName": "hive-HIVESERVER2-BASE", "configs": [{"name": "hs2_max_heap", "value": 4096}]},
                    {"refName": "hive-GATEWAY-BASE", "base": true}
                ]
            },
            {"refName": "zookeeper", "serviceConfigs": [{"name": "x", "value": null}]}
        ]
    }"#;

    #[test]
    fn test_updates_from_template() {
        let template = ConfigTemplate::from_json(TEMPLATE).unwrap();
        let updates = template.updates();
        assert_eq!(updates.len(), 2);

        assert_eq!(updates[0].service, "hive");
        assert_eq!(updates[0].role_config_group, None);
        assert_eq!(updates[0].message, "Updating parameter(s) for hive");
        assert_eq!(
            updates[0].configs,
            vec![ApiConfig::new("hive_metastore_database_host", "db1.example.com")]
        );

        assert_eq!(
            updates[1].message,
            "Updating parameter(s) for hive and role config group hive-HIVESERVER2-BASE"
        );
        assert_eq!(updates[1].configs[0].value.as_deref(), Some("4096"));
    }

    #[test]
    fn test_invalid_template() {
        assert!(ConfigTemplate::from_json("{\"services\": 3}").is_err());
        assert!(ConfigTemplate::from_json("{}").unwrap().updates().is_empty());
    }

    #[tokio::test]
    async fn test_push_dry_run_sends_nothing() {
        let settings = crate::config::CmSettings {
            url: Some("http://127.0.0.1:1".to_string()),
            password: Some("admin".to_string()),
            ..Default::default()
        };
        let cm = CmClient::new(&settings).unwrap();
        let updates = ConfigTemplate::from_json(TEMPLATE).unwrap().updates();
        let results = push(&cm, "Cluster 1", updates, true).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && r.error.is_none()));
    }
}
