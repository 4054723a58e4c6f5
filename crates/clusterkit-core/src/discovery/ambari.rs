//! Ambari (HDP) API dump under `api_diagnostics/`.

use super::dump_json;
use crate::providers::ambari::AmbariClient;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info, warn};

/// `properties` of `config_type` in a `service_config_versions` response.
pub fn config_properties<'a>(versions: &'a Value, config_type: &str) -> Option<&'a Value> {
    versions["items"]
        .get(0)?
        .get("configurations")?
        .as_array()?
        .iter()
        .find(|c| c["type"] == config_type)
        .map(|c| &c["properties"])
}

pub fn capacity_scheduler(versions: &Value) -> Option<&Value> {
    config_properties(versions, "capacity-scheduler")
}

/// Host of the first instance of a component, from a component response.
pub fn master_host(component: &Value) -> Option<&str> {
    component["host_components"].get(0)?["HostRoles"]["host_name"].as_str()
}

/// `{protocol, host, port}` of the Ambari server.
pub fn ambari_details(ambari: &AmbariClient) -> Value {
    let url = ambari.api_url();
    json!({
        "ambari_http_protocol": url.scheme(),
        "ambari_server_host": url.host_str().unwrap_or_default(),
        "ambari_server_port": url.port_or_known_default(),
    })
}

async fn dump_or_warn(path: &Path, result: crate::providers::ClientResult<Value>) -> Result<Option<Value>> {
    match result {
        Ok(value) => {
            dump_json(path, &value).await?;
            Ok(Some(value))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ambari API call failed");
            Ok(None)
        }
    }
}

pub async fn collect(ambari: &AmbariClient, bundle: &Path) -> Result<()> {
    info!("Ambari API collection started");
    let dir = bundle.join("api_diagnostics");
    dump_json(&dir.join("ambari_details.json"), &ambari_details(ambari)).await?;

    let clusters = ambari
        .get_raw("clusters", None)
        .await
        .context("Unable to connect to the Ambari server")?;
    dump_json(&dir.join("cluster_name.json"), &clusters).await?;
    let cluster = ambari.cluster_name().await?;
    debug!(cluster = %cluster, "collecting cluster");

    for item in ambari.hosts().await.context("Failed to read hosts")? {
        let host = item.host.host_name;
        dump_or_warn(&dir.join(format!("{}details.json", host)), ambari.host(&host).await).await?;
    }
    dump_or_warn(
        &dir.join("hosts.json"),
        ambari.get_raw(&format!("clusters/{}/hosts", cluster), None).await,
    )
    .await?;

    let services: Vec<String> = ambari
        .services(&cluster)
        .await
        .context("Failed to read services")?
        .into_iter()
        .map(|s| s.service_info.service_name)
        .collect();
    dump_or_warn(
        &dir.join("services.json"),
        ambari.get_raw(&format!("clusters/{}/services", cluster), None).await,
    )
    .await?;
    for service in &services {
        let Some(detail) =
            dump_or_warn(&dir.join(format!("{}.json", service)), ambari.service(&cluster, service).await).await?
        else {
            continue;
        };
        let components = detail["components"].as_array().cloned().unwrap_or_default();
        for component in components {
            let Some(name) = component["ServiceComponentInfo"]["component_name"].as_str() else {
                continue;
            };
            dump_or_warn(
                &dir.join(format!("{}.json", name)),
                ambari.component(&cluster, service, name).await,
            )
            .await?;
        }
    }

    dump_or_warn(&dir.join("blueprint.json"), ambari.blueprint(&cluster).await).await?;
    if let Ok(info) = ambari.cluster_info(&cluster).await {
        dump_json(&dir.join("clusters.json"), &info["Clusters"]).await?;
    }

    if services.iter().any(|s| s == "KERBEROS") {
        dump_or_warn(
            &dir.join("kerberos.json"),
            ambari.service_config_versions(&cluster, "KERBEROS").await,
        )
        .await?;
    } else {
        debug!("Kerberos is not enabled for this cluster");
    }
    if services.iter().any(|s| s == "YARN") {
        match ambari.service_config_versions(&cluster, "YARN").await {
            Ok(versions) => match capacity_scheduler(&versions) {
                Some(properties) => dump_json(&dir.join("capacity-scheduler.json"), properties).await?,
                None => debug!("no capacity-scheduler configuration"),
            },
            Err(e) => warn!(error = %e, "failed to read YARN configuration"),
        }
    }

    dump_or_warn(&dir.join("componentslist.json"), ambari.component_list(&cluster).await).await?;
    dump_or_warn(
        &dir.join("configurations.json"),
        ambari.current_configurations(&cluster).await,
    )
    .await?;
    info!("Ambari API collection finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_scheduler() {
        let versions = json!({"items": [{"configurations": [
            {"type": "yarn-site", "properties": {"a": "1"}},
            {"type": "capacity-scheduler", "properties": {"yarn.scheduler.capacity.root.queues": "default"}}
        ]}]});
        let props = capacity_scheduler(&versions).unwrap();
        assert_eq!(props["yarn.scheduler.capacity.root.queues"], "default");
        assert!(capacity_scheduler(&json!({"items": []})).is_none());
        assert_eq!(config_properties(&versions, "yarn-site").unwrap()["a"], "1");
    }

    #[test]
    fn test_master_host() {
        let component = json!({"host_components": [
            {"HostRoles": {"component_name": "METRICS_COLLECTOR", "host_name": "ams1.example.com"}}
        ]});
        assert_eq!(master_host(&component), Some("ams1.example.com"));
        assert_eq!(master_host(&json!({"host_components": []})), None);
    }

    #[test]
    fn test_ambari_details() {
        let settings = crate::config::AmbariSettings {
            url: Some("https://ambari.example.com:8443".to_string()),
            password: Some("admin".to_string()),
            ..Default::default()
        };
        let client = AmbariClient::new(&settings).unwrap();
        let details = ambari_details(&client);
        assert_eq!(details["ambari_http_protocol"], "https");
        assert_eq!(details["ambari_server_host"], "ambari.example.com");
        assert_eq!(details["ambari_server_port"], 8443);
    }
}
