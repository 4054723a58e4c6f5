//! Impala query profiles taken from the extracted diagnostic bundle.

use super::command::tar_directory;
use super::layout::find_files;
use super::DiscoveryContext;
use crate::model::cm::{ApiHost, ApiService};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const PROFILE_DIR: &str = "var/log/impalad";

/// Non-empty `impala_profile*` files logged by the given Impala daemon hosts.
pub fn profile_files(extracted: &Path, hosts: &[&ApiHost]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for host in hosts {
        let dir = extracted.join("impala-query-logs").join(format!(
            "{}-{}",
            host.hostname,
            host.ip_address.as_deref().unwrap_or_default()
        ));
        debug!(dir = %dir.display(), "looking for impala profiles");
        files.extend(
            find_files(&dir, "impala_profile*")
                .into_iter()
                .filter(|p| std::fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false)),
        );
    }
    files
}

/// Daemon hosts of an Impala service, resolved against the deployment hosts.
fn impalad_hosts<'a>(service: &ApiService, hosts: &'a [ApiHost]) -> Vec<&'a ApiHost> {
    service
        .roles
        .iter()
        .filter(|r| r.role_type == "IMPALAD")
        .filter_map(|r| hosts.iter().find(|h| h.host_id == r.host_ref.host_id))
        .collect()
}

pub async fn collect(ctx: &DiscoveryContext) -> Result<()> {
    info!("Impala profile extraction started");
    let deployment = ctx
        .cm
        .deployment(ctx.export_view())
        .await
        .context("Failed to read the CM deployment")?;
    let extracted = ctx.layout.extracted_bundle_dir();
    if !extracted.is_dir() {
        warn!(dir = %extracted.display(), "no extracted diagnostic bundle, skipping Impala profiles");
        return Ok(());
    }
    for cluster in &deployment.clusters {
        let Some((service, hosts)) = cluster
            .services
            .iter()
            .map(|s| (s, impalad_hosts(s, &deployment.hosts)))
            .find(|(_, hosts)| !hosts.is_empty())
        else {
            debug!(cluster = %cluster.label(), "no Impala daemons");
            continue;
        };
        let out = ctx.layout.workload_service_dir(cluster.label(), &service.name);
        let dest = out.join(PROFILE_DIR);
        tokio::fs::create_dir_all(&dest).await?;
        let files = profile_files(&extracted, &hosts);
        for file in &files {
            if let Some(name) = file.file_name() {
                tokio::fs::copy(file, dest.join(name)).await?;
            }
        }
        tar_directory(&out.join("IMPALA_PROFILE_LOGS.tar.gz"), &out).await?;
        info!(cluster = %cluster.label(), profiles = files.len(), "Impala profiles collected");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cm::{ApiHostRef, ApiRole};

    #[test]
    fn test_profile_files_skip_empty() {
        let dir = tempfile::tempdir().unwrap();
        let host = ApiHost {
            host_id: "h1".to_string(),
            hostname: "impala1".to_string(),
            ip_address: Some("10.0.0.5".to_string()),
            ..Default::default()
        };
        let logs = dir.path().join("impala-query-logs/impala1-10.0.0.5/x");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join("impala_profile_log_1.1-1"), "profile").unwrap();
        std::fs::write(logs.join("impala_profile_log_1.1-2"), "").unwrap();
        std::fs::write(logs.join("impalad.INFO"), "log").unwrap();

        let files = profile_files(dir.path(), &[&host]);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("impala_profile_log_1.1-1"));
    }

    #[test]
    fn test_impalad_hosts() {
        let hosts = vec![
            ApiHost {
                host_id: "h1".to_string(),
                hostname: "impala1".to_string(),
                ..Default::default()
            },
            ApiHost {
                host_id: "h2".to_string(),
                hostname: "cat1".to_string(),
                ..Default::default()
            },
        ];
        let role = |name: &str, role_type: &str, host: &str| ApiRole {
            name: name.to_string(),
            role_type: role_type.to_string(),
            host_ref: ApiHostRef {
                host_id: host.to_string(),
                hostname: None,
            },
            health_summary: None,
        };
        let service = ApiService {
            name: "impala".to_string(),
            service_type: "IMPALA".to_string(),
            roles: vec![role("impalad1", "IMPALAD", "h1"), role("catalog", "CATALOGSERVER", "h2")],
            ..Default::default()
        };
        let found = impalad_hosts(&service, &hosts);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hostname, "impala1");
    }
}
