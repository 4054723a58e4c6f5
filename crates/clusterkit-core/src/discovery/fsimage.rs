//! HDFS namespace dump: fetch the NameNode image with the cluster's client
//! configuration and convert it to `hdfs_fs.tsv` with the offline viewer.

use super::command::{convert_image, unzip, HdfsClient};
use super::layout::find_files;
use super::DiscoveryContext;
use crate::hadoop_conf::find_config_dir;
use crate::model::cm::{sanitize_name, ApiCluster};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const AGENT_PROCESS_DIR: &str = "/var/run/cloudera-scm-agent/process";
pub const DEFAULT_SSL_CLIENT: &str = "/etc/hadoop/conf/ssl-client.xml";
pub const DUMP_FILE: &str = "hdfs_fs.tsv";

/// An `ssl-client.xml` living next to an agent truststore, else `fallback`
/// when it exists.
pub fn find_ssl_client(process_dir: &Path, fallback: &Path) -> Option<PathBuf> {
    for truststore in find_files(process_dir, "*truststore*.jks") {
        if let Some(parent) = truststore.parent() {
            if let Some(config) = find_files(parent, "ssl-client.xml").into_iter().next() {
                return Some(config);
            }
        }
    }
    fallback.is_file().then(|| fallback.to_path_buf())
}

/// Download and unpack the HDFS client configuration of `cluster` into
/// `<scratch>/<purpose>/<Cluster>`; returns the directory holding
/// `core-site.xml`.
pub async fn hdfs_client_config(
    ctx: &DiscoveryContext,
    cluster: &ApiCluster,
    hdfs_service: &str,
    purpose: &str,
) -> Result<HdfsClient> {
    let dir = ctx
        .settings
        .scratch_dir
        .join(purpose)
        .join(sanitize_name(cluster.label()));
    let archive = dir.join("client_config.zip");
    ctx.cm
        .client_config(&cluster.name, hdfs_service, &archive)
        .await
        .with_context(|| format!("Failed to download the HDFS client configuration of '{}'", cluster.label()))?;
    unzip(&archive, &dir).await?;
    let config_dir = find_config_dir(&dir)
        .with_context(|| format!("No core-site.xml in the client configuration at '{}'", dir.display()))?;
    debug!(dir = %config_dir.display(), "client configuration extracted");

    match find_ssl_client(Path::new(AGENT_PROCESS_DIR), Path::new(DEFAULT_SSL_CLIENT)) {
        Some(ssl) => {
            debug!(source = %ssl.display(), "copying ssl-client.xml");
            if let Err(e) = tokio::fs::copy(&ssl, config_dir.join("ssl-client.xml")).await {
                error!(source = %ssl.display(), error = %e, "unable to copy ssl-client.xml");
            }
        }
        None => debug!("no ssl-client.xml found"),
    }
    Ok(HdfsClient::new(config_dir))
}

pub async fn collect(ctx: &DiscoveryContext) -> Result<()> {
    let deployment = ctx
        .cm
        .deployment(ctx.export_view())
        .await
        .context("Failed to read the CM deployment")?;
    for cluster in &deployment.clusters {
        let Some(hdfs) = cluster.service_of_type("HDFS") else {
            debug!(cluster = %cluster.label(), "HDFS is not deployed");
            continue;
        };
        if let Err(e) = collect_cluster(ctx, cluster, &hdfs.name).await {
            error!(cluster = %cluster.label(), error = %format!("{:#}", e), "HDFS report extraction failed");
        }
    }
    Ok(())
}

async fn collect_cluster(ctx: &DiscoveryContext, cluster: &ApiCluster, hdfs_service: &str) -> Result<()> {
    let client = hdfs_client_config(ctx, cluster, hdfs_service, "hdfs_report").await?;
    let out_dir = ctx.layout.workload_service_dir(cluster.label(), hdfs_service);
    tokio::fs::create_dir_all(&out_dir).await?;

    let image = out_dir.join(format!(
        "dfs_image_{}_{}",
        sanitize_name(cluster.label()),
        Utc::now().format("%Y-%m-%dT%H-%M-%S")
    ));
    client.fetch_image(&image).await?;
    if !image.exists() {
        error!(
            cluster = %cluster.label(),
            "no local fsimage copy could be created, skipping conversion"
        );
        return Ok(());
    }
    let dump = out_dir.join(DUMP_FILE);
    convert_image(&image, &dump).await?;
    tokio::fs::remove_file(&image).await?;
    info!(cluster = %cluster.label(), path = %dump.display(), "fsimage dump written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_ssl_client_next_to_truststore() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join("123-hdfs-DATANODE");
        std::fs::create_dir_all(proc_dir.join("conf")).unwrap();
        std::fs::write(proc_dir.join("cm-auto-global_truststore.jks"), "").unwrap();
        std::fs::write(proc_dir.join("conf/ssl-client.xml"), "<configuration/>").unwrap();

        let found = find_ssl_client(dir.path(), Path::new("/nonexistent/ssl-client.xml"));
        assert_eq!(found, Some(proc_dir.join("conf/ssl-client.xml")));
    }

    #[test]
    fn test_find_ssl_client_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("ssl-client.xml");
        assert_eq!(find_ssl_client(dir.path(), &fallback), None);
        std::fs::write(&fallback, "<configuration/>").unwrap();
        assert_eq!(find_ssl_client(&dir.path().join("none"), &fallback), Some(fallback));
    }
}
