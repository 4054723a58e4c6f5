//! CM diagnostic bundle: collect, download, extract, then copy the per-host
//! sysstats files into `bundle/<hostname>/`.

use super::command::unzip;
use super::layout::find_files;
use super::DiscoveryContext;
use crate::model::cm::ApiHost;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Files copied verbatim from `sysstats/`.
pub const SYSSTATS_FILES: &[&str] = &["lscpu_stdout", "lsb_release_stdout", "krb5_stdout", "df_stdout"];

/// `<hostname>-<hostId>-<ip>-host-statistics/sysstats`
pub fn sysstats_dir(extracted: &Path, host: &ApiHost) -> PathBuf {
    extracted
        .join(format!(
            "{}-{}-{}-host-statistics",
            host.hostname,
            host.host_id,
            host.ip_address.as_deref().unwrap_or_default()
        ))
        .join("sysstats")
}

/// `java -version` prints to stderr on most JDKs; take whichever is non-empty.
pub fn java_version_source(sysstats: &Path) -> Option<PathBuf> {
    ["java_version_stdout", "java_version_stderr"]
        .iter()
        .map(|name| sysstats.join(name))
        .find(|p| std::fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false))
}

pub async fn collect(ctx: &DiscoveryContext) -> Result<()> {
    info!("diagnostic bundle collection started");
    let extracted = ctx.layout.extracted_bundle_dir();
    tokio::fs::create_dir_all(&extracted).await?;

    let command = ctx
        .cm
        .collect_diagnostic_data(&ctx.window.start, &ctx.window.end)
        .await
        .context("Failed to start diagnostic data collection")?;
    wait_for_command(ctx, command.id).await?;

    let archive = ctx.layout.root().join(format!("{}-scm-command-result.zip", command.id));
    let bytes = ctx
        .cm
        .download_command_result(command.id, &archive)
        .await
        .context("Failed to download the diagnostic bundle")?;
    debug!(path = %archive.display(), bytes, "diagnostic bundle downloaded");
    extract(&archive, &extracted).await?;
    tokio::fs::remove_file(&archive).await?;

    let hosts = ctx.cm.read_hosts("SUMMARY").await.context("Failed to read hosts")?;
    for host in &hosts {
        copy_host_files(&extracted, &ctx.layout.host_bundle_dir(&host.hostname), host).await?;
    }
    info!("diagnostic bundle collection finished");
    Ok(())
}

async fn wait_for_command(ctx: &DiscoveryContext, id: u64) -> Result<()> {
    info!(command = id, "waiting for command to finish");
    let interval = Duration::from_secs(ctx.settings.poll_interval_secs);
    loop {
        let command = ctx.cm.read_command(id).await?;
        info!(command = id, active = command.active, "command status");
        if !command.active {
            if command.success == Some(true) {
                return Ok(());
            }
            anyhow::bail!(
                "Diagnostic data command {} did not succeed: {}",
                id,
                command.result_message.as_deref().unwrap_or("no message")
            );
        }
        tokio::time::sleep(interval).await;
    }
}

/// Unzip the bundle and every archive nested inside it, in place.
pub async fn extract(archive: &Path, dest: &Path) -> Result<()> {
    debug!(archive = %archive.display(), "unzipping diagnostic bundle");
    unzip(archive, dest).await?;
    for nested in find_files(dest, "*.zip") {
        let parent = nested.parent().unwrap_or(dest).to_path_buf();
        if let Err(e) = unzip(&nested, &parent).await {
            warn!(archive = %nested.display(), error = %format!("{:#}", e), "failed to unzip nested archive");
        }
    }
    Ok(())
}

pub async fn copy_host_files(extracted: &Path, dest: &Path, host: &ApiHost) -> Result<()> {
    tokio::fs::create_dir_all(dest)
        .await
        .with_context(|| format!("Failed to create '{}'", dest.display()))?;
    let sysstats = sysstats_dir(extracted, host);
    for name in SYSSTATS_FILES {
        if let Err(e) = tokio::fs::copy(sysstats.join(name), dest.join(name)).await {
            error!(host = %host.hostname, file = name, error = %e, "unable to copy file");
        }
    }
    match java_version_source(&sysstats) {
        Some(source) => {
            if let Err(e) = tokio::fs::copy(&source, dest.join("java_version")).await {
                error!(host = %host.hostname, error = %e, "unable to copy java version");
            }
        }
        None => warn!(
            host = %host.hostname,
            dir = %sysstats.display(),
            "neither java_version_stdout nor java_version_stderr found"
        ),
    }
    Ok(())
}
