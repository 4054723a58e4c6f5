//! Raw Cloudera Manager API dumps under `api_diagnostics/`.

use super::{dump_json, DiscoveryContext};
use crate::model::cm::ApiService;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

pub async fn collect(ctx: &DiscoveryContext) -> Result<()> {
    info!("CM API collection started");
    let cm = &ctx.cm;
    let layout = &ctx.layout;
    let view = ctx.export_view();

    let deployment = cm
        .get_raw("cm/deployment", &[("view", view)])
        .await
        .context("Failed to read the CM deployment")?;
    dump_json(&layout.deployment(), &deployment).await?;

    let hosts = cm
        .get_raw("hosts", &[("view", "FULL")])
        .await
        .context("Failed to read hosts")?;
    dump_json(&layout.hosts(), &hosts).await?;

    for (name, path, query) in [
        ("kerberos_info", "cm/kerberosInfo", None),
        ("cm_config", "cm/config", Some("FULL")),
        ("cm_version", "cm/version", None),
    ] {
        let query: Vec<(&str, &str)> = query.map(|v| ("view", v)).into_iter().collect();
        match cm.get_raw(path, &query).await {
            Ok(value) => dump_json(&layout.cm_dump(name), &value).await?,
            Err(e) => warn!(dump = name, error = %e, "CM API call failed"),
        }
    }

    let clusters = cm
        .get_raw("clusters", &[("view", view)])
        .await
        .context("Failed to read clusters")?;
    dump_json(&layout.cm_dump("clusters"), &clusters).await?;

    for cluster in cm.read_clusters("SUMMARY").await? {
        let label = cluster.label().to_string();
        let dir = layout.cluster_dir(&label);
        match cm.list_cluster_hosts(&cluster.name).await {
            Ok(v) => dump_json(&dir.join("list_of_hosts.json"), &v).await?,
            Err(e) => warn!(cluster = %label, error = %e, "failed to list cluster hosts"),
        }
        match cm.export_cluster(&cluster.name).await {
            Ok(v) => dump_json(&dir.join("cluster_export.json"), &v).await?,
            Err(e) => warn!(cluster = %label, error = %e, "failed to export cluster"),
        }
        let services_path = format!("clusters/{}/services", cluster.name);
        match cm.get_raw(&services_path, &[("view", "FULL")]).await {
            Ok(v) => dump_json(&dir.join("services.json"), &v).await?,
            Err(e) => warn!(cluster = %label, error = %e, "failed to read services"),
        }
        let services = cm
            .read_services(&cluster.name, "SUMMARY")
            .await
            .with_context(|| format!("Failed to read services of '{}'", label))?;
        for service in &services {
            collect_service_configs(ctx, &cluster.name, &label, service).await?;
        }
    }
    info!("CM API collection finished");
    Ok(())
}

async fn dump_config(ctx: &DiscoveryContext, api_path: &str, dest: &Path) -> Result<()> {
    match ctx.cm.get_raw(api_path, &[("view", "FULL")]).await {
        Ok(value) => dump_json(dest, &value).await,
        Err(e) => {
            warn!(path = api_path, error = %e, "failed to read configuration");
            Ok(())
        }
    }
}

/// Service, role and role-config-group configurations of one service.
async fn collect_service_configs(
    ctx: &DiscoveryContext,
    cluster: &str,
    label: &str,
    service: &ApiService,
) -> Result<()> {
    let layout = &ctx.layout;
    let base = format!("clusters/{}/services/{}", cluster, service.name);
    debug!(cluster = label, service = %service.name, "collecting configurations");

    dump_config(
        ctx,
        &format!("{}/config", base),
        &layout.config_file(label, &service.service_type, "service", &service.name),
    )
    .await?;

    match ctx.cm.read_roles(cluster, &service.name).await {
        Ok(roles) => {
            for role in roles {
                dump_config(
                    ctx,
                    &format!("{}/roles/{}/config", base, role.name),
                    &layout.config_file(label, &service.service_type, "role", &role.name),
                )
                .await?;
            }
        }
        Err(e) => warn!(service = %service.name, error = %e, "failed to read roles"),
    }

    match ctx.cm.read_role_config_groups(cluster, &service.name).await {
        Ok(groups) => {
            for group in groups {
                dump_config(
                    ctx,
                    &format!("{}/roleConfigGroups/{}/config", base, group.name),
                    &layout.config_file(
                        label,
                        &service.service_type,
                        "role_config_group",
                        &group.name,
                    ),
                )
                .await?;
            }
        }
        Err(e) => warn!(service = %service.name, error = %e, "failed to read role config groups"),
    }
    Ok(())
}
