//! HDP discovery bundle: the Ambari API dump plus the extractors that talk to
//! Ranger, the metrics collector, the metastore database and HDFS from an
//! edge node.

use super::ambari::{self, config_properties, master_host};
use super::command::{convert_image, tar_directory, HdfsClient};
use super::fsimage::DUMP_FILE;
use super::layout::BundleLayout;
use super::metastore::{self, Catalog, DbConnection};
use super::{closest_name, dump_json, outcome, ModuleOutcome, TimeWindow};
use crate::config::AmbariSettings;
use crate::hdfs::{tree::DEFAULT_MAX_DEPTH, HdfsReport};
use crate::providers::ams::{collector_url, AmsClient};
use crate::providers::ranger::RangerClient;
use crate::remote::run_blocking;
use crate::AmbariClient;
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const MR_HISTORY_DIR: &str = "/mr-history/done";
pub const MR_HISTORY_ARCHIVE: &str = "mr-history.tar.gz";

/// Metric name patterns queried per AMS application, with the file suffix
/// each one is stored under.
const METRIC_AGGREGATES: [(&str, &str); 4] = [("%", ""), ("%._max", "_max"), ("%._min", "_min"), ("%._avg", "_avg")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AmbariModule {
    All,
    AmbariApi,
    HiveMetastore,
    ExtractMetrics,
    MapreduceExtractor,
    RangerPolicyExtractor,
    HdfsReport,
}

impl AmbariModule {
    pub const ALL: &'static [AmbariModule] = &[
        AmbariModule::All,
        AmbariModule::AmbariApi,
        AmbariModule::HiveMetastore,
        AmbariModule::ExtractMetrics,
        AmbariModule::MapreduceExtractor,
        AmbariModule::RangerPolicyExtractor,
        AmbariModule::HdfsReport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AmbariModule::All => "all",
            AmbariModule::AmbariApi => "ambari_api",
            AmbariModule::HiveMetastore => "hive_metastore",
            AmbariModule::ExtractMetrics => "extract_metrics",
            AmbariModule::MapreduceExtractor => "mapreduce_extractor",
            AmbariModule::RangerPolicyExtractor => "ranger_policy_extractor",
            AmbariModule::HdfsReport => "hdfs_report",
        }
    }

    pub fn expand(self) -> BTreeSet<AmbariModule> {
        match self {
            AmbariModule::All => Self::ALL.iter().copied().filter(|m| *m != AmbariModule::All).collect(),
            other => BTreeSet::from([other]),
        }
    }
}

impl fmt::Display for AmbariModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AmbariModule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(m) = Self::ALL.iter().find(|m| m.name() == s) {
            return Ok(*m);
        }
        match closest_name(s, Self::ALL.iter().map(|m| m.name())) {
            Some(suggestion) => anyhow::bail!("Unknown module '{}', did you mean '{}'?", s, suggestion),
            None => {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.name()).collect();
                anyhow::bail!("Unknown module '{}'. Available: {}", s, names.join(", "))
            }
        }
    }
}

/// Everything an HDP extractor needs; shared between tasks.
pub struct HdpContext {
    pub ambari: AmbariClient,
    pub settings: AmbariSettings,
    pub layout: BundleLayout,
    pub window: TimeWindow,
}

async fn run_module(module: AmbariModule, ctx: Arc<HdpContext>, cluster: String) -> Result<()> {
    match module {
        AmbariModule::AmbariApi => ambari::collect(&ctx.ambari, ctx.layout.root()).await,
        AmbariModule::HiveMetastore => collect_hive_metastore(&ctx).await,
        AmbariModule::ExtractMetrics => collect_metrics(&ctx, &cluster).await,
        AmbariModule::MapreduceExtractor => collect_mr_history(&ctx).await,
        AmbariModule::RangerPolicyExtractor => collect_ranger_policies(&ctx).await,
        AmbariModule::HdfsReport => collect_hdfs_report(&ctx, &cluster).await,
        AmbariModule::All => Ok(()),
    }
}

/// Build an HDP discovery bundle for `module` into `ctx.layout`. Every
/// extractor runs as its own task once Ambari answers.
pub async fn build(ctx: HdpContext, module: AmbariModule) -> Result<Vec<ModuleOutcome<AmbariModule>>> {
    let root = ctx.layout.root().to_path_buf();
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create bundle directory '{}'", root.display()))?;
    info!(module = %module, ambari = %ctx.ambari.api_url(), output = %root.display(), "starting HDP bundle extraction");

    let cluster = ctx
        .ambari
        .cluster_name()
        .await
        .context("Unable to connect to the Ambari server. Verify the URL, that the server is reachable and the credentials")?;
    info!(cluster = %cluster, "connected to Ambari");

    let ctx = Arc::new(ctx);
    let mut tasks = JoinSet::new();
    for m in module.expand() {
        let ctx = Arc::clone(&ctx);
        let cluster = cluster.clone();
        tasks.spawn(async move { (m, run_module(m, ctx, cluster).await) });
    }
    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (m, result) = joined.context("Extractor task panicked")?;
        outcomes.push(outcome(m, result));
    }
    outcomes.sort_by_key(|o| o.module);
    info!(output = %root.display(), "finished HDP bundle extraction");
    Ok(outcomes)
}

async fn collect_ranger_policies(ctx: &HdpContext) -> Result<()> {
    let settings = ctx
        .settings
        .ranger
        .as_ref()
        .context("Ranger is not configured, set ambari.ranger")?;
    let ranger = RangerClient::new(settings, ctx.settings.verify_tls, ctx.settings.timeout_secs)?;
    let policies = ranger
        .policies()
        .await
        .context("Unable to read policies from the Ranger admin server")?;
    let path = ctx.layout.root().join("ranger_policies").join("ranger_policies.json");
    dump_json(&path, &policies).await?;
    info!(path = %path.display(), "Ranger policies written");
    Ok(())
}

async fn collect_hive_metastore(ctx: &HdpContext) -> Result<()> {
    let settings = ctx
        .settings
        .hive_metastore
        .as_ref()
        .context("The Hive metastore database is not configured, set ambari.hive_metastore")?;
    let conn = DbConnection::from_settings(settings)?;
    metastore::dump(&conn, Catalog::HiveMetastore, &ctx.layout.workload_dir().join("hive")).await?;
    Ok(())
}

/// Application ids of an AMS metadata response, sorted.
pub fn ams_apps(metadata: &Value) -> Vec<String> {
    let mut apps: Vec<String> = metadata
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    apps.sort();
    apps
}

/// Component responses under `AMB_METRICS/<service>/<component>/`; returns
/// the metrics collector host when one is deployed.
async fn dump_component_metrics(ctx: &HdpContext, cluster: &str) -> Result<Option<String>> {
    let dir = ctx.layout.root().join("AMB_METRICS");
    let mut collector = None;
    for service in ctx.ambari.services(cluster).await.context("Failed to read services")? {
        let service = service.service_info.service_name;
        let detail = match ctx.ambari.service(cluster, &service).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(service = %service, error = %e, "Ambari API call failed");
                continue;
            }
        };
        let names: Vec<String> = detail["components"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|c| c["ServiceComponentInfo"]["component_name"].as_str())
            .map(str::to_string)
            .collect();
        for name in names {
            match ctx.ambari.component(cluster, &service, &name).await {
                Ok(component) => {
                    if name == "METRICS_COLLECTOR" {
                        collector = master_host(&component).map(str::to_string);
                    }
                    let path = dir.join(&service).join(&name).join(format!("{}_METRICS.json", name));
                    dump_json(&path, &component).await?;
                }
                Err(e) => warn!(component = %name, error = %e, "Ambari API call failed"),
            }
        }
    }
    Ok(collector)
}

async fn collect_metrics(ctx: &HdpContext, cluster: &str) -> Result<()> {
    info!("HDP metrics collection started");
    let Some(host) = dump_component_metrics(ctx, cluster).await? else {
        info!("no metrics collector deployed, skipping AMS metrics");
        return Ok(());
    };
    let versions = ctx
        .ambari
        .service_config_versions(cluster, "AMBARI_METRICS")
        .await
        .context("Failed to read the Ambari Metrics configuration")?;
    let ams_site = config_properties(&versions, "ams-site").context("No ams-site configuration")?;
    let base = collector_url(ams_site, &host)?;
    debug!(collector = %base, "metrics collector found");
    let ams = AmsClient::new(base, ctx.settings.verify_tls, ctx.settings.timeout_secs)?;

    let dir = ctx.layout.root().join("AMS_METRICS");
    let metadata = ams
        .metadata()
        .await
        .context("Unable to reach the metrics collector, check that it is up and its name resolves")?;
    dump_json(&dir.join("apps.json"), &metadata).await?;

    let (start, end) = (ctx.window.start.timestamp(), ctx.window.end.timestamp());
    let apps = ams_apps(&metadata);
    let mut failed = 0;
    for app in &apps {
        for (pattern, suffix) in METRIC_AGGREGATES {
            let path = dir.join(app).join(format!("{}{}.json", app, suffix));
            match ams.metrics(app, pattern, start, end).await {
                Ok(series) => dump_json(&path, &series).await?,
                Err(e) => {
                    failed += 1;
                    error!(app = %app, metrics = pattern, error = %e, "metrics query failed");
                }
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} metrics queries failed", failed, apps.len() * METRIC_AGGREGATES.len());
    }
    info!(apps = apps.len(), "HDP metrics collection finished");
    Ok(())
}

/// Download the MapReduce job history and pack it into `mr-history.tar.gz`.
async fn collect_mr_history(ctx: &HdpContext) -> Result<()> {
    let client = HdfsClient::new(&ctx.settings.hadoop_conf_dir);
    if !client.dir_exists(MR_HISTORY_DIR).await? {
        info!(dir = MR_HISTORY_DIR, "no MapReduce job history in HDFS");
        return Ok(());
    }
    let dest = ctx.layout.workload_dir().join("MAPREDUCE");
    let output = client.get(MR_HISTORY_DIR, &dest).await?;
    if !output.success() {
        anyhow::bail!("Failed to download {}: {}", MR_HISTORY_DIR, output.stderr.trim());
    }
    tar_directory(&dest.join(MR_HISTORY_ARCHIVE), &dest).await?;
    info!(path = %dest.display(), "MapReduce job history collected");
    Ok(())
}

/// Structure and modification-time reports next to `dump`.
pub async fn write_hdfs_report(dump: &Path, depth: usize) -> Result<(PathBuf, PathBuf)> {
    let dump = dump.to_path_buf();
    run_blocking(move || {
        let dir = dump.parent().unwrap_or(Path::new("."));
        HdfsReport::from_file(&dump, depth)?.write_csv(dir)
    })
    .await?
}

async fn collect_hdfs_report(ctx: &HdpContext, cluster: &str) -> Result<()> {
    let client = HdfsClient::new(&ctx.settings.hadoop_conf_dir);
    let out_dir = ctx.layout.workload_service_dir(cluster, "hdfs");
    tokio::fs::create_dir_all(&out_dir)
        .await
        .with_context(|| format!("Failed to create '{}'", out_dir.display()))?;

    let image = out_dir.join(format!("dfs_image_{}", Utc::now().format("%Y-%m-%dT%H-%M-%S")));
    let fetched = client.fetch_image(&image).await?;
    if !fetched.success() || !image.exists() {
        anyhow::bail!("Failed to fetch the NameNode image: {}", fetched.stderr.trim());
    }
    let dump = out_dir.join(DUMP_FILE);
    let converted = convert_image(&image, &dump).await?;
    tokio::fs::remove_file(&image).await?;
    if !converted.success() {
        anyhow::bail!("Failed to convert the NameNode image: {}", converted.stderr.trim());
    }
    let (structure, modtime) = write_hdfs_report(&dump, DEFAULT_MAX_DEPTH).await?;
    info!(structure = %structure.display(), modtime = %modtime.display(), "HDFS report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_module_parse() {
        assert_eq!("ranger_policy_extractor".parse::<AmbariModule>().unwrap(), AmbariModule::RangerPolicyExtractor);
        let err = "extract_metric".parse::<AmbariModule>().unwrap_err().to_string();
        assert!(err.contains("did you mean 'extract_metrics'"));
        assert!("cm_api".parse::<AmbariModule>().is_err());
    }

    #[test]
    fn test_all_expands_to_every_extractor() {
        let all = AmbariModule::All.expand();
        assert_eq!(all.len(), 6);
        assert!(!all.contains(&AmbariModule::All));
        assert_eq!(AmbariModule::HdfsReport.expand().len(), 1);
    }

    #[test]
    fn test_ams_apps() {
        let metadata = json!({"namenode": [], "HOST": [], "ams-hbase": []});
        assert_eq!(ams_apps(&metadata), vec!["HOST", "ams-hbase", "namenode"]);
        assert!(ams_apps(&json!([])).is_empty());
    }

    #[tokio::test]
    async fn test_write_hdfs_report_next_to_dump() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("hdfs_fs.tsv");
        std::fs::write(
            &dump,
            "Path\tReplication\tModificationTime\tAccessTime\tPreferredBlockSize\tBlocksCount\tFileSize\tNSQUOTA\tDSQUOTA\tPermission\tUserName\tGroupName\n\
             /\t0\t2022-02-01 07:00\t1970-01-01 00:00\t0\t0\t0\t-1\t-1\tdrwxr-xr-x\thdfs\thdfs\n\
             /apps\t0\t2022-02-01 07:00\t1970-01-01 00:00\t0\t0\t0\t-1\t-1\tdrwxr-xr-x\thdfs\thdfs\n\
             /apps/a.jar\t3\t2022-02-02 07:00\t2022-02-02 07:00\t134217728\t1\t1024\t0\t0\t-rw-r--r--\thdfs\thdfs\n",
        )
        .unwrap();

        let (structure, modtime) = write_hdfs_report(&dump, DEFAULT_MAX_DEPTH).await.unwrap();

        assert_eq!(structure.parent(), Some(dir.path()));
        assert!(std::fs::read_to_string(&structure).unwrap().contains("/apps"));
        assert!(modtime.exists());
    }

    #[tokio::test]
    async fn test_write_hdfs_report_missing_dump() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_hdfs_report(&dir.path().join("hdfs_fs.tsv"), 2).await.is_err());
    }
}
