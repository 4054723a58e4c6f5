//! Discovery bundle builder: dumps Cloudera Manager API state, metrics,
//! the diagnostic bundle and workload history into one directory tree that
//! [`crate::report::ReportBuilder`] turns into a workbook.

pub mod ambari;
pub mod cm_api;
pub mod command;
pub mod diagnostic;
pub mod fsimage;
pub mod hdp;
pub mod impala;
pub mod layout;
pub mod metastore;
pub mod metrics;
pub mod workload;

use crate::config::DiscoverySettings;
use crate::providers::cloudera::CmClient;
use crate::redact::redact_url;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use layout::BundleLayout;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// A selectable part of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Module {
    All,
    CmApi,
    CmMetrics,
    DiagnosticBundle,
    HdfsReport,
    MapreduceExtractor,
    SparkExtractor,
    TezExtractor,
    ImpalaProfiles,
    HiveMetastore,
    SentryPolicies,
}

impl Module {
    pub const ALL: &'static [Module] = &[
        Module::All,
        Module::CmApi,
        Module::CmMetrics,
        Module::DiagnosticBundle,
        Module::HdfsReport,
        Module::MapreduceExtractor,
        Module::SparkExtractor,
        Module::TezExtractor,
        Module::ImpalaProfiles,
        Module::HiveMetastore,
        Module::SentryPolicies,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Module::All => "all",
            Module::CmApi => "cm_api",
            Module::CmMetrics => "cm_metrics",
            Module::DiagnosticBundle => "diagnostic_bundle",
            Module::HdfsReport => "hdfs_report",
            Module::MapreduceExtractor => "mapreduce_extractor",
            Module::SparkExtractor => "spark_extractor",
            Module::TezExtractor => "tez_extractor",
            Module::ImpalaProfiles => "impala_profiles",
            Module::HiveMetastore => "hive_metastore",
            Module::SentryPolicies => "sentry_policies",
        }
    }

    /// Concrete modules selected by `self`. Spark event logs are large and
    /// only collected when asked for by name.
    pub fn expand(self) -> BTreeSet<Module> {
        match self {
            Module::All => Self::ALL
                .iter()
                .copied()
                .filter(|m| !matches!(m, Module::All | Module::SparkExtractor))
                .collect(),
            other => BTreeSet::from([other]),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nearest candidate within two edits of `name`.
pub(crate) fn closest_name(name: &str, candidates: impl IntoIterator<Item = &'static str>) -> Option<&'static str> {
    let mut best = None;
    let mut best_distance = usize::MAX;
    for candidate in candidates {
        let dist = strsim::damerau_levenshtein(name, candidate);
        if dist < best_distance && dist <= 2 {
            best_distance = dist;
            best = Some(candidate);
        }
    }
    best
}

impl FromStr for Module {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(m) = Module::ALL.iter().find(|m| m.name() == s) {
            return Ok(*m);
        }
        match closest_name(s, Module::ALL.iter().map(|m| m.name())) {
            Some(suggestion) => anyhow::bail!("Unknown module '{}', did you mean '{}'?", s, suggestion),
            None => {
                let names: Vec<&str> = Module::ALL.iter().map(|m| m.name()).collect();
                anyhow::bail!("Unknown module '{}'. Available: {}", s, names.join(", "))
            }
        }
    }
}

/// Metric and diagnostic-data window.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }
}

/// Everything an extractor needs; shared between tasks.
pub struct DiscoveryContext {
    pub cm: CmClient,
    pub layout: BundleLayout,
    pub window: TimeWindow,
    pub settings: DiscoverySettings,
}

impl DiscoveryContext {
    /// Deployment view used for dumps: redacted unless redaction is disabled.
    pub fn export_view(&self) -> &'static str {
        if self.settings.redact_sensitive {
            "EXPORT_REDACTED"
        } else {
            "EXPORT"
        }
    }
}

/// Serialize `value` to `path`, creating parent directories.
pub async fn dump_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let json = serde_json::to_string(value)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    debug!(path = %path.display(), "api response stored");
    Ok(())
}

/// Outcome of one extractor task.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutcome<M = Module> {
    pub module: M,
    pub error: Option<String>,
}

async fn run_module(module: Module, ctx: Arc<DiscoveryContext>, workloads: Vec<workload::WorkloadKind>) -> Result<()> {
    match module {
        Module::CmApi => cm_api::collect(&ctx).await,
        Module::CmMetrics => metrics::collect(&ctx).await,
        Module::DiagnosticBundle => diagnostic::collect(&ctx).await,
        Module::HdfsReport => fsimage::collect(&ctx).await,
        Module::MapreduceExtractor | Module::SparkExtractor | Module::TezExtractor => {
            workload::collect(&ctx, &workloads).await
        }
        Module::ImpalaProfiles => impala::collect(&ctx).await,
        Module::HiveMetastore => metastore::collect(&ctx, metastore::Catalog::HiveMetastore).await,
        Module::SentryPolicies => metastore::collect(&ctx, metastore::Catalog::Sentry).await,
        Module::All => Ok(()),
    }
}

/// Build a discovery bundle for `module` into `ctx.layout`.
///
/// Connectivity is verified first; after that every extractor runs as its own
/// task and a failing extractor does not stop the others. The YARN workload
/// extractors share one task. Impala profiles are read from the extracted
/// diagnostic bundle, so they run once the other tasks are done.
pub async fn build(ctx: DiscoveryContext, module: Module, cm_url: &str) -> Result<Vec<ModuleOutcome>> {
    let root = ctx.layout.root().to_path_buf();
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create bundle directory '{}'", root.display()))?;
    tokio::fs::write(ctx.layout.cm_url(), redact_url(cm_url.trim_end_matches('/')))
        .await
        .context("Failed to write cm_url")?;

    info!(
        module = %module,
        cm = %redact_url(cm_url),
        output = %root.display(),
        start = %ctx.window.start,
        end = %ctx.window.end,
        redacted = ctx.settings.redact_sensitive,
        "starting discovery bundle extraction"
    );

    let clusters = ctx.cm.read_clusters("SUMMARY").await.with_context(|| {
        format!(
            "Unable to connect to {}. Verify the URL, that the server is reachable and the credentials",
            redact_url(cm_url)
        )
    })?;
    info!(clusters = clusters.len(), "connected to Cloudera Manager");

    let selected = module.expand();
    let workloads = workload::WorkloadKind::selected_by(&selected);
    let ctx = Arc::new(ctx);
    let mut tasks = JoinSet::new();
    let mut workloads_spawned = false;
    for &m in &selected {
        if m == Module::ImpalaProfiles {
            continue;
        }
        let is_workload = matches!(
            m,
            Module::MapreduceExtractor | Module::SparkExtractor | Module::TezExtractor
        );
        if is_workload {
            if workloads_spawned {
                continue;
            }
            workloads_spawned = true;
        }
        let ctx = Arc::clone(&ctx);
        let workloads = workloads.clone();
        tasks.spawn(async move { (m, run_module(m, ctx, workloads).await) });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (m, result) = joined.context("Extractor task panicked")?;
        outcomes.push(outcome(m, result));
    }
    if selected.contains(&Module::ImpalaProfiles) {
        let result = run_module(Module::ImpalaProfiles, Arc::clone(&ctx), Vec::new()).await;
        outcomes.push(outcome(Module::ImpalaProfiles, result));
    }
    outcomes.sort_by_key(|o| o.module);
    info!(output = %root.display(), "finished discovery bundle extraction");
    Ok(outcomes)
}

pub(crate) fn outcome<M: fmt::Display>(module: M, result: Result<()>) -> ModuleOutcome<M> {
    match result {
        Ok(()) => {
            info!(module = %module, "extractor finished");
            ModuleOutcome { module, error: None }
        }
        Err(e) => {
            let message = format!("{:#}", e);
            error!(module = %module, error = %message, "extractor failed");
            ModuleOutcome {
                module,
                error: Some(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_module_parse() {
        assert_eq!("cm_api".parse::<Module>().unwrap(), Module::CmApi);
        assert_eq!("all".parse::<Module>().unwrap(), Module::All);
        assert_eq!("hive_metastore".parse::<Module>().unwrap(), Module::HiveMetastore);
        let err = "cm_metric".parse::<Module>().unwrap_err().to_string();
        assert!(err.contains("did you mean 'cm_metrics'"));
        let err = "everything".parse::<Module>().unwrap_err().to_string();
        assert!(err.contains("Available"));
    }

    #[test]
    fn test_all_excludes_spark() {
        let all = Module::All.expand();
        assert!(!all.contains(&Module::SparkExtractor));
        assert!(!all.contains(&Module::All));
        assert!(all.contains(&Module::ImpalaProfiles));
        assert_eq!(all.len(), 9);
        assert!(all.contains(&Module::SentryPolicies));
        assert_eq!(Module::SparkExtractor.expand().len(), 1);
    }

    #[test]
    fn test_time_window() {
        let end = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();
        let window = TimeWindow::ending_at(end, 45);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2022, 1, 15, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_dump_json_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.json");
        dump_json(&path, &serde_json::json!({"items": []})).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), r#"{"items":[]}"#);
    }
}
