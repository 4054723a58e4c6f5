//! YARN workload history: MapReduce job history, Spark event logs and
//! Tez / Hive-on-Tez proto history, copied out of HDFS and tarred.

use super::command::{tar_directory, HdfsClient};
use super::fsimage::hdfs_client_config;
use super::{DiscoveryContext, Module};
use crate::hadoop_conf::mapreduce_done_dir;
use crate::model::cm::{find_config, ApiCluster, ApiService};
use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Local, NaiveDate};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::Path;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkloadKind {
    Mapreduce,
    Spark,
    Tez,
}

impl WorkloadKind {
    pub fn selected_by(modules: &BTreeSet<Module>) -> Vec<WorkloadKind> {
        let mut kinds = Vec::new();
        if modules.contains(&Module::MapreduceExtractor) {
            kinds.push(WorkloadKind::Mapreduce);
        }
        if modules.contains(&Module::SparkExtractor) {
            kinds.push(WorkloadKind::Spark);
        }
        if modules.contains(&Module::TezExtractor) {
            kinds.push(WorkloadKind::Tez);
        }
        kinds
    }
}

/// A history directory date; `day == None` stands for the whole month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadDate {
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
}

impl WorkloadDate {
    fn day_part(&self) -> String {
        match self.day {
            Some(d) => format!("{:02}", d),
            None => "*".to_string(),
        }
    }

    /// `YYYY/MM/DD` or `YYYY/MM/*`, the MapReduce done-dir layout.
    pub fn history_path(&self) -> String {
        format!("{}/{:02}/{}", self.year, self.month, self.day_part())
    }

    /// `date=YYYY-MM-DD` or `date=YYYY-MM-*`, the Tez proto history layout.
    pub fn partition(&self) -> String {
        format!("date={}-{:02}-{}", self.year, self.month, self.day_part())
    }
}

impl fmt::Display for WorkloadDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.history_path())
    }
}

/// Directory dates covering the last `days` days ending `today`. Walking back
/// from today, a month whose remaining days all fall in the window becomes a
/// month wildcard; the rest are listed day by day.
pub fn workload_dates(today: NaiveDate, days: u32) -> Vec<WorkloadDate> {
    let mut dates = Vec::new();
    let mut remaining = i64::from(days);
    let mut pointer = today;
    while remaining > 0 {
        let days_in_month_so_far = i64::from(pointer.day());
        if days_in_month_so_far <= remaining {
            dates.push(WorkloadDate {
                year: pointer.year(),
                month: pointer.month(),
                day: None,
            });
            pointer -= Duration::days(days_in_month_so_far);
            remaining -= days_in_month_so_far;
        } else {
            for i in 0..remaining {
                let date = pointer - Duration::days(i);
                dates.push(WorkloadDate {
                    year: date.year(),
                    month: date.month(),
                    day: Some(date.day()),
                });
            }
            remaining = 0;
        }
    }
    dates
}

/// Effective value of `name`, from the explicit value or the default.
async fn config_value(ctx: &DiscoveryContext, cluster: &str, service: &str, name: &str) -> Result<Option<String>> {
    let configs = ctx
        .cm
        .read_service_config(cluster, service, "FULL")
        .await
        .with_context(|| format!("Failed to read the configuration of '{}'", service))?;
    Ok(find_config(&configs, name).and_then(|c| c.effective_value()).map(str::to_string))
}

pub async fn collect(ctx: &DiscoveryContext, kinds: &[WorkloadKind]) -> Result<()> {
    if kinds.is_empty() {
        return Ok(());
    }
    let dates = workload_dates(Local::now().date_naive(), ctx.settings.time_range_days);
    debug!(dates = ?dates.iter().map(|d| d.to_string()).collect::<Vec<_>>(), "history directories to download");
    let deployment = ctx
        .cm
        .deployment(ctx.export_view())
        .await
        .context("Failed to read the CM deployment")?;
    let collected = for_each_cluster(&deployment.clusters, |cluster| {
        collect_cluster(ctx, cluster, kinds, &dates)
    })
    .await;
    info!(clusters = collected, "collected workloads");
    Ok(())
}

/// Run `extract` on every cluster. A cluster that fails is logged and the
/// rest still run; returns how many succeeded.
async fn for_each_cluster<'a, F, Fut>(clusters: &'a [ApiCluster], mut extract: F) -> usize
where
    F: FnMut(&'a ApiCluster) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut succeeded = 0;
    for cluster in clusters {
        match extract(cluster).await {
            Ok(()) => succeeded += 1,
            Err(e) => {
                error!(cluster = %cluster.label(), error = %format!("{:#}", e), "skipping workload extraction")
            }
        }
    }
    succeeded
}

async fn collect_cluster(
    ctx: &DiscoveryContext,
    cluster: &ApiCluster,
    kinds: &[WorkloadKind],
    dates: &[WorkloadDate],
) -> Result<()> {
    let Some(hdfs) = cluster.service_of_type("HDFS") else {
        debug!(cluster = %cluster.label(), "HDFS is not deployed");
        return Ok(());
    };
    let client = hdfs_client_config(ctx, cluster, &hdfs.name, "workload").await?;
    let groups = client.groups().await?;
    if !groups.success() {
        anyhow::bail!("HDFS is not reachable: {}", groups.stderr.trim());
    }
    for kind in kinds {
        let result = match kind {
            WorkloadKind::Spark => collect_spark(ctx, cluster, &client).await,
            WorkloadKind::Mapreduce => collect_mapreduce(ctx, cluster, &client, dates).await,
            WorkloadKind::Tez => collect_tez(ctx, cluster, &client, dates).await,
        };
        if let Err(e) = result {
            error!(cluster = %cluster.label(), workload = ?kind, error = %format!("{:#}", e), "workload extraction failed");
        }
    }
    info!(cluster = %cluster.label(), "collected workloads");
    Ok(())
}

async fn collect_spark(ctx: &DiscoveryContext, cluster: &ApiCluster, client: &HdfsClient) -> Result<()> {
    let spark: Vec<&ApiService> = cluster
        .services
        .iter()
        .filter(|s| s.service_type.contains("SPARK"))
        .collect();
    if spark.is_empty() {
        debug!(cluster = %cluster.label(), "Spark is not deployed");
        return Ok(());
    }
    for service in spark {
        let Some(log_dir) = config_value(ctx, &cluster.name, &service.name, "spark_history_log_dir").await? else {
            warn!(service = %service.name, "spark_history_log_dir is not set");
            continue;
        };
        let out = ctx.layout.workload_service_dir(cluster.label(), &service.name);
        if client.dir_exists(&log_dir).await? {
            client.get(&log_dir, &out).await?;
        }
        tar_directory(&out.join("SPARK_APP_HISTORY.tar.gz"), &out).await?;
    }
    Ok(())
}

/// The job history done-dir: from the YARN MapReduce safety valve when it
/// sets one, else `<JobHistory staging dir>/history/done`.
async fn mapreduce_history_dir(ctx: &DiscoveryContext, cluster: &ApiCluster) -> Result<Option<String>> {
    let Some(yarn) = cluster.service_of_type("YARN") else {
        debug!(cluster = %cluster.label(), "YARN is not deployed");
        return Ok(None);
    };
    if let Some(valve) = config_value(ctx, &cluster.name, &yarn.name, "yarn_service_mapred_safety_valve").await? {
        match mapreduce_done_dir(&valve) {
            Some(dir) => {
                info!(dir = %dir, "MapReduce history dir from safety valve");
                return Ok(Some(dir));
            }
            None => debug!("safety valve does not set the done-dir"),
        }
    }
    let groups = ctx.cm.read_role_config_groups(&cluster.name, &yarn.name).await?;
    let Some(job_history) = groups.iter().find(|g| g.role_type == "JOBHISTORY") else {
        warn!(cluster = %cluster.label(), "no JobHistory role config group");
        return Ok(None);
    };
    let configs = ctx
        .cm
        .read_role_config_group_config(&cluster.name, &yarn.name, &job_history.name, "FULL")
        .await?;
    Ok(find_config(&configs, "yarn_app_mapreduce_am_staging_dir")
        .and_then(|c| c.effective_value())
        .map(|staging| format!("{}/history/done", staging.trim_end_matches('/'))))
}

async fn collect_mapreduce(
    ctx: &DiscoveryContext,
    cluster: &ApiCluster,
    client: &HdfsClient,
    dates: &[WorkloadDate],
) -> Result<()> {
    let Some(history_dir) = mapreduce_history_dir(ctx, cluster).await? else {
        return Ok(());
    };
    let out = ctx.layout.workload_service_dir(cluster.label(), "MAPREDUCE");
    for date in dates {
        let dest = out.join("done").join(date.year.to_string()).join(format!("{:02}", date.month));
        tokio::fs::create_dir_all(&dest).await?;
        let src = format!("{}/{}", history_dir, date.history_path());
        if client.dir_exists(&src).await? {
            client.get(&src, &dest).await?;
        }
    }
    tar_directory(&out.join("MR_JOB_HISTORY.tar.gz"), &out).await
}

async fn copy_partitions(client: &HdfsClient, base: &str, dates: &[WorkloadDate], dest: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    for date in dates {
        let src = format!("{}/{}", base.trim_end_matches('/'), date.partition());
        if client.dir_exists(&src).await? {
            client.get(&src, dest).await?;
        }
    }
    Ok(())
}

async fn collect_tez(
    ctx: &DiscoveryContext,
    cluster: &ApiCluster,
    client: &HdfsClient,
    dates: &[WorkloadDate],
) -> Result<()> {
    let (Some(tez), Some(hive_on_tez)) = (
        cluster.service_of_type("TEZ"),
        cluster.service_of_type("HIVE_ON_TEZ"),
    ) else {
        debug!(cluster = %cluster.label(), "Tez or Hive on Tez is not deployed");
        return Ok(());
    };
    let out = ctx.layout.workload_service_dir(cluster.label(), &tez.name);

    match config_value(ctx, &cluster.name, &hive_on_tez.name, "hive_hook_proto_base_directory").await? {
        Some(base) => {
            let dir = out.join("hive_on_tez_protoquery_databuf_app_files");
            copy_partitions(client, &base, dates, &dir.join("query_data")).await?;
            tar_directory(&dir.join("HIVE_PROTOBUF_APPLICATIONS.tar.gz"), &dir).await?;
        }
        None => warn!(service = %hive_on_tez.name, "hive_hook_proto_base_directory is not set"),
    }

    match config_value(ctx, &cluster.name, &tez.name, "tez.history.logging.proto-base-dir").await? {
        Some(base) => {
            let dir = out.join("tez_protobuf_app_files");
            for table in ["app_data", "dag_data", "dag_meta"] {
                let src = format!("{}/{}", base.trim_end_matches('/'), table);
                copy_partitions(client, &src, dates, &dir.join("sys.db").join(table)).await?;
            }
            tar_directory(&dir.join("TEZ_PROTOBUF_APPLICATIONS.tar.gz"), &dir).await?;
        }
        None => warn!(service = %tez.name, "tez.history.logging.proto-base-dir is not set"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: Option<u32>) -> WorkloadDate {
        WorkloadDate { year: y, month: m, day }
    }

    #[test]
    fn test_dates_within_current_month() {
        let today = NaiveDate::from_ymd_opt(2022, 3, 20).unwrap();
        let dates = workload_dates(today, 3);
        assert_eq!(
            dates,
            vec![d(2022, 3, Some(20)), d(2022, 3, Some(19)), d(2022, 3, Some(18))]
        );
    }

    #[test]
    fn test_dates_cover_whole_months() {
        // 10 days of March, all of February (28), then 7 days of January
        let today = NaiveDate::from_ymd_opt(2022, 3, 10).unwrap();
        let dates = workload_dates(today, 45);
        assert_eq!(dates[0], d(2022, 3, None));
        assert_eq!(dates[1], d(2022, 2, None));
        assert_eq!(dates.len(), 2 + 7);
        assert_eq!(dates[2], d(2022, 1, Some(31)));
        assert_eq!(dates[8], d(2022, 1, Some(25)));
    }

    #[test]
    fn test_dates_cross_year() {
        let today = NaiveDate::from_ymd_opt(2022, 1, 2).unwrap();
        let dates = workload_dates(today, 4);
        assert_eq!(dates, vec![d(2022, 1, None), d(2021, 12, Some(31)), d(2021, 12, Some(30))]);
    }

    #[test]
    fn test_exact_month_boundary() {
        let today = NaiveDate::from_ymd_opt(2022, 3, 31).unwrap();
        assert_eq!(workload_dates(today, 31), vec![d(2022, 3, None)]);
    }

    #[test]
    fn test_date_paths() {
        assert_eq!(d(2022, 3, Some(5)).history_path(), "2022/03/05");
        assert_eq!(d(2022, 3, None).history_path(), "2022/03/*");
        assert_eq!(d(2022, 11, None).partition(), "date=2022-11-*");
        assert_eq!(d(2022, 11, Some(9)).partition(), "date=2022-11-09");
    }

    #[tokio::test]
    async fn test_failing_cluster_does_not_stop_the_others() {
        let clusters: Vec<ApiCluster> = ["Cluster 1", "Cluster 2"]
            .iter()
            .map(|name| ApiCluster {
                name: name.to_string(),
                ..Default::default()
            })
            .collect();
        let mut visited = Vec::new();
        let succeeded = for_each_cluster(&clusters, |cluster| {
            visited.push(cluster.name.clone());
            let fails = cluster.name == "Cluster 1";
            async move {
                if fails {
                    anyhow::bail!("HDFS is not reachable: connection refused");
                }
                Ok(())
            }
        })
        .await;
        assert_eq!(succeeded, 1);
        assert_eq!(visited, vec!["Cluster 1", "Cluster 2"]);
    }

    #[test]
    fn test_selected_kinds() {
        let modules = Module::All.expand();
        assert_eq!(
            WorkloadKind::selected_by(&modules),
            vec![WorkloadKind::Mapreduce, WorkloadKind::Tez]
        );
    }
}
