//! Time-series dumps under `metrics/`: per-host, per-role CPU and per-cluster
//! service and workload queries.

use super::{dump_json, DiscoveryContext};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub const HOST_METRICS: &[&str] = &[
    "cpu_percent",
    "swap_used",
    "physical_memory_used",
    "physical_memory_total",
    "physical_memory_cached",
    "physical_memory_buffers",
    "mem_rss",
    "total_bytes_receive_rate_across_network_interfaces",
    "total_bytes_transmit_rate_across_network_interfaces",
];

const HDFS_METRICS: &[&str] = &["dfs_capacity", "dfs_capacity_used", "blocks_total", "files_total"];

const YARN_SERVICE_METRICS: &[&str] = &[
    "total_available_vcores_across_yarn_pools",
    "total_allocated_vcores_across_yarn_pools",
    "total_pending_vcores_across_yarn_pools",
    "total_reserved_vcores_across_yarn_pools",
    "total_available_memory_mb_across_yarn_pools",
    "total_allocated_memory_mb_across_yarn_pools",
    "total_containers_running_across_nodemanagers",
    "pending_containers_cumulative",
    "apps_running_cumulative",
    "apps_killed_cumulative_rate",
    "apps_failed_cumulative_rate",
];

const YARN_POOL_METRICS: &[&str] = &[
    "pending_containers_cumulative",
    "apps_running_cumulative",
    "apps_killed_cumulative_rate",
    "apps_failed_cumulative_rate",
];

const IMPALA_METRICS: &[&str] = &[
    "total_num_queries_rate_across_impalads",
    "queries_oom_rate",
    "queries_successful_rate",
    "queries_spilled_memory_rate",
];

const KUDU_METRICS: &[&str] = &[
    "total_kudu_on_disk_size_across_kudu_replicas",
    "total_kudu_rows_upserted_rate_across_kudu_replicas",
    "total_kudu_rows_updated_rate_across_kudu_replicas",
    "total_kudu_rows_deleted_rate_across_kudu_replicas",
    "total_kudu_rows_inserted_rate_across_kudu_replicas",
    "total_kudu_scanner_bytes_scanned_from_disk_rate_across_kudu_replicas",
    "total_kudu_scanner_bytes_returned_rate_across_kudu_replicas",
];

const SOLR_METRICS: &[&str] = &[
    "total_index_size_across_solr_replicas",
    "index_size_across_solr_replicas",
    "total_num_docs_across_solr_replicas",
    "num_docs_across_solr_replicas",
    "total_select_requests_rate_across_solr_replicas",
    "select_requests_rate_across_solr_replicas",
    "total_query_requests_rate_across_solr_replicas",
    "query_requests_rate_across_solr_replicas",
    "total_update_requests_rate_across_solr_replicas",
    "update_requests_rate_across_solr_replicas",
    "select_avg_time_per_request_across_solr_replicas",
    "query_avg_time_per_request_across_solr_replicas",
    "update_avg_time_per_request_across_solr_replicas",
];

const WORKLOAD_METRICS: &[&str] = &["allocated_memory_seconds", "allocated_vcore_seconds"];

/// MapReduce has no CM service of its own; its workload queries always run.
pub const MAPREDUCE: &str = "MAPREDUCE";

/// One time-series query, stored as `<service_type>/<file_name>.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub service_type: &'static str,
    pub file_name: String,
    pub query: String,
}

impl MetricQuery {
    fn new(service_type: &'static str, file_name: impl Into<String>, query: String) -> Self {
        Self {
            service_type,
            file_name: file_name.into(),
            query,
        }
    }
}

pub fn host_metric_query(metric: &str, host_id: &str) -> String {
    format!("SELECT {} WHERE category = 'host' AND entityName='{}'", metric, host_id)
}

/// CPU usage of every role on a host, as a percentage of the host's cores.
/// YARN roles are measured including their container descendants.
pub fn role_cpu_query(host_id: &str) -> String {
    format!(
        "select (cpu_user_rate / getHostFact(numCores, 1) * 100) + (cpu_system_rate / getHostFact(numCores, 1) * 100) AS role_total_cpu_usage \
         WHERE category = role AND (serviceType RLIKE \"^(?!YARN).*\") AND (serviceType RLIKE \"^(?!MGMT).*\") AND hostId = {id}; \
         select (cpu_user_with_descendants_rate / getHostFact(numCores, 1) * 100) + (cpu_system_with_descendants_rate / getHostFact(numCores, 1) * 100) AS role_total_cpu_usage \
         WHERE category = role and serviceType = YARN AND hostId = {id}; ",
        id = host_id
    )
}

fn service_query(metric: &str, cluster: &str, service_type: &str) -> String {
    format!(
        "SELECT {} WHERE clusterDisplayName = '{}' AND serviceType='{}' AND category = 'service'",
        metric, cluster, service_type
    )
}

/// All per-cluster queries, keyed by the service type that must be present.
pub fn cluster_queries(cluster: &str) -> Vec<MetricQuery> {
    let mut queries = Vec::new();
    for (service_type, metrics) in [
        ("HDFS", HDFS_METRICS),
        ("IMPALA", IMPALA_METRICS),
        ("KUDU", KUDU_METRICS),
        ("SOLR", SOLR_METRICS),
    ] {
        for metric in metrics {
            queries.push(MetricQuery::new(
                service_type,
                format!("service_{}", metric),
                service_query(metric, cluster, service_type),
            ));
        }
    }
    for metric in YARN_SERVICE_METRICS {
        queries.push(MetricQuery::new(
            "YARN",
            *metric,
            format!("SELECT {} WHERE clusterDisplayName = '{}' AND serviceType='YARN'", metric, cluster),
        ));
    }
    // root pool figures overwrite the service-wide ones of the same name
    for metric in YARN_POOL_METRICS {
        queries.push(MetricQuery::new(
            "YARN",
            *metric,
            format!(
                "SELECT {} WHERE clusterDisplayName = '{}' AND serviceType='YARN' AND entityName RLIKE '.*root$'",
                metric, cluster
            ),
        ));
    }
    queries.push(MetricQuery::new(
        "HUE",
        "service_hue_users_active",
        "SELECT hue_users_active WHERE category = ROLE and roleType = HUE_SERVER".to_string(),
    ));
    for metric in WORKLOAD_METRICS {
        let name = format!("workload_{}", metric);
        queries.push(MetricQuery::new(
            "HIVE",
            name.clone(),
            format!(
                "select {} from YARN_APPLICATIONS where hive_query_id RLIKE \".*\" OR application_type = \"TEZ\"",
                metric
            ),
        ));
        queries.push(MetricQuery::new(
            "SPARK_ON_YARN",
            name.clone(),
            format!("select {} from YARN_APPLICATIONS where applicationType = SPARK", metric),
        ));
        queries.push(MetricQuery::new(
            MAPREDUCE,
            name,
            format!(
                "select {} from YARN_APPLICATIONS where applicationType = MAPREDUCE and hive_query_id is NULL",
                metric
            ),
        ));
    }
    queries
}

/// Queries whose service is deployed; `MAPREDUCE` always qualifies.
pub fn applicable<'a>(queries: &'a [MetricQuery], service_types: &BTreeSet<String>) -> Vec<&'a MetricQuery> {
    queries
        .iter()
        .filter(|q| q.service_type == MAPREDUCE || service_types.contains(q.service_type))
        .collect()
}

pub async fn collect(ctx: &DiscoveryContext) -> Result<()> {
    info!("CM metrics collection started");
    let cm = &ctx.cm;
    let (from, to) = (&ctx.window.start, &ctx.window.end);
    let hosts = cm.read_hosts("FULL").await.context("Failed to read hosts")?;

    for host in &hosts {
        let dir = ctx.layout.host_metrics_dir(&host.hostname);
        for metric in HOST_METRICS {
            debug!(host = %host.hostname, metric, "collecting host metric");
            match cm.query_time_series(&host_metric_query(metric, &host.host_id), from, to).await {
                Ok(v) => dump_json(&dir.join(format!("{}.json", metric)), &v).await?,
                Err(e) => warn!(host = %host.hostname, metric, error = %e, "unable to fetch metric"),
            }
        }
        match cm.query_time_series(&role_cpu_query(&host.host_id), from, to).await {
            Ok(v) => dump_json(&dir.join("role_cpu_usage_rate.json"), &v).await?,
            Err(e) => warn!(host = %host.hostname, error = %e, "unable to fetch role CPU usage"),
        }
    }

    for cluster in cm.read_clusters("SUMMARY").await? {
        let label = cluster.label().to_string();
        let service_types: BTreeSet<String> = match cm.read_services(&cluster.name, "SUMMARY").await {
            Ok(services) => services.into_iter().map(|s| s.service_type).collect(),
            Err(e) => {
                warn!(cluster = %label, error = %e, "failed to read services, skipping cluster metrics");
                continue;
            }
        };
        let queries = cluster_queries(&label);
        for query in applicable(&queries, &service_types) {
            debug!(cluster = %label, service = query.service_type, metric = %query.file_name, "collecting metric");
            match cm.query_time_series(&query.query, from, to).await {
                Ok(v) => {
                    let path = ctx
                        .layout
                        .service_metrics_dir(&label, query.service_type)
                        .join(format!("{}.json", query.file_name));
                    dump_json(&path, &v).await?;
                }
                Err(e) => warn!(cluster = %label, metric = %query.file_name, error = %e, "unable to fetch metric"),
            }
        }
    }
    info!("CM metrics collection finished");
    Ok(())
}
