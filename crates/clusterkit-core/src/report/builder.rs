//! Builds the assessment workbook from a discovery bundle on disk.

use crate::discovery::layout::{find_files, BundleLayout};
use crate::hdfs::{tree, HdfsReport, FSIMAGE_DUMP_FILES};
use crate::model::cm::{
    find_config, ApiCluster, ApiConfig, ApiDeployment, ApiHost, ApiKerberosInfo, ApiList,
    ApiTimeSeriesResponse, ApiVersionInfo,
};
use crate::redact::config_value_for_display;
use crate::report::csv::read_rows;
use crate::report::hostfacts::HostFacts;
use crate::report::workbook::{Cell, Sheet, Workbook};
use crate::row;
use anyhow::{Context, Result};
use chrono::DateTime;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const REPORT_WORKBOOK: &str = "mac-discovery-bundle-report";
pub const NOT_ENABLED: &str = "Not enabled";

/// Role type -> host category for the `Clusters` sheet. A role type may
/// appear in several categories.
pub const ROLE_ASSIGNMENTS: &[(&str, &[&str])] = &[
    (
        "master",
        &[
            "NAMENODE",
            "JOURNALNODE",
            "FAILOVERCONTROLLER",
            "RESOURCEMANAGER",
            "SERVER",
            "JOBHISTORY",
            "KUDU_MASTER",
            "MASTER",
            "SCHEMA_REGISTRY_SERVER",
            "SPARK_YARN_HISTORY_SERVER",
        ],
    ),
    (
        "utility",
        &[
            "ACTIVITYMONITOR",
            "ALERTPUBLISHER",
            "EVENTSERVER",
            "HOSTMONITOR",
            "NAVIGATOR",
            "NAVIGATORMETASERVER",
            "REPORTSMANAGER",
            "SERVICEMONITOR",
            "TELEMETRYPUBLISHER",
            "CRUISE_CONTROL_SERVER",
            "HIVEMETASTORE",
            "CATALOGSERVER",
            "STATESTORE",
            "OOZIE_SERVER",
            "RANGER_ADMIN",
            "RANGER_TAGSYNC",
            "RANGER_USERSYNC",
            "ATLAS_SERVER",
            "SOLR_SERVER",
            "STREAMS_MESSAGING_MANAGER_SERVER",
            "STREAMS_MESSAGING_MANAGER_UI",
            "STREAMS_REPLICATION_MANAGER_SERVICE",
        ],
    ),
    (
        "gateway",
        &["HUE_LOAD_BALANCER", "HUE_SERVER", "KT_RENEWER", "HIVESERVER2", "GATEWAY"],
    ),
    (
        "worker",
        &[
            "DATANODE",
            "NODEMANAGER",
            "IMPALAD",
            "KUDU_TSERVER",
            "KAFKA_BROKER",
            "KAFKA_CONNECT",
            "REGIONSERVER",
            "SOLR_SERVER",
            "STREAMS_REPLICATION_MANAGER_DRIVER",
        ],
    ),
];

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

/// Optional inputs: missing or unreadable files degrade to defaults.
fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "using empty data");
            T::default()
        }
    }
}

/// `2022-03-01T12:00:00.000Z` -> `2022-03-01 12:00:00`.
pub fn format_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn file_name_of(path: &Path, ancestor: usize) -> String {
    path.ancestors()
        .nth(ancestor)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn join_sorted<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct ReportBuilder {
    layout: BundleLayout,
    deployment: ApiDeployment,
    hosts: Vec<ApiHost>,
    hdfs_depth: usize,
    redact: bool,
}

impl ReportBuilder {
    /// Load the deployment and host dumps; both are required.
    pub fn open(bundle: &Path) -> Result<Self> {
        let layout = BundleLayout::new(bundle);
        let deployment: ApiDeployment = read_json(&layout.deployment())
            .context("The bundle has no usable CM deployment dump")?;
        let hosts: ApiList<ApiHost> =
            read_json(&layout.hosts()).context("The bundle has no usable host dump")?;
        Ok(Self {
            layout,
            deployment,
            hosts: hosts.items,
            hdfs_depth: tree::DEFAULT_MAX_DEPTH,
            redact: true,
        })
    }

    pub fn with_hdfs_depth(mut self, depth: usize) -> Self {
        self.hdfs_depth = depth;
        self
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact = redact;
        self
    }

    pub fn build(&self) -> Result<Workbook> {
        info!(bundle = %self.layout.root().display(), "building discovery report");
        let mut wb = Workbook::new(REPORT_WORKBOOK);
        wb.add_sheet(self.nodes_sheet());
        wb.add_sheet(self.configurations_sheet());
        wb.add_sheet(self.service_metrics_sheet());
        wb.add_sheet(self.role_metrics_sheet());
        wb.add_sheet(self.workload_metrics_sheet());
        wb.add_sheet(self.services_sheet());
        wb.add_sheet(self.passthrough_sheet("Hive Metastore", "hive_ms.csv"));
        wb.add_sheet(self.passthrough_sheet("Sentry Policies", "sentry_policies.csv"));
        let (structure, modtime) = self.hdfs_sheets();
        for sheet in structure {
            wb.add_sheet(sheet);
        }
        wb.add_sheet(modtime);
        wb.add_sheet(self.cm_sheet());
        wb.add_sheet(self.clusters_sheet());
        Ok(wb)
    }

    /// Build and write the workbook under `output`; returns its sheet directory.
    pub fn write(&self, output: &Path) -> Result<PathBuf> {
        let wb = self.build()?;
        let dir = wb.write(output)?;
        info!(path = %dir.display(), sheets = wb.sheets.len(), "discovery report written");
        Ok(dir)
    }

    fn nodes_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(
            "Nodes",
            &[
                "Hostname",
                "Cluster",
                "OS",
                "Java Version",
                "Cores",
                "Physical Cores",
                "CPU Max MHz",
                "Memory (GB)",
                "Disk Available (GB)",
                "Disk Used (GB)",
                "Roles",
                "Services",
            ],
        );
        for host in &self.hosts {
            let facts = HostFacts::load(self.layout.root(), &host.hostname);
            sheet.push(row![
                host.hostname.as_str(),
                host.cluster_name().unwrap_or("Not PRESENT"),
                facts.os.description,
                facts.java_version,
                host.num_cores,
                host.num_physical_cores,
                facts.cpu_max_mhz,
                host.memory_gb(),
                facts.disk.available_gb,
                facts.disk.used_gb,
                join_sorted(host.role_refs.iter().map(|r| r.role_name.as_str())),
                join_sorted(host.role_refs.iter().map(|r| r.service_name.as_str())),
            ]);
        }
        sheet
    }

    fn configurations_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(
            "Configurations",
            &["Cluster", "Service Type", "Config Level", "Owner", "Name", "Value", "Default"],
        );
        for cluster in &self.deployment.clusters {
            for file in find_files(&self.layout.configs_dir(cluster.label()), "*.json") {
                let configs: ApiList<ApiConfig> = match read_json(&file) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %format!("{:#}", e), "skipping config dump");
                        continue;
                    }
                };
                let owner = file
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let service_type = file_name_of(&file, 2);
                let level = file_name_of(&file, 1);
                for config in &configs.items {
                    let value = if self.redact {
                        config_value_for_display(config)
                    } else {
                        config.value.clone()
                    };
                    sheet.push(row![
                        cluster.label(),
                        service_type.as_str(),
                        level.as_str(),
                        owner.as_str(),
                        config.name.as_str(),
                        value,
                        config.default.as_deref(),
                    ]);
                }
            }
        }
        sheet
    }

    fn time_series_files(&self, dir: &Path, pattern: &str) -> Vec<(PathBuf, Vec<ApiTimeSeriesResponse>)> {
        find_files(dir, pattern)
            .into_iter()
            .filter_map(|file| match read_json::<ApiList<ApiTimeSeriesResponse>>(&file) {
                Ok(list) => Some((file, list.items)),
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "skipping metric dump");
                    None
                }
            })
            .collect()
    }

    fn service_metrics_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(
            "Service Metrics",
            &["Cluster", "Service Name", "Service Type", "Timestamp", "Metric", "Min", "Mean", "Max", "Unit"],
        );
        for (_, responses) in self.time_series_files(&self.layout.cluster_metrics_dir(), "service_*.json") {
            for series in responses.iter().flat_map(|r| &r.time_series) {
                let meta = &series.metadata;
                for data in &series.data {
                    let stats = data.aggregate_statistics.as_ref();
                    sheet.push(row![
                        meta.attribute("clusterDisplayName").unwrap_or(""),
                        meta.attribute("serviceName").unwrap_or(""),
                        meta.attribute("serviceType").unwrap_or(""),
                        format_timestamp(&data.timestamp),
                        meta.metric_name.as_str(),
                        stats.and_then(|s| s.min),
                        stats.and_then(|s| s.mean),
                        stats.and_then(|s| s.max),
                        meta.unit(),
                    ]);
                }
            }
        }
        sheet
    }

    fn role_metrics_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(
            "Role Metrics",
            &["Cluster", "Hostname", "Service Type", "Role Type", "Alias", "Timestamp", "Value", "Unit"],
        );
        let dir = self.layout.root().join("metrics").join("host");
        for (_, responses) in self.time_series_files(&dir, "role_cpu_usage_rate.json") {
            for series in responses.iter().flat_map(|r| &r.time_series) {
                let meta = &series.metadata;
                for data in &series.data {
                    sheet.push(row![
                        meta.attribute("clusterDisplayName").unwrap_or("NONE"),
                        meta.attribute("hostname").unwrap_or(""),
                        meta.attribute("serviceType").unwrap_or(""),
                        meta.attribute("roleType").unwrap_or(""),
                        meta.alias.as_deref(),
                        format_timestamp(&data.timestamp),
                        data.value,
                        "%",
                    ]);
                }
            }
        }
        sheet
    }

    fn workload_metrics_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(
            "YARN Workload Metrics",
            &["Service Type", "Metric", "Timestamp", "Value", "Unit"],
        );
        for (file, responses) in self.time_series_files(&self.layout.cluster_metrics_dir(), "workload_*.json") {
            let service_type = file_name_of(&file, 1);
            for series in responses.iter().flat_map(|r| &r.time_series) {
                for data in &series.data {
                    sheet.push(row![
                        service_type.as_str(),
                        series.metadata.metric_name.as_str(),
                        format_timestamp(&data.timestamp),
                        data.value,
                        series.metadata.unit(),
                    ]);
                }
            }
        }
        sheet
    }

    fn services_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new("Services", &["Hostname", "Cluster", "Service Type", "Role Type"]);
        let names = self.deployment.host_names();
        for cluster in &self.deployment.clusters {
            for service in &cluster.services {
                for role in &service.roles {
                    let host_id = role.host_ref.host_id.as_str();
                    sheet.push(row![
                        names.get(host_id).copied().unwrap_or(host_id),
                        cluster.label(),
                        service.service_type.as_str(),
                        role.role_type.as_str(),
                    ]);
                }
            }
        }
        sheet
    }

    /// Rows of every `file_name` under `workload/`, header taken from the first.
    fn passthrough_sheet(&self, name: &str, file_name: &str) -> Sheet {
        let files = find_files(&self.layout.workload_dir(), file_name);
        let header: Vec<String> = files
            .first()
            .and_then(|f| std::fs::read_to_string(f).ok())
            .and_then(|c| c.lines().next().map(|l| crate::report::csv::split_record(l, ',')))
            .unwrap_or_default();
        let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();
        let mut sheet = Sheet::new(name, &header_refs);
        for file in &files {
            match read_rows(file, ',') {
                Ok(rows) => rows.iter().for_each(|r| sheet.push_text(r.as_slice())),
                Err(e) => warn!(path = %file.display(), error = %e, "skipping csv"),
            }
        }
        sheet
    }

    fn hdfs_dumps(&self) -> Vec<PathBuf> {
        FSIMAGE_DUMP_FILES
            .iter()
            .flat_map(|name| find_files(&self.layout.workload_dir(), name))
            .collect()
    }

    /// One structure sheet per cluster dump plus the merged ModTime sheet.
    /// The CSV reports are also written next to each dump. A dump that does
    /// not parse is skipped.
    fn hdfs_sheets(&self) -> (Vec<Sheet>, Sheet) {
        let mut structure = Vec::new();
        let mut modtimes = Vec::new();
        for dump in self.hdfs_dumps() {
            let report = match HdfsReport::from_file(&dump, self.hdfs_depth) {
                Ok(report) => report,
                Err(e) => {
                    warn!(path = %dump.display(), error = %format!("{:#}", e), "skipping fsimage dump");
                    continue;
                }
            };
            if let Some(dir) = dump.parent() {
                if let Err(e) = report.write_csv(dir) {
                    warn!(path = %dir.display(), error = %format!("{:#}", e), "could not write HDFS csv reports");
                }
            }
            structure.push(tree::structure_sheet(
                &format!("{} HDFS Report", report.cluster_name),
                &report.structure,
            ));
            modtimes.extend(report.modification_times);
        }
        (structure, tree::modtime_sheet("HDFS ModTime Report", &modtimes))
    }

    fn cm_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(
            "CM",
            &[
                "Deployment Timestamp",
                "CM URL",
                "CM Version",
                "WEB_TLS",
                "AGENT_TLS",
                "External Authentication",
                "AUTO_TLS_TYPE",
                "Kerberized",
                "KDC Type",
                "KDC Host",
                "Kerberos Realm",
            ],
        );
        let cm_url = std::fs::read_to_string(self.layout.cm_url())
            .map(|s| s.lines().next().unwrap_or_default().to_string())
            .unwrap_or_else(|e| {
                debug!(error = %e, "no cm_url file");
                String::new()
            });
        let version: ApiVersionInfo = read_json_or_default(&self.layout.cm_dump("cm_version"));
        let configs: ApiList<ApiConfig> = read_json_or_default(&self.layout.cm_dump("cm_config"));
        let kerberos: ApiKerberosInfo = read_json_or_default(&self.layout.cm_dump("kerberos_info"));

        let value_or = |name: &str, fallback: &str| -> String {
            find_config(&configs.items, name)
                .and_then(|c| c.value.as_deref())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        let auth_order = find_config(&configs.items, "AUTH_BACKEND_ORDER").and_then(|c| c.effective_value());
        let external_auth = if auth_order == Some("DB_ONLY") {
            "DB_ONLY".to_string()
        } else {
            find_config(&configs.items, "LDAP_TYPE")
                .and_then(|c| c.effective_value())
                .unwrap_or("-")
                .to_string()
        };
        let or_not_enabled = |v: Option<&str>| v.filter(|s| !s.is_empty()).unwrap_or(NOT_ENABLED).to_string();

        sheet.push(row![
            self.deployment.timestamp.as_deref(),
            cm_url,
            version.version.as_deref(),
            value_or("WEB_TLS", NOT_ENABLED),
            value_or("AGENT_TLS", NOT_ENABLED),
            external_auth,
            value_or("AUTO_TLS_TYPE", NOT_ENABLED),
            match kerberos.kerberized {
                Some(true) => Cell::Bool(true),
                _ => Cell::from(NOT_ENABLED),
            },
            or_not_enabled(kerberos.kdc_type.as_deref()),
            or_not_enabled(kerberos.kdc_host.as_deref()),
            or_not_enabled(kerberos.kerberos_realm.as_deref()),
        ]);
        sheet
    }

    fn hosts_of_cluster(&self, cluster: &ApiCluster) -> Vec<&ApiHost> {
        self.hosts
            .iter()
            .filter(|h| h.cluster_name() == Some(cluster.name.as_str()))
            .collect()
    }

    /// category -> hostnames (first-seen order), and the distinct role types.
    fn role_assignment(&self, cluster: &ApiCluster) -> (BTreeMap<&'static str, Vec<String>>, BTreeSet<String>) {
        let names = self.deployment.host_names();
        let mut assignment: BTreeMap<&'static str, Vec<String>> =
            ROLE_ASSIGNMENTS.iter().map(|(k, _)| (*k, Vec::new())).collect();
        let mut role_types = BTreeSet::new();
        for role in cluster.services.iter().flat_map(|s| &s.roles) {
            role_types.insert(role.role_type.clone());
            let host_id = role.host_ref.host_id.as_str();
            let host = names.get(host_id).copied().unwrap_or(host_id);
            for (category, types) in ROLE_ASSIGNMENTS {
                let hosts = assignment.entry(*category).or_default();
                if types.contains(&role.role_type.as_str()) && !hosts.iter().any(|h| h == host) {
                    hosts.push(host.to_string());
                }
            }
        }
        (assignment, role_types)
    }

    /// Latest `dfs_capacity_used` and `dfs_capacity` in TB.
    fn hdfs_capacity_tb(&self, cluster: &ApiCluster) -> (f64, f64) {
        let dir = self.layout.service_metrics_dir(cluster.label(), "HDFS");
        let latest = |metric: &str| -> f64 {
            let path = dir.join(format!("service_{}.json", metric));
            if !path.is_file() {
                return 0.0;
            }
            let list: ApiList<ApiTimeSeriesResponse> = read_json_or_default(&path);
            list.items
                .iter()
                .flat_map(|r| &r.time_series)
                .filter_map(|s| s.data.last())
                .map(|d| d.value.trunc() / 1e12)
                .sum()
        };
        (latest("dfs_capacity_used"), latest("dfs_capacity"))
    }

    /// (views, tables) counted from the cluster's Hive metastore export.
    fn hive_object_counts(&self, cluster: &ApiCluster) -> (u64, u64) {
        let mut views = 0;
        let mut tables = 0;
        for file in find_files(&self.layout.workload_cluster_dir(cluster.label()), "hive_ms.csv") {
            let Ok(rows) = read_rows(&file, ',') else {
                continue;
            };
            for row in rows {
                if row.iter().any(|f| f == "MANAGED_TABLE" || f == "EXTERNAL_TABLE") {
                    tables += 1;
                } else if row.iter().any(|f| f == "VIRTUAL_VIEW") {
                    views += 1;
                }
            }
        }
        (views, tables)
    }

    fn clusters_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(
            "Clusters",
            &[
                "Cluster Name",
                "CDH Version",
                "HDFS Used (TB)",
                "HDFS Capacity (TB)",
                "Total Cores",
                "Total Memory (GB)",
                "Worker Cores",
                "Worker Memory (GB)",
                "Hive Views",
                "Hive Tables",
                "Number of Hosts",
                "Master Hosts Count",
                "Master Hosts",
                "Utility Hosts Count",
                "Utility Hosts",
                "Gateway Hosts Count",
                "Gateway Hosts",
                "Worker Hosts Count",
                "Worker Hosts",
                "Role Types",
            ],
        );
        for cluster in &self.deployment.clusters {
            let cluster_hosts = self.hosts_of_cluster(cluster);
            let (assignment, role_types) = self.role_assignment(cluster);
            let (used_tb, capacity_tb) = self.hdfs_capacity_tb(cluster);
            let (views, tables) = self.hive_object_counts(cluster);

            let total_cores: u64 = cluster_hosts.iter().filter_map(|h| h.num_cores).sum();
            let total_memory: f64 = cluster_hosts.iter().map(|h| h.memory_gb()).sum();
            let workers: Vec<&ApiHost> = assignment
                .get("worker")
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|n| self.hosts.iter().find(|h| &h.hostname == n))
                        .collect()
                })
                .unwrap_or_default();
            let worker_cores: u64 = workers.iter().filter_map(|h| h.num_cores).sum();
            let worker_memory: f64 = workers.iter().map(|h| h.memory_gb()).sum();
            let hosts_in = |category: &str| -> (usize, String) {
                let list = assignment.get(category).map(Vec::as_slice).unwrap_or(&[]);
                (list.len(), list.join(", "))
            };
            let (master_n, master) = hosts_in("master");
            let (utility_n, utility) = hosts_in("utility");
            let (gateway_n, gateway) = hosts_in("gateway");
            let (worker_n, worker) = hosts_in("worker");

            sheet.push(row![
                cluster.label(),
                cluster.activated_cdh_version().unwrap_or("-"),
                used_tb,
                capacity_tb,
                total_cores,
                total_memory,
                worker_cores,
                worker_memory,
                views,
                tables,
                cluster_hosts.len(),
                master_n,
                master,
                utility_n,
                utility,
                gateway_n,
                gateway,
                worker_n,
                worker,
                role_types.len(),
            ]);
        }
        sheet
    }
}
