//! Post-upgrade smoke test: client commands per healthy service, run on this
//! host, and a reachability check of each service web UI.

use crate::model::cm::{ApiHost, ApiService};
use crate::providers::build_http_client;
use crate::providers::cloudera::CmClient;
use crate::remote::{run_blocking, RemoteShell};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const AUTO_TLS_CA_CERT: &str = "/var/lib/cloudera-scm-agent/agent-cert/cm-auto-global_cacerts.pem";
pub const YARN_EXAMPLES_JAR: &str = "/opt/cloudera/parcels/CDH/jars/hadoop-mapreduce-examples*.jar";
pub const SPARK_EXAMPLES_JAR: &str = "/opt/cloudera/parcels/CDH-*/jars/spark-examples_*.jar";
const UI_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    Pass,
    Fail,
    Skipped,
}

impl TestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Pass => "Pass",
            TestStatus::Fail => "Fail",
            TestStatus::Skipped => "Skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub service: String,
    pub test: String,
    pub status: TestStatus,
    pub detail: Option<String>,
}

impl TestResult {
    fn new(service: &str, test: &str, status: TestStatus, detail: Option<String>) -> Self {
        Self {
            service: service.to_string(),
            test: test.to_string(),
            status,
            detail,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SmokeReport {
    pub cluster: String,
    pub commands: Vec<TestResult>,
    pub ui: Vec<TestResult>,
}

impl SmokeReport {
    pub fn failed_count(&self) -> usize {
        self.commands
            .iter()
            .chain(&self.ui)
            .filter(|r| r.status == TestStatus::Fail)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandTest {
    pub name: &'static str,
    pub command: String,
}

#[derive(Debug, Clone, Default)]
pub struct SmokeOptions {
    pub ca_cert: Option<String>,
}

fn beeline(sql: &str) -> String {
    format!("beeline -e '{}'", sql)
}

fn impala_shell(impalad: &str, ca_cert: &str, sql: &str) -> String {
    format!("impala-shell -i {} -k --ssl --ca_cert={} -q '{}'", impalad, ca_cert, sql)
}

/// Client commands exercising a service type, in execution order.
pub fn command_tests(service_type: &str, impalad: Option<&str>, ca_cert: &str) -> Vec<CommandTest> {
    let test = |name, command: String| CommandTest { name, command };
    match service_type {
        "HDFS" => vec![
            test("hdfs_create", "hdfs dfs -mkdir /tmp/smoke_test".to_string()),
            test("hdfs_write", "hdfs dfs -touchz /tmp/smoke_test/test.txt".to_string()),
            test("hdfs_delete", "hdfs dfs -rm -r /tmp/smoke_test/".to_string()),
        ],
        "HIVE" => vec![
            test("hive_show", beeline("show tables;")),
            test("hive_create_db", beeline("create database if not exists sanity_test;")),
            test("hive_use", beeline("use sanity_test;")),
            test(
                "hive_internal_table_creation",
                beeline("create table if not exists sanity_test.insertion (num int, name STRING, state STRING);"),
            ),
            test(
                "hive_external_table_creation",
                beeline("create external table if not exists sanity_test.tester (num int, name STRING) partitioned by (state STRING) stored as parquet;"),
            ),
            test(
                "hive_insert_values",
                beeline("insert into table sanity_test.insertion (num, name, state) values (1, \"abc\", \"NY\"), (2, \"def\", \"CA\");"),
            ),
            test(
                "hive_insert_partition",
                beeline("insert into table sanity_test.tester partition(state=\"NY\") select num, name from sanity_test.insertion where state=\"NY\";"),
            ),
            test("hive_select", beeline("select * from sanity_test.tester;")),
            test("hive_drop_internal", beeline("drop table sanity_test.insertion;")),
            test("hive_drop_external", beeline("drop table sanity_test.tester;")),
        ],
        "YARN" => vec![test("yarn_job", format!("hadoop jar {} pi 16 100", YARN_EXAMPLES_JAR))],
        "SPARK_ON_YARN" => vec![test(
            "spark_submit",
            format!(
                "spark-submit --class org.apache.spark.examples.SparkPi --master yarn --deploy-mode client \
                 --num-executors 1 --driver-memory 512m --executor-memory 512m --executor-cores 1 {}",
                SPARK_EXAMPLES_JAR
            ),
        )],
        "HBASE" => vec![test("hbase_list", "echo \"list\" | hbase shell -n".to_string())],
        "IMPALA" => {
            let Some(impalad) = impalad else {
                return Vec::new();
            };
            let sql = |s| impala_shell(impalad, ca_cert, s);
            vec![
                test("impala_drop", sql("drop database if exists sanity;")),
                test("impala_show_db", sql("show databases;")),
                test("impala_create_db", sql("create database if not exists sanity_test;")),
                test(
                    "impala_create_external",
                    sql("create external table if not exists sanity_test.tester (num int, name varchar(5)) partitioned by (state varchar(2)) stored as parquet;"),
                ),
                test(
                    "impala_create_internal",
                    sql("create table if not exists sanity_test.tester_dummy (num int, name varchar(5), state varchar(2));"),
                ),
                test(
                    "impala_insert",
                    sql("insert into table sanity_test.tester_dummy values (10, CAST(\"rty\" as VARCHAR(5)),CAST(\"CA\" as varchar(2))), (15, CAST(\"asd\" as varchar(5)),CAST(\"NY\" as varchar(2)));"),
                ),
                test("impala_select", sql("select * from sanity_test.tester_dummy;")),
                test("impala_drop_external", sql("drop table sanity_test.tester;")),
                test("impala_drop_internal", sql("drop table sanity_test.tester_dummy;")),
            ]
        }
        _ => Vec::new(),
    }
}

/// A service web UI, served by the host of the first role of `role_type`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UiEndpoint {
    pub service_type: &'static str,
    pub role_type: &'static str,
    pub scheme: &'static str,
    pub port: u16,
    pub path: &'static str,
}

impl UiEndpoint {
    pub fn url(&self, host: &str) -> String {
        format!("{}://{}:{}{}", self.scheme, host, self.port, self.path)
    }
}

const fn ui(
    service_type: &'static str,
    role_type: &'static str,
    scheme: &'static str,
    port: u16,
    path: &'static str,
) -> UiEndpoint {
    UiEndpoint {
        service_type,
        role_type,
        scheme,
        port,
        path,
    }
}

pub const UI_ENDPOINTS: &[UiEndpoint] = &[
    ui("ATLAS", "ATLAS_SERVER", "https", 31443, ""),
    ui("IMPALA", "STATESTORE", "https", 25010, ""),
    ui("IMPALA", "CATALOGSERVER", "https", 25020, ""),
    ui("FLINK", "FLINK_HISTORY_SERVER", "https", 18211, ""),
    ui("LIVY", "LIVY_SERVER", "https", 8998, ""),
    ui("OOZIE", "OOZIE_SERVER", "https", 11443, "/oozie"),
    ui("HBASE", "MASTER", "https", 22002, "/master-status"),
    ui("HDFS", "NAMENODE", "https", 20102, "/dfshealth.html#tab-overview"),
    ui("SPARK_ON_YARN", "SPARK_YARN_HISTORY_SERVER", "http", 18089, ""),
    ui("SPARK_ON_YARN", "SPARK_YARN_HISTORY_SERVER", "http", 18088, ""),
    ui("SPARK_ON_YARN", "SPARK_YARN_HISTORY_SERVER", "https", 18089, ""),
    ui("SPARK_ON_YARN", "SPARK_YARN_HISTORY_SERVER", "https", 18088, ""),
    ui("YARN", "JOBHISTORY", "https", 19890, ""),
    ui("YARN", "RESOURCEMANAGER", "https", 8090, ""),
    ui("SCHEMAREGISTRY", "SCHEMA_REGISTRY_SERVER", "https", 7790, ""),
    ui("SQL_STREAM_BUILDER", "STREAMING_SQL_CONSOLE", "http", 18111, ""),
    ui("KUDU", "KUDU_MASTER", "https", 8051, ""),
    ui("STREAMS_MESSAGING_MANAGER", "STREAMS_MESSAGING_MANAGER_SERVER", "http", 9991, ""),
    ui("STREAMS_REPLICATION_MANAGER", "STREAMS_REPLICATION_MANAGER_SERVICE", "http", 7790, ""),
    ui("HUE", "HUE_SERVER", "https", 8888, ""),
    ui("SOLR", "SOLR_SERVER", "https", 8995, ""),
    ui("RANGER", "RANGER_ADMIN", "https", 6182, ""),
    ui("KNOX", "KNOX_GATEWAY", "https", 8443, "/gateway/knoxsso/knoxauth/login.html"),
];

/// A UI answering 401 is up but wants SPNEGO or a login.
pub fn ui_status_passes(status: u16) -> bool {
    status == 200 || status == 401
}

/// What the tests need from CM: the first base cluster, its services and
/// the host of each `(service type, role type)`.
#[derive(Debug, Clone, Default)]
pub struct SmokeFacts {
    pub cluster: String,
    pub services: Vec<ApiService>,
    pub role_hosts: BTreeMap<(String, String), String>,
}

impl SmokeFacts {
    pub async fn gather(cm: &CmClient) -> Result<Self> {
        let clusters = cm.read_clusters("summary").await.context("Failed to read clusters")?;
        let cluster = clusters
            .into_iter()
            .find(|c| c.cluster_type.as_deref().map_or(true, |t| t == "BASE_CLUSTER"))
            .context("Cloudera Manager manages no base cluster")?;
        let services = cm
            .read_services(&cluster.name, "summary")
            .await
            .with_context(|| format!("Failed to read services of '{}'", cluster.name))?;
        let hosts = cm.read_hosts("summary").await.context("Failed to read hosts")?;

        let mut services_with_roles = Vec::with_capacity(services.len());
        for mut service in services {
            match cm.read_roles(&cluster.name, &service.name).await {
                Ok(roles) => service.roles = roles,
                Err(e) => warn!(service = %service.name, error = %e, "failed to read roles"),
            }
            services_with_roles.push(service);
        }
        let role_hosts = role_hosts(&services_with_roles, &hosts);
        Ok(Self {
            cluster: cluster.label().to_string(),
            services: services_with_roles,
            role_hosts,
        })
    }

    pub fn role_host(&self, service_type: &str, role_type: &str) -> Option<&str> {
        self.role_hosts
            .get(&(service_type.to_string(), role_type.to_string()))
            .map(String::as_str)
    }
}

/// Hostname of the first role of each `(service type, role type)`.
pub fn role_hosts(services: &[ApiService], hosts: &[ApiHost]) -> BTreeMap<(String, String), String> {
    let mut found = BTreeMap::new();
    for service in services {
        for role in &service.roles {
            let key = (service.service_type.clone(), role.role_type.clone());
            if found.contains_key(&key) {
                continue;
            }
            let hostname = hosts
                .iter()
                .find(|h| h.host_id == role.host_ref.host_id)
                .map(|h| h.hostname.clone())
                .or_else(|| role.host_ref.hostname.clone());
            if let Some(hostname) = hostname {
                found.insert(key, hostname);
            }
        }
    }
    found
}

/// `klist -s` exits 0 only with a valid ticket cache.
pub fn has_kerberos_ticket(shell: &dyn RemoteShell) -> bool {
    match shell.run("localhost", "klist -s") {
        Ok(output) => output.success(),
        Err(e) => {
            warn!(error = %e, "failed to run klist");
            false
        }
    }
}

fn unhealthy(service: &ApiService) -> Option<TestResult> {
    (!service.is_healthy()).then(|| {
        TestResult::new(
            &service.service_type,
            "health",
            TestStatus::Skipped,
            Some(format!(
                "{} is {}, tests not performed",
                service.name,
                service.health_summary.as_deref().unwrap_or("UNKNOWN")
            )),
        )
    })
}

pub fn run_command_tests(facts: &SmokeFacts, shell: &dyn RemoteShell, options: &SmokeOptions) -> Vec<TestResult> {
    let ca_cert = options.ca_cert.as_deref().unwrap_or(AUTO_TLS_CA_CERT);
    let impalad = facts.role_host("IMPALA", "IMPALAD");
    let mut results = Vec::new();
    for service in &facts.services {
        let tests = command_tests(&service.service_type, impalad, ca_cert);
        if tests.is_empty() {
            continue;
        }
        if let Some(skipped) = unhealthy(service) {
            results.push(skipped);
            continue;
        }
        info!(service = %service.name, tests = tests.len(), "performing command tests");
        for test in tests {
            debug!(command = %test.command);
            let (status, detail) = match shell.run("localhost", &test.command) {
                Ok(output) if output.success() => (TestStatus::Pass, None),
                Ok(output) => (
                    TestStatus::Fail,
                    Some(output.combined().lines().last().unwrap_or_default().to_string()),
                ),
                Err(e) => (TestStatus::Fail, Some(e.to_string())),
            };
            results.push(TestResult::new(&service.service_type, test.name, status, detail));
        }
    }
    results
}

/// The UI endpoints to check, as `(service type, role type, url)`, plus
/// skip/fail rows for unhealthy services and unresolved roles.
pub fn ui_targets(facts: &SmokeFacts) -> (Vec<(&'static str, &'static str, String)>, Vec<TestResult>) {
    let mut targets = Vec::new();
    let mut results = Vec::new();
    for service in &facts.services {
        let endpoints: Vec<&UiEndpoint> = UI_ENDPOINTS
            .iter()
            .filter(|e| e.service_type == service.service_type)
            .collect();
        if endpoints.is_empty() {
            continue;
        }
        if let Some(skipped) = unhealthy(service) {
            results.push(skipped);
            continue;
        }
        for endpoint in endpoints {
            match facts.role_host(endpoint.service_type, endpoint.role_type) {
                Some(host) => targets.push((endpoint.service_type, endpoint.role_type, endpoint.url(host))),
                None => results.push(TestResult::new(
                    endpoint.service_type,
                    &ui_test_name(endpoint.role_type),
                    TestStatus::Fail,
                    Some(format!("no {} role found", endpoint.role_type)),
                )),
            }
        }
    }
    (targets, results)
}

fn ui_test_name(role_type: &str) -> String {
    format!("{}_ui_accessible", role_type.to_lowercase())
}

pub async fn run_ui_tests(facts: &SmokeFacts) -> Result<Vec<TestResult>> {
    let http = build_http_client(false, None, UI_TIMEOUT_SECS)?;
    let (targets, mut results) = ui_targets(facts);
    for (service_type, role_type, url) in targets {
        let (status, detail) = match http.get(&url).send().await {
            Ok(response) if ui_status_passes(response.status().as_u16()) => (TestStatus::Pass, Some(url)),
            Ok(response) => (
                TestStatus::Fail,
                Some(format!("{} returned {}", url, response.status())),
            ),
            Err(e) => {
                debug!(url = %url, error = %e, "UI not accessible");
                (TestStatus::Fail, Some(format!("{} not accessible", url)))
            }
        };
        results.push(TestResult::new(service_type, &ui_test_name(role_type), status, detail));
    }
    Ok(results)
}

pub async fn run(cm: &CmClient, shell: Arc<dyn RemoteShell>, options: &SmokeOptions) -> Result<SmokeReport> {
    let ticket_shell = shell.clone();
    if !run_blocking(move || has_kerberos_ticket(ticket_shell.as_ref())).await? {
        anyhow::bail!("No valid Kerberos ticket present. Run kinit and try again");
    }
    let facts = Arc::new(SmokeFacts::gather(cm).await?);
    info!(cluster = %facts.cluster, services = facts.services.len(), "running smoke tests");
    let commands = {
        let (facts, options) = (facts.clone(), options.clone());
        run_blocking(move || run_command_tests(&facts, shell.as_ref(), &options)).await?
    };
    let ui = run_ui_tests(&facts).await?;
    Ok(SmokeReport {
        cluster: facts.cluster.clone(),
        commands,
        ui,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cm::{ApiHostRef, ApiRole};
    use crate::remote::fake::FakeShell;

    fn service(name: &str, service_type: &str, health: &str, roles: &[(&str, &str)]) -> ApiService {
        ApiService {
            name: name.to_string(),
            service_type: service_type.to_string(),
            health_summary: Some(health.to_string()),
            roles: roles
                .iter()
                .map(|(role_type, host_id)| ApiRole {
                    name: format!("{}-{}", name, role_type),
                    role_type: role_type.to_string(),
                    host_ref: ApiHostRef {
                        host_id: host_id.to_string(),
                        hostname: None,
                    },
                    health_summary: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn facts() -> SmokeFacts {
        let hosts = vec![
            ApiHost {
                host_id: "h1".to_string(),
                hostname: "master1.example.com".to_string(),
                ..Default::default()
            },
            ApiHost {
                host_id: "h2".to_string(),
                hostname: "worker1.example.com".to_string(),
                ..Default::default()
            },
        ];
        let services = vec![
            service("hdfs", "HDFS", "GOOD", &[("NAMENODE", "h1"), ("DATANODE", "h2")]),
            service("hbase", "HBASE", "BAD", &[("MASTER", "h1")]),
            service("impala", "IMPALA", "GOOD", &[("IMPALAD", "h2"), ("STATESTORE", "h1")]),
        ];
        SmokeFacts {
            cluster: "Cluster 1".to_string(),
            role_hosts: role_hosts(&services, &hosts),
            services,
        }
    }

    #[test]
    fn test_ui_status() {
        assert!(ui_status_passes(200));
        assert!(ui_status_passes(401));
        assert!(!ui_status_passes(403));
        assert!(!ui_status_passes(500));
    }

    #[test]
    fn test_role_hosts_first_match() {
        let facts = facts();
        assert_eq!(facts.role_host("IMPALA", "IMPALAD"), Some("worker1.example.com"));
        assert_eq!(facts.role_host("HDFS", "NAMENODE"), Some("master1.example.com"));
        assert_eq!(facts.role_host("HDFS", "JOURNALNODE"), None);
    }

    #[test]
    fn test_impala_commands_target_first_daemon() {
        let tests = command_tests("IMPALA", Some("worker1.example.com"), "/ca.pem");
        assert!(tests[0]
            .command
            .starts_with("impala-shell -i worker1.example.com -k --ssl --ca_cert=/ca.pem"));
        assert!(command_tests("IMPALA", None, "/ca.pem").is_empty());
        assert!(command_tests("ZOOKEEPER", None, "/ca.pem").is_empty());
    }

    #[test]
    fn test_command_tests_pass_fail_and_skip() {
        let shell = FakeShell::new()
            .respond("*", "hdfs dfs -mkdir /tmp/smoke_test", "")
            .respond("*", "hdfs dfs -touchz /tmp/smoke_test/test.txt", "");
        let results = run_command_tests(&facts(), &shell, &SmokeOptions::default());

        let hdfs: Vec<_> = results.iter().filter(|r| r.service == "HDFS").collect();
        assert_eq!(hdfs.len(), 3);
        assert_eq!(hdfs[0].status, TestStatus::Pass);
        assert_eq!(hdfs[2].status, TestStatus::Fail);

        let hbase: Vec<_> = results.iter().filter(|r| r.service == "HBASE").collect();
        assert_eq!(hbase.len(), 1);
        assert_eq!(hbase[0].status, TestStatus::Skipped);

        assert!(results
            .iter()
            .filter(|r| r.service == "IMPALA")
            .all(|r| r.status == TestStatus::Fail));
    }

    #[test]
    fn test_ui_targets() {
        let (targets, results) = ui_targets(&facts());
        assert!(targets.contains(&(
            "HDFS",
            "NAMENODE",
            "https://master1.example.com:20102/dfshealth.html#tab-overview".to_string()
        )));
        assert!(targets.contains(&("IMPALA", "STATESTORE", "https://master1.example.com:25010".to_string())));
        let catalog = results.iter().find(|r| r.test == "catalogserver_ui_accessible").unwrap();
        assert_eq!(catalog.status, TestStatus::Fail);
        assert!(results
            .iter()
            .any(|r| r.service == "HBASE" && r.status == TestStatus::Skipped));
    }

    #[test]
    fn test_kerberos_ticket() {
        let shell = FakeShell::new().respond("localhost", "klist -s", "");
        assert!(has_kerberos_ticket(&shell));
        assert!(!has_kerberos_ticket(&FakeShell::new()));
    }
}
