//! Base-cluster checks against Cloudera Manager and the cluster hosts.

use super::versions::{
    db_host_from_properties, df_available_gb, is_mariadb, is_supported, java_version,
    mysql_version, os_release, postgres_major,
};
use super::{security, CheckReport};
use crate::config::CheckSettings;
use crate::model::cm::{ApiHost, ApiService};
use crate::providers::cloudera::CmClient;
use crate::remote::{resolve_host, run_blocking, ssh_failure, RemoteShell};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub const DB_PROPERTIES: &str = "/etc/cloudera-scm-server/db.properties";

/// What the checks need to know about the CM deployment.
#[derive(Debug, Clone, Default)]
pub struct CmFacts {
    pub cm_host: String,
    pub hosts: Vec<ApiHost>,
    pub clusters: Vec<ClusterFacts>,
    /// `POSTGRESQL`, `MYSQL`, `ORACLE`, ...
    pub db_type: Option<String>,
    pub kerberized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterFacts {
    pub name: String,
    pub label: String,
    pub tls_enabled: bool,
    pub services: Vec<ApiService>,
}

impl CmFacts {
    pub async fn gather(cm: &CmClient) -> Result<Self> {
        let cm_host = cm
            .server_url()
            .host_str()
            .context("Cloudera Manager URL has no host")?
            .to_string();
        let hosts = cm.read_hosts("full").await.context("Failed to read hosts")?;
        let db_type = cm
            .scm_db_info()
            .await
            .context("Failed to read CM database info")?
            .scm_db_type;
        let kerberized = cm
            .kerberos_info()
            .await
            .context("Failed to read Kerberos info")?
            .kerberized
            .unwrap_or(false);

        let mut clusters = Vec::new();
        for cluster in cm.read_clusters("summary").await.context("Failed to read clusters")? {
            let tls_enabled = match cm.is_tls_enabled(&cluster.name).await {
                Ok(enabled) => enabled,
                Err(e) => {
                    warn!(cluster = %cluster.name, error = %e, "failed to read TLS status");
                    false
                }
            };
            let services = cm
                .read_services(&cluster.name, "summary")
                .await
                .with_context(|| format!("Failed to read services of '{}'", cluster.name))?;
            clusters.push(ClusterFacts {
                label: cluster.label().to_string(),
                name: cluster.name,
                tls_enabled,
                services,
            });
        }

        Ok(Self {
            cm_host,
            hosts,
            clusters,
            db_type,
            kerberized,
        })
    }

    /// Hosts running a Hue server, load balancer or ticket renewer.
    pub fn hue_hosts(&self) -> Vec<&ApiHost> {
        self.hosts
            .iter()
            .filter(|h| {
                h.role_refs.iter().any(|r| {
                    let name = r.role_name.to_lowercase();
                    name.contains("hue")
                        && ["LOAD_BALANCER", "SERVER", "KT"]
                            .iter()
                            .any(|t| r.role_name.contains(t))
                })
            })
            .collect()
    }
}

fn run_on(shell: &dyn RemoteShell, host: &str, command: &str) -> String {
    match shell.run(host, command) {
        Ok(output) => output.combined(),
        Err(e) => {
            warn!(host, command, error = %e, "remote command failed");
            String::new()
        }
    }
}

/// Abort when any host cannot be reached over SSH non-interactively.
pub fn check_ssh(facts: &CmFacts, shell: &dyn RemoteShell) -> Result<()> {
    for host in &facts.hosts {
        let output = shell.run(&host.hostname, "sudo tail -1 /var/log/messages")?;
        if let Some(err) = ssh_failure(&output) {
            anyhow::bail!(
                "SSH to '{}' failed ({}). Passwordless SSH with sudo is required on every host",
                host.hostname,
                err
            );
        }
    }
    Ok(())
}

pub fn check_os(facts: &CmFacts, shell: &dyn RemoteShell, settings: &CheckSettings, report: &mut CheckReport) {
    let mut ok = true;
    for host in &facts.hosts {
        let release = os_release(&run_on(shell, &host.hostname, "cat /etc/redhat-release"));
        match release {
            Some(r) if is_supported(&r, &settings.os_releases) => {}
            Some(r) => {
                ok = false;
                report.add_error(&host.hostname, format!("Unsupported OS version: {}", r));
            }
            None => {
                ok = false;
                report.add_error(&host.hostname, "Could not determine the OS version");
            }
        }
    }
    report.add_verdict("All base cluster nodes are running the supported version of Linux", ok);
}

pub fn check_database(
    facts: &CmFacts,
    shell: &dyn RemoteShell,
    settings: &CheckSettings,
    report: &mut CheckReport,
) {
    let props = run_on(shell, &facts.cm_host, &format!("sudo cat {}", DB_PROPERTIES));
    let Some(db_host) = db_host_from_properties(&props) else {
        report.add_error(&facts.cm_host, format!("No database host found in {}", DB_PROPERTIES));
        report.add_summary("Is the version of the CM database supported?", "Unknown");
        return;
    };
    info!(db_host = %db_host, db_type = ?facts.db_type, "checking CM database");

    match facts.db_type.as_deref().map(str::to_uppercase).as_deref() {
        Some("POSTGRESQL") => {
            let output = run_on(shell, &db_host, "postgres --version");
            let ok = match postgres_major(&output) {
                Some(v) if is_supported(&v, &settings.postgres_versions) => true,
                Some(v) => {
                    report.add_error(&db_host, format!("Unsupported PostgreSQL version: {}", v));
                    false
                }
                None => {
                    report.add_error(&db_host, format!("Could not read PostgreSQL version: {}", output));
                    false
                }
            };
            report.add_verdict("Is the version of postgres running supported?", ok);
        }
        Some("MYSQL") => {
            let output = run_on(shell, &db_host, "mysql -V");
            let (name, supported) = if is_mariadb(&output) {
                ("MariaDB", &settings.mariadb_versions)
            } else {
                ("MySQL", &settings.mysql_versions)
            };
            let ok = match mysql_version(&output) {
                Some(v) if is_supported(&v, supported) => true,
                Some(v) => {
                    report.add_error(&db_host, format!("Unsupported {} version: {}", name, v));
                    false
                }
                None => {
                    report.add_error(&db_host, format!("Could not read {} version: {}", name, output));
                    false
                }
            };
            report.add_verdict(format!("The version of {} installed is supported", name), ok);
        }
        other => {
            let name = other.unwrap_or("UNKNOWN");
            report.add_error(&db_host, format!("Database type {} is not checked", name));
            report.add_verdict(format!("The version of {} installed is supported", name), false);
        }
    }
}

pub fn check_security_flags(facts: &CmFacts, report: &mut CheckReport) {
    for cluster in &facts.clusters {
        report.add_verdict(format!("{} is TLS Secured", cluster.label), cluster.tls_enabled);
        report.add_verdict(format!("{} has Kerberos enabled", cluster.label), facts.kerberized);
    }
}

/// "Yes" only when every cluster runs every required service type.
pub fn check_required_services(facts: &CmFacts, settings: &CheckSettings, report: &mut CheckReport) {
    let mut ok = !facts.clusters.is_empty();
    for cluster in &facts.clusters {
        let missing: Vec<&str> = settings
            .required_services
            .iter()
            .filter(|req| !cluster.services.iter().any(|s| &s.service_type == *req))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            ok = false;
            report.add_error(
                &cluster.label,
                format!("Missing required services: {}", missing.join(", ")),
            );
        }
    }
    report.add_verdict(
        format!(
            "All clusters have the required services ({})",
            settings.required_services.join(", ")
        ),
        ok,
    );
}

pub fn check_hue_python(facts: &CmFacts, shell: &dyn RemoteShell, settings: &CheckSettings, report: &mut CheckReport) {
    let mut ok = true;
    for host in facts.hue_hosts() {
        let version = run_on(shell, &host.hostname, "python -V");
        if !is_supported(version.trim(), &settings.hue_python_versions) {
            ok = false;
            report.add_error(&host.hostname, format!("Unsupported Python for Hue: {}", version.trim()));
        }
    }
    report.add_verdict("All Hue hosts are running the supported version of Python", ok);
}

pub fn check_parcel_space(facts: &CmFacts, shell: &dyn RemoteShell, settings: &CheckSettings, report: &mut CheckReport) {
    let mut ok = true;
    let command = format!("df -BG {}", settings.parcel_dir);
    for host in &facts.hosts {
        let output = run_on(shell, &host.hostname, &command);
        match df_available_gb(&output) {
            Some(gb) if gb >= settings.parcel_min_free_gb => {}
            Some(gb) => {
                ok = false;
                report.add_error(
                    &host.hostname,
                    format!("Only {}GB free in {}", gb, settings.parcel_dir),
                );
            }
            None => {
                ok = false;
                report.add_error(&host.hostname, format!("Could not read free space of {}", settings.parcel_dir));
            }
        }
    }
    report.add_verdict(
        format!(
            "All base cluster nodes have enough space to accommodate the CDP Parcel ({}GB)",
            settings.parcel_min_free_gb
        ),
        ok,
    );
}

pub fn check_java(facts: &CmFacts, shell: &dyn RemoteShell, settings: &CheckSettings, report: &mut CheckReport) {
    let mut ok = true;
    for host in &facts.hosts {
        let output = run_on(shell, &host.hostname, "java -version");
        match java_version(&output) {
            Some(v) if is_supported(&v, &settings.java_versions) => {}
            Some(v) => {
                ok = false;
                report.add_error(&host.hostname, format!("Unsupported Java version: {}", v));
            }
            None => {
                ok = false;
                report.add_error(&host.hostname, format!("Could not read Java version: {}", output));
            }
        }
    }
    report.add_verdict("All base cluster nodes are running the supported version of Java", ok);
}

/// Host-side checks over already gathered facts, in report order, except
/// the security scan which needs the API.
pub fn run_host_checks(
    facts: &CmFacts,
    shell: &dyn RemoteShell,
    settings: &CheckSettings,
) -> Result<CheckReport> {
    resolve_host(&facts.cm_host)?;
    check_ssh(facts, shell)?;

    let mut report = CheckReport::new();
    check_os(facts, shell, settings, &mut report);
    check_database(facts, shell, settings, &mut report);
    check_security_flags(facts, &mut report);
    check_required_services(facts, settings, &mut report);
    check_hue_python(facts, shell, settings, &mut report);
    Ok(report)
}

/// The full base-cluster check run. The ssh round-trips run on the blocking
/// pool.
pub async fn run(cm: &CmClient, shell: Arc<dyn RemoteShell>, settings: &CheckSettings) -> Result<CheckReport> {
    let facts = Arc::new(CmFacts::gather(cm).await?);
    info!(
        hosts = facts.hosts.len(),
        clusters = facts.clusters.len(),
        "running base cluster checks"
    );
    let mut report = {
        let (facts, shell, settings) = (facts.clone(), shell.clone(), settings.clone());
        run_blocking(move || run_host_checks(&facts, shell.as_ref(), &settings)).await??
    };
    for cluster in &facts.clusters {
        report.merge(security::scan_cluster(cm, &cluster.name, &cluster.services).await);
    }
    let settings = settings.clone();
    let tail = run_blocking(move || {
        let mut tail = CheckReport::new();
        check_parcel_space(&facts, shell.as_ref(), &settings, &mut tail);
        check_java(&facts, shell.as_ref(), &settings, &mut tail);
        tail
    })
    .await?;
    report.merge(tail);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cm::ApiRoleRef;
    use crate::remote::fake::FakeShell;
    use crate::remote::CommandOutput;

    fn host(name: &str, roles: &[&str]) -> ApiHost {
        ApiHost {
            host_id: format!("id-{}", name),
            hostname: name.to_string(),
            role_refs: roles
                .iter()
                .map(|r| ApiRoleRef {
                    cluster_name: Some("cluster1".to_string()),
                    service_name: "svc".to_string(),
                    role_name: r.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn service(name: &str, service_type: &str) -> ApiService {
        ApiService {
            name: name.to_string(),
            service_type: service_type.to_string(),
            ..Default::default()
        }
    }

    fn facts() -> CmFacts {
        CmFacts {
            cm_host: "localhost".to_string(),
            hosts: vec![
                host("node1", &["hue-HUE_SERVER-1a2b", "hdfs-DATANODE-3c4d"]),
                host("node2", &["hdfs-DATANODE-5e6f"]),
            ],
            clusters: vec![ClusterFacts {
                name: "cluster1".to_string(),
                label: "Cluster 1".to_string(),
                tls_enabled: true,
                services: vec![service("hdfs", "HDFS"), service("yarn", "YARN")],
            }],
            db_type: Some("POSTGRESQL".to_string()),
            kerberized: false,
        }
    }

    fn healthy_shell() -> FakeShell {
        FakeShell::new()
            .respond("*", "sudo tail -1 /var/log/messages", "Oct 1 systemd: Started Session")
            .respond("node1", "cat /etc/redhat-release", "CentOS Linux release 7.9.2009 (Core)\n")
            .respond("node2", "cat /etc/redhat-release", "Ubuntu 20.04\n")
            .respond(
                "localhost",
                "sudo cat /etc/cloudera-scm-server/db.properties",
                "com.cloudera.cmf.db.type=postgresql\ncom.cloudera.cmf.db.host=db1:5432\n",
            )
            .respond("db1", "postgres --version", "postgres (PostgreSQL) 12.5")
            .respond_output(
                "node1",
                "python -V",
                CommandOutput {
                    exit_code: Some(0),
                    stdout: String::new(),
                    stderr: "Python 2.7.5\n".to_string(),
                },
            )
    }

    #[test]
    fn test_hue_hosts() {
        let f = facts();
        let hue: Vec<_> = f.hue_hosts().iter().map(|h| h.hostname.as_str()).collect();
        assert_eq!(hue, vec!["node1"]);
    }

    #[test]
    fn test_host_checks() {
        let report = run_host_checks(&facts(), &healthy_shell(), &CheckSettings::default()).unwrap();
        assert_eq!(
            report.result_of("All base cluster nodes are running the supported version of Linux"),
            Some("No")
        );
        assert!(report
            .errors
            .iter()
            .any(|e| e.host == "node2" && e.message.contains("Ubuntu")));
        assert_eq!(report.result_of("Is the version of postgres running supported?"), Some("Yes"));
        assert_eq!(report.result_of("Cluster 1 is TLS Secured"), Some("Yes"));
        assert_eq!(report.result_of("Cluster 1 has Kerberos enabled"), Some("No"));
        assert_eq!(
            report.result_of("All Hue hosts are running the supported version of Python"),
            Some("Yes")
        );
    }

    #[test]
    fn test_required_services_verdict() {
        let mut report = CheckReport::new();
        check_required_services(&facts(), &CheckSettings::default(), &mut report);
        assert_eq!(report.summary[0].result, "No");
        assert!(report.errors[0].message.contains("ZOOKEEPER"));
        assert!(!report.errors[0].message.contains("HDFS"));

        let mut settings = CheckSettings::default();
        settings.required_services = vec!["HDFS".to_string(), "YARN".to_string()];
        let mut report = CheckReport::new();
        check_required_services(&facts(), &settings, &mut report);
        assert_eq!(report.summary[0].result, "Yes");
    }

    #[test]
    fn test_ssh_failure_aborts() {
        let shell = FakeShell::new().respond_output(
            "*",
            "sudo tail -1 /var/log/messages",
            CommandOutput {
                exit_code: Some(255),
                stdout: String::new(),
                stderr: "ssh: Could not resolve hostname node1".to_string(),
            },
        );
        let err = check_ssh(&facts(), &shell).unwrap_err();
        assert!(err.to_string().contains("node1"));
    }

    #[test]
    fn test_parcel_space_and_java() {
        let shell = FakeShell::new()
            .respond(
                "node1",
                "df -BG /opt/cloudera/parcels",
                "Filesystem 1G-blocks Used Available Use% Mounted on\n/dev/sda1 100G 10G 90G 10% /\n",
            )
            .respond(
                "node2",
                "df -BG /opt/cloudera/parcels",
                "Filesystem 1G-blocks Used Available Use% Mounted on\n/dev/sda1 100G 95G 5G 95% /\n",
            )
            .respond("*", "java -version", "openjdk version \"1.8.0_292\"");
        let mut report = CheckReport::new();
        let settings = CheckSettings::default();
        check_parcel_space(&facts(), &shell, &settings, &mut report);
        check_java(&facts(), &shell, &settings, &mut report);
        assert_eq!(report.summary[0].result, "No");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].host, "node2");
        assert_eq!(report.summary[1].result, "Yes");
    }

    #[test]
    fn test_unknown_database_type() {
        let mut f = facts();
        f.db_type = Some("ORACLE".to_string());
        let mut report = CheckReport::new();
        check_database(&f, &healthy_shell(), &CheckSettings::default(), &mut report);
        assert_eq!(
            report.result_of("The version of ORACLE installed is supported"),
            Some("No")
        );
    }
}
