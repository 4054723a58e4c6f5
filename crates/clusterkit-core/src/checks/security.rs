//! TLS and Kerberos parameter scan over service and role-config-group
//! configurations.

use super::{CheckReport, ConfigRow};
use crate::model::cm::{ApiConfig, ApiService};
use crate::providers::cloudera::CmClient;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Tls,
    Kerberos,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanItem {
    pub target: Target,
    pub label: &'static str,
    pub parameters: &'static [&'static str],
}

/// Parameters to read for services whose name contains `service` (and none
/// of `exclude`). `groups` lists role-config-group suffixes appended to the
/// service name, each with its own items.
#[derive(Debug, Clone, Copy)]
pub struct ScanRule {
    pub service: &'static str,
    pub exclude: &'static [&'static str],
    pub service_items: &'static [ScanItem],
    pub groups: &'static [(&'static str, &'static [ScanItem])],
}

impl ScanRule {
    pub fn matches(&self, service_name: &str) -> bool {
        let name = service_name.to_lowercase();
        name.contains(self.service) && !self.exclude.iter().any(|e| name.contains(e))
    }
}

const fn tls(label: &'static str, parameters: &'static [&'static str]) -> ScanItem {
    ScanItem {
        target: Target::Tls,
        label,
        parameters,
    }
}

const fn kerb(label: &'static str, parameters: &'static [&'static str]) -> ScanItem {
    ScanItem {
        target: Target::Kerberos,
        label,
        parameters,
    }
}

const SSL_ENABLE: &[&str] = &["ssl_enable", "ssl_enabled"];

pub const SCAN_RULES: &[ScanRule] = &[
    ScanRule {
        service: "atlas",
        exclude: &[],
        service_items: &[kerb("Atlas", &["kerberos.auth.enable"])],
        groups: &[("-ATLAS_SERVER-BASE", &[tls("Atlas", SSL_ENABLE)])],
    },
    ScanRule {
        service: "hbase",
        exclude: &[],
        service_items: &[kerb(
            "HBase",
            &["hbase_security_authentication", "hbase_restserver_security_authentication"],
        )],
        groups: &[
            (
                "-HBASERESTSERVER-BASE",
                &[tls(
                    "HBase Rest Server",
                    &["hbase_restserver_ssl_enable", "hbase_restserver_ssl_enabled"],
                )],
            ),
            (
                "-HBASETHRIFTSERVER-BASE",
                &[tls(
                    "HBase Thrift Server",
                    &["hbase_thriftserver_http_use_ssl", "hbase_thriftserver_https_use_ssl"],
                )],
            ),
        ],
    },
    ScanRule {
        service: "hdfs",
        exclude: &[],
        service_items: &[
            tls("HDFS", &["hdfs_hadoop_ssl_enabled", "hdfs_hadoop_ssl_enable"]),
            kerb("HDFS", &["hadoop_security_authentication", "hadoop_secure_web_ui"]),
        ],
        groups: &[],
    },
    ScanRule {
        service: "hive",
        exclude: &["hive_on_tez"],
        service_items: &[
            tls("Hive Metastore Server", &["ssl_enabled_database", "ssl_enable_database"]),
            tls("Hive Server 2", &["hiveserver2_enable_ssl", "hiveserver2_enabled_ssl"]),
        ],
        groups: &[],
    },
    ScanRule {
        service: "hue",
        exclude: &[],
        service_items: &[],
        groups: &[("-HUE_SERVER-BASE", &[tls("Hue", SSL_ENABLE)])],
    },
    ScanRule {
        service: "impala",
        exclude: &[],
        service_items: &[tls(
            "Impala",
            &["client_services_ssl_enabled", "client_services_ssl_enable"],
        )],
        groups: &[],
    },
    ScanRule {
        service: "kafka",
        exclude: &[],
        service_items: &[kerb("Kafka", &["kerberos.auth.enable"])],
        groups: &[
            ("-KAFKA_BROKER-BASE", &[tls("Kafka Broker", SSL_ENABLE)]),
            ("-KAFKA_CONNECT-BASE", &[tls("Kafka Connect", SSL_ENABLE)]),
            ("-KAFKA_MIRROR_MAKER-BASE", &[tls("Kafka Mirror Maker", SSL_ENABLE)]),
        ],
    },
    ScanRule {
        service: "ranger",
        exclude: &["ranger_rms"],
        service_items: &[],
        groups: &[
            ("-RANGER_ADMIN-BASE", &[tls("Ranger Admin", SSL_ENABLE)]),
            ("-RANGER_TAGSYNC-BASE", &[tls("Ranger Tagsync", SSL_ENABLE)]),
        ],
    },
    ScanRule {
        service: "ranger_rms",
        exclude: &[],
        service_items: &[kerb("Ranger RMS", &["ranger_rms_authentication"])],
        groups: &[("-RANGER_RMS_SERVER-BASE", &[tls("Ranger RMS", SSL_ENABLE)])],
    },
    ScanRule {
        service: "solr",
        exclude: &["solr_user"],
        service_items: &[
            tls("Solr", &["solr_use_ssl"]),
            kerb("Solr", &["solr_security_authentication"]),
        ],
        groups: &[],
    },
    ScanRule {
        service: "zookeeper",
        exclude: &[],
        service_items: &[
            tls("ZooKeeper", &["zookeeper_tls_enabled", "ssl_enabled"]),
            kerb("ZooKeeper", &["enableSecurity", "quorum_auth_enable_sasl"]),
        ],
        groups: &[],
    },
    ScanRule {
        service: "ozone",
        exclude: &[],
        service_items: &[kerb(
            "Ozone",
            &["ozone.security.enabled", "ozone.security.http.kerberos.enabled"],
        )],
        groups: &[
            ("-OZONE_DATANODE-BASE", &[tls("Ozone Datanode", &["ssl_enabled", "ssl_enable"])]),
            ("-OZONE_MANAGER-BASE", &[tls("Ozone Manager", &["ssl_enabled", "ssl_enable"])]),
            ("-OZONE_RECON-BASE", &[tls("Ozone Recon", &["ssl_enabled", "ssl_enable"])]),
            ("-S3_GATEWAY-BASE", &[tls("Ozone Gateway", &["ssl_enabled", "ssl_enable"])]),
            (
                "-STORAGE_CONTAINER_MANAGER-BASE",
                &[tls("Ozone Storage Container Manager", &["ssl_enabled", "ssl_enable"])],
            ),
        ],
    },
];

/// Append the rows for every configured parameter of `items` to `report`.
pub fn collect_rows(items: &[ScanItem], configs: &[ApiConfig], report: &mut CheckReport) {
    for item in items {
        for config in configs {
            if !item.parameters.contains(&config.name.as_str()) {
                continue;
            }
            let row = ConfigRow {
                service: item.label.to_string(),
                parameter: config.name.clone(),
                value: config.effective_value().unwrap_or("-").to_string(),
            };
            match item.target {
                Target::Tls => report.tls.push(row),
                Target::Kerberos => report.kerberos.push(row),
            }
        }
    }
}

/// Scan the services of one cluster. Unreadable configs are logged and
/// skipped.
pub async fn scan_cluster(cm: &CmClient, cluster: &str, services: &[ApiService]) -> CheckReport {
    let mut report = CheckReport::new();
    for service in services {
        for rule in SCAN_RULES.iter().filter(|r| r.matches(&service.name)) {
            debug!(cluster, service = %service.name, rule = rule.service, "security scan");
            if !rule.service_items.is_empty() {
                match cm.read_service_config(cluster, &service.name, "full").await {
                    Ok(configs) => collect_rows(rule.service_items, &configs, &mut report),
                    Err(e) => warn!(cluster, service = %service.name, error = %e, "failed to read service config"),
                }
            }
            for (suffix, items) in rule.groups {
                let group = format!("{}{}", service.name, suffix);
                match cm
                    .read_role_config_group_config(cluster, &service.name, &group, "full")
                    .await
                {
                    Ok(configs) => collect_rows(items, &configs, &mut report),
                    Err(e) => warn!(cluster, group = %group, error = %e, "failed to read role config group"),
                }
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(service: &str) -> &'static ScanRule {
        SCAN_RULES.iter().find(|r| r.service == service).unwrap()
    }

    #[test]
    fn test_rule_exclusions() {
        assert!(rule("hive").matches("hive"));
        assert!(!rule("hive").matches("hive_on_tez"));
        assert!(rule("ranger").matches("ranger"));
        assert!(!rule("ranger").matches("ranger_rms"));
        assert!(rule("ranger_rms").matches("ranger_rms"));
        assert!(!rule("solr").matches("solr_user"));
    }

    #[test]
    fn test_collect_rows_routes_by_target() {
        let configs = vec![
            ApiConfig {
                name: "hdfs_hadoop_ssl_enabled".to_string(),
                value: None,
                default: Some("false".to_string()),
                sensitive: None,
            },
            ApiConfig::new("hadoop_security_authentication", "kerberos"),
            ApiConfig::new("dfs_replication", "3"),
        ];
        let mut report = CheckReport::new();
        collect_rows(rule("hdfs").service_items, &configs, &mut report);
        assert_eq!(report.tls.len(), 1);
        assert_eq!(report.tls[0].value, "false");
        assert_eq!(report.kerberos.len(), 1);
        assert_eq!(report.kerberos[0].service, "HDFS");
        assert_eq!(report.kerberos[0].value, "kerberos");
    }

    #[test]
    fn test_atlas_items() {
        let atlas = rule("atlas");
        assert_eq!(atlas.service_items[0].target, Target::Kerberos);
        assert_eq!(atlas.groups[0].0, "-ATLAS_SERVER-BASE");
        assert_eq!(atlas.groups[0].1[0].target, Target::Tls);
    }
}
