//! Ansible INI inventory generated from CM role assignments.

use crate::model::cm::ApiHost;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Service key -> (group name, role-name pattern), in output order.
pub const SERVICE_GROUPS: &[(&str, &[(&str, &str)])] = &[
    (
        "hdfs",
        &[
            ("namenodes", "NAMENODE"),
            ("datanodes", "DATANODE"),
            ("journalnodes", "JOURNAL"),
            ("nfs_gateway", "NFSGATEWAY"),
            ("hdfs_gateways", "-GATEWAY"),
            ("failover_controllers", "FAIL"),
            ("httpfs", "HTTPFS"),
            ("balancer", "BALANCER"),
        ],
    ),
    (
        "hive",
        &[
            ("hive_metastore_server", "METASTORE"),
            ("hiveserver2", "SERVER2"),
            ("webhcat_server", "WEBHCAT"),
            ("hive_gateway", "GATEWAY"),
        ],
    ),
    (
        "hue",
        &[
            ("hue_load_balancer", "LOAD_BALANCER"),
            ("hue_server", "SERVER"),
            ("kerberos_ticket_renewer", "KT"),
        ],
    ),
    (
        "impala",
        &[
            ("catalog_server", "CATALOGSERVER"),
            ("state_store", "STATESTORE"),
            ("daemons", "IMPALAD"),
        ],
    ),
    ("oozie", &[("oozie_server", "SERVER")]),
    ("sentry", &[("sentry_server", "SERVER")]),
    ("solr", &[("solr_server", "SERVER"), ("solr_gateway", "GATEWAY")]),
    ("spark", &[("spark_gateway", "-GATEWAY")]),
    (
        "yarn",
        &[
            ("job_history_server", "JOB"),
            ("resource_manager", "RESOURCE"),
            ("yarn_gateway", "yarn-GATEWAY"),
            ("node_manager", "NODE"),
        ],
    ),
    ("zookeeper", &[("zookeeper_server", "SERVER")]),
];

fn role_matches(service: &str, pattern: &str, role_name: &str) -> bool {
    if !role_name.contains(pattern) {
        return false;
    }
    if service == "yarn" {
        // spark_on_yarn roles carry "yarn" too
        role_name.contains("yarn") && !role_name.contains("spark")
    } else {
        role_name.contains(service)
    }
}

pub struct AnsibleInventory<'a> {
    pub hosts: &'a [ApiHost],
    pub cm_host: &'a str,
    /// internal cluster name -> display name; `Some` prefixes every group
    /// line with the cluster.
    pub clusters: Option<&'a BTreeMap<String, String>>,
}

impl AnsibleInventory<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (service, groups) in SERVICE_GROUPS {
            for (group, pattern) in *groups {
                let _ = writeln!(out, "\n[{}]", group);
                for host in self.hosts {
                    for role in &host.role_refs {
                        if !role_matches(service, pattern, &role.role_name) {
                            continue;
                        }
                        match self.clusters {
                            Some(names) => {
                                let internal = role.cluster_name.as_deref().unwrap_or("");
                                let display = names.get(internal).map(String::as_str).unwrap_or(internal);
                                let _ = writeln!(out, "{} - {}", display, host.hostname);
                            }
                            None => {
                                let _ = writeln!(out, "{}", host.hostname);
                            }
                        }
                    }
                }
            }
        }
        for group in ["cm_server", "ansible_host"] {
            let _ = writeln!(out, "\n[{}]\n{}", group, self.cm_host);
        }
        let _ = writeln!(out, "\n[all_hosts]");
        for host in self.hosts {
            let _ = writeln!(out, "{}", host.hostname);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cm::ApiRoleRef;

    fn host(name: &str, roles: &[&str]) -> ApiHost {
        ApiHost {
            host_id: name.to_string(),
            hostname: name.to_string(),
            role_refs: roles
                .iter()
                .map(|r| ApiRoleRef {
                    cluster_name: Some("cluster1".to_string()),
                    service_name: r.split('-').next().unwrap_or_default().to_string(),
                    role_name: r.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn section<'a>(text: &'a str, group: &str) -> Vec<&'a str> {
        let header = format!("[{}]", group);
        text.lines()
            .skip_while(|l| *l != header)
            .skip(1)
            .take_while(|l| !l.is_empty() && !l.starts_with('['))
            .collect()
    }

    #[test]
    fn test_groups() {
        let hosts = vec![
            host("master1", &["hdfs-NAMENODE-abc", "yarn-RESOURCEMANAGER-abc"]),
            host("worker1", &["hdfs-DATANODE-abc", "yarn-NODEMANAGER-abc"]),
            host("edge1", &["spark_on_yarn-GATEWAY-abc", "hdfs-GATEWAY-abc"]),
        ];
        let text = AnsibleInventory {
            hosts: &hosts,
            cm_host: "cm.example.com",
            clusters: None,
        }
        .render();

        assert_eq!(section(&text, "namenodes"), vec!["master1"]);
        assert_eq!(section(&text, "datanodes"), vec!["worker1"]);
        assert_eq!(section(&text, "hdfs_gateways"), vec!["edge1"]);
        assert_eq!(section(&text, "node_manager"), vec!["worker1"]);
        // spark gateway is not a yarn gateway
        assert!(section(&text, "yarn_gateway").is_empty());
        assert_eq!(section(&text, "spark_gateway"), vec!["edge1"]);
        assert_eq!(section(&text, "cm_server"), vec!["cm.example.com"]);
        assert_eq!(section(&text, "all_hosts"), vec!["master1", "worker1", "edge1"]);
    }

    #[test]
    fn test_cluster_prefix() {
        let hosts = vec![host("worker1", &["hdfs-DATANODE-abc"])];
        let mut names = BTreeMap::new();
        names.insert("cluster1".to_string(), "Cluster 1".to_string());
        let text = AnsibleInventory {
            hosts: &hosts,
            cm_host: "cm",
            clusters: Some(&names),
        }
        .render();
        assert_eq!(section(&text, "datanodes"), vec!["Cluster 1 - worker1"]);
    }
}
