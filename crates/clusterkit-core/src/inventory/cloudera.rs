use super::{HostDetails, WORKBOOK_NAME};
use crate::model::cm::{clean_role_name, ApiCluster, ApiHost, ApiService, ApiVersionInfo, ScmDbInfo};
use crate::providers::cloudera::CmClient;
use crate::remote::RemoteShell;
use crate::report::workbook::{Sheet, Workbook};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::info;

/// Everything the CM inventory reads from the API.
#[derive(Debug, Clone, Default)]
pub struct CmInventory {
    pub version: ApiVersionInfo,
    pub db: ScmDbInfo,
    pub clusters: Vec<(ApiCluster, Vec<ApiService>)>,
    pub hosts: Vec<ApiHost>,
}

impl CmInventory {
    pub async fn fetch(cm: &CmClient) -> Result<Self> {
        let version = cm.cm_version().await.context("Failed to read CM version")?;
        let db = cm.scm_db_info().await.context("Failed to read CM database info")?;
        let mut clusters = Vec::new();
        for cluster in cm.read_clusters("summary").await.context("Failed to read clusters")? {
            let services = cm
                .read_services(&cluster.name, "full")
                .await
                .with_context(|| format!("Failed to read services of '{}'", cluster.name))?;
            clusters.push((cluster, services));
        }
        let hosts = cm.read_hosts("full").await.context("Failed to read hosts")?;
        info!(clusters = clusters.len(), hosts = hosts.len(), "CM inventory fetched");
        Ok(Self {
            version,
            db,
            clusters,
            hosts,
        })
    }

    fn display_names(&self) -> BTreeMap<&str, &str> {
        self.clusters
            .iter()
            .map(|(c, _)| (c.name.as_str(), c.label()))
            .collect()
    }

    pub fn to_workbook(&self, shell: &dyn RemoteShell) -> Workbook {
        let mut wb = Workbook::new(WORKBOOK_NAME);
        wb.add_sheet(self.host_sheet(shell));
        wb.add_sheet(self.version_sheet());
        for (cluster, services) in &self.clusters {
            let mut sheet = Sheet::new(cluster.label(), &["Type of Service", "Service Name"]);
            for service in services {
                sheet.push(crate::row![
                    service.service_type.as_str(),
                    service.display_name.as_deref().unwrap_or(&service.name),
                ]);
            }
            wb.add_sheet(sheet);
        }
        wb
    }

    fn host_sheet(&self, shell: &dyn RemoteShell) -> Sheet {
        let names = self.display_names();
        let mut sheet = Sheet::new(
            "Host_Information",
            &[
                "Hostname",
                "Roles",
                "Number of Roles",
                "Cluster",
                "Linux Version",
                "Model Number",
                "Number of Cores",
                "Total Memory",
                "Java Version",
                "System Python Version",
            ],
        );
        for host in &self.hosts {
            let details = HostDetails::collect(shell, &host.hostname);
            let roles: Vec<String> = host
                .role_refs
                .iter()
                .map(|r| format!("\"{}\"", clean_role_name(&r.role_name)))
                .collect();
            // the last role decides, as hosts belong to one cluster
            let cluster = host
                .role_refs
                .last()
                .and_then(|r| r.cluster_name.as_deref())
                .map(|c| names.get(c).copied().unwrap_or(c))
                .unwrap_or("");
            let memory = (host.memory_gb() * 10.0).round() / 10.0;
            sheet.push(crate::row![
                host.hostname.as_str(),
                roles.join(" "),
                host.role_refs.len(),
                cluster,
                details.linux_version,
                details.model_number,
                host.num_cores.unwrap_or(0),
                memory,
                details.java_version,
                details.python_version,
            ]);
        }
        sheet
    }

    fn version_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new("Cloudera_Version_Information", &["Item", "Value"]);
        let version = match (&self.version.version, &self.version.build_timestamp) {
            (Some(v), Some(ts)) => format!("{} ({})", v, ts),
            (Some(v), None) => v.clone(),
            _ => String::new(),
        };
        sheet.push(crate::row!["CM Version & Build", version]);
        sheet.push(crate::row!["scmDbType", self.db.scm_db_type.as_deref().unwrap_or("")]);
        sheet.push(crate::row!["", ""]);
        sheet.push(crate::row!["Cluster Name", "Version"]);
        for (cluster, _) in &self.clusters {
            let version = cluster
                .full_version
                .as_deref()
                .or(cluster.version.as_deref())
                .unwrap_or("");
            sheet.push(crate::row![cluster.label(), version]);
        }
        sheet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cm::ApiRoleRef;
    use crate::remote::fake::FakeShell;

    fn inventory() -> CmInventory {
        let cluster = ApiCluster {
            name: "cluster1".to_string(),
            display_name: Some("Cluster 1".to_string()),
            full_version: Some("7.1.7".to_string()),
            ..Default::default()
        };
        let services = vec![ApiService {
            name: "hdfs".to_string(),
            service_type: "HDFS".to_string(),
            display_name: Some("HDFS".to_string()),
            ..Default::default()
        }];
        let hosts = vec![
            ApiHost {
                host_id: "h1".to_string(),
                hostname: "node1".to_string(),
                num_cores: Some(16),
                total_phys_mem_bytes: Some(134_217_728_000),
                role_refs: vec![
                    ApiRoleRef {
                        cluster_name: Some("cluster1".to_string()),
                        service_name: "hdfs".to_string(),
                        role_name: "hdfs-DATANODE-0a1b2c3d4e5f60718293a4b5c6d7e8f9".to_string(),
                    },
                    ApiRoleRef {
                        cluster_name: Some("cluster1".to_string()),
                        service_name: "yarn".to_string(),
                        role_name: "yarn-NODEMANAGER-0a1b2c3d4e5f60718293a4b5c6d7e8f9".to_string(),
                    },
                ],
                ..Default::default()
            },
            ApiHost {
                host_id: "h2".to_string(),
                hostname: "edge1".to_string(),
                ..Default::default()
            },
        ];
        CmInventory {
            version: ApiVersionInfo {
                version: Some("7.4.4".to_string()),
                ..Default::default()
            },
            db: ScmDbInfo {
                scm_db_type: Some("POSTGRESQL".to_string()),
                embedded_db_used: Some(false),
            },
            clusters: vec![(cluster, services)],
            hosts,
        }
    }

    #[test]
    fn test_host_information_sheet() {
        let shell = FakeShell::new()
            .respond("*", "cat /etc/redhat-release", "CentOS Linux release 7.9.2009 (Core)")
            .respond("*", "python -V", "Python 2.7.5");
        let wb = inventory().to_workbook(&shell);
        let hosts = wb.sheet("Host_Information").unwrap();
        assert_eq!(
            hosts.column("Roles")[0],
            "\"hdfs DATANODE\" \"yarn NODEMANAGER\""
        );
        assert_eq!(hosts.column("Number of Roles"), vec!["2", "0"]);
        assert_eq!(hosts.column("Cluster"), vec!["Cluster 1", ""]);
        assert_eq!(hosts.column("Total Memory")[0], "134.2");
        assert_eq!(hosts.column("System Python Version")[0], "Python 2.7.5");
    }

    #[test]
    fn test_version_and_cluster_sheets() {
        let wb = inventory().to_workbook(&FakeShell::new());
        let versions = wb.sheet("Cloudera_Version_Information").unwrap();
        assert_eq!(versions.column("Value")[0], "7.4.4");
        assert_eq!(versions.column("Value")[1], "POSTGRESQL");
        assert_eq!(versions.column("Item")[4], "Cluster 1");
        assert_eq!(versions.column("Value")[4], "7.1.7");
        let cluster = wb.sheet("Cluster 1").unwrap();
        assert_eq!(cluster.column("Type of Service"), vec!["HDFS"]);
    }
}
