use super::{HostDetails, WORKBOOK_NAME};
use crate::providers::ambari::AmbariClient;
use crate::remote::RemoteShell;
use crate::report::workbook::{Sheet, Workbook};
use anyhow::{Context, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct AmbariInventory {
    pub cluster_name: String,
    /// `HDP3.1`
    pub stack_version: Option<String>,
    pub database: Option<String>,
    pub services: Vec<String>,
    /// hostname -> component names
    pub hosts: Vec<(String, Vec<String>)>,
}

impl AmbariInventory {
    pub async fn fetch(ambari: &AmbariClient) -> Result<Self> {
        let cluster_name = ambari.cluster_name().await.context("Failed to read Ambari cluster")?;
        let stack_version = ambari
            .stack_versions(&cluster_name)
            .await
            .context("Failed to read stack versions")?
            .first()
            .map(|s| s.stack_version.label());
        let database = match ambari.ambari_database().await {
            Ok(db) => db,
            Err(e) => {
                warn!(error = %e, "failed to read Ambari database type");
                None
            }
        };
        let services = ambari
            .services(&cluster_name)
            .await
            .context("Failed to read services")?
            .into_iter()
            .map(|s| s.service_info.service_name)
            .collect();

        let mut hosts = Vec::new();
        for item in ambari.hosts().await.context("Failed to read hosts")? {
            let hostname = item.host.host_name;
            let components = match ambari.host_components(&cluster_name, &hostname).await {
                Ok(list) => list.into_iter().map(|c| c.host_role.component_name).collect(),
                Err(e) => {
                    warn!(host = %hostname, error = %e, "failed to read host components");
                    Vec::new()
                }
            };
            hosts.push((hostname, components));
        }
        info!(cluster = %cluster_name, hosts = hosts.len(), "Ambari inventory fetched");
        Ok(Self {
            cluster_name,
            stack_version,
            database,
            services,
            hosts,
        })
    }

    pub fn to_workbook(&self, shell: &dyn RemoteShell) -> Workbook {
        let mut wb = Workbook::new(WORKBOOK_NAME);

        let mut hosts = Sheet::new(
            "Host_Information",
            &[
                "Hostname",
                "Roles",
                "Number of Roles",
                "Cluster",
                "Linux Version",
                "Model Number",
                "Java Version",
                "System Python Version",
            ],
        );
        for (hostname, components) in &self.hosts {
            let details = HostDetails::collect(shell, hostname);
            hosts.push(crate::row![
                hostname,
                components.join("\n"),
                components.len(),
                self.cluster_name.as_str(),
                details.linux_version,
                details.model_number,
                details.java_version,
                details.python_version,
            ]);
        }
        wb.add_sheet(hosts);

        let mut version = Sheet::new("HDP_Version_Information", &["Item", "Value"]);
        version.push(crate::row!["HDP Version", self.stack_version.as_deref().unwrap_or("")]);
        version.push(crate::row!["cluster_name", self.cluster_name.as_str()]);
        version.push(crate::row!["", ""]);
        version.push(crate::row!["Ambari Database", self.database.as_deref().unwrap_or("")]);
        wb.add_sheet(version);

        let mut services = Sheet::new("Active Services", &["Service Name"]);
        for s in &self.services {
            services.push(crate::row![s]);
        }
        wb.add_sheet(services);
        wb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeShell;

    #[test]
    fn test_ambari_workbook() {
        let inventory = AmbariInventory {
            cluster_name: "hdp1".to_string(),
            stack_version: Some("HDP3.1".to_string()),
            database: Some("postgres".to_string()),
            services: vec!["HDFS".to_string(), "YARN".to_string()],
            hosts: vec![(
                "node1".to_string(),
                vec!["DATANODE".to_string(), "NODEMANAGER".to_string()],
            )],
        };
        let shell = FakeShell::new().respond("node1", "java -version", "openjdk version \"1.8.0_292\"");
        let wb = inventory.to_workbook(&shell);

        let hosts = wb.sheet("Host_Information").unwrap();
        assert_eq!(hosts.column("Roles"), vec!["DATANODE\nNODEMANAGER"]);
        assert_eq!(hosts.column("Number of Roles"), vec!["2"]);
        assert_eq!(hosts.column("Cluster"), vec!["hdp1"]);
        assert_eq!(hosts.column("Java Version"), vec!["openjdk version \"1.8.0_292\""]);

        let version = wb.sheet("HDP_Version_Information").unwrap();
        assert_eq!(version.column("Value"), vec!["HDP3.1", "hdp1", "", "postgres"]);
        assert_eq!(wb.sheet("Active Services").unwrap().len(), 2);
    }
}
