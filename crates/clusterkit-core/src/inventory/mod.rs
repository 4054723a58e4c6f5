//! Host and service inventories of CM- and Ambari-managed clusters.

pub mod ambari;
pub mod ansible;
pub mod cloudera;

use crate::remote::RemoteShell;
use tracing::warn;

pub const WORKBOOK_NAME: &str = "Cluster_Discovery";

/// Facts read from a host over SSH for the `Host_Information` sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostDetails {
    pub linux_version: String,
    pub model_number: String,
    pub java_version: String,
    pub python_version: String,
}

impl HostDetails {
    pub fn collect(shell: &dyn RemoteShell, host: &str) -> Self {
        let run = |command: &str| match shell.run(host, command) {
            Ok(output) => output.combined(),
            Err(e) => {
                warn!(host, command, error = %e, "failed to collect host detail");
                String::new()
            }
        };
        Self {
            linux_version: run("cat /etc/redhat-release"),
            model_number: run("cat /sys/class/dmi/id/product_name"),
            java_version: run("java -version"),
            python_version: run("python -V"),
        }
    }
}
