//! Directory layout of a discovery bundle, shared by the extractors that
//! write it and the report builder that reads it back.

use crate::model::cm::sanitize_name;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const CM_URL_FILE: &str = "cm_url";
pub const EXTRACTED_BUNDLE_DIR: &str = "extracted_raw_diagnostic_bundle";

#[derive(Debug, Clone)]
pub struct BundleLayout {
    root: PathBuf,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<output>_<dd_mm_YYYY_HH_MM_SS>`
    pub fn timestamped(output_dir: &Path, now: &DateTime<Local>) -> Self {
        let stamp = now.format("%d_%m_%Y_%H_%M_%S");
        let name = match output_dir.file_name() {
            Some(n) => format!("{}_{}", n.to_string_lossy(), stamp),
            None => format!("discovery_bundle_{}", stamp),
        };
        Self::new(output_dir.with_file_name(name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cm_url(&self) -> PathBuf {
        self.root.join(CM_URL_FILE)
    }

    pub fn api_dir(&self) -> PathBuf {
        self.root.join("api_diagnostics")
    }

    pub fn deployment(&self) -> PathBuf {
        self.api_dir().join("cm_deployment.json")
    }

    pub fn hosts(&self) -> PathBuf {
        self.api_dir().join("host").join("read_hosts.json")
    }

    /// `api_diagnostics/cluster/<name>.json` for the CM-wide dumps
    /// (`kerberos_info`, `cm_config`, `cm_version`, `clusters`).
    pub fn cm_dump(&self, name: &str) -> PathBuf {
        self.api_dir().join("cluster").join(format!("{}.json", name))
    }

    pub fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.api_dir().join("cluster").join(sanitize_name(cluster))
    }

    pub fn configs_dir(&self, cluster: &str) -> PathBuf {
        self.cluster_dir(cluster).join("configs")
    }

    /// `configs/<TYPE>/<level>/<owner>.json`, level being `service`, `role`
    /// or `role_config_group`.
    pub fn config_file(&self, cluster: &str, service_type: &str, level: &str, owner: &str) -> PathBuf {
        self.configs_dir(cluster)
            .join(service_type)
            .join(level)
            .join(format!("{}.json", owner))
    }

    pub fn host_metrics_dir(&self, hostname: &str) -> PathBuf {
        self.root.join("metrics").join("host").join(hostname)
    }

    pub fn cluster_metrics_dir(&self) -> PathBuf {
        self.root.join("metrics").join("cluster")
    }

    pub fn service_metrics_dir(&self, cluster: &str, service_type: &str) -> PathBuf {
        self.cluster_metrics_dir()
            .join(sanitize_name(cluster))
            .join("service")
            .join(service_type)
    }

    pub fn host_bundle_dir(&self, hostname: &str) -> PathBuf {
        self.root.join("bundle").join(hostname)
    }

    pub fn extracted_bundle_dir(&self) -> PathBuf {
        self.root.join(EXTRACTED_BUNDLE_DIR)
    }

    pub fn workload_dir(&self) -> PathBuf {
        self.root.join("workload")
    }

    pub fn workload_cluster_dir(&self, cluster: &str) -> PathBuf {
        self.workload_dir().join(sanitize_name(cluster))
    }

    pub fn workload_service_dir(&self, cluster: &str, service: &str) -> PathBuf {
        self.workload_cluster_dir(cluster).join("service").join(service)
    }
}

/// Files under `dir` matching `pattern` at any depth, sorted.
pub fn find_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = dir.join("**").join(pattern);
    let mut files: Vec<PathBuf> = match glob::glob(&full.to_string_lossy()) {
        Ok(paths) => paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_dir() {
        let now = Local.with_ymd_and_hms(2022, 3, 7, 9, 5, 1).unwrap();
        let layout = BundleLayout::timestamped(Path::new("/tmp/out/discovery"), &now);
        assert_eq!(layout.root(), Path::new("/tmp/out/discovery_07_03_2022_09_05_01"));
    }

    #[test]
    fn test_paths() {
        let layout = BundleLayout::new("/b");
        assert_eq!(
            layout.config_file("Cluster 1", "HDFS", "service", "hdfs"),
            Path::new("/b/api_diagnostics/cluster/Cluster_1/configs/HDFS/service/hdfs.json")
        );
        assert_eq!(
            layout.service_metrics_dir("Cluster 1", "YARN"),
            Path::new("/b/metrics/cluster/Cluster_1/service/YARN")
        );
        assert_eq!(
            layout.workload_service_dir("Cluster 1", "hdfs"),
            Path::new("/b/workload/Cluster_1/service/hdfs")
        );
        assert_eq!(layout.cm_dump("cm_version"), Path::new("/b/api_diagnostics/cluster/cm_version.json"));
    }

    #[test]
    fn test_find_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("service_x.json"), "{}").unwrap();
        std::fs::write(dir.path().join("service_y.json"), "{}").unwrap();
        std::fs::write(dir.path().join("other.json"), "{}").unwrap();
        let found = find_files(dir.path(), "service_*.json");
        assert_eq!(found.len(), 2);
    }
}
