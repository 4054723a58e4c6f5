//! HDFS filesystem-image analysis: directory roll-ups and modification-time
//! histograms computed from an `hdfs oiv -p Delimited` dump.

pub mod fsimage;
pub mod tree;

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub use fsimage::{read_fsimage, FsImageEntry};
pub use tree::{modification_report, structure_report, ModTimeCount, PathSummary};

pub const STRUCTURE_REPORT_FILE: &str = "hdfs_structure_report.csv";
pub const MODTIME_REPORT_FILE: &str = "hdfs_modification_times.csv";

/// File names the fsimage dump is stored under in a discovery bundle.
pub const FSIMAGE_DUMP_FILES: &[&str] = &["hdfs_fs.tsv", "hdfs_fs.csv"];

/// Both reports computed from one dump.
#[derive(Debug, Clone, Serialize)]
pub struct HdfsReport {
    pub cluster_name: String,
    pub structure: Vec<PathSummary>,
    pub modification_times: Vec<ModTimeCount>,
}

impl HdfsReport {
    pub fn from_entries(cluster_name: &str, entries: &[FsImageEntry], max_depth: usize) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            structure: structure_report(entries, max_depth),
            modification_times: modification_report(entries, cluster_name),
        }
    }

    pub fn from_file(path: &Path, max_depth: usize) -> Result<Self> {
        let entries = read_fsimage(path)?;
        let cluster_name = cluster_name_for_dump(path).unwrap_or_else(|| "unknown".to_string());
        info!(
            path = %path.display(),
            entries = entries.len(),
            cluster = %cluster_name,
            "analysing fsimage dump"
        );
        Ok(Self::from_entries(&cluster_name, &entries, max_depth))
    }

    /// Write both CSVs into `dir`; returns their paths.
    pub fn write_csv(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let structure = dir.join(STRUCTURE_REPORT_FILE);
        tree::structure_sheet("HDFS Report", &self.structure).write_csv(&structure)?;
        let modtime = dir.join(MODTIME_REPORT_FILE);
        tree::modtime_sheet("HDFS ModTime Report", &self.modification_times)
            .write_csv(&modtime)?;
        Ok((structure, modtime))
    }
}

/// `workload/<Cluster>/service/<svc>/hdfs_fs.tsv` -> `<Cluster>`.
pub fn cluster_name_for_dump(path: &Path) -> Option<String> {
    let cluster_dir = path.parent()?.parent()?.parent()?;
    cluster_dir.file_name().map(|n| n.to_string_lossy().to_string())
}
