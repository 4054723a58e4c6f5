//! Per-host facts copied from the diagnostic bundle into
//! `bundle/<hostname>/`.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

pub const JAVA_MISSING: &str = "Not present in diagnostic bundle";

static DF_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/dev/\S*)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+%)\s+(.*)$").unwrap()
});
static CPU_MHZ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CPU max MHz:\s+(\d+\.?\d*)\s*$").unwrap());
static JAVA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:java|openjdk) version\s+(.*?)\s*$").unwrap());
static LSB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Description|Distributor ID|Release):\s+(.*?)\s*$").unwrap());

/// Sums of the `/dev/*` rows of `df` (1K blocks), in GB.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskUsage {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
}

pub fn parse_df(content: &str) -> DiskUsage {
    const KB_PER_GB: f64 = 1024.0 * 1024.0;
    let mut usage = DiskUsage::default();
    for line in content.lines() {
        if let Some(c) = DF_ROW_RE.captures(line) {
            let kb = |i: usize| c[i].parse::<f64>().unwrap_or(0.0) / KB_PER_GB;
            usage.total_gb += kb(2);
            usage.used_gb += kb(3);
            usage.available_gb += kb(4);
        }
    }
    usage
}

pub fn parse_cpu_max_mhz(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|l| CPU_MHZ_RE.captures(l))
        .last()
        .map(|c| c[1].to_string())
}

/// The quoted version string from `java -version`, quotes included.
pub fn parse_java_version(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|l| JAVA_RE.captures(l))
        .last()
        .map(|c| c[1].to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsRelease {
    pub description: String,
    pub distributor_id: String,
    pub release: String,
}

impl Default for OsRelease {
    fn default() -> Self {
        Self {
            description: "-".to_string(),
            distributor_id: "-".to_string(),
            release: "-".to_string(),
        }
    }
}

pub fn parse_lsb_release(content: &str) -> OsRelease {
    let mut os = OsRelease::default();
    for c in content.lines().filter_map(|l| LSB_RE.captures(l)) {
        let value = c[2].to_string();
        match &c[1] {
            "Description" => os.description = value,
            "Distributor ID" => os.distributor_id = value,
            _ => os.release = value,
        }
    }
    os
}

/// Facts of one host, each falling back when its file is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct HostFacts {
    pub os: OsRelease,
    pub java_version: String,
    pub cpu_max_mhz: String,
    pub disk: DiskUsage,
}

impl HostFacts {
    pub fn load(bundle: &Path, hostname: &str) -> Self {
        let dir = bundle.join("bundle").join(hostname);
        let read = |name: &str| {
            let path = dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(content) => Some(content),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "host fact file unavailable");
                    None
                }
            }
        };
        Self {
            os: read("lsb_release_stdout")
                .map(|c| parse_lsb_release(&c))
                .unwrap_or_default(),
            java_version: read("java_version")
                .and_then(|c| parse_java_version(&c))
                .unwrap_or_else(|| JAVA_MISSING.to_string()),
            cpu_max_mhz: read("lscpu_stdout")
                .and_then(|c| parse_cpu_max_mhz(&c))
                .unwrap_or_else(|| "-".to_string()),
            disk: read("df_stdout").map(|c| parse_df(&c)).unwrap_or_default(),
        }
    }
}
