use super::fsimage::{parent_path, FsImageEntry};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::AddAssign;

use crate::report::workbook::Sheet;

pub const DEFAULT_MAX_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub directory_count: u64,
    pub file_count: u64,
    pub small_file: u64,
    pub small_file_10: u64,
    pub small_file_1000: u64,
    pub blocks_count: u64,
    pub file_size: u64,
}

impl Counters {
    fn of(entry: &FsImageEntry) -> Self {
        let block = entry.preferred_block_size;
        let size = entry.file_size;
        Self {
            directory_count: u64::from(entry.is_directory()),
            file_count: u64::from(!entry.is_directory()),
            small_file: u64::from(size < block),
            small_file_10: u64::from(size < block / 10),
            small_file_1000: u64::from(size < block / 1000),
            blocks_count: entry.blocks_count,
            file_size: size,
        }
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.directory_count += rhs.directory_count;
        self.file_count += rhs.file_count;
        self.small_file += rhs.small_file;
        self.small_file_10 += rhs.small_file_10;
        self.small_file_1000 += rhs.small_file_1000;
        self.blocks_count += rhs.blocks_count;
        self.file_size += rhs.file_size;
    }
}

/// One row of the structure report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSummary {
    pub path: String,
    pub depth: usize,
    #[serde(flatten)]
    pub counters: Counters,
    pub avg_file_size: Option<f64>,
}

impl PathSummary {
    fn aggregate(path: String, depth: usize, counters: Counters) -> Self {
        let avg_file_size = (counters.file_count > 0)
            .then(|| counters.file_size as f64 / counters.file_count as f64);
        Self {
            path,
            depth,
            counters,
            avg_file_size,
        }
    }

    fn empty_directory(path: String, depth: usize) -> Self {
        Self {
            path,
            depth,
            counters: Counters::default(),
            avg_file_size: None,
        }
    }
}

/// Roll every entry up into its ancestors, deepest level first, and keep
/// the rows at or above `max_depth`.
pub fn structure_report(entries: &[FsImageEntry], max_depth: usize) -> Vec<PathSummary> {
    let mut by_depth: BTreeMap<usize, Vec<&FsImageEntry>> = BTreeMap::new();
    for entry in entries {
        by_depth.entry(entry.depth()).or_default().push(entry);
    }
    let deepest = by_depth.keys().next_back().copied().unwrap_or(0);

    let mut output = Vec::new();
    let mut carried: BTreeMap<String, Counters> = BTreeMap::new();

    for level in (1..=deepest).rev() {
        let originals = by_depth.get(&level).map(Vec::as_slice).unwrap_or(&[]);

        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for entry in originals {
            *occurrences.entry(entry.path.as_str()).or_default() += 1;
        }
        for path in carried.keys() {
            *occurrences.entry(path.as_str()).or_default() += 1;
        }

        if level <= max_depth {
            for entry in originals {
                if entry.is_directory() && occurrences.get(entry.path.as_str()) == Some(&1) {
                    output.push(PathSummary::empty_directory(entry.path.clone(), level));
                }
            }
        }

        let mut parents: BTreeMap<String, Counters> = BTreeMap::new();
        for entry in originals {
            *parents.entry(parent_path(&entry.path).to_string()).or_default() +=
                Counters::of(entry);
        }
        for (path, counters) in &carried {
            *parents.entry(parent_path(path).to_string()).or_default() += *counters;
        }

        if level - 1 <= max_depth {
            for (path, counters) in &parents {
                output.push(PathSummary::aggregate(path.clone(), level - 1, *counters));
            }
        }
        carried = parents;
    }

    output.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.path.cmp(&b.path)));
    output
}

pub const STRUCTURE_HEADER: &[&str] = &[
    "Path",
    "FileSize",
    "BlocksCount",
    "Depth",
    "FileCount",
    "DirectoryCount",
    "SmallFile",
    "SmallFile10",
    "SmallFile1000",
    "AvgFileSize",
];

pub fn structure_sheet(name: &str, rows: &[PathSummary]) -> Sheet {
    let mut sheet = Sheet::new(name, STRUCTURE_HEADER);
    for r in rows {
        let c = &r.counters;
        sheet.push(crate::row![
            r.path.as_str(),
            c.file_size,
            c.blocks_count,
            r.depth,
            c.file_count,
            c.directory_count,
            c.small_file,
            c.small_file_10,
            c.small_file_1000,
            r.avg_file_size,
        ]);
    }
    sheet
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModTimeCount {
    pub cluster_name: String,
    pub date: NaiveDate,
    pub count: u64,
}

/// `2022-01-11 09:30` or `2022-01-11 09:30:15` -> 2022-01-11.
fn modification_date(raw: &str) -> Option<NaiveDate> {
    let date = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Entries per modification day, oldest first.
pub fn modification_report(entries: &[FsImageEntry], cluster_name: &str) -> Vec<ModTimeCount> {
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for entry in entries {
        if let Some(date) = modification_date(&entry.modification_time) {
            *per_day.entry(date).or_default() += 1;
        }
    }
    per_day
        .into_iter()
        .map(|(date, count)| ModTimeCount {
            cluster_name: cluster_name.to_string(),
            date,
            count,
        })
        .collect()
}

pub const MODTIME_HEADER: &[&str] = &["ClusterName", "Date", "Count"];

pub fn modtime_sheet(name: &str, rows: &[ModTimeCount]) -> Sheet {
    let mut sheet = Sheet::new(name, MODTIME_HEADER);
    for r in rows {
        sheet.push(crate::row![
            r.cluster_name.as_str(),
            r.date.format("%Y-%m-%d").to_string(),
            r.count,
        ]);
    }
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(path: &str) -> FsImageEntry {
        FsImageEntry {
            path: path.to_string(),
            replication: 0,
            modification_time: "2022-01-10 08:00".to_string(),
            ..Default::default()
        }
    }

    fn file(path: &str, size: u64, modified: &str) -> FsImageEntry {
        FsImageEntry {
            path: path.to_string(),
            replication: 3,
            modification_time: modified.to_string(),
            preferred_block_size: 134_217_728,
            blocks_count: 1,
            file_size: size,
        }
    }

    fn sample() -> Vec<FsImageEntry> {
        vec![
            dir("/"),
            dir("/data"),
            dir("/data/raw"),
            file("/data/raw/a.csv", 1_000, "2022-01-11 09:30"),
            file("/data/raw/b.csv", 200_000_000, "2022-01-11 10:00"),
            dir("/tmp"),
            dir("/empty"),
        ]
    }

    fn find<'a>(rows: &'a [PathSummary], path: &str, depth: usize) -> &'a PathSummary {
        rows.iter()
            .find(|r| r.path == path && r.depth == depth)
            .unwrap_or_else(|| panic!("no row for {} at depth {}", path, depth))
    }

    #[test]
    fn test_root_rollup() {
        let rows = structure_report(&sample(), 3);
        let root = find(&rows, "/", 0);
        assert_eq!(root.counters.file_count, 2);
        // /data, /data/raw, /tmp, /empty
        assert_eq!(root.counters.directory_count, 4);
        assert_eq!(root.counters.file_size, 200_001_000);
        assert_eq!(root.counters.blocks_count, 2);
        assert_eq!(root.counters.small_file, 1);
        assert_eq!(root.avg_file_size, Some(100_000_500.0));
    }

    #[test]
    fn test_intermediate_rollup() {
        let rows = structure_report(&sample(), 3);
        let data = find(&rows, "/data", 1);
        assert_eq!(data.counters.file_count, 2);
        assert_eq!(data.counters.directory_count, 1);
        let raw = find(&rows, "/data/raw", 2);
        assert_eq!(raw.counters.file_count, 2);
        assert_eq!(raw.counters.directory_count, 0);
    }

    #[test]
    fn test_empty_directories_reported() {
        let rows = structure_report(&sample(), 3);
        let empty = find(&rows, "/empty", 1);
        assert_eq!(empty.counters, Counters::default());
        assert_eq!(empty.avg_file_size, None);
        assert!(rows.iter().any(|r| r.path == "/tmp" && r.depth == 1));
        // non-empty directories appear once, as aggregates
        assert_eq!(rows.iter().filter(|r| r.path == "/data").count(), 1);
    }

    #[test]
    fn test_max_depth_limits_rows() {
        let rows = structure_report(&sample(), 1);
        assert!(rows.iter().all(|r| r.depth <= 1));
        assert_eq!(find(&rows, "/", 0).counters.file_count, 2);
    }

    #[test]
    fn test_empty_directories_below_the_top_level() {
        let entries = vec![
            dir("/"),
            dir("/data"),
            dir("/data/empty"),
            dir("/data/raw"),
            dir("/data/raw/empty"),
            dir("/data/raw/deep"),
            file("/data/raw/deep/f.csv", 1_000, "2022-01-11 09:30"),
        ];
        let rows = structure_report(&entries, 2);
        assert!(rows.iter().all(|r| r.depth <= 2));
        assert_eq!(find(&rows, "/data/empty", 2).counters, Counters::default());
        let raw = find(&rows, "/data/raw", 2);
        assert_eq!(raw.counters.directory_count, 2);
        assert_eq!(raw.counters.file_count, 1);
        assert!(!rows.iter().any(|r| r.path.starts_with("/data/raw/")));
        // everything below the cut still counts in the ancestors
        assert_eq!(find(&rows, "/", 0).counters.directory_count, 5);

        let deeper = structure_report(&entries, 3);
        assert_eq!(find(&deeper, "/data/raw/empty", 3).counters, Counters::default());
        assert_eq!(find(&deeper, "/data/raw/deep", 3).counters.file_count, 1);
    }

    #[test]
    fn test_rows_ordered_by_depth_then_path() {
        let rows = structure_report(&sample(), 3);
        let keys: Vec<(usize, &str)> = rows.iter().map(|r| (r.depth, r.path.as_str())).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_modification_report() {
        let rows = modification_report(&sample(), "Cluster_1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2022, 1, 10).unwrap());
        assert_eq!(rows[0].count, 5);
        assert_eq!(rows[1].count, 2);
        assert_eq!(rows[1].cluster_name, "Cluster_1");
    }

    #[test]
    fn test_modification_date_formats() {
        assert!(modification_date("2022-01-11 09:30:15").is_some());
        assert!(modification_date("garbage").is_none());
        assert!(modification_date("").is_none());
    }

    #[test]
    fn test_structure_sheet() {
        let rows = structure_report(&sample(), 1);
        let sheet = structure_sheet("Cluster 1 HDFS Report", &rows);
        assert_eq!(sheet.header[0], "Path");
        assert_eq!(sheet.column("Path")[0], "/");
    }
}
