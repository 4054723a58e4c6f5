use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

use crate::report::csv::split_record;

/// One inode from an `hdfs oiv -p Delimited` dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FsImageEntry {
    pub path: String,
    /// 0 for directories.
    pub replication: u32,
    pub modification_time: String,
    pub preferred_block_size: u64,
    pub blocks_count: u64,
    pub file_size: u64,
}

impl FsImageEntry {
    pub fn is_directory(&self) -> bool {
        self.replication == 0
    }

    /// `/` is depth 0, `/a` depth 1, `/a/b` depth 2.
    pub fn depth(&self) -> usize {
        path_depth(&self.path)
    }
}

pub fn path_depth(path: &str) -> usize {
    if path == "/" {
        0
    } else {
        path.matches('/').count()
    }
}

/// `/a/b` -> `/a`, `/a` -> `/`.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

const REQUIRED_COLUMNS: &[&str] = &[
    "Path",
    "Replication",
    "ModificationTime",
    "PreferredBlockSize",
    "BlocksCount",
    "FileSize",
];

/// Tab when the header has one, otherwise comma.
fn detect_delimiter(header: &str) -> char {
    if header.contains('\t') {
        '\t'
    } else {
        ','
    }
}

pub fn parse_fsimage<R: BufRead>(reader: R) -> Result<Vec<FsImageEntry>> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line.context("Failed to read fsimage header")?,
        None => return Ok(Vec::new()),
    };
    let delimiter = detect_delimiter(&header);
    let columns: HashMap<String, usize> = split_record(&header, delimiter)
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect();

    let mut index = Vec::with_capacity(REQUIRED_COLUMNS.len());
    for name in REQUIRED_COLUMNS {
        let idx = columns
            .get(*name)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("fsimage dump is missing the '{}' column", name))?;
        index.push(idx);
    }
    let width = index.iter().copied().max().unwrap_or(0) + 1;

    let mut entries = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let line = line.context("Failed to read fsimage dump")?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_record(&line, delimiter);
        if fields.len() < width {
            debug!(line = line_no + 2, "skipping short fsimage row");
            continue;
        }
        let number = |i: usize| fields[index[i]].trim().parse::<u64>().unwrap_or(0);
        entries.push(FsImageEntry {
            path: fields[index[0]].clone(),
            replication: u32::try_from(number(1)).unwrap_or(u32::MAX),
            modification_time: fields[index[2]].clone(),
            preferred_block_size: number(3),
            blocks_count: number(4),
            file_size: number(5),
        });
    }
    Ok(entries)
}

pub fn read_fsimage(path: &Path) -> Result<Vec<FsImageEntry>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open fsimage dump '{}'", path.display()))?;
    parse_fsimage(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse fsimage dump '{}'", path.display()))
}
