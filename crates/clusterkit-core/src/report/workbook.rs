use super::csv::format_record;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<&String> for Cell {
    fn from(s: &String) -> Self {
        Cell::Text(s.clone())
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<u64> for Cell {
    fn from(v: u64) -> Self {
        Cell::Int(v as i64)
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::Int(v as i64)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Empty)
    }
}

/// Build a row from heterogeneous values: `row![host, 4u64, 1.5]`.
#[macro_export]
macro_rules! row {
    ($($cell:expr),* $(,)?) => {
        vec![$($crate::report::workbook::Cell::from($cell)),*]
    };
}

/// One worksheet: a header row and data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, header: &[&str]) -> Self {
        Self {
            name: name.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn push_text<S: AsRef<str>>(&mut self, row: &[S]) {
        self.rows
            .push(row.iter().map(|s| Cell::Text(s.as_ref().to_string())).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column values of `column` as text, for tests and lookups.
    pub fn column(&self, column: &str) -> Vec<String> {
        let Some(idx) = self.header.iter().position(|h| h == column) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|r| r.get(idx).map(|c| c.to_string()).unwrap_or_default())
            .collect()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        if !self.header.is_empty() {
            out.push_str(&format_record(&self.header, ','));
            out.push('\n');
        }
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            out.push_str(&format_record(&fields, ','));
            out.push('\n');
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
        std::fs::write(path, self.to_csv())
            .with_context(|| format!("Failed to write '{}'", path.display()))
    }

    /// File name used for this sheet inside a workbook directory.
    pub fn file_name(&self) -> String {
        let mut stem: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        while stem.contains("__") {
            stem = stem.replace("__", "_");
        }
        format!("{}.csv", stem.trim_matches('_'))
    }
}

/// An ordered collection of sheets written as one CSV per sheet plus a JSON
/// rendition of the whole workbook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub name: String,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sheets: Vec::new(),
        }
    }

    /// Add a sheet, suffixing its name when another sheet already uses it
    /// or would be written to the same file.
    pub fn add_sheet(&mut self, mut sheet: Sheet) -> &mut Sheet {
        if self.is_taken(&sheet) {
            let base = sheet.name.clone();
            let mut n = 2;
            loop {
                sheet.name = format!("{} {}", base, n);
                if !self.is_taken(&sheet) {
                    break;
                }
                n += 1;
            }
        }
        self.sheets.push(sheet);
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    fn is_taken(&self, sheet: &Sheet) -> bool {
        let file_name = sheet.file_name();
        self.sheets
            .iter()
            .any(|s| s.name == sheet.name || s.file_name() == file_name)
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    /// Write `<dir>/<name>/<sheet>.csv` for every sheet and `<dir>/<name>.json`.
    /// Returns the sheet directory.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let sheet_dir = dir.join(&self.name);
        std::fs::create_dir_all(&sheet_dir)
            .with_context(|| format!("Failed to create '{}'", sheet_dir.display()))?;
        for sheet in &self.sheets {
            sheet.write_csv(&sheet_dir.join(sheet.file_name()))?;
        }
        let json_path = dir.join(format!("{}.json", self.name));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize workbook")?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("Failed to write '{}'", json_path.display()))?;
        Ok(sheet_dir)
    }
}
