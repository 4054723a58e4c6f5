//! Scan HQL scripts and `.properties` files for constructs that need
//! attention when moving to Hive 3.

pub mod rules;

use crate::report::workbook::Sheet;
use anyhow::{Context, Result};
use regex::Regex;
use rules::LineRule;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

pub const OUTPUT_FILE: &str = "hive3_conversion_recommendations.csv";
pub const SCANNED_EXTENSIONS: &[&str] = &["hql", "properties"];

static TABLE_OPERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)(CREATE(?:\s+(?:EXTERNAL|TEMPORARY))?|ALTER|DROP)\s+TABLE(?:\s+IF\s+NOT\s+EXISTS)?\s+(\w+)\.(\w+)",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub file_name: String,
    pub line_number: usize,
    pub problematic_search: String,
    pub recommendation: String,
}

/// Every `.hql`/`.properties` file below `dir`, sorted.
pub fn find_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("'{}' is not a directory", dir.display());
    }
    let mut files = Vec::new();
    for ext in SCANNED_EXTENSIONS {
        let pattern = format!("{}/**/*.{}", glob::Pattern::escape(&dir.to_string_lossy()), ext);
        let paths = glob::glob(&pattern).with_context(|| format!("Invalid scan pattern '{}'", pattern))?;
        files.extend(paths.flatten().filter(|p| p.is_file()));
    }
    files.sort();
    Ok(files)
}

/// Unqualified-looking `db.table` references in table DDL; these need
/// `` `db`.`table` `` quoting in Hive 3.
pub fn table_operations(file_name: &str, text: &str) -> Vec<Finding> {
    TABLE_OPERATION
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let line_number = text[..whole.start()].matches('\n').count() + 1;
            Some(Finding {
                file_name: file_name.to_string(),
                line_number,
                problematic_search: "table operations".to_string(),
                recommendation: format!(
                    "Enclose the database name and the table name in backticks AS `{}`.`{}`",
                    &caps[2], &caps[3]
                ),
            })
        })
        .collect()
}

/// Line rules over every line that is not a `--` comment.
pub fn line_findings(file_name: &str, text: &str, rules: &[LineRule]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.starts_with("--") {
            continue;
        }
        for rule in rules.iter().filter(|r| r.is_match(line)) {
            findings.push(Finding {
                file_name: file_name.to_string(),
                line_number: idx + 1,
                problematic_search: rule.name.clone(),
                recommendation: rule.recommendation.clone(),
            });
        }
    }
    findings
}

/// Scan one script. Bytes that are not UTF-8 (Latin-1 scripts) are replaced
/// rather than rejected.
pub fn scan_file(path: &Path, rules: &[LineRule]) -> Result<Vec<Finding>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let name = path.display().to_string();
    let mut findings = table_operations(&name, &text);
    findings.extend(line_findings(&name, &text, rules));
    Ok(findings)
}

pub fn scan_directory(dir: &Path, rules: &[LineRule]) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for file in find_scripts(dir)? {
        info!(file = %file.display(), "scanning");
        match scan_file(&file, rules) {
            Ok(found) => findings.extend(found),
            Err(e) => warn!(file = %file.display(), error = %format!("{:#}", e), "skipping unreadable script"),
        }
    }
    debug!(findings = findings.len(), "scan finished");
    Ok(findings)
}

pub fn findings_sheet(findings: &[Finding]) -> Sheet {
    let mut sheet = Sheet::new(
        "hive3_conversion_recommendations",
        &["file_name", "line_number", "problematic_search", "recommendation"],
    );
    for f in findings {
        sheet.push(crate::row![
            f.file_name.as_str(),
            f.line_number,
            f.problematic_search.as_str(),
            f.recommendation.as_str(),
        ]);
    }
    sheet
}

/// Writes `<output_dir>/hive3_conversion_recommendations.csv`.
pub fn write_findings(findings: &[Finding], output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create '{}'", output_dir.display()))?;
    let path = output_dir.join(OUTPUT_FILE);
    findings_sheet(findings).write_csv(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_operations_line_numbers() {
        let text = "use sales;\n\nCREATE EXTERNAL TABLE IF NOT EXISTS sales.orders (id int);\ndrop table\n  tmp.t1;\nselect * from a.b;\n";
        let findings = table_operations("x.hql", text);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].line_number, 3);
        assert_eq!(
            findings[0].recommendation,
            "Enclose the database name and the table name in backticks AS `sales`.`orders`"
        );
        assert_eq!(findings[1].line_number, 4);
        assert!(findings[1].recommendation.ends_with("`tmp`.`t1`"));
    }

    #[test]
    fn test_unqualified_table_is_not_reported() {
        assert!(table_operations("x.hql", "CREATE TABLE orders (id int);").is_empty());
    }

    #[test]
    fn test_line_findings_skip_comments() {
        let rules = rules::builtin_rules();
        let text = "-- set hive.execution.engine=mr;\nset hive.execution.engine=mr;\n";
        let findings = line_findings("x.hql", text, &rules);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line_number, 2);
        assert_eq!(findings[0].problematic_search, "execution engine mr");
    }

    #[test]
    fn test_table_operation_inside_a_word() {
        let findings = table_operations("x.hql", "RECREATE TABLE db.t (id int);");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].recommendation.ends_with("`db`.`t`"));
    }

    #[test]
    fn test_scan_directory_latin1_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.hql"), b"-- caf\xe9\nDROP TABLE db.t;\n").unwrap();
        std::fs::write(dir.path().join("b.hql"), "ALTER TABLE db.u RENAME TO db.v;\n").unwrap();

        let findings = scan_directory(dir.path(), &rules::builtin_rules()).unwrap();
        let tables: Vec<_> = findings
            .iter()
            .filter(|f| f.problematic_search == "table operations")
            .map(|f| (f.file_name.ends_with("a.hql"), f.line_number))
            .collect();
        assert_eq!(tables, vec![(true, 2), (false, 1)]);
    }

    #[test]
    fn test_scan_directory_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etl/daily")).unwrap();
        std::fs::write(dir.path().join("etl/daily/load.hql"), "ALTER TABLE db.t ADD COLUMNS (c int);\n").unwrap();
        std::fs::write(dir.path().join("job.properties"), "mapred.job.queue.name=etl\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "DROP TABLE db.t;\n").unwrap();

        let findings = scan_directory(dir.path(), &rules::builtin_rules()).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().any(|f| f.problematic_search == "mapreduce queue"));
        assert!(findings.iter().any(|f| f.problematic_search == "table operations"));

        let path = write_findings(&findings, &dir.path().join("out")).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("file_name,line_number,problematic_search,recommendation"));
    }
}
