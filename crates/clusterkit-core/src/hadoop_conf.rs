//! Hadoop `*-site.xml` files and CM safety-valve snippets.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const DONE_DIR_PROPERTY: &str = "mapreduce.jobhistory.done-dir";

static DONE_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<name>mapreduce\.jobhistory\.done-dir</name>\s*<value>\s*([/\w.-]*)\s*</value>")
        .unwrap()
});

#[derive(Debug, Deserialize)]
struct Configuration {
    #[serde(rename = "property", default)]
    properties: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Property {
    name: String,
    #[serde(default)]
    value: String,
}

/// Parse a `<configuration>` document into name -> value.
pub fn parse_properties(xml: &str) -> Result<BTreeMap<String, String>> {
    let conf: Configuration =
        quick_xml::de::from_str(xml).context("Failed to parse Hadoop configuration XML")?;
    Ok(conf
        .properties
        .into_iter()
        .map(|p| (p.name.trim().to_string(), p.value.trim().to_string()))
        .collect())
}

/// Safety valves hold bare `<property>` elements without the root element.
pub fn parse_safety_valve(snippet: &str) -> Result<BTreeMap<String, String>> {
    parse_properties(&format!("<configuration>{}</configuration>", snippet))
}

pub fn read_site_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    parse_properties(&xml).with_context(|| format!("Invalid XML in '{}'", path.display()))
}

/// JobHistory done directory configured in a mapred safety valve.
/// Snippets CM accepts but that are not well-formed XML fall back to a
/// pattern match.
pub fn mapreduce_done_dir(snippet: &str) -> Option<String> {
    if let Ok(props) = parse_safety_valve(snippet) {
        if let Some(dir) = props.get(DONE_DIR_PROPERTY).filter(|d| !d.is_empty()) {
            return Some(dir.clone());
        }
    }
    DONE_DIR_RE
        .captures(snippet)
        .map(|c| c[1].to_string())
        .filter(|d| !d.is_empty())
}

/// Directory under `root` that holds `core-site.xml` (client config zips
/// nest it one level down, e.g. `hadoop-conf/`).
pub fn find_config_dir(root: &Path) -> Option<PathBuf> {
    if root.join("core-site.xml").is_file() {
        return Some(root.to_path_buf());
    }
    let pattern = root.join("**").join("core-site.xml");
    glob::glob(&pattern.to_string_lossy())
        .ok()?
        .filter_map(|p| p.ok())
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .min_by_key(|p| p.components().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_site_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<configuration>
  <property>
    <name>fs.defaultFS</name>
    <value>hdfs://nameservice1</value>
  </property>
  <property>
    <name>hadoop.security.authentication</name>
    <value>kerberos</value>
  </property>
</configuration>"#;
        let props = parse_properties(xml).unwrap();
        assert_eq!(props["fs.defaultFS"], "hdfs://nameservice1");
        assert_eq!(props["hadoop.security.authentication"], "kerberos");
    }

    #[test]
    fn test_done_dir_from_safety_valve() {
        let snippet = "<property><name>mapreduce.jobhistory.done-dir</name><value>/user/history/done</value></property>";
        assert_eq!(mapreduce_done_dir(snippet).as_deref(), Some("/user/history/done"));
    }

    #[test]
    fn test_done_dir_malformed_snippet() {
        let snippet = "<property><name>mapreduce.jobhistory.done-dir</name> <value>/mr/done</value></property><property>";
        assert_eq!(mapreduce_done_dir(snippet).as_deref(), Some("/mr/done"));
    }

    #[test]
    fn test_done_dir_absent() {
        assert_eq!(mapreduce_done_dir(""), None);
        assert_eq!(
            mapreduce_done_dir("<property><name>x</name><value>y</value></property>"),
            None
        );
    }

    #[test]
    fn test_find_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("hdfs-clientconfig").join("hadoop-conf");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("core-site.xml"), "<configuration/>").unwrap();
        assert_eq!(find_config_dir(dir.path()), Some(nested));
    }
}
