use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Anchored at the start of the line.
    Match,
    /// Anywhere in the line.
    Search,
}

struct BuiltinRule {
    name: &'static str,
    recommendation: &'static str,
    mode: MatchMode,
    pattern: &'static str,
}

const HIVE3_RULES: &[BuiltinRule] = &[
    BuiltinRule {
        name: "execution engine mr",
        recommendation: "Hive 3 runs on Tez only; remove hive.execution.engine=mr",
        mode: MatchMode::Search,
        pattern: r"hive\.execution\.engine\s*=\s*mr\b",
    },
    BuiltinRule {
        name: "hive cli",
        recommendation: "The Hive CLI is replaced by Beeline; use beeline -u <jdbc url> -f/-e",
        mode: MatchMode::Search,
        pattern: r"(^|[\s;|&])hive\s+(-e|-f|--hiveconf)\b",
    },
    BuiltinRule {
        name: "managed table",
        recommendation: "Managed tables are transactional (ACID) in Hive 3; use CREATE EXTERNAL TABLE for data shared with other engines",
        mode: MatchMode::Match,
        pattern: r"\s*CREATE\s+TABLE\b",
    },
    BuiltinRule {
        name: "warehouse location",
        recommendation: "The managed warehouse moves to /warehouse/tablespace/managed/hive; external tables default to /warehouse/tablespace/external/hive",
        mode: MatchMode::Search,
        pattern: r"/user/hive/warehouse|hive\.metastore\.warehouse\.dir",
    },
    BuiltinRule {
        name: "strict mode",
        recommendation: "hive.mapred.mode is removed; use the hive.strict.checks.* properties",
        mode: MatchMode::Search,
        pattern: r"hive\.mapred\.mode",
    },
    BuiltinRule {
        name: "mapreduce queue",
        recommendation: "Set the YARN queue with tez.queue.name",
        mode: MatchMode::Search,
        pattern: r"mapred(uce)?\.job\.queue(name|\.name)",
    },
    BuiltinRule {
        name: "reducer count",
        recommendation: "mapred.reduce.tasks is ignored by Tez; tune hive.exec.reducers.bytes.per.reducer and hive.exec.reducers.max",
        mode: MatchMode::Search,
        pattern: r"mapred(uce)?\.(reduce\.tasks|job\.reduces)\s*=",
    },
    BuiltinRule {
        name: "concurrency disabled",
        recommendation: "ACID tables require hive.support.concurrency=true",
        mode: MatchMode::Search,
        pattern: r"hive\.support\.concurrency\s*=\s*false",
    },
    BuiltinRule {
        name: "local jar",
        recommendation: "HiveServer2 cannot read jars from the client filesystem; use an HDFS path or hive.reloadable.aux.jars.path",
        mode: MatchMode::Match,
        pattern: r"\s*ADD\s+JARS?\s+(file://)?/",
    },
    BuiltinRule {
        name: "reserved keyword",
        recommendation: "TIME, NUMERIC and SYNC are reserved in Hive 3; enclose them in backticks when used as identifiers",
        mode: MatchMode::Search,
        pattern: r"\b(TIME|NUMERIC|SYNC)\b",
    },
    BuiltinRule {
        name: "index",
        recommendation: "Indexes are removed in Hive 3; use materialized views or ORC/Parquet statistics",
        mode: MatchMode::Search,
        pattern: r"\b(CREATE|DROP|ALTER)\s+INDEX\b",
    },
];

/// A compiled line rule.
#[derive(Debug, Clone)]
pub struct LineRule {
    pub name: String,
    pub recommendation: String,
    pub mode: MatchMode,
    regex: Regex,
}

impl LineRule {
    pub fn new(name: &str, recommendation: &str, mode: MatchMode, pattern: &str) -> Result<Self> {
        let anchored;
        let source = match mode {
            MatchMode::Match => {
                anchored = format!("^(?:{})", pattern);
                anchored.as_str()
            }
            MatchMode::Search => pattern,
        };
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid pattern for rule '{}'", name))?;
        Ok(Self {
            name: name.to_string(),
            recommendation: recommendation.to_string(),
            mode,
            regex,
        })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

/// Rule file format:
///
/// ```toml
/// replace_builtin = false
///
/// [[rules]]
/// name = "bucketing"
/// recommendation = "Bucketing version 2 is the default in Hive 3"
/// mode = "search"
/// pattern = "CLUSTERED\\s+BY"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub replace_builtin: bool,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub recommendation: String,
    #[serde(default = "default_mode")]
    pub mode: MatchMode,
    pub pattern: String,
}

fn default_mode() -> MatchMode {
    MatchMode::Search
}

pub fn builtin_rules() -> Vec<LineRule> {
    HIVE3_RULES
        .iter()
        .filter_map(|r| LineRule::new(r.name, r.recommendation, r.mode, r.pattern).ok())
        .collect()
}

pub fn load_rule_file(path: &Path) -> Result<RuleFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule file '{}'", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse rule file '{}'", path.display()))
}

/// Built-in rules, extended or replaced by the rules of `file`.
pub fn load_rules(file: Option<&Path>) -> Result<Vec<LineRule>> {
    let Some(path) = file else {
        return Ok(builtin_rules());
    };
    let definitions = load_rule_file(path)?;
    let mut rules = if definitions.replace_builtin {
        Vec::new()
    } else {
        builtin_rules()
    };
    for def in &definitions.rules {
        rules.push(LineRule::new(&def.name, &def.recommendation, def.mode, &def.pattern)?);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_compile() {
        assert_eq!(builtin_rules().len(), HIVE3_RULES.len());
    }

    #[test]
    fn test_match_mode_is_anchored() {
        let rule = LineRule::new("t", "r", MatchMode::Match, r"create\s+table").unwrap();
        assert!(rule.is_match("CREATE TABLE x (a int);"));
        assert!(!rule.is_match("-- then CREATE TABLE x"));

        let rule = LineRule::new("t", "r", MatchMode::Search, r"create\s+table").unwrap();
        assert!(rule.is_match("-- then CREATE TABLE x"));
    }

    #[test]
    fn test_load_rules_extend_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(
            &path,
            "[[rules]]\nname = \"bucketing\"\nrecommendation = \"check bucketing\"\npattern = \"CLUSTERED\\\\s+BY\"\n",
        )
        .unwrap();
        let rules = load_rules(Some(&path)).unwrap();
        assert_eq!(rules.len(), HIVE3_RULES.len() + 1);
        let last = rules.last().unwrap();
        assert_eq!(last.mode, MatchMode::Search);
        assert!(last.is_match("clustered by (id) into 8 buckets"));

        std::fs::write(
            &path,
            "replace_builtin = true\n[[rules]]\nname = \"x\"\nrecommendation = \"y\"\nmode = \"match\"\npattern = \"x\"\n",
        )
        .unwrap();
        assert_eq!(load_rules(Some(&path)).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "[[rules]]\nname = \"bad\"\nrecommendation = \"r\"\npattern = \"(\"\n").unwrap();
        let err = load_rules(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("bad"));
    }
}
