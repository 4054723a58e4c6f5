//! Pre-install and upgrade compatibility checks.
//!
//! Every check appends to a [`CheckReport`]: one summary statement with a
//! verdict, plus per-host error rows explaining failures. The security scan
//! adds TLS and Kerberos parameter rows.

pub mod base;
pub mod ecs;
pub mod security;
pub mod versions;

use crate::report::workbook::{Sheet, Workbook};
use serde::Serialize;

pub const WORKBOOK_NAME: &str = "Version_Check";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub statement: String,
    pub result: String,
}

impl SummaryRow {
    pub fn passed(&self) -> bool {
        self.result == "Yes"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostError {
    pub host: String,
    pub message: String,
}

/// A configuration parameter found by the security scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigRow {
    pub service: String,
    pub parameter: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub summary: Vec<SummaryRow>,
    pub errors: Vec<HostError>,
    pub tls: Vec<ConfigRow>,
    pub kerberos: Vec<ConfigRow>,
}

impl CheckReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_summary(&mut self, statement: impl Into<String>, result: impl Into<String>) {
        self.summary.push(SummaryRow {
            statement: statement.into(),
            result: result.into(),
        });
    }

    pub fn add_verdict(&mut self, statement: impl Into<String>, ok: bool) {
        self.add_summary(statement, versions::yes_no(ok));
    }

    pub fn add_error(&mut self, host: impl Into<String>, message: impl Into<String>) {
        self.errors.push(HostError {
            host: host.into(),
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: CheckReport) {
        self.summary.extend(other.summary);
        self.errors.extend(other.errors);
        self.tls.extend(other.tls);
        self.kerberos.extend(other.kerberos);
    }

    pub fn result_of(&self, statement: &str) -> Option<&str> {
        self.summary
            .iter()
            .find(|r| r.statement == statement)
            .map(|r| r.result.as_str())
    }

    pub fn failed_count(&self) -> usize {
        self.summary.iter().filter(|r| r.result == "No").count()
    }

    pub fn to_workbook(&self) -> Workbook {
        let mut wb = Workbook::new(WORKBOOK_NAME);

        let mut summary = Sheet::new("Status Summary", &["Check", "Result"]);
        for r in &self.summary {
            summary.push_text(&[&r.statement, &r.result]);
        }
        wb.add_sheet(summary);

        let mut errors = Sheet::new("Incompatible Versions Error Log", &["Hostname", "Error on Host"]);
        for e in &self.errors {
            errors.push_text(&[&e.host, &e.message]);
        }
        wb.add_sheet(errors);

        let mut tls = Sheet::new(
            "TLS Service Level Info",
            &["Name of Service", "SSL Parameter Name", "SSL Enabled?"],
        );
        for r in &self.tls {
            tls.push_text(&[&r.service, &r.parameter, &r.value]);
        }
        wb.add_sheet(tls);

        let mut kerberos = Sheet::new(
            "Kerberos Information",
            &["Name of Service", "Kerberos Parameter Name", "Kerberos Parameter Value"],
        );
        for r in &self.kerberos {
            kerberos.push_text(&[&r.service, &r.parameter, &r.value]);
        }
        wb.add_sheet(kerberos);

        wb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workbook_sheets() {
        let mut report = CheckReport::new();
        report.add_verdict("Cluster 1 is TLS Secured", true);
        report.add_verdict("Cluster 1 has Kerberos enabled", false);
        report.add_error("node1", "Unsupported OS: Ubuntu 20.04");
        report.tls.push(ConfigRow {
            service: "HDFS".to_string(),
            parameter: "hdfs_hadoop_ssl_enabled".to_string(),
            value: "true".to_string(),
        });

        let wb = report.to_workbook();
        let names: Vec<_> = wb.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Status Summary",
                "Incompatible Versions Error Log",
                "TLS Service Level Info",
                "Kerberos Information"
            ]
        );
        assert_eq!(wb.sheet("Status Summary").unwrap().column("Result"), vec!["Yes", "No"]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.result_of("Cluster 1 is TLS Secured"), Some("Yes"));
    }

    #[test]
    fn test_merge() {
        let mut a = CheckReport::new();
        a.add_verdict("x", true);
        let mut b = CheckReport::new();
        b.add_error("node1", "boom");
        a.merge(b);
        assert_eq!(a.summary.len(), 1);
        assert_eq!(a.errors.len(), 1);
    }
}
