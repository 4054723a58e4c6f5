use colored::*;
use clusterkit_core::checks::CheckReport;
use clusterkit_core::config_push::PushResult;
use clusterkit_core::discovery::ModuleOutcome;
use clusterkit_core::hdfs::HdfsReport;
use clusterkit_core::hive_scan::Finding;
use clusterkit_core::smoke::{SmokeReport, TestResult, TestStatus};
use clusterkit_core::Workbook;
use std::path::Path;

fn header(title: &str) {
    println!();
    println!(
        "{}",
        format!(" clusterkit v{} — {}", env!("CARGO_PKG_VERSION"), title).bold()
    );
    println!();
}

fn separator() {
    println!(" {}", "=".repeat(60).dimmed());
}

fn failures(n: usize) -> String {
    if n > 0 {
        n.to_string().red().bold().to_string()
    } else {
        "0".to_string()
    }
}

/// Sheets and row counts of a written workbook.
pub fn print_workbook_written(workbook: &Workbook, path: &Path) {
    header(&format!("Workbook {}", workbook.name));
    for sheet in &workbook.sheets {
        println!(
            " {} {:<40} {} rows",
            "|-".dimmed(),
            sheet.name,
            sheet.len()
        );
    }
    println!();
    println!(" Written to {}", path.display().to_string().cyan());
    println!();
}

pub fn print_check_report(report: &CheckReport) {
    header("Compatibility checks");
    println!(" {}", "Status Summary".bold().underline());
    for row in &report.summary {
        let tag = match row.result.as_str() {
            "Yes" => " PASS ".on_green().black().bold().to_string(),
            "No" => " FAIL ".on_red().white().bold().to_string(),
            _ => " INFO ".on_blue().white().to_string(),
        };
        if row.result == "Yes" || row.result == "No" {
            println!(" {} {}", tag, row.statement);
        } else {
            println!(" {} {}: {}", tag, row.statement, row.result.cyan());
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!(" {}", "Incompatible Versions Error Log".bold().underline());
        for error in &report.errors {
            println!("   {} {} {}", "|".dimmed(), error.host.yellow(), error.message);
        }
    }

    if !report.tls.is_empty() || !report.kerberos.is_empty() {
        println!();
        println!(
            " {} TLS parameters, {} Kerberos parameters collected",
            report.tls.len(),
            report.kerberos.len()
        );
    }

    println!();
    separator();
    let failed = report.failed_count();
    println!(
        " Result: {} ({} of {} checks failed)",
        if failed == 0 {
            "PASS".green().bold().to_string()
        } else {
            "FAIL".red().bold().to_string()
        },
        failures(failed),
        report.summary.len()
    );
    println!();
}

pub fn print_discovery_outcomes<M: std::fmt::Display>(outcomes: &[ModuleOutcome<M>], bundle: &Path) {
    header("Discovery bundle");
    for outcome in outcomes {
        match &outcome.error {
            None => println!(" {} {}", " OK ".on_green().black().bold(), outcome.module),
            Some(e) => {
                println!(" {} {}", " FAIL ".on_red().white().bold(), outcome.module);
                println!("   {} {}", "|".dimmed(), e.dimmed());
            }
        }
    }
    println!();
    print_bundle_written(bundle);
}

pub fn print_bundle_written(bundle: &Path) {
    println!(" Bundle written to {}", bundle.display().to_string().cyan());
    println!(
        " Run {} to build the report",
        format!("clusterkit report --bundle {} --output <dir>", bundle.display()).cyan()
    );
    println!();
}

pub fn print_hdfs_report(report: &HdfsReport, structure: &Path, modtime: &Path) {
    header(&format!("HDFS report for {}", report.cluster_name));
    println!(" {}", "Top-level directories".bold().underline());
    for summary in report.structure.iter().filter(|s| s.depth <= 1) {
        println!(
            " {} {:<40} {:>10} files {:>8} dirs {:>14} bytes",
            "|-".dimmed(),
            summary.path,
            summary.counters.file_count,
            summary.counters.directory_count,
            summary.counters.file_size
        );
    }
    println!();
    println!(
        " {} days with modifications",
        report.modification_times.len()
    );
    println!(" Structure report:    {}", structure.display().to_string().cyan());
    println!(" Modification times:  {}", modtime.display().to_string().cyan());
    println!();
}

pub fn print_push_results(results: &[PushResult], dry_run: bool) {
    header(if dry_run {
        "Configuration push (dry run)"
    } else {
        "Configuration push"
    });
    for result in results {
        let tag = if result.success {
            " OK ".on_green().black().bold().to_string()
        } else {
            " FAIL ".on_red().white().bold().to_string()
        };
        println!(" {} {}", tag, result.update.message);
        for config in &result.update.configs {
            println!(
                "   {} {} = {}",
                "|".dimmed(),
                config.name,
                config.value.as_deref().unwrap_or_default().dimmed()
            );
        }
        if let Some(error) = &result.error {
            println!("   {} {}", "|".dimmed(), error.red());
        }
    }
    println!();
    let failed = results.iter().filter(|r| !r.success).count();
    println!(
        " {} updates, {} failed",
        results.len(),
        failures(failed)
    );
    println!();
}

pub fn print_hive_findings(findings: &[Finding], csv: &Path) {
    header("Hive 3 conversion scan");
    if findings.is_empty() {
        println!(" {} No Hive 3 conversion issues found!", "OK".green().bold());
    } else {
        let mut current = "";
        for finding in findings {
            if finding.file_name != current {
                current = finding.file_name.as_str();
                println!(" {}", current.bold());
            }
            println!(
                "   {} line {:<5} [{}] {}",
                "|".dimmed(),
                finding.line_number,
                finding.problematic_search.yellow(),
                finding.recommendation
            );
        }
    }
    println!();
    println!(" {} findings written to {}", findings.len(), csv.display().to_string().cyan());
    println!();
}

fn print_test_result(result: &TestResult) {
    let tag = match result.status {
        TestStatus::Pass => " PASS ".on_green().black().bold().to_string(),
        TestStatus::Fail => " FAIL ".on_red().white().bold().to_string(),
        TestStatus::Skipped => " SKIP ".on_yellow().black().to_string(),
    };
    println!(" {} [{}] {}", tag, result.service.dimmed(), result.test);
    if let Some(detail) = &result.detail {
        println!("   {} {}", "|".dimmed(), detail.dimmed());
    }
}

pub fn print_smoke_report(report: &SmokeReport) {
    header(&format!("Smoke test of {}", report.cluster));
    println!(" {}", "Service commands".bold().underline());
    report.commands.iter().for_each(print_test_result);
    println!();
    println!(" {}", "Web UIs".bold().underline());
    report.ui.iter().for_each(print_test_result);
    println!();
    separator();
    let total = report.commands.len() + report.ui.len();
    println!(
        " {} tests, {} failed",
        total,
        failures(report.failed_count())
    );
    println!();
}
