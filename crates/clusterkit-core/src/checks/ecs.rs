//! Host prerequisites for Embedded Container Service (ECS) nodes.

use super::CheckReport;
use crate::remote::{CommandOutput, RemoteShell};
use tracing::{debug, warn};

/// One prerequisite: a command, how to judge its output, and what to log
/// for a failing host. `None` as failure message logs the raw output.
pub struct EcsCheck {
    pub statement: &'static str,
    pub commands: &'static [&'static str],
    pub passes: fn(&[String]) -> bool,
    pub failure: Option<&'static str>,
}

fn first_contains_any(outputs: &[String], needles: &[&str]) -> bool {
    outputs
        .first()
        .is_some_and(|o| needles.iter().any(|n| o.contains(n)))
}

pub const ECS_CHECKS: &[EcsCheck] = &[
    EcsCheck {
        statement: "All ECS nodes have clean iptables",
        commands: &["sudo iptables -S | grep -v '^-P' | wc -l"],
        passes: |o| o.first().is_some_and(|s| s.trim() == "0"),
        failure: Some("Iptables are filled with rules"),
    },
    EcsCheck {
        statement: "All ECS nodes have scsi devices",
        commands: &["ls /sys/block | grep -v -E '^(sd|loop|sr|dm-)'"],
        passes: |o| o.first().is_some_and(|s| s.trim().is_empty()),
        failure: None,
    },
    EcsCheck {
        statement: "All ECS nodes have devices with ftype=1",
        commands: &["sudo xfs_info / | grep -o 'ftype=[01]'"],
        passes: |o| o.first().is_some_and(|s| s.trim() == "ftype=1"),
        failure: None,
    },
    EcsCheck {
        statement: "All ECS nodes are not running firewalld",
        commands: &["systemctl status firewalld.service | grep Active"],
        passes: |o| first_contains_any(o, &["inactive", "could not be found"]),
        failure: Some("Firewalld is Running"),
    },
    EcsCheck {
        statement: "All ECS nodes are running either NTP or Chronyd",
        commands: &[
            "systemctl status chronyd.service | grep Active",
            "systemctl status ntpd.service | grep Active",
        ],
        passes: |o| o.iter().any(|s| s.contains("running")),
        failure: Some("Chronyd/NTPD is not running"),
    },
    EcsCheck {
        statement: "All ECS nodes have vm.swappiness=1",
        commands: &["cat /etc/sysctl.conf | grep vm.swappiness"],
        passes: |o| {
            o.first().is_some_and(|s| {
                s.lines()
                    .filter(|l| !l.trim_start().starts_with('#'))
                    .any(|l| l.split('=').nth(1).map(str::trim) == Some("1"))
            })
        },
        failure: None,
    },
    EcsCheck {
        statement: "All ECS nodes have nfs utils installed",
        commands: &["rpm -qa | grep nfs-utils"],
        passes: |o| first_contains_any(o, &["nfs-utils"]),
        failure: Some("NFS Utility needs to be installed"),
    },
    EcsCheck {
        statement: "All ECS nodes have SE Linux disabled",
        commands: &["sestatus"],
        passes: |o| first_contains_any(o, &["disabled", "permissive", "command not found"]),
        failure: Some("SE Linux needs to be set to disabled or permissive"),
    },
];

pub const POSTGRES_SSL_COMMAND: &str =
    "cat /var/lib/pgsql/10/data/postgresql.conf | grep \"ssl =\"";

fn output_text(output: anyhow::Result<CommandOutput>, host: &str) -> String {
    match output {
        Ok(o) => o.combined(),
        Err(e) => {
            warn!(host, error = %e, "ECS check command failed");
            String::new()
        }
    }
}

/// Run every ECS check on every host; one summary row per check.
pub fn run(hosts: &[String], db_host: Option<&str>, shell: &dyn RemoteShell) -> CheckReport {
    let mut report = CheckReport::new();
    for check in ECS_CHECKS {
        let mut ok = !hosts.is_empty();
        for host in hosts {
            let outputs: Vec<String> = check
                .commands
                .iter()
                .map(|cmd| output_text(shell.run(host, cmd), host))
                .collect();
            debug!(host, check = check.statement, ?outputs, "ECS check");
            if !(check.passes)(&outputs) {
                ok = false;
                let message = match check.failure {
                    Some(m) => m.to_string(),
                    None => outputs.join(" ").trim().to_string(),
                };
                report.add_error(host, message);
            }
        }
        report.add_verdict(check.statement, ok);
    }

    if let Some(db) = db_host {
        let line = output_text(shell.run(db, POSTGRES_SSL_COMMAND), db);
        let encrypted = line
            .lines()
            .filter(|l| !l.trim_start().starts_with('#'))
            .any(|l| l.split('#').next().map(str::trim) == Some("ssl = on"));
        report.add_verdict("The ECS Cluster Postgres DB is Encrypted", encrypted);
    }
    report
}
