//! Parsers for the version strings and command outputs the checks compare
//! against the supported-version lists.

use regex::Regex;
use std::sync::LazyLock;

static POSTGRES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PostgreSQL\)?\s+(\d+)(?:\.\d+)*").unwrap());
static MYSQL_DISTRIB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Distrib\s+(\d+)\.(\d+)").unwrap());
static MYSQL_VER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Ver\s+(\d+)\.(\d+)").unwrap());
static JAVA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"version\s+"(\d+)(?:\.(\d+))?[^"]*""#).unwrap());
static DF_GB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)G$").unwrap());

/// Major version from `postgres --version` / `psql --version`:
/// `postgres (PostgreSQL) 12.5` -> `12`.
pub fn postgres_major(output: &str) -> Option<String> {
    POSTGRES_RE.captures(output).map(|c| c[1].to_string())
}

/// `major.minor` from `mysql --version`, for both MySQL and MariaDB builds.
pub fn mysql_version(output: &str) -> Option<String> {
    MYSQL_DISTRIB_RE
        .captures(output)
        .or_else(|| MYSQL_VER_RE.captures(output))
        .map(|c| format!("{}.{}", &c[1], &c[2]))
}

pub fn is_mariadb(output: &str) -> bool {
    output.to_lowercase().contains("mariadb")
}

/// `major.minor` of the quoted version in `java -version` output:
/// `"1.8.0_292"` -> `1.8`, `"11.0.12"` -> `11.0`, `"17"` -> `17.0`.
pub fn java_version(output: &str) -> Option<String> {
    JAVA_RE.captures(output).map(|c| {
        let minor = c.get(2).map(|m| m.as_str()).unwrap_or("0");
        format!("{}.{}", &c[1], minor)
    })
}

/// First non-empty line of `/etc/redhat-release`.
pub fn os_release(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Available space in GB from `df -BG <dir>`. Counted from the end of the
/// last row (`Avail Use% Mounted`) since long device names wrap.
pub fn df_available_gb(output: &str) -> Option<u64> {
    let rows: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    if rows.len() < 2 {
        return None;
    }
    let last = rows[rows.len() - 1];
    let fields: Vec<&str> = last.split_whitespace().collect();
    let avail = fields.get(fields.len().checked_sub(3)?)?;
    DF_GB_RE.captures(avail)?.get(1)?.as_str().parse().ok()
}

/// Host of the CM database from `db.properties`, without the port.
pub fn db_host_from_properties(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() != "com.cloudera.cmf.db.host" {
            return None;
        }
        let host = value.trim();
        let host = host.split(':').next().unwrap_or(host);
        (!host.is_empty()).then(|| host.to_string())
    })
}

/// `Yes`/`No` cell text.
pub fn yes_no(ok: bool) -> &'static str {
    if ok {
        "Yes"
    } else {
        "No"
    }
}

pub fn is_supported(version: &str, supported: &[String]) -> bool {
    supported.iter().any(|v| v == version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_major() {
        assert_eq!(postgres_major("postgres (PostgreSQL) 12.5").as_deref(), Some("12"));
        assert_eq!(postgres_major("psql (PostgreSQL) 10.17").as_deref(), Some("10"));
        assert_eq!(postgres_major("command not found"), None);
    }

    #[test]
    fn test_mysql_version() {
        assert_eq!(
            mysql_version("mysql  Ver 15.1 Distrib 10.3.28-MariaDB, for Linux (x86_64)").as_deref(),
            Some("10.3")
        );
        assert_eq!(
            mysql_version("mysql  Ver 8.0.26 for Linux on x86_64 (MySQL Community Server - GPL)")
                .as_deref(),
            Some("8.0")
        );
        assert!(is_mariadb("Distrib 10.3.28-MariaDB"));
    }

    #[test]
    fn test_java_version() {
        let out = "openjdk version \"1.8.0_292\"\nOpenJDK Runtime Environment";
        assert_eq!(java_version(out).as_deref(), Some("1.8"));
        assert_eq!(java_version("java version \"11.0.12\" 2021-07-20 LTS").as_deref(), Some("11.0"));
        assert_eq!(java_version("openjdk version \"17\" 2021-09-14").as_deref(), Some("17.0"));
        assert_eq!(java_version("bash: java: command not found"), None);
    }

    #[test]
    fn test_os_release() {
        assert_eq!(
            os_release("\nCentOS Linux release 7.9.2009 (Core)\n").as_deref(),
            Some("CentOS Linux release 7.9.2009 (Core)")
        );
    }

    #[test]
    fn test_df_available_gb() {
        let out = "Filesystem     1G-blocks  Used Available Use% Mounted on\n\
                   /dev/sda1           100G   30G       70G  30% /\n";
        assert_eq!(df_available_gb(out), Some(70));
    }

    #[test]
    fn test_df_available_gb_wrapped_device() {
        let out = "Filesystem     1G-blocks  Used Available Use% Mounted on\n\
                   /dev/mapper/centos-root\n\
                   100G   88G       12G  88% /\n";
        assert_eq!(df_available_gb(out), Some(12));
    }

    #[test]
    fn test_db_host_from_properties() {
        let props = "com.cloudera.cmf.db.type=postgresql\ncom.cloudera.cmf.db.host=db1.example.com:5432\n";
        assert_eq!(db_host_from_properties(props).as_deref(), Some("db1.example.com"));
        assert_eq!(db_host_from_properties("com.cloudera.cmf.db.type=mysql"), None);
    }

    #[test]
    fn test_is_supported() {
        let supported = vec!["1.8".to_string(), "11.0".to_string()];
        assert!(is_supported("1.8", &supported));
        assert!(!is_supported("1.7", &supported));
        assert!(!is_supported("11", &supported));
    }
}
