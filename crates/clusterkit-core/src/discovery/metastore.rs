//! Hive metastore tables and Sentry privileges, read straight from the
//! backing databases with their command-line clients (`psql`, `mysql`).

use super::command::run_with_env;
use super::DiscoveryContext;
use crate::config::DatabaseSettings;
use crate::model::cm::{find_config, ApiCluster, ApiConfig, ApiService};
use crate::report::workbook::Sheet;
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const HIVE_MS_FILE: &str = "hive_ms.csv";
pub const SENTRY_POLICIES_FILE: &str = "sentry_policies.csv";

const HMS_POSTGRES: &str = r#"select "NAME" as "DB_NAME", "TBL_NAME", "PART_NAME" IS NOT NULL as "IS_PARTITIONED", "PKEY_NAME", count("PKEY_NAME") as "PARTITION_COUNT", "TBL_TYPE", "DB_LOCATION_URI", "LOCATION" from "TBLS" join "DBS" on "DBS"."DB_ID"="TBLS"."DB_ID" left join "PARTITIONS" on "TBLS"."TBL_ID"="PARTITIONS"."TBL_ID" left join "PARTITION_KEYS" on "PARTITION_KEYS"."TBL_ID"="TBLS"."TBL_ID" left join "SDS" on "TBLS"."SD_ID"="SDS"."SD_ID" group by "NAME", "TBL_NAME", "PART_NAME" IS NOT NULL, "PKEY_NAME", "TBL_TYPE", "DB_LOCATION_URI", "LOCATION";"#;

const HMS_MYSQL: &str = "select name as DB_NAME, tbl_name as TBL_NAME, PART_NAME IS NOT NULL as IS_PARTITIONED, PKEY_NAME, count(PKEY_NAME) as PARTITION_COUNT, tbl_type as TBL_TYPE, db_location_uri as DB_LOCATION_URI, LOCATION from TBLS join DBS on TBLS.db_id=DBS.db_id left join PARTITIONS on TBLS.tbl_id=PARTITIONS.tbl_id left join PARTITION_KEYS on PARTITION_KEYS.tbl_id=TBLS.tbl_id left join SDS on TBLS.SD_ID=SDS.SD_ID group by name, tbl_name, PART_NAME IS NOT NULL, PKEY_NAME, tbl_type, db_location_uri, LOCATION;";

/// User grants, role grants on Hive objects and generic-model (Solr, Kafka)
/// role grants, in one column layout.
const SENTRY_MYSQL: &str = "(select 'HIVE' as SERVICE_TYPE, u.USER_NAME, null as GROUP_NAME, null as ROLE_NAME, p.PRIVILEGE_SCOPE, p.SERVER_NAME, p.DB_NAME, p.TABLE_NAME, p.COLUMN_NAME, null as RESOURCE_NAME_0, null as RESOURCE_NAME_1, null as RESOURCE_NAME_2, null as RESOURCE_NAME_3, null as RESOURCE_TYPE_0, null as RESOURCE_TYPE_1, null as RESOURCE_TYPE_2, null as RESOURCE_TYPE_3, p.URI, p.ACTION, p.WITH_GRANT_OPTION from SENTRY_USER u join SENTRY_USER_DB_PRIVILEGE_MAP up on up.USER_ID = u.USER_ID join SENTRY_DB_PRIVILEGE p on p.DB_PRIVILEGE_ID = up.DB_PRIVILEGE_ID) \
UNION ALL (select 'HIVE' as SERVICE_TYPE, null as USER_NAME, g.GROUP_NAME, r.ROLE_NAME, p.PRIVILEGE_SCOPE, p.SERVER_NAME, p.DB_NAME, p.TABLE_NAME, p.COLUMN_NAME, null as RESOURCE_NAME_0, null as RESOURCE_NAME_1, null as RESOURCE_NAME_2, null as RESOURCE_NAME_3, null as RESOURCE_TYPE_0, null as RESOURCE_TYPE_1, null as RESOURCE_TYPE_2, null as RESOURCE_TYPE_3, p.URI, p.ACTION, p.WITH_GRANT_OPTION from SENTRY_ROLE_GROUP_MAP rg join SENTRY_ROLE r on r.ROLE_ID = rg.ROLE_ID join SENTRY_ROLE_DB_PRIVILEGE_MAP rp on rp.ROLE_ID = r.ROLE_ID join SENTRY_DB_PRIVILEGE p on p.DB_PRIVILEGE_ID = rp.DB_PRIVILEGE_ID join SENTRY_GROUP g on g.GROUP_ID = rg.GROUP_ID) \
UNION ALL (select upper(p.COMPONENT_NAME) as SERVICE_TYPE, null as USER_NAME, g.GROUP_NAME, r.ROLE_NAME, upper(p.SCOPE) as PRIVILEGE_SCOPE, null as SERVER_NAME, null as DB_NAME, null as TABLE_NAME, null as COLUMN_NAME, p.RESOURCE_NAME_0, p.RESOURCE_NAME_1, p.RESOURCE_NAME_2, p.RESOURCE_NAME_3, p.RESOURCE_TYPE_0, p.RESOURCE_TYPE_1, p.RESOURCE_TYPE_2, p.RESOURCE_TYPE_3, null as URI, p.ACTION, p.WITH_GRANT_OPTION from SENTRY_GROUP g join SENTRY_ROLE_GROUP_MAP rg on rg.GROUP_ID = g.GROUP_ID join SENTRY_ROLE r on r.ROLE_ID = rg.ROLE_ID join SENTRY_ROLE_GM_PRIVILEGE_MAP rp on rp.ROLE_ID = r.ROLE_ID join SENTRY_GM_PRIVILEGE p on p.GM_PRIVILEGE_ID = rp.GM_PRIVILEGE_ID);";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Postgres,
    Mysql,
}

impl DbKind {
    pub fn parse(db_type: &str) -> Result<Self> {
        match db_type.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DbKind::Postgres),
            "mysql" | "mariadb" => Ok(DbKind::Mysql),
            "oracle" => anyhow::bail!("Oracle databases are not supported, only PostgreSQL, MySQL and MariaDB"),
            other => anyhow::bail!("Unsupported database type: {}", other),
        }
    }
}

/// Which catalog a dump reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    HiveMetastore,
    Sentry,
}

impl Catalog {
    fn config_prefix(self) -> &'static str {
        match self {
            Catalog::HiveMetastore => "hive_metastore_database",
            Catalog::Sentry => "sentry_server_database",
        }
    }

    /// Role type marking the service that owns the database settings.
    pub fn role_type(self) -> &'static str {
        match self {
            Catalog::HiveMetastore => "HIVEMETASTORE",
            Catalog::Sentry => "SENTRY_SERVER",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Catalog::HiveMetastore => HIVE_MS_FILE,
            Catalog::Sentry => SENTRY_POLICIES_FILE,
        }
    }

    pub fn query(self, kind: DbKind) -> Result<&'static str> {
        match (self, kind) {
            (Catalog::HiveMetastore, DbKind::Postgres) => Ok(HMS_POSTGRES),
            (Catalog::HiveMetastore, DbKind::Mysql) => Ok(HMS_MYSQL),
            (Catalog::Sentry, DbKind::Mysql) => Ok(SENTRY_MYSQL),
            (Catalog::Sentry, DbKind::Postgres) => {
                anyhow::bail!("Sentry policies can only be read from MySQL or MariaDB")
            }
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Catalog::HiveMetastore => f.write_str("Hive metastore"),
            Catalog::Sentry => f.write_str("Sentry"),
        }
    }
}

#[derive(Clone)]
pub struct DbConnection {
    pub kind: DbKind,
    pub host: String,
    pub port: Option<String>,
    pub name: String,
    pub user: String,
    password: String,
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// A database client invocation. `env` carries the password.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientCommand {
    pub program: &'static str,
    pub args: Vec<String>,
    pub env: Vec<(&'static str, String)>,
}

impl DbConnection {
    /// Connection settings from the `<prefix>_{type,host,port,name,user,password}`
    /// service configs.
    pub fn from_configs(configs: &[ApiConfig], catalog: Catalog) -> Result<Self> {
        let prefix = catalog.config_prefix();
        let value = |suffix: &str| -> Result<String> {
            let name = format!("{}_{}", prefix, suffix);
            find_config(configs, &name)
                .and_then(|c| c.effective_value())
                .map(str::to_string)
                .with_context(|| format!("Config value is not found for {}", name))
        };
        Ok(Self {
            kind: DbKind::parse(&value("type")?)?,
            host: value("host")?,
            port: value("port").ok(),
            name: value("name")?,
            user: value("user")?,
            password: value("password").unwrap_or_default(),
        })
    }

    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self> {
        Ok(Self {
            kind: DbKind::parse(&settings.db_type)?,
            host: settings.host.clone(),
            port: settings.port.map(|p| p.to_string()),
            name: settings.name.clone(),
            user: settings.user.clone(),
            password: settings.password.clone().unwrap_or_default(),
        })
    }

    /// `query` through `psql` or `mysql`, printing a tab-separated header
    /// row followed by the rows.
    pub fn client_command(&self, query: &str) -> ClientCommand {
        let mut args = Vec::new();
        match self.kind {
            DbKind::Postgres => {
                args.extend(["-X", "-h", self.host.as_str()].map(String::from));
                if let Some(port) = &self.port {
                    args.extend(["-p".to_string(), port.clone()]);
                }
                args.extend(
                    [
                        "-U",
                        self.user.as_str(),
                        "-d",
                        self.name.as_str(),
                        "-A",
                        "-F",
                        "\t",
                        "-P",
                        "footer=off",
                        "-v",
                        "ON_ERROR_STOP=1",
                        "-c",
                        query,
                    ]
                    .map(String::from),
                );
                ClientCommand {
                    program: "psql",
                    args,
                    env: vec![("PGPASSWORD", self.password.clone())],
                }
            }
            DbKind::Mysql => {
                args.extend(["-h", self.host.as_str()].map(String::from));
                if let Some(port) = &self.port {
                    args.extend(["-P".to_string(), port.clone()]);
                }
                args.extend(["-u", self.user.as_str(), "--batch", "-e", query, self.name.as_str()].map(String::from));
                ClientCommand {
                    program: "mysql",
                    args,
                    env: vec![("MYSQL_PWD", self.password.clone())],
                }
            }
        }
    }
}

/// Undo `mysql --batch` escaping and map its `NULL` to an empty field.
fn mysql_field(raw: &str) -> String {
    if raw == "NULL" {
        return String::new();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Header and rows of the client's tab-separated output.
pub fn parse_client_output(kind: DbKind, stdout: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut lines = stdout.lines().filter(|l| !l.is_empty());
    let Some(header) = lines.next() else {
        return (Vec::new(), Vec::new());
    };
    let header = header.split('\t').map(str::to_string).collect();
    let rows = lines
        .map(|line| {
            line.split('\t')
                .map(|field| match kind {
                    DbKind::Mysql => mysql_field(field),
                    DbKind::Postgres => field.to_string(),
                })
                .collect()
        })
        .collect();
    (header, rows)
}

/// Run the `catalog` query against `conn` and write `<out_dir>/<file>`.
pub async fn dump(conn: &DbConnection, catalog: Catalog, out_dir: &Path) -> Result<PathBuf> {
    let query = catalog.query(conn.kind)?;
    let command = conn.client_command(query);
    debug!(host = %conn.host, database = %conn.name, catalog = %catalog, "connecting to database");
    let env: Vec<(&str, &str)> = command.env.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let output = run_with_env(command.program, &command.args, &env).await?;
    if !output.success() {
        anyhow::bail!(
            "{} query against {} on {} failed: {}",
            catalog,
            conn.name,
            conn.host,
            output.stderr.trim()
        );
    }
    let (header, rows) = parse_client_output(conn.kind, &output.stdout);
    let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();
    let mut sheet = Sheet::new(catalog.file_name(), &header_refs);
    for row in &rows {
        sheet.push_text(row.as_slice());
    }
    let path = out_dir.join(catalog.file_name());
    sheet.write_csv(&path)?;
    info!(catalog = %catalog, rows = rows.len(), path = %path.display(), "database dump written");
    Ok(path)
}

async fn dump_service(ctx: &DiscoveryContext, cluster: &ApiCluster, service: &ApiService, catalog: Catalog) -> Result<()> {
    let configs = ctx
        .cm
        .read_service_config(&cluster.name, &service.name, "FULL")
        .await
        .with_context(|| format!("Failed to read the configuration of '{}'", service.name))?;
    let conn = DbConnection::from_configs(&configs, catalog)?;
    dump(&conn, catalog, &ctx.layout.workload_service_dir(cluster.label(), &service.name)).await?;
    Ok(())
}

/// Dump `catalog` for every service running its role. Each service is
/// attempted; the failures are reported together.
pub async fn collect(ctx: &DiscoveryContext, catalog: Catalog) -> Result<()> {
    info!(catalog = %catalog, "database extraction started");
    let deployment = ctx
        .cm
        .deployment(ctx.export_view())
        .await
        .context("Failed to read the CM deployment")?;
    let mut attempted = 0;
    let mut failures = Vec::new();
    for cluster in &deployment.clusters {
        let owners = cluster
            .services
            .iter()
            .filter(|s| s.roles.iter().any(|r| r.role_type == catalog.role_type()));
        for service in owners {
            attempted += 1;
            debug!(cluster = %cluster.label(), service = %service.name, catalog = %catalog, "service owns the database");
            if let Err(e) = dump_service(ctx, cluster, service, catalog).await {
                error!(cluster = %cluster.label(), service = %service.name, error = %format!("{:#}", e), "database dump failed");
                failures.push(format!("{}/{}: {:#}", cluster.label(), service.name, e));
            }
        }
    }
    if attempted == 0 {
        info!(catalog = %catalog, "no service with a {} role", catalog.role_type());
    }
    if !failures.is_empty() {
        anyhow::bail!("{} of {} {} dumps failed: {}", failures.len(), attempted, catalog, failures.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hive_configs() -> Vec<ApiConfig> {
        vec![
            ApiConfig::new("hive_metastore_database_type", "postgresql"),
            ApiConfig::new("hive_metastore_database_host", "db1.example.com"),
            ApiConfig {
                name: "hive_metastore_database_port".to_string(),
                value: None,
                default: Some("5432".to_string()),
                sensitive: None,
            },
            ApiConfig::new("hive_metastore_database_name", "metastore"),
            ApiConfig::new("hive_metastore_database_user", "hive"),
            ApiConfig::new("hive_metastore_database_password", "s3cret"),
        ]
    }

    #[test]
    fn test_db_kind_parse() {
        assert_eq!(DbKind::parse("postgresql").unwrap(), DbKind::Postgres);
        assert_eq!(DbKind::parse("MariaDB").unwrap(), DbKind::Mysql);
        assert!(DbKind::parse("oracle").unwrap_err().to_string().contains("not supported"));
        assert!(DbKind::parse("db2").is_err());
    }

    #[test]
    fn test_connection_from_service_configs() {
        let conn = DbConnection::from_configs(&hive_configs(), Catalog::HiveMetastore).unwrap();
        assert_eq!(conn.kind, DbKind::Postgres);
        assert_eq!(conn.port.as_deref(), Some("5432"));
        assert_eq!(conn.name, "metastore");
        assert!(!format!("{:?}", conn).contains("s3cret"));

        let err = DbConnection::from_configs(&hive_configs(), Catalog::Sentry).unwrap_err();
        assert!(err.to_string().contains("sentry_server_database_type"));
    }

    #[test]
    fn test_psql_command() {
        let conn = DbConnection::from_configs(&hive_configs(), Catalog::HiveMetastore).unwrap();
        let cmd = conn.client_command("select 1;");
        assert_eq!(cmd.program, "psql");
        assert_eq!(&cmd.args[..5], &["-X", "-h", "db1.example.com", "-p", "5432"]);
        assert_eq!(cmd.args.last().map(String::as_str), Some("select 1;"));
        assert!(cmd.args.iter().any(|a| a == "footer=off"));
        assert_eq!(cmd.env, vec![("PGPASSWORD", "s3cret".to_string())]);
    }

    #[test]
    fn test_mysql_command_without_port() {
        let conn = DbConnection::from_settings(&DatabaseSettings {
            db_type: "mysql".to_string(),
            host: "db2.example.com".to_string(),
            port: None,
            name: "hive".to_string(),
            user: "hive".to_string(),
            password: Some("pw".to_string()),
        })
        .unwrap();
        let cmd = conn.client_command("select 1;");
        assert_eq!(cmd.program, "mysql");
        assert_eq!(
            cmd.args,
            vec!["-h", "db2.example.com", "-u", "hive", "--batch", "-e", "select 1;", "hive"]
        );
        assert_eq!(cmd.env, vec![("MYSQL_PWD", "pw".to_string())]);
    }

    #[test]
    fn test_parse_mysql_output() {
        let out = "DB_NAME\tTBL_NAME\tPKEY_NAME\tLOCATION\nsales\torders\tNULL\thdfs://ns1/warehouse/orders\nsales\tnotes\tdt\tC:\\\\data\\tx\n";
        let (header, rows) = parse_client_output(DbKind::Mysql, out);
        assert_eq!(header, vec!["DB_NAME", "TBL_NAME", "PKEY_NAME", "LOCATION"]);
        assert_eq!(rows[0][2], "");
        assert_eq!(rows[1][3], "C:\\data\tx");
    }

    #[test]
    fn test_parse_psql_output() {
        let out = "DB_NAME\tTBL_NAME\tIS_PARTITIONED\ndefault\tweb_logs\tt\n";
        let (header, rows) = parse_client_output(DbKind::Postgres, out);
        assert_eq!(header.len(), 3);
        assert_eq!(rows, vec![vec!["default", "web_logs", "t"]]);
        assert_eq!(parse_client_output(DbKind::Postgres, ""), (Vec::new(), Vec::new()));
    }

    #[test]
    fn test_catalog_queries() {
        assert!(Catalog::HiveMetastore.query(DbKind::Postgres).unwrap().contains(r#""TBLS""#));
        assert!(Catalog::Sentry.query(DbKind::Mysql).unwrap().contains("SENTRY_GM_PRIVILEGE"));
        assert!(Catalog::Sentry.query(DbKind::Postgres).is_err());
        assert_eq!(Catalog::Sentry.file_name(), "sentry_policies.csv");
    }
}
