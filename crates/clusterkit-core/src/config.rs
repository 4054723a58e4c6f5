use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "clusterkit.yml";

static MANAGER_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/:@\s]+:\d+/?$").unwrap());

/// Tool configuration loaded from `clusterkit.yml`.
///
/// Every section is optional. Commands complain about the individual values
/// they need (for example the Cloudera Manager URL) instead of the loader
/// rejecting a sparse file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cloudera_manager: CmSettings,
    #[serde(default)]
    pub ambari: AmbariSettings,
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub ecs: EcsSettings,
    #[serde(default)]
    pub checks: CheckSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub inventory: InventorySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmSettings {
    /// `https://cm-host:7183`, without the `/api/vNN` suffix.
    pub url: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    pub password: Option<String>,
    #[serde(default = "default_cm_api_version")]
    pub api_version: String,
    /// Most CM deployments use the self-signed Auto-TLS CA.
    #[serde(default)]
    pub verify_tls: bool,
    /// PEM bundle to trust in addition to the system roots.
    pub ca_cert: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CmSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: default_username(),
            password: None,
            api_version: default_cm_api_version(),
            verify_tls: false,
            ca_cert: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbariSettings {
    /// `http://ambari-host:8080` or `https://ambari-host:8443`.
    pub url: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    pub password: Option<String>,
    #[serde(default)]
    pub verify_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ranger admin server whose policies are exported.
    pub ranger: Option<RangerSettings>,
    /// Hive metastore database; Ambari does not expose its password.
    pub hive_metastore: Option<DatabaseSettings>,
    /// Client configuration used for `hdfs` commands on the edge node.
    #[serde(default = "default_hadoop_conf_dir")]
    pub hadoop_conf_dir: PathBuf,
}

impl Default for AmbariSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: default_username(),
            password: None,
            verify_tls: false,
            timeout_secs: default_timeout_secs(),
            ranger: None,
            hive_metastore: None,
            hadoop_conf_dir: default_hadoop_conf_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangerSettings {
    /// `http://ranger-host:6080`.
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// `postgresql`, `mysql` or `mariadb`.
    pub db_type: String,
    pub host: String,
    pub port: Option<u16>,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    #[serde(default)]
    pub disable_strict_host_key_checking: bool,
    /// Seconds ssh waits for a connection; 0 leaves ssh's own default.
    #[serde(default = "default_ssh_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_ssh_connect_timeout() -> u64 {
    10
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: None,
            identity_file: None,
            disable_strict_host_key_checking: false,
            connect_timeout_secs: default_ssh_connect_timeout(),
        }
    }
}

/// Data Services (ECS) hosts for the pre-install checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcsSettings {
    #[serde(default)]
    pub hosts: Vec<String>,
    pub db_host: Option<String>,
}

/// Supported-version matrices used by the compatibility checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSettings {
    #[serde(default = "default_postgres_versions")]
    pub postgres_versions: Vec<String>,
    #[serde(default = "default_mysql_versions")]
    pub mysql_versions: Vec<String>,
    #[serde(default = "default_mariadb_versions")]
    pub mariadb_versions: Vec<String>,
    #[serde(default = "default_java_versions")]
    pub java_versions: Vec<String>,
    #[serde(default = "default_os_releases")]
    pub os_releases: Vec<String>,
    #[serde(default = "default_hue_python_versions")]
    pub hue_python_versions: Vec<String>,
    #[serde(default = "default_required_services")]
    pub required_services: Vec<String>,
    #[serde(default = "default_parcel_dir")]
    pub parcel_dir: String,
    #[serde(default = "default_parcel_min_free_gb")]
    pub parcel_min_free_gb: u64,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            postgres_versions: default_postgres_versions(),
            mysql_versions: default_mysql_versions(),
            mariadb_versions: default_mariadb_versions(),
            java_versions: default_java_versions(),
            os_releases: default_os_releases(),
            hue_python_versions: default_hue_python_versions(),
            required_services: default_required_services(),
            parcel_dir: default_parcel_dir(),
            parcel_min_free_gb: default_parcel_min_free_gb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_time_range_days")]
    pub time_range_days: u32,
    /// Export the deployment with `EXPORT_REDACTED` and mask sensitive
    /// configuration values in reports.
    #[serde(default = "default_true")]
    pub redact_sensitive: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Scratch space for downloaded client configurations.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            time_range_days: default_time_range_days(),
            redact_sensitive: true,
            poll_interval_secs: default_poll_interval_secs(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Environment name to Cloudera Manager host, used by the Ansible inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default)]
    pub environments: BTreeMap<String, String>,
}

impl InventorySettings {
    /// CM URL for environment `name`. Entries are either a full URL or a
    /// bare host, which gets the default TLS port.
    pub fn cm_url(&self, name: &str) -> Result<String> {
        let entry = self.environments.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.environments.keys().map(String::as_str).collect();
            anyhow::anyhow!(
                "Unknown environment '{}'. Configured: {}",
                name,
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            )
        })?;
        if entry.contains("://") {
            Ok(entry.clone())
        } else {
            Ok(format!("https://{}:7183", entry))
        }
    }
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_cm_api_version() -> String {
    "v41".to_string()
}

fn default_hadoop_conf_dir() -> PathBuf {
    PathBuf::from("/etc/hadoop/conf")
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_time_range_days() -> u32 {
    45
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("clusterkit")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_postgres_versions() -> Vec<String> {
    strings(&["10", "11", "12", "14"])
}

fn default_mysql_versions() -> Vec<String> {
    strings(&["8.0", "5.7", "5.6"])
}

fn default_mariadb_versions() -> Vec<String> {
    strings(&["10.5", "10.4", "10.3", "10.2"])
}

fn default_java_versions() -> Vec<String> {
    strings(&["1.8", "11.0"])
}

fn default_os_releases() -> Vec<String> {
    strings(&[
        "Red Hat Enterprise Linux Server release 8.4 (Ootpa)",
        "Red Hat Enterprise Linux Server release 8.2 (Ootpa)",
        "Red Hat Enterprise Linux Server release 7.9 (Maipo)",
        "Red Hat Enterprise Linux Server release 7.7 (Maipo)",
        "Red Hat Enterprise Linux Server release 7.6 (Maipo)",
        "CentOS Linux release 8.2.2004 (Core)",
        "CentOS Linux release 7.9.2009 (Core)",
        "CentOS Linux release 7.7.1908 (Core)",
        "CentOS Linux release 7.6.1810 (Core)",
    ])
}

fn default_hue_python_versions() -> Vec<String> {
    strings(&["Python 2.7.5"])
}

fn default_required_services() -> Vec<String> {
    strings(&[
        "ZOOKEEPER", "HDFS", "OZONE", "HBASE", "HIVE", "KAFKA", "SOLR", "RANGER", "ATLAS", "YARN",
    ])
}

fn default_parcel_dir() -> String {
    "/opt/cloudera/parcels".to_string()
}

fn default_parcel_min_free_gb() -> u64 {
    20
}

impl Config {
    /// Load configuration from `path`, or from `clusterkit.yml` in the
    /// working directory when it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overlay `CLUSTERKIT_*` variables. `lookup` is `std::env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CLUSTERKIT_CM_URL") {
            self.cloudera_manager.url = Some(v);
        }
        if let Some(v) = lookup("CLUSTERKIT_CM_USER") {
            self.cloudera_manager.username = v;
        }
        if let Some(v) = lookup("CLUSTERKIT_CM_PASSWORD") {
            self.cloudera_manager.password = Some(v);
        }
        if let Some(v) = lookup("CLUSTERKIT_AMBARI_URL") {
            self.ambari.url = Some(v);
        }
        if let Some(v) = lookup("CLUSTERKIT_AMBARI_USER") {
            self.ambari.username = v;
        }
        if let Some(v) = lookup("CLUSTERKIT_AMBARI_PASSWORD") {
            self.ambari.password = Some(v);
        }
    }

    pub fn cm_url(&self) -> Result<&str> {
        self.cloudera_manager.url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Cloudera Manager URL not configured. Set cloudera_manager.url, \
                 CLUSTERKIT_CM_URL or pass --cm-url"
            )
        })
    }

    pub fn ambari_url(&self) -> Result<&str> {
        self.ambari.url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Ambari URL not configured. Set ambari.url, CLUSTERKIT_AMBARI_URL or pass --ambari-url"
            )
        })
    }
}

/// Check that a manager URL has the `scheme://host:port` shape.
///
/// The API path is appended by the clients, so anything after the port is
/// rejected to avoid building `/api/v41/api/v41` style URLs.
pub fn validate_manager_url(url: &str) -> Result<reqwest::Url> {
    if !MANAGER_URL_RE.is_match(url) {
        anyhow::bail!(
            "Invalid manager URL '{}'. Expected format: http[s]://host:port",
            crate::redact::redact_url(url)
        );
    }
    reqwest::Url::parse(url).with_context(|| format!("Invalid manager URL '{}'", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.cloudera_manager.api_version, "v41");
        assert_eq!(config.cloudera_manager.username, "admin");
        assert_eq!(config.discovery.time_range_days, 45);
        assert!(config.discovery.redact_sensitive);
        assert_eq!(config.checks.parcel_min_free_gb, 20);
        assert_eq!(config.checks.required_services.len(), 10);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
cloudera_manager:
  url: https://cm.example.com:7183
  password: secret
ssh:
  user: centos
  disable_strict_host_key_checking: true
ecs:
  hosts: [ecs-1, ecs-2]
checks:
  postgres_versions: ["14"]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.cm_url().unwrap(), "https://cm.example.com:7183");
        assert_eq!(config.cloudera_manager.username, "admin");
        assert_eq!(config.ssh.user.as_deref(), Some("centos"));
        assert!(config.ssh.disable_strict_host_key_checking);
        assert_eq!(config.ssh.connect_timeout_secs, 10);
        assert_eq!(config.ecs.hosts, vec!["ecs-1", "ecs-2"]);
        assert_eq!(config.checks.postgres_versions, vec!["14"]);
        // untouched lists keep their defaults
        assert_eq!(config.checks.java_versions, vec!["1.8", "11.0"]);
    }

    #[test]
    fn test_ambari_extractor_settings() {
        let yaml = r#"
ambari:
  url: http://ambari.example.com:8080
  ranger:
    url: http://ranger.example.com:6080
    password: rangerpw
  hive_metastore:
    db_type: mysql
    host: db.example.com
    name: hive
    user: hive
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let ranger = config.ambari.ranger.as_ref().unwrap();
        assert_eq!(ranger.username, "admin");
        let hms = config.ambari.hive_metastore.as_ref().unwrap();
        assert_eq!(hms.port, None);
        assert!(hms.password.is_none());
        assert_eq!(config.ambari.hadoop_conf_dir, PathBuf::from("/etc/hadoop/conf"));
        assert!(Config::default().ambari.ranger.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "CLUSTERKIT_CM_URL" => Some("http://cm:7180".to_string()),
            "CLUSTERKIT_CM_PASSWORD" => Some("pw".to_string()),
            _ => None,
        });
        assert_eq!(config.cm_url().unwrap(), "http://cm:7180");
        assert_eq!(config.cloudera_manager.password.as_deref(), Some("pw"));
        assert!(config.ambari_url().is_err());
    }

    #[test]
    fn test_validate_manager_url() {
        assert!(validate_manager_url("https://cm.example.com:7183").is_ok());
        assert!(validate_manager_url("http://10.0.0.1:7180/").is_ok());
        assert!(validate_manager_url("https://cm.example.com").is_err());
        assert!(validate_manager_url("cm.example.com:7183").is_err());
        assert!(validate_manager_url("https://cm:7183/api/v41").is_err());
    }

    #[test]
    fn test_environment_cm_url() {
        let yaml = r#"
inventory:
  environments:
    prod: cm-prod.example.com
    dev: http://cm-dev.example.com:7180
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.inventory.cm_url("prod").unwrap(),
            "https://cm-prod.example.com:7183"
        );
        assert_eq!(
            config.inventory.cm_url("dev").unwrap(),
            "http://cm-dev.example.com:7180"
        );
        let err = config.inventory.cm_url("qa").unwrap_err().to_string();
        assert!(err.contains("dev, prod"));
    }
}
