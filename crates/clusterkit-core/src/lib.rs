pub mod checks;
pub mod config;
pub mod config_push;
pub mod discovery;
pub mod hadoop_conf;
pub mod hdfs;
pub mod hive_scan;
pub mod inventory;
pub mod model;
pub mod providers;
pub mod redact;
pub mod remote;
pub mod report;
pub mod smoke;

pub use checks::CheckReport;
pub use config::Config;
pub use providers::ambari::AmbariClient;
pub use providers::cloudera::CmClient;
pub use providers::ClientError;
pub use remote::{CommandOutput, RemoteShell, SshShell};
pub use report::workbook::{Cell, Sheet, Workbook};
