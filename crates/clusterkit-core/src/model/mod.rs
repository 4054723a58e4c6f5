pub mod ambari;
pub mod cm;

pub use cm::{
    clean_role_name, find_config, sanitize_name, ApiCluster, ApiConfig, ApiDeployment, ApiHost,
    ApiList, ApiRole, ApiService, ApiTimeSeriesResponse,
};
