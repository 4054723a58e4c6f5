use super::{build_http_client, decode_json, ensure_success, join_segments, ClientError, ClientResult};
use crate::config::{validate_manager_url, AmbariSettings};
use crate::model::ambari::{
    AmbariList, ClusterItem, HostComponentItem, HostItem, RootServiceComponentItem, ServiceItem,
    StackVersionItem,
};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Async client for the Ambari REST API (`/api/v1`).
#[derive(Clone)]
pub struct AmbariClient {
    http: Client,
    api: Url,
    username: String,
    password: String,
}

impl AmbariClient {
    pub fn new(settings: &AmbariSettings) -> ClientResult<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| ClientError::Config("Ambari URL is not set".to_string()))?;
        let password = settings
            .password
            .clone()
            .ok_or_else(|| ClientError::Config("Ambari password is not set".to_string()))?;
        let server =
            validate_manager_url(url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let http = build_http_client(settings.verify_tls, None, settings.timeout_secs)?;
        Self::with_http(http, server, &settings.username, &password)
    }

    pub(crate) fn with_http(
        http: Client,
        server: Url,
        username: &str,
        password: &str,
    ) -> ClientResult<Self> {
        Ok(Self {
            http,
            api: join_segments(&server, &["api", "v1"])?,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api
    }

    /// Build an API URL from a `/`-separated path and an optional raw query
    /// string. Ambari field selectors (`fields=A/b/c`) must not be encoded.
    pub(crate) fn url(&self, path: &str, query: Option<&str>) -> ClientResult<Url> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut url = join_segments(&self.api, &segments)?;
        url.set_query(query);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: Option<&str>) -> ClientResult<T> {
        let url = self.url(path, query)?;
        debug!(url = %url, "Ambari API request");
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("X-Requested-By", "ambari")
            .send()
            .await?;
        decode_json(ensure_success(response).await?).await
    }

    /// GET any API path as raw JSON, for bundle dumps.
    pub async fn get_raw(&self, path: &str, query: Option<&str>) -> ClientResult<serde_json::Value> {
        self.get(path, query).await
    }

    /// Name of the first (and in practice only) cluster managed by Ambari.
    pub async fn cluster_name(&self) -> ClientResult<String> {
        let list: AmbariList<ClusterItem> = self.get("clusters", None).await?;
        list.items
            .into_iter()
            .next()
            .map(|c| c.cluster.cluster_name)
            .ok_or_else(|| ClientError::Config("Ambari manages no clusters".to_string()))
    }

    pub async fn stack_versions(&self, cluster: &str) -> ClientResult<Vec<StackVersionItem>> {
        let list: AmbariList<StackVersionItem> = self
            .get(
                &format!("clusters/{}/stack_versions", cluster),
                Some("fields=ClusterStackVersions/*"),
            )
            .await?;
        Ok(list.items)
    }

    pub async fn services(&self, cluster: &str) -> ClientResult<Vec<ServiceItem>> {
        let list: AmbariList<ServiceItem> = self
            .get(&format!("clusters/{}/services", cluster), None)
            .await?;
        Ok(list.items)
    }

    pub async fn hosts(&self) -> ClientResult<Vec<HostItem>> {
        let list: AmbariList<HostItem> = self
            .get("hosts", Some("fields=Hosts/host_name,Hosts/ip,Hosts/os_type,Hosts/cpu_count,Hosts/total_mem"))
            .await?;
        Ok(list.items)
    }

    pub async fn host_components(
        &self,
        cluster: &str,
        host: &str,
    ) -> ClientResult<Vec<HostComponentItem>> {
        let list: AmbariList<HostComponentItem> = self
            .get(&format!("clusters/{}/hosts/{}/host_components", cluster, host), None)
            .await?;
        Ok(list.items)
    }

    pub async fn service(&self, cluster: &str, service: &str) -> ClientResult<serde_json::Value> {
        self.get(&format!("clusters/{}/services/{}", cluster, service), None)
            .await
    }

    pub async fn component(
        &self,
        cluster: &str,
        service: &str,
        component: &str,
    ) -> ClientResult<serde_json::Value> {
        self.get(
            &format!("clusters/{}/services/{}/components/{}", cluster, service, component),
            None,
        )
        .await
    }

    pub async fn host(&self, host: &str) -> ClientResult<serde_json::Value> {
        self.get(&format!("hosts/{}", host), None).await
    }

    pub async fn blueprint(&self, cluster: &str) -> ClientResult<serde_json::Value> {
        self.get(&format!("clusters/{}", cluster), Some("format=blueprint"))
            .await
    }

    pub async fn cluster_info(&self, cluster: &str) -> ClientResult<serde_json::Value> {
        self.get(&format!("clusters/{}", cluster), None).await
    }

    pub async fn component_list(&self, cluster: &str) -> ClientResult<serde_json::Value> {
        self.get(&format!("clusters/{}/components", cluster), None)
            .await
    }

    /// Desired (current) configuration tags of every config type.
    pub async fn current_configurations(&self, cluster: &str) -> ClientResult<serde_json::Value> {
        self.get(
            &format!("clusters/{}", cluster),
            Some("fields=Clusters/desired_configs"),
        )
        .await
    }

    /// Current service config version of `service`, with its properties.
    pub async fn service_config_versions(
        &self,
        cluster: &str,
        service: &str,
    ) -> ClientResult<serde_json::Value> {
        let query = format!("service_name={}&is_current=true", service);
        self.get(
            &format!("clusters/{}/configurations/service_config_versions", cluster),
            Some(&query),
        )
        .await
    }

    /// Database backing the Ambari server (`postgres`, `mysql`, ...).
    pub async fn ambari_database(&self) -> ClientResult<Option<String>> {
        let item: RootServiceComponentItem = self
            .get(
                "services/AMBARI/components/AMBARI_SERVER",
                Some("fields=RootServiceComponents/properties/server.jdbc.database"),
            )
            .await?;
        Ok(item.component.properties.get("server.jdbc.database").cloned())
    }
}
