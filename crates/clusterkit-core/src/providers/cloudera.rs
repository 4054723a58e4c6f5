use super::{
    build_http_client, decode_json, ensure_success, join_segments, stream_to_file, ClientError,
    ClientResult,
};
use crate::config::{validate_manager_url, CmSettings};
use crate::model::cm::{
    ApiCluster, ApiCollectDiagnosticDataArguments, ApiCommand, ApiConfig, ApiDeployment, ApiHost,
    ApiKerberosInfo, ApiList, ApiRole, ApiRoleConfigGroup, ApiService, ApiTimeSeriesResponse,
    ApiVersionInfo, ScmDbInfo,
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Async client for the Cloudera Manager REST API.
#[derive(Clone)]
pub struct CmClient {
    http: Client,
    /// `scheme://host:port`, used for the non-API `/cmf` download endpoint.
    server: Url,
    /// `scheme://host:port/api/vNN`
    api: Url,
    username: String,
    password: String,
}

/// Format a timestamp the way the CM API expects query bounds.
pub fn api_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl CmClient {
    pub fn new(settings: &CmSettings) -> ClientResult<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| ClientError::Config("Cloudera Manager URL is not set".to_string()))?;
        let password = settings.password.clone().ok_or_else(|| {
            ClientError::Config("Cloudera Manager password is not set".to_string())
        })?;
        let server =
            validate_manager_url(url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let http = build_http_client(
            settings.verify_tls,
            settings.ca_cert.as_deref(),
            settings.timeout_secs,
        )?;
        Self::with_http(http, server, &settings.api_version, &settings.username, &password)
    }

    pub(crate) fn with_http(
        http: Client,
        server: Url,
        api_version: &str,
        username: &str,
        password: &str,
    ) -> ClientResult<Self> {
        let api = join_segments(&server, &["api", api_version])?;
        Ok(Self {
            http,
            server,
            api,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api
    }

    pub fn server_url(&self) -> &Url {
        &self.server
    }

    pub(crate) fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        join_segments(&self.api, segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, url = %url, "CM API request");
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> ClientResult<T> {
        let url = self.url(segments)?;
        let response = self.request(Method::GET, url).query(query).send().await?;
        decode_json(ensure_success(response).await?).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: &B,
    ) -> ClientResult<T> {
        let url = self.url(segments)?;
        let response = self
            .request(method, url)
            .query(query)
            .json(body)
            .send()
            .await?;
        decode_json(ensure_success(response).await?).await
    }

    /// GET any API path (e.g. `cm/deployment`) as raw JSON, for bundle dumps.
    pub async fn get_raw(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<serde_json::Value> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.get(&segments, query).await
    }

    pub async fn read_clusters(&self, view: &str) -> ClientResult<Vec<ApiCluster>> {
        let list: ApiList<ApiCluster> = self.get(&["clusters"], &[("view", view)]).await?;
        Ok(list.items)
    }

    pub async fn read_services(&self, cluster: &str, view: &str) -> ClientResult<Vec<ApiService>> {
        let list: ApiList<ApiService> = self
            .get(&["clusters", cluster, "services"], &[("view", view)])
            .await?;
        Ok(list.items)
    }

    pub async fn read_service_config(
        &self,
        cluster: &str,
        service: &str,
        view: &str,
    ) -> ClientResult<Vec<ApiConfig>> {
        let list: ApiList<ApiConfig> = self
            .get(
                &["clusters", cluster, "services", service, "config"],
                &[("view", view)],
            )
            .await?;
        Ok(list.items)
    }

    pub async fn update_service_config(
        &self,
        cluster: &str,
        service: &str,
        message: &str,
        configs: &[ApiConfig],
    ) -> ClientResult<Vec<ApiConfig>> {
        let body = ApiList {
            items: configs.to_vec(),
        };
        let list: ApiList<ApiConfig> = self
            .send_json(
                Method::PUT,
                &["clusters", cluster, "services", service, "config"],
                &[("message", message)],
                &body,
            )
            .await?;
        Ok(list.items)
    }

    pub async fn read_roles(&self, cluster: &str, service: &str) -> ClientResult<Vec<ApiRole>> {
        let list: ApiList<ApiRole> = self
            .get(&["clusters", cluster, "services", service, "roles"], &[])
            .await?;
        Ok(list.items)
    }

    pub async fn read_role_config(
        &self,
        cluster: &str,
        service: &str,
        role: &str,
        view: &str,
    ) -> ClientResult<Vec<ApiConfig>> {
        let list: ApiList<ApiConfig> = self
            .get(
                &["clusters", cluster, "services", service, "roles", role, "config"],
                &[("view", view)],
            )
            .await?;
        Ok(list.items)
    }

    pub async fn read_role_config_groups(
        &self,
        cluster: &str,
        service: &str,
    ) -> ClientResult<Vec<ApiRoleConfigGroup>> {
        let list: ApiList<ApiRoleConfigGroup> = self
            .get(
                &["clusters", cluster, "services", service, "roleConfigGroups"],
                &[],
            )
            .await?;
        Ok(list.items)
    }

    pub async fn read_role_config_group_config(
        &self,
        cluster: &str,
        service: &str,
        group: &str,
        view: &str,
    ) -> ClientResult<Vec<ApiConfig>> {
        let list: ApiList<ApiConfig> = self
            .get(
                &[
                    "clusters",
                    cluster,
                    "services",
                    service,
                    "roleConfigGroups",
                    group,
                    "config",
                ],
                &[("view", view)],
            )
            .await?;
        Ok(list.items)
    }

    pub async fn update_role_config_group_config(
        &self,
        cluster: &str,
        service: &str,
        group: &str,
        message: &str,
        configs: &[ApiConfig],
    ) -> ClientResult<Vec<ApiConfig>> {
        let body = ApiList {
            items: configs.to_vec(),
        };
        let list: ApiList<ApiConfig> = self
            .send_json(
                Method::PUT,
                &[
                    "clusters",
                    cluster,
                    "services",
                    service,
                    "roleConfigGroups",
                    group,
                    "config",
                ],
                &[("message", message)],
                &body,
            )
            .await?;
        Ok(list.items)
    }

    pub async fn read_hosts(&self, view: &str) -> ClientResult<Vec<ApiHost>> {
        let list: ApiList<ApiHost> = self.get(&["hosts"], &[("view", view)]).await?;
        Ok(list.items)
    }

    /// Hosts assigned to `cluster` (host refs only).
    pub async fn list_cluster_hosts(&self, cluster: &str) -> ClientResult<serde_json::Value> {
        self.get(&["clusters", cluster, "hosts"], &[]).await
    }

    /// Cluster template export, used by the discovery dumps.
    pub async fn export_cluster(&self, cluster: &str) -> ClientResult<serde_json::Value> {
        self.get(&["clusters", cluster, "export"], &[]).await
    }

    /// `GET /clusters/{name}/isTlsEnabled`. The endpoint answers with a bare
    /// JSON boolean.
    pub async fn is_tls_enabled(&self, cluster: &str) -> ClientResult<bool> {
        self.get(&["clusters", cluster, "isTlsEnabled"], &[]).await
    }

    pub async fn scm_db_info(&self) -> ClientResult<ScmDbInfo> {
        self.get(&["cm", "scmDbInfo"], &[]).await
    }

    pub async fn kerberos_info(&self) -> ClientResult<ApiKerberosInfo> {
        self.get(&["cm", "kerberosInfo"], &[]).await
    }

    pub async fn cm_config(&self, view: &str) -> ClientResult<Vec<ApiConfig>> {
        let list: ApiList<ApiConfig> = self.get(&["cm", "config"], &[("view", view)]).await?;
        Ok(list.items)
    }

    pub async fn cm_version(&self) -> ClientResult<ApiVersionInfo> {
        self.get(&["cm", "version"], &[]).await
    }

    pub async fn deployment(&self, view: &str) -> ClientResult<ApiDeployment> {
        self.get(&["cm", "deployment"], &[("view", view)]).await
    }

    pub async fn query_time_series(
        &self,
        query: &str,
        from: &DateTime<Utc>,
        to: &DateTime<Utc>,
    ) -> ClientResult<serde_json::Value> {
        let from = api_timestamp(from);
        let to = api_timestamp(to);
        self.get(
            &["timeseries"],
            &[
                ("query", query),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("desiredRollup", "HOURLY"),
                ("mustUseDesiredRollup", "true"),
            ],
        )
        .await
    }

    /// Typed variant of [`Self::query_time_series`].
    pub async fn time_series(
        &self,
        query: &str,
        from: &DateTime<Utc>,
        to: &DateTime<Utc>,
    ) -> ClientResult<ApiList<ApiTimeSeriesResponse>> {
        let value = self.query_time_series(query, from, to).await?;
        serde_json::from_value(value).map_err(|source| ClientError::Decode {
            url: "timeseries".to_string(),
            source,
        })
    }

    pub async fn collect_diagnostic_data(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> ClientResult<ApiCommand> {
        let args = ApiCollectDiagnosticDataArguments {
            start_time: api_timestamp(start),
            end_time: api_timestamp(end),
        };
        self.send_json(
            Method::POST,
            &["cm", "commands", "collectDiagnosticData"],
            &[],
            &args,
        )
        .await
    }

    pub async fn read_command(&self, id: u64) -> ClientResult<ApiCommand> {
        let id = id.to_string();
        self.get(&["commands", id.as_str()], &[]).await
    }

    /// URL of the command result archive served outside the versioned API.
    pub fn command_download_url(&self, id: u64) -> ClientResult<Url> {
        let id = id.to_string();
        join_segments(&self.server, &["cmf", "command", id.as_str(), "download"])
    }

    pub async fn download_command_result(&self, id: u64, dest: &Path) -> ClientResult<u64> {
        let url = self.command_download_url(id)?;
        let response = self.request(Method::GET, url).send().await?;
        stream_to_file(ensure_success(response).await?, dest).await
    }

    /// Download the client configuration zip of a service.
    pub async fn client_config(&self, cluster: &str, service: &str, dest: &Path) -> ClientResult<u64> {
        let url = self.url(&["clusters", cluster, "services", service, "clientConfig"])?;
        let response = self.request(Method::GET, url).send().await?;
        stream_to_file(ensure_success(response).await?, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client() -> CmClient {
        let server = Url::parse("https://cm.example.com:7183").unwrap();
        CmClient::with_http(Client::new(), server, "v41", "admin", "admin").unwrap()
    }

    #[test]
    fn test_api_url() {
        let cm = client();
        assert_eq!(cm.api_url().as_str(), "https://cm.example.com:7183/api/v41");
    }

    #[test]
    fn test_service_config_url() {
        let cm = client();
        let url = cm
            .url(&["clusters", "Cluster 1", "services", "hdfs", "config"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://cm.example.com:7183/api/v41/clusters/Cluster%201/services/hdfs/config"
        );
    }

    #[test]
    fn test_command_download_url() {
        let cm = client();
        assert_eq!(
            cm.command_download_url(42).unwrap().as_str(),
            "https://cm.example.com:7183/cmf/command/42/download"
        );
    }

    #[test]
    fn test_api_timestamp() {
        let ts = Utc.with_ymd_and_hms(2022, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(api_timestamp(&ts), "2022-03-01T12:30:00Z");
    }

    #[test]
    fn test_new_requires_password() {
        let settings = CmSettings {
            url: Some("https://cm.example.com:7183".to_string()),
            ..Default::default()
        };
        let err = CmClient::new(&settings).err().unwrap();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
