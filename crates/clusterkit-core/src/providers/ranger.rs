//! Ranger admin REST API, used to export the policy set of an HDP cluster.

use super::{build_http_client, decode_json, ensure_success, join_segments, ClientError, ClientResult};
use crate::config::{validate_manager_url, RangerSettings};
use reqwest::{Client, Url};
use tracing::debug;

#[derive(Clone)]
pub struct RangerClient {
    http: Client,
    server: Url,
    username: String,
    password: String,
}

impl RangerClient {
    pub fn new(settings: &RangerSettings, verify_tls: bool, timeout_secs: u64) -> ClientResult<Self> {
        let password = settings
            .password
            .clone()
            .ok_or_else(|| ClientError::Config("Ranger password is not set".to_string()))?;
        let server =
            validate_manager_url(&settings.url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http: build_http_client(verify_tls, None, timeout_secs)?,
            server,
            username: settings.username.clone(),
            password,
        })
    }

    pub fn policies_url(&self) -> ClientResult<Url> {
        join_segments(&self.server, &["service", "public", "v2", "api", "policy"])
    }

    /// Every policy of every Ranger service, as returned by the public v2 API.
    pub async fn policies(&self) -> ClientResult<serde_json::Value> {
        let url = self.policies_url()?;
        debug!(url = %url, "Ranger API request");
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        decode_json(ensure_success(response).await?).await
    }
}
