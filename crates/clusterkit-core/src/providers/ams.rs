//! Ambari Metrics collector timeline API.

use super::{build_http_client, decode_json, ensure_success, join_segments, ClientError, ClientResult};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_COLLECTOR_PORT: &str = "6188";

/// Collector base URL from the `ams-site` properties: HTTPS unless the
/// policy is `HTTP_ONLY`, port taken from the webapp address.
pub fn collector_url(ams_site: &Value, host: &str) -> ClientResult<Url> {
    let scheme = match ams_site["timeline.metrics.service.http.policy"].as_str() {
        None | Some("HTTP_ONLY") => "http",
        Some(_) => "https",
    };
    let port = ams_site["timeline.metrics.service.webapp.address"]
        .as_str()
        .and_then(|address| address.rsplit(':').next())
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_COLLECTOR_PORT);
    let url = format!("{}://{}:{}", scheme, host, port);
    Url::parse(&url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", url, e)))
}

#[derive(Clone)]
pub struct AmsClient {
    http: Client,
    base: Url,
}

impl AmsClient {
    pub fn new(base: Url, verify_tls: bool, timeout_secs: u64) -> ClientResult<Self> {
        Ok(Self {
            http: build_http_client(verify_tls, None, timeout_secs)?,
            base,
        })
    }

    pub fn metadata_url(&self) -> ClientResult<Url> {
        join_segments(&self.base, &["ws", "v1", "timeline", "metrics", "metadata"])
    }

    /// Series of `app` matching `metric_names` (a `%` pattern) on every host,
    /// between two epoch-second timestamps.
    pub fn metrics_url(&self, app: &str, metric_names: &str, start: i64, end: i64) -> ClientResult<Url> {
        let mut url = join_segments(&self.base, &["ws", "v1", "timeline", "metrics"])?;
        url.query_pairs_mut()
            .append_pair("metricNames", metric_names)
            .append_pair("appId", app)
            .append_pair("hostname", "%")
            .append_pair("startTime", &start.to_string())
            .append_pair("endTime", &end.to_string());
        Ok(url)
    }

    async fn get(&self, url: Url) -> ClientResult<Value> {
        debug!(url = %url, "metrics collector request");
        let response = self.http.get(url).send().await?;
        decode_json(ensure_success(response).await?).await
    }

    /// Metric metadata keyed by application id.
    pub async fn metadata(&self) -> ClientResult<Value> {
        self.get(self.metadata_url()?).await
    }

    pub async fn metrics(&self, app: &str, metric_names: &str, start: i64, end: i64) -> ClientResult<Value> {
        self.get(self.metrics_url(app, metric_names, start, end)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collector_url() {
        let site = json!({
            "timeline.metrics.service.http.policy": "HTTP_ONLY",
            "timeline.metrics.service.webapp.address": "0.0.0.0:6188"
        });
        assert_eq!(collector_url(&site, "ams1.example.com").unwrap().as_str(), "http://ams1.example.com:6188/");

        let site = json!({
            "timeline.metrics.service.http.policy": "HTTPS_ONLY",
            "timeline.metrics.service.webapp.address": "0.0.0.0:6189"
        });
        assert_eq!(collector_url(&site, "ams1.example.com").unwrap().scheme(), "https");
        assert_eq!(collector_url(&json!({}), "ams1").unwrap().port(), Some(6188));
    }

    #[test]
    fn test_metrics_url_encodes_patterns() {
        let base = Url::parse("http://ams1.example.com:6188").unwrap();
        let ams = AmsClient::new(base, false, 30).unwrap();
        assert_eq!(
            ams.metrics_url("namenode", "%._max", 1000, 2000).unwrap().as_str(),
            "http://ams1.example.com:6188/ws/v1/timeline/metrics?metricNames=%25._max&appId=namenode&hostname=%25&startTime=1000&endTime=2000"
        );
        assert_eq!(
            ams.metadata_url().unwrap().as_str(),
            "http://ams1.example.com:6188/ws/v1/timeline/metrics/metadata"
        );
    }
}
