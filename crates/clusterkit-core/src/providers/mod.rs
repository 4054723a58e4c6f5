pub mod ambari;
pub mod ams;
pub mod cloudera;
pub mod ranger;

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors raised by the cluster-manager REST clients.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status for `Http` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Build the shared `reqwest` client used by both manager APIs.
pub(crate) fn build_http_client(
    verify_tls: bool,
    ca_cert: Option<&Path>,
    timeout_secs: u64,
) -> ClientResult<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("clusterkit/", env!("CARGO_PKG_VERSION")));

    if let Some(path) = ca_cert {
        let pem = std::fs::read(path)?;
        let cert = reqwest::Certificate::from_pem(&pem)?;
        builder = builder.add_root_certificate(cert);
    }
    if !verify_tls {
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder.build()?)
}

/// Append path segments to `base`, percent-encoding each one.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> ClientResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Fail on non-2xx responses, keeping the body for the error message.
pub(crate) async fn ensure_success(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = crate::redact::redact_url(response.url().as_str());
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Http {
        status: status.as_u16(),
        url,
        body: body.chars().take(500).collect(),
    })
}

pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let url = crate::redact::redact_url(response.url().as_str());
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode { url, source })
}

/// Stream a response body to `dest`, returning the number of bytes written.
pub(crate) async fn stream_to_file(mut response: Response, dest: &Path) -> ClientResult<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_segments_encodes_spaces() {
        let base = Url::parse("https://cm.example.com:7183/api/v41").unwrap();
        let url = join_segments(&base, &["clusters", "Cluster 1", "services"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://cm.example.com:7183/api/v41/clusters/Cluster%201/services"
        );
    }

    #[test]
    fn test_join_segments_trailing_slash() {
        let base = Url::parse("http://ambari:8080/api/v1/").unwrap();
        let url = join_segments(&base, &["hosts"]).unwrap();
        assert_eq!(url.as_str(), "http://ambari:8080/api/v1/hosts");
    }

    #[test]
    fn test_http_error_display() {
        let err = ClientError::Http {
            status: 404,
            url: "https://cm:7183/api/v41/clusters/x".to_string(),
            body: "not found".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("HTTP 404"));
    }
}
