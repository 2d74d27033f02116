//! Durable cover materialization
//!
//! Covers referenced by source records are expiring, source-hosted URLs.
//! The materializer turns one into a durable asset: a deterministic key
//! derived from the record id, probed against the content host so repeated
//! runs never re-download or re-upload, committed to a GitHub repository
//! and served through the jsDelivr CDN.
//!
//! Every failure on this path degrades to `None` ("enrichment unavailable
//! this run"); nothing here aborts the run.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use thiserror::Error;

use crate::pipeline::CoverStore;
use crate::services::image_ops;

const GITHUB_API_BASE: &str = "https://api.github.com";
const CDN_BASE: &str = "https://cdn.jsdelivr.net/gh";
/// Repository directory the covers are committed under
const COVERS_DIR: &str = "assets/covers";
const USER_AGENT: &str = "bitelog-sync/0.1.0";

/// Content host errors
#[derive(Debug, Error)]
pub enum AssetError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Host API returned an error response
    #[error("API error {0}: {1}")]
    Api(u16, String),
}

/// Storage backend for durable cover assets
#[async_trait]
pub trait ContentHost: Send + Sync {
    /// Probe for an object under the given key
    async fn exists(&self, key: &str) -> Result<bool, AssetError>;

    /// Store bytes under the given key
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), AssetError>;

    /// Durable public URL for a key
    fn public_url(&self, key: &str) -> String;

    /// Prefix every durable URL of this host starts with
    fn url_prefix(&self) -> String;
}

/// GitHub-repository content host, served via jsDelivr
pub struct GithubContentHost {
    http: reqwest::Client,
    repo: String,
    branch: String,
}

impl GithubContentHost {
    pub fn new(token: &str, repo: &str, branch: &str) -> Result<Self, AssetError> {
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| AssetError::Network(e.to_string()))?;
        auth.set_sensitive(true);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AssetError::Network(e.to_string()))?;

        Ok(Self {
            http,
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }

    fn contents_url(&self, key: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}/{}",
            GITHUB_API_BASE, self.repo, COVERS_DIR, key
        )
    }
}

#[async_trait]
impl ContentHost for GithubContentHost {
    async fn exists(&self, key: &str) -> Result<bool, AssetError> {
        let response = self
            .http
            .get(self.contents_url(key))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| AssetError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AssetError::Api(status, body))
            }
        }
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), AssetError> {
        let body = json!({
            "message": format!("Add cover {}", key),
            "content": BASE64.encode(&bytes),
            "branch": self.branch,
        });

        let response = self
            .http
            .put(self.contents_url(key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AssetError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssetError::Api(status, body));
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}@{}/{}/{}",
            CDN_BASE, self.repo, self.branch, COVERS_DIR, key
        )
    }

    fn url_prefix(&self) -> String {
        format!("{}/{}@", CDN_BASE, self.repo)
    }
}

/// Fetches transient cover bytes from the source host
#[async_trait]
pub trait TransientFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

/// HTTP fetcher for expiring source-hosted cover URLs
pub struct HttpTransientFetch {
    http: reqwest::Client,
}

impl HttpTransientFetch {
    pub fn new() -> Result<Self, AssetError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AssetError::Network(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TransientFetch for HttpTransientFetch {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AssetError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssetError::Api(status, body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Idempotent cover materializer over a content host
pub struct CoverMaterializer<H: ContentHost, F: TransientFetch = HttpTransientFetch> {
    host: H,
    fetcher: F,
}

impl<H: ContentHost> CoverMaterializer<H> {
    pub fn new(host: H) -> Result<Self, AssetError> {
        Ok(Self {
            host,
            fetcher: HttpTransientFetch::new()?,
        })
    }
}

impl<H: ContentHost, F: TransientFetch> CoverMaterializer<H, F> {
    /// Build with an explicit fetcher (used by tests with fake collaborators)
    pub fn with_fetcher(host: H, fetcher: F) -> Self {
        Self { host, fetcher }
    }

    /// Deterministic asset key for a record id
    fn cover_key(record_id: &str) -> String {
        format!("{}.jpg", record_id.replace('-', ""))
    }
}

#[async_trait]
impl<H: ContentHost, F: TransientFetch> CoverStore for CoverMaterializer<H, F> {
    async fn materialize(&self, transient_url: &str, record_id: &str) -> Option<String> {
        let key = Self::cover_key(record_id);

        match self.host.exists(&key).await {
            Ok(true) => {
                tracing::debug!(key = %key, "Cover already materialized");
                return Some(self.host.public_url(&key));
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cover probe failed");
                return None;
            }
        }

        let bytes = match self.fetcher.fetch(transient_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Transient cover fetch failed");
                return None;
            }
        };

        let jpeg = match image_ops::transform_cover(&bytes) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cover transform failed");
                return None;
            }
        };

        match self.host.upload(&key, jpeg).await {
            Ok(()) => {
                tracing::info!(key = %key, "Cover uploaded");
                Some(self.host.public_url(&key))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cover upload failed");
                None
            }
        }
    }

    fn is_durable(&self, url: &str) -> bool {
        !url.is_empty() && url.starts_with(&self.host.url_prefix())
    }
}
