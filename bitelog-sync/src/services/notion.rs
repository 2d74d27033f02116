//! Notion API client
//!
//! Since API version 2025-09-03 a database is a container; records are
//! queried through its associated data source. The client resolves the
//! configured database id to that data source once per run, paginates the
//! record query, and pushes partial property updates back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::pipeline::RecordSource;

const NOTION_BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2025-09-03";
const USER_AGENT: &str = "bitelog-sync/0.1.0";

/// Notion client errors
#[derive(Debug, Error)]
pub enum NotionError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Notion API returned an error response
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Database could not be resolved to exactly one data source
    #[error("Data source resolution failed: {0}")]
    Resolution(String),
}

/// One record page as returned by the query endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    /// Stable page id (hyphenated UUID form)
    pub id: String,
    /// Last modification timestamp, owned by the source
    pub last_edited_time: DateTime<Utc>,
    /// Heterogeneous property bag, decoded via [`crate::props`]
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// One page of query results plus its continuation state
#[derive(Debug, Clone, Deserialize)]
pub struct QueryBatch {
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResult {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) parent: Option<SearchParent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchParent {
    #[serde(rename = "type", default)]
    pub(crate) parent_type: String,
    #[serde(default)]
    pub(crate) database_id: Option<String>,
}

/// Notion API client
pub struct NotionClient {
    http: reqwest::Client,
}

impl NotionClient {
    pub fn new(token: &str) -> Result<Self, NotionError> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| NotionError::Network(e.to_string()))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            "Notion-Version",
            header::HeaderValue::from_static(NOTION_VERSION),
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotionError::Network(e.to_string()))?;

        Ok(Self { http })
    }

    /// Normalize a database id to the canonical hyphenated 8-4-4-4-12 form.
    ///
    /// Ids copied from URLs come without hyphens; the search API reports
    /// parents in hyphenated form. Anything that is not 32 hex digits is
    /// passed through unchanged.
    pub fn normalize_database_id(id: &str) -> String {
        let bare: String = id.chars().filter(|c| *c != '-').collect();
        if bare.len() == 32 && bare.chars().all(|c| c.is_ascii_hexdigit()) {
            format!(
                "{}-{}-{}-{}-{}",
                &bare[..8],
                &bare[8..12],
                &bare[12..16],
                &bare[16..20],
                &bare[20..]
            )
        } else {
            id.to_string()
        }
    }

    async fn parse_error(response: reqwest::Response) -> NotionError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        NotionError::Api(status, body)
    }
}

/// Pick the single data source whose parent is the given database.
///
/// Zero or multiple matches is an operator configuration error, never a
/// retryable condition.
pub(crate) fn match_data_source(
    results: &[SearchResult],
    database_id: &str,
) -> Result<String, NotionError> {
    let matches: Vec<&SearchResult> = results
        .iter()
        .filter(|r| {
            r.parent.as_ref().is_some_and(|p| {
                p.parent_type == "database_id" && p.database_id.as_deref() == Some(database_id)
            })
        })
        .collect();

    match matches.as_slice() {
        [] => Err(NotionError::Resolution(format!(
            "no data source found for database {} (is it shared with the integration?)",
            database_id
        ))),
        [single] => Ok(single.id.clone()),
        many => Err(NotionError::Resolution(format!(
            "{} data sources claim database {}",
            many.len(),
            database_id
        ))),
    }
}

#[async_trait]
impl RecordSource for NotionClient {
    async fn resolve_data_source(&self, database_id: &str) -> Result<String, NotionError> {
        let normalized = Self::normalize_database_id(database_id);
        tracing::debug!(database = %normalized, "Resolving data source");

        let body = json!({
            "filter": { "property": "object", "value": "data_source" }
        });

        let response = self
            .http
            .post(format!("{}/search", NOTION_BASE_URL))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| NotionError::Parse(e.to_string()))?;

        let data_source_id = match_data_source(&search.results, &normalized)?;
        tracing::info!(data_source = %data_source_id, "Resolved data source");
        Ok(data_source_id)
    }

    async fn query_page(
        &self,
        data_source_id: &str,
        cursor: Option<&str>,
    ) -> Result<QueryBatch, NotionError> {
        let mut body = Map::new();
        if let Some(cursor) = cursor {
            body.insert("start_cursor".to_string(), Value::String(cursor.to_string()));
        }

        tracing::debug!(data_source = %data_source_id, cursor = ?cursor, "Querying page batch");

        let response = self
            .http
            .post(format!(
                "{}/data_sources/{}/query",
                NOTION_BASE_URL, data_source_id
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| NotionError::Parse(e.to_string()))
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: Map<String, Value>,
    ) -> Result<(), NotionError> {
        let body = json!({ "properties": properties });

        let response = self
            .http
            .patch(format!("{}/pages/{}", NOTION_BASE_URL, page_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }

        tracing::debug!(page = %page_id, "Write-back accepted");
        Ok(())
    }
}
