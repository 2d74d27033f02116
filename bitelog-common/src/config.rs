//! Configuration resolution for the sync pipeline
//!
//! All credentials come from the environment (a `.env` file is loaded by
//! the binary before this runs). Every required variable that is missing
//! aborts the run before any network call is made.

use crate::{Error, Result};

/// Credentials and targets for one sync run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Notion integration token
    pub notion_key: String,
    /// Notion database id (the container; resolved to a data source at runtime)
    pub notion_db_id: String,
    /// GitHub token with contents write access to the asset repository
    pub github_token: String,
    /// Asset repository in `owner/name` form
    pub github_repo: String,
    /// Branch the covers are committed to
    pub github_branch: String,
    /// AMap web-service API key
    pub amap_key: String,
}

impl SyncConfig {
    /// Resolve configuration from the environment.
    ///
    /// Required: `NOTION_KEY`, `NOTION_DB_ID`, `GITHUB_TOKEN`,
    /// `GITHUB_REPO`, `AMAP_KEY`. Optional: `GITHUB_BRANCH` (default
    /// `main`).
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            notion_key: required("NOTION_KEY")?,
            notion_db_id: required("NOTION_DB_ID")?,
            github_token: required("GITHUB_TOKEN")?,
            github_repo: required("GITHUB_REPO")?,
            github_branch: std::env::var("GITHUB_BRANCH").unwrap_or_else(|_| "main".to_string()),
            amap_key: required("AMAP_KEY")?,
        })
    }
}

fn required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{} is not set", name))),
    }
}
