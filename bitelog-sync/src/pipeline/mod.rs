//! Sequential sync pipeline
//!
//! Drives one full pass: resolve the data source, paginate every record,
//! enrich each one through the cover and geocode collaborators, write
//! deltas back, and hand the normalized records to the caller for
//! publishing.
//!
//! Records are processed strictly one at a time, in source order. The
//! per-record awaits are the backpressure: running records concurrently
//! would hit the source, the content host, and the geocoder rate limits
//! at once.

pub mod reconcile;

use async_trait::async_trait;
use bitelog_common::Restaurant;
use serde_json::{Map, Value};

use crate::services::amap::GeoResult;
use crate::services::notion::{NotionError, Page, QueryBatch};

/// Source of truth for records
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Resolve the configured database to its single queryable data source
    async fn resolve_data_source(&self, database_id: &str) -> Result<String, NotionError>;

    /// Fetch one batch of records at the given continuation cursor
    async fn query_page(
        &self,
        data_source_id: &str,
        cursor: Option<&str>,
    ) -> Result<QueryBatch, NotionError>;

    /// Merge the given partial properties into a record, server-side
    async fn update_page(
        &self,
        page_id: &str,
        properties: Map<String, Value>,
    ) -> Result<(), NotionError>;
}

/// Durable cover storage
#[async_trait]
pub trait CoverStore: Send + Sync {
    /// Produce a durable URL for a transient cover, or `None` this run
    async fn materialize(&self, transient_url: &str, record_id: &str) -> Option<String>;

    /// Whether a URL already points at this store
    fn is_durable(&self, url: &str) -> bool;
}

/// Place-search service
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Top candidate for a name, optionally scoped to a city
    async fn search(&self, name: &str, city: &str) -> Option<GeoResult>;
}

/// Fetch every record of a data source, in source order.
///
/// Any batch failure is fatal for the whole run: a truncated record set
/// would silently hide entries from consumers, so no partial sequence is
/// ever returned.
pub async fn fetch_all_records<S: RecordSource>(
    source: &S,
    data_source_id: &str,
) -> Result<Vec<Page>, NotionError> {
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let batch = source.query_page(data_source_id, cursor.as_deref()).await?;
        pages.extend(batch.results);

        if !batch.has_more {
            break;
        }
        match batch.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                tracing::warn!("Source reported more pages but no cursor; stopping");
                break;
            }
        }
    }

    Ok(pages)
}

/// One-shot enrichment pipeline over injected collaborators
pub struct SyncPipeline<S, C, G> {
    source: S,
    covers: C,
    geocoder: G,
}

impl<S: RecordSource, C: CoverStore, G: Geocoder> SyncPipeline<S, C, G> {
    pub fn new(source: S, covers: C, geocoder: G) -> Self {
        Self {
            source,
            covers,
            geocoder,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn covers(&self) -> &C {
        &self.covers
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    /// Run one full pass and return the normalized records in source order.
    pub async fn run(&self, database_id: &str) -> Result<Vec<Restaurant>, NotionError> {
        let data_source_id = self.source.resolve_data_source(database_id).await?;

        let pages = fetch_all_records(&self.source, &data_source_id).await?;
        tracing::info!(count = pages.len(), "Fetched records");

        let mut records = Vec::with_capacity(pages.len());
        for page in &pages {
            let (record, changes) =
                reconcile::reconcile(page, &self.covers, &self.geocoder).await;

            if !changes.is_empty() {
                let properties = changes.into_properties(page);
                tracing::debug!(
                    id = %page.id,
                    fields = ?properties.keys().collect::<Vec<_>>(),
                    "Writing back enriched fields"
                );
                // At-least-once: a failed write-back is retried naturally on
                // the next run, and the snapshot keeps the in-memory value.
                if let Err(e) = self.source.update_page(&page.id, properties).await {
                    tracing::warn!(id = %page.id, error = %e, "Write-back failed");
                }
            }

            records.push(record.normalized());
        }

        Ok(records)
    }
}
