//! End-to-end pipeline tests over fake network collaborators
//!
//! Every collaborator the pipeline talks to is replaced by an in-memory
//! fake that counts calls and captures write-backs, so these tests pin the
//! pipeline's ordering, backfill, and degradation behavior without any
//! network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use bitelog_sync::pipeline::{
    fetch_all_records, CoverStore, Geocoder, RecordSource, SyncPipeline,
};
use bitelog_sync::services::amap::GeoResult;
use bitelog_sync::services::notion::{NotionError, Page, QueryBatch};

// ---------------------------------------------------------------------------
// Fakes

struct MockSource {
    batches: Vec<QueryBatch>,
    updates: Mutex<Vec<(String, Map<String, Value>)>>,
    fail_updates: bool,
    fail_query_at: Option<usize>,
}

impl MockSource {
    fn with_batches(batches: Vec<QueryBatch>) -> Self {
        Self {
            batches,
            updates: Mutex::new(Vec::new()),
            fail_updates: false,
            fail_query_at: None,
        }
    }

    fn single(pages: Vec<Page>) -> Self {
        Self::with_batches(vec![QueryBatch {
            results: pages,
            has_more: false,
            next_cursor: None,
        }])
    }

    fn updates(&self) -> Vec<(String, Map<String, Value>)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSource for MockSource {
    async fn resolve_data_source(&self, _database_id: &str) -> Result<String, NotionError> {
        Ok("ds-1".to_string())
    }

    async fn query_page(
        &self,
        _data_source_id: &str,
        cursor: Option<&str>,
    ) -> Result<QueryBatch, NotionError> {
        let index: usize = cursor.map_or(0, |c| c.parse().unwrap());
        if self.fail_query_at == Some(index) {
            return Err(NotionError::Api(502, "bad gateway".to_string()));
        }
        Ok(self.batches[index].clone())
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: Map<String, Value>,
    ) -> Result<(), NotionError> {
        self.updates
            .lock()
            .unwrap()
            .push((page_id.to_string(), properties));
        if self.fail_updates {
            return Err(NotionError::Api(500, "boom".to_string()));
        }
        Ok(())
    }
}

const DURABLE_PREFIX: &str = "https://cdn.jsdelivr.net/gh/u/r@";

struct FakeCovers {
    result: Option<String>,
    calls: AtomicUsize,
}

impl FakeCovers {
    fn unavailable() -> Self {
        Self {
            result: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn returning(url: &str) -> Self {
        Self {
            result: Some(url.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CoverStore for FakeCovers {
    async fn materialize(&self, _transient_url: &str, _record_id: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }

    fn is_durable(&self, url: &str) -> bool {
        !url.is_empty() && url.starts_with(DURABLE_PREFIX)
    }
}

struct FakeGeo {
    result: Option<GeoResult>,
    queries: Mutex<Vec<(String, String)>>,
}

impl FakeGeo {
    fn empty() -> Self {
        Self {
            result: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    fn shanghai() -> Self {
        Self {
            result: Some(GeoResult {
                longitude: 121.47,
                latitude: 31.23,
                address: "Shanghai Jing'an District 123 Main St".to_string(),
                city: "Shanghai".to_string(),
            }),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FakeGeo {
    async fn search(&self, name: &str, city: &str) -> Option<GeoResult> {
        self.queries
            .lock()
            .unwrap()
            .push((name.to_string(), city.to_string()));
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures

fn page(id: &str, properties: Value) -> Page {
    serde_json::from_value(json!({
        "id": id,
        "last_edited_time": "2026-05-01T08:30:00.000Z",
        "properties": properties,
    }))
    .unwrap()
}

fn named_page(id: &str, name: &str) -> Page {
    page(
        id,
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": name }] },
        }),
    )
}

fn batches_of(sizes: &[usize]) -> Vec<QueryBatch> {
    let mut batches = Vec::new();
    let mut counter = 0;
    for (i, &size) in sizes.iter().enumerate() {
        let results = (0..size)
            .map(|_| {
                let p = named_page(&format!("p{}", counter), "Old Town Cafe");
                counter += 1;
                p
            })
            .collect();
        let last = i + 1 == sizes.len();
        batches.push(QueryBatch {
            results,
            has_more: !last,
            next_cursor: if last { None } else { Some((i + 1).to_string()) },
        });
    }
    batches
}

// ---------------------------------------------------------------------------
// Pagination

#[tokio::test]
async fn test_pagination_accumulates_every_page_in_order() {
    let source = MockSource::with_batches(batches_of(&[2, 3, 1]));

    let pages = fetch_all_records(&source, "ds-1").await.unwrap();

    assert_eq!(pages.len(), 6);
    let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4", "p5"]);
}

#[tokio::test]
async fn test_page_fetch_failure_is_fatal() {
    let mut source = MockSource::with_batches(batches_of(&[2, 2]));
    source.fail_query_at = Some(1);

    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::empty());
    let result = pipeline.run("db-1").await;

    assert!(matches!(result, Err(NotionError::Api(502, _))));
}

// ---------------------------------------------------------------------------
// Geo enrichment

#[tokio::test]
async fn test_old_town_cafe_scenario() {
    let record_page = page(
        "p-cafe",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "City": { "type": "select", "select": null },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::shanghai());

    let records = pipeline.run("db-1").await.unwrap();

    let record = &records[0];
    assert_eq!(record.longitude, Some(121.47));
    assert_eq!(record.latitude, Some(31.23));
    assert_eq!(record.location, "Shanghai Jing'an District 123 Main St");
    assert_eq!(record.city, "Shanghai");

    let updates = pipeline_updates(&pipeline);
    assert_eq!(updates.len(), 1);
    let (page_id, properties) = &updates[0];
    assert_eq!(page_id, "p-cafe");

    let mut fields: Vec<&str> = properties.keys().map(String::as_str).collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["City", "Latitude", "Location", "Longitude"]);

    // City property was declared select, so the write-back keeps that shape
    assert_eq!(
        properties["City"],
        json!({ "select": { "name": "Shanghai" } })
    );
    assert_eq!(properties["Longitude"], json!({ "number": 121.47 }));
}

#[tokio::test]
async fn test_populated_longitude_is_never_overwritten() {
    let record_page = page(
        "p-1",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "Longitude": { "type": "number", "number": 100.0 },
            "City": { "type": "rich_text", "rich_text": [{ "plain_text": "Beijing" }] },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let geocoder = FakeGeo::shanghai();
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), geocoder);

    let records = pipeline.run("db-1").await.unwrap();

    assert_eq!(records[0].longitude, Some(100.0));
    assert_eq!(records[0].latitude, Some(31.23));
    assert_eq!(records[0].city, "Beijing");

    let updates = pipeline_updates(&pipeline);
    let (_, properties) = &updates[0];
    assert!(!properties.contains_key("Longitude"));
    assert!(!properties.contains_key("City"));
    assert!(properties.contains_key("Latitude"));
    assert!(properties.contains_key("Location"));
}

#[tokio::test]
async fn test_search_is_scoped_to_the_record_city() {
    let record_page = page(
        "p-1",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "City": { "type": "rich_text", "rich_text": [{ "plain_text": "Beijing" }] },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::empty());

    pipeline.run("db-1").await.unwrap();

    assert_eq!(
        pipeline_geo(&pipeline).queries(),
        vec![("Old Town Cafe".to_string(), "Beijing".to_string())]
    );
}

#[tokio::test]
async fn test_fully_enriched_record_triggers_no_collaborators() {
    let record_page = page(
        "p-1",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "Longitude": { "type": "number", "number": 121.47 },
            "Latitude": { "type": "number", "number": 31.23 },
            "Location": { "type": "rich_text", "rich_text": [{ "plain_text": "123 Main St" }] },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::shanghai());

    pipeline.run("db-1").await.unwrap();

    assert!(pipeline_updates(&pipeline).is_empty());
    assert!(pipeline_geo(&pipeline).queries().is_empty());
    assert_eq!(pipeline_covers(&pipeline).calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Cover materialization

#[tokio::test]
async fn test_durable_cover_short_circuits_materializer() {
    let record_page = page(
        "p-1",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "Cover": { "type": "files", "files": [
                { "type": "file", "file": { "url": "https://s3.example.com/expiring.png" } }
            ]},
            "CoverURL": { "type": "url", "url": "https://cdn.jsdelivr.net/gh/u/r@main/assets/covers/p1.jpg" },
            "Longitude": { "type": "number", "number": 121.47 },
            "Latitude": { "type": "number", "number": 31.23 },
            "Location": { "type": "rich_text", "rich_text": [{ "plain_text": "123 Main St" }] },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::empty());

    let records = pipeline.run("db-1").await.unwrap();

    assert_eq!(pipeline_covers(&pipeline).calls.load(Ordering::SeqCst), 0);
    // Transient reference is still cleared in the published record
    assert_eq!(records[0].cover, "");
    assert_eq!(
        records[0].cover_url,
        "https://cdn.jsdelivr.net/gh/u/r@main/assets/covers/p1.jpg"
    );
}

#[tokio::test]
async fn test_materialized_cover_is_written_back_and_stripped() {
    let durable = "https://cdn.jsdelivr.net/gh/u/r@main/assets/covers/p1.jpg";
    let record_page = page(
        "p-1",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "Cover": { "type": "files", "files": [
                { "type": "file", "file": { "url": "https://s3.example.com/expiring.png" } }
            ]},
            "Longitude": { "type": "number", "number": 121.47 },
            "Latitude": { "type": "number", "number": 31.23 },
            "Location": { "type": "rich_text", "rich_text": [{ "plain_text": "123 Main St" }] },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let pipeline = SyncPipeline::new(source, FakeCovers::returning(durable), FakeGeo::empty());

    let records = pipeline.run("db-1").await.unwrap();

    assert_eq!(records[0].cover_url, durable);
    assert_eq!(records[0].cover, "");

    let updates = pipeline_updates(&pipeline);
    assert_eq!(updates.len(), 1);
    let (_, properties) = &updates[0];
    assert_eq!(properties["CoverURL"], json!({ "url": durable }));
}

#[tokio::test]
async fn test_failed_materialization_leaves_cover_fields_alone() {
    let record_page = page(
        "p-1",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "Cover": { "type": "files", "files": [
                { "type": "file", "file": { "url": "https://s3.example.com/expiring.png" } }
            ]},
            "Longitude": { "type": "number", "number": 121.47 },
            "Latitude": { "type": "number", "number": 31.23 },
            "Location": { "type": "rich_text", "rich_text": [{ "plain_text": "123 Main St" }] },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::empty());

    let records = pipeline.run("db-1").await.unwrap();

    assert_eq!(pipeline_covers(&pipeline).calls.load(Ordering::SeqCst), 1);
    assert!(pipeline_updates(&pipeline).is_empty());
    // No durable reference, so the transient one stays visible
    assert_eq!(records[0].cover, "https://s3.example.com/expiring.png");
    assert_eq!(records[0].cover_url, "");
}

// ---------------------------------------------------------------------------
// Degradation and invariants

#[tokio::test]
async fn test_write_back_failure_does_not_abort_nor_roll_back() {
    let mut source = MockSource::single(vec![named_page("p-1", "Old Town Cafe")]);
    source.fail_updates = true;
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::shanghai());

    let records = pipeline.run("db-1").await.unwrap();

    // The snapshot still reflects the enrichment; the next run retries
    assert_eq!(records[0].longitude, Some(121.47));
    assert_eq!(pipeline_updates(&pipeline).len(), 1);
}

#[tokio::test]
async fn test_orphan_coordinate_is_dropped_when_geocode_fails() {
    let record_page = page(
        "p-1",
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Old Town Cafe" }] },
            "Longitude": { "type": "number", "number": 100.0 },
        }),
    );
    let source = MockSource::single(vec![record_page]);
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::empty());

    let records = pipeline.run("db-1").await.unwrap();

    assert!(records[0].longitude.is_none());
    assert!(records[0].latitude.is_none());
}

#[tokio::test]
async fn test_output_invariants_hold_for_every_record() {
    let pages = vec![
        named_page("p-0", "Old Town Cafe"),
        page(
            "p-1",
            json!({
                "Name": { "type": "title", "title": [{ "plain_text": "Noodle Bar" }] },
                "Cover": { "type": "files", "files": [
                    { "type": "file", "file": { "url": "https://s3.example.com/n.png" } }
                ]},
                "CoverURL": { "type": "url", "url": "https://cdn.jsdelivr.net/gh/u/r@main/assets/covers/p1.jpg" },
            }),
        ),
        page(
            "p-2",
            json!({
                "Name": { "type": "title", "title": [{ "plain_text": "Dumpling House" }] },
                "Latitude": { "type": "number", "number": 31.23 },
            }),
        ),
    ];
    let source = MockSource::single(pages);
    let pipeline = SyncPipeline::new(source, FakeCovers::unavailable(), FakeGeo::empty());

    let records = pipeline.run("db-1").await.unwrap();

    for record in &records {
        assert_eq!(
            record.longitude.is_some(),
            record.latitude.is_some(),
            "coordinate pairing violated for {}",
            record.id
        );
        if !record.cover_url.is_empty() {
            assert!(
                record.cover.is_empty(),
                "transient cover leaked for {}",
                record.id
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors into the pipeline's collaborators

fn pipeline_updates(
    pipeline: &SyncPipeline<MockSource, FakeCovers, FakeGeo>,
) -> Vec<(String, Map<String, Value>)> {
    pipeline.source().updates()
}

fn pipeline_covers(pipeline: &SyncPipeline<MockSource, FakeCovers, FakeGeo>) -> &FakeCovers {
    pipeline.covers()
}

fn pipeline_geo(pipeline: &SyncPipeline<MockSource, FakeCovers, FakeGeo>) -> &FakeGeo {
    pipeline.geocoder()
}
