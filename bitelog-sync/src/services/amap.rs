//! AMap place-search client
//!
//! Queries the place text-search endpoint to backfill coordinates and a
//! resolved address for records that lack them. Transport failures are
//! retried on a fixed schedule; an empty candidate list is a terminal
//! negative answer and is never retried. The client never surfaces an
//! error to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::pipeline::Geocoder;

const AMAP_PLACE_URL: &str = "https://restapi.amap.com/v3/place/text";
const USER_AGENT: &str = "bitelog-sync/0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const RATE_LIMIT_MS: u64 = 300;
/// Placeholder name given to records without a title; never worth querying
const UNKNOWN_NAME: &str = "Unknown";

/// Geocoding client errors
#[derive(Debug, Error)]
pub enum GeoError {
    /// Network communication error or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Endpoint returned a non-success HTTP status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Endpoint answered with a non-OK service status
    #[error("Service status error: {0}")]
    Status(String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Top-ranked geocoding candidate
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResult {
    pub longitude: f64,
    pub latitude: f64,
    /// Resolved address: city + district + street
    pub address: String,
    /// Resolved city name
    pub city: String,
}

#[derive(Debug, Deserialize)]
struct PlaceResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    pois: Vec<Poi>,
}

// Absent POI fields come back as empty arrays, not strings
#[derive(Debug, Deserialize)]
struct Poi {
    #[serde(default, deserialize_with = "lenient_string")]
    location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    cityname: String,
    #[serde(default, deserialize_with = "lenient_string")]
    adname: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Rate limiter keeping a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Geocoder rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Retry an operation on error with a fixed delay between attempts.
///
/// `Ok(None)` is a terminal negative answer and stops immediately; only
/// errors consume further attempts. Exhausted attempts degrade to `None`.
async fn retry_with_fixed_delay<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, GeoError>>,
{
    for attempt in 1..=attempts {
        match op().await {
            Ok(result) => return result,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Geocode attempt failed");
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    None
}

/// AMap place-search API client
pub struct AmapClient {
    http: reqwest::Client,
    key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl AmapClient {
    pub fn new(key: &str) -> Result<Self, GeoError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GeoError::Network(e.to_string()))?;

        Ok(Self {
            http,
            key: key.to_string(),
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }

    async fn attempt(&self, name: &str, city: &str) -> Result<Option<GeoResult>, GeoError> {
        self.rate_limiter.wait().await;

        let mut request = self
            .http
            .get(AMAP_PLACE_URL)
            .query(&[("key", self.key.as_str()), ("keywords", name)]);
        if !city.is_empty() {
            request = request.query(&[("city", city), ("citylimit", "true")]);
        }

        tracing::debug!(name = %name, city = %city, "Querying place search");

        let response = request
            .send()
            .await
            .map_err(|e| GeoError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeoError::Api(status.as_u16(), body));
        }

        let place: PlaceResponse = response
            .json()
            .await
            .map_err(|e| GeoError::Parse(e.to_string()))?;

        if place.status != "1" {
            return Err(GeoError::Status(place.info));
        }

        // First-ranked candidate only
        let Some(poi) = place.pois.first() else {
            return Ok(None);
        };

        let Some((longitude, latitude)) = parse_location(&poi.location) else {
            tracing::warn!(location = %poi.location, "Candidate has unusable coordinates");
            return Ok(None);
        };

        Ok(Some(GeoResult {
            longitude,
            latitude,
            address: format!("{}{}{}", poi.cityname, poi.adname, poi.address),
            city: poi.cityname.clone(),
        }))
    }
}

/// Parse a `"lng,lat"` pair
fn parse_location(location: &str) -> Option<(f64, f64)> {
    let (lng, lat) = location.split_once(',')?;
    Some((lng.trim().parse().ok()?, lat.trim().parse().ok()?))
}

#[async_trait]
impl Geocoder for AmapClient {
    async fn search(&self, name: &str, city: &str) -> Option<GeoResult> {
        if name.is_empty() || name.eq_ignore_ascii_case(UNKNOWN_NAME) {
            tracing::debug!("Skipping geocode for placeholder name");
            return None;
        }

        let result =
            retry_with_fixed_delay(RETRY_ATTEMPTS, RETRY_DELAY, || self.attempt(name, city)).await;

        match &result {
            Some(found) => tracing::info!(
                name = %name,
                longitude = found.longitude,
                latitude = found.latitude,
                "Geocode hit"
            ),
            None => tracing::info!(name = %name, "Geocode yielded nothing"),
        }
        result
    }
}
