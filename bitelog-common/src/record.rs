//! Snapshot record model
//!
//! `Restaurant` is the normalized shape published to the front end. Field
//! names serialize in camelCase to match the JSON the store consumes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One synchronized restaurant entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    /// Stable page id from the source (opaque, immutable)
    pub id: String,
    /// Display name
    pub name: String,
    /// Transient cover image URL (expiring source-hosted file), empty if none
    pub cover: String,
    /// Durable CDN cover URL, empty if not yet materialized
    pub cover_url: String,
    /// Free-form tags, order preserved for display
    pub tags: Vec<String>,
    /// Categorical rating label
    pub rating: String,
    /// Review text
    pub review: String,
    /// Price per person
    pub price: f64,
    /// City name, empty when unknown
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Resolved street address, empty when unknown
    pub location: String,
    /// Visit date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Last modification timestamp, owned by the source
    pub last_edited: DateTime<Utc>,
}

impl Restaurant {
    /// Apply the publish-time invariants.
    ///
    /// - A durable cover URL supersedes the transient one, which must not
    ///   leak into the snapshot.
    /// - Longitude and latitude are either both present or both absent;
    ///   a singleton coordinate is unusable and is dropped.
    pub fn normalized(mut self) -> Self {
        if !self.cover_url.is_empty() {
            self.cover.clear();
        }
        if self.longitude.is_some() != self.latitude.is_some() {
            self.longitude = None;
            self.latitude = None;
        }
        self
    }

    /// True when both coordinates are present
    pub fn has_coordinates(&self) -> bool {
        self.longitude.is_some() && self.latitude.is_some()
    }
}
