//! Per-record reconciliation
//!
//! Decodes a raw page into a [`Restaurant`], fills missing derived fields
//! through the injected collaborators, and computes the minimal change-set
//! to push back to the source. Fields that already carry a value are never
//! overwritten.

use bitelog_common::Restaurant;
use serde_json::{Map, Value};

use crate::pipeline::{CoverStore, Geocoder};
use crate::props;
use crate::services::notion::Page;

/// Fields this run derived for one record; only previously-empty fields
/// are eligible
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub cover_url: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub location: Option<String>,
    pub city: Option<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.cover_url.is_none()
            && self.longitude.is_none()
            && self.latitude.is_none()
            && self.location.is_none()
            && self.city.is_none()
    }

    /// Build the partial property map for write-back.
    ///
    /// The city property's shape has drifted between select and rich text
    /// across the database's history; the existing property's declared
    /// type decides which shape is written back.
    pub fn into_properties(self, page: &Page) -> Map<String, Value> {
        let mut properties = Map::new();
        if let Some(url) = self.cover_url {
            properties.insert("CoverURL".to_string(), props::url_prop(&url));
        }
        if let Some(longitude) = self.longitude {
            properties.insert("Longitude".to_string(), props::number_prop(longitude));
        }
        if let Some(latitude) = self.latitude {
            properties.insert("Latitude".to_string(), props::number_prop(latitude));
        }
        if let Some(location) = self.location {
            properties.insert("Location".to_string(), props::rich_text_prop(&location));
        }
        if let Some(city) = self.city {
            let value = match props::declared_type(&page.properties, "City") {
                Some("select") => props::select_prop(&city),
                _ => props::rich_text_prop(&city),
            };
            properties.insert("City".to_string(), value);
        }
        properties
    }
}

/// Decode a page's property bag into a record, defaults for everything
/// missing.
pub fn decode(page: &Page) -> Restaurant {
    let props = &page.properties;

    let name = {
        let title = props::title_text(props, "Name");
        if title.is_empty() {
            "Unknown".to_string()
        } else {
            title
        }
    };

    let city = match props::declared_type(props, "City") {
        Some("select") => props::select_name(props, "City"),
        _ => props::rich_text_text(props, "City"),
    };

    Restaurant {
        id: page.id.clone(),
        name,
        cover: props::file_url(props, "Cover"),
        cover_url: props::url_value(props, "CoverURL"),
        tags: props::multi_select_names(props, "Tags"),
        rating: props::select_name(props, "Rating"),
        review: props::rich_text_text(props, "Review"),
        price: props::number_value(props, "Price").unwrap_or(0.0),
        city,
        longitude: props::number_value(props, "Longitude"),
        latitude: props::number_value(props, "Latitude"),
        location: props::rich_text_text(props, "Location"),
        date: props::date_start(props, "Date"),
        last_edited: page.last_edited_time,
    }
}

/// Reconcile one record: fill missing derived fields, never overwrite.
pub async fn reconcile<C, G>(page: &Page, covers: &C, geocoder: &G) -> (Restaurant, ChangeSet)
where
    C: CoverStore + ?Sized,
    G: Geocoder + ?Sized,
{
    let mut record = decode(page);
    let mut changes = ChangeSet::default();

    // Cover: materialize when there is a transient reference and no
    // durable one yet (or the recorded one points somewhere else).
    if !record.cover.is_empty()
        && (record.cover_url.is_empty() || !covers.is_durable(&record.cover_url))
    {
        if let Some(url) = covers.materialize(&record.cover, &record.id).await {
            record.cover_url = url.clone();
            changes.cover_url = Some(url);
        }
    }

    // Geo: one search per record at most, backfilling only empty fields.
    if record.longitude.is_none() || record.latitude.is_none() || record.location.is_empty() {
        if let Some(found) = geocoder.search(&record.name, &record.city).await {
            if record.longitude.is_none() {
                record.longitude = Some(found.longitude);
                changes.longitude = Some(found.longitude);
            }
            if record.latitude.is_none() {
                record.latitude = Some(found.latitude);
                changes.latitude = Some(found.latitude);
            }
            if record.location.is_empty() && !found.address.is_empty() {
                record.location = found.address.clone();
                changes.location = Some(found.address);
            }
            if record.city.is_empty() && !found.city.is_empty() {
                record.city = found.city.clone();
                changes.city = Some(found.city);
            }
        }
    }

    (record, changes)
}
