//! Geocoding from the postcodes.io JSON API.
//!
//! Full postcodes resolve through `/postcodes/{postcode}`; bare districts
//! through `/outcodes/{outcode}`, whose administrative fields are arrays
//! (a district can straddle boroughs), so the first entry is used.

use areascope::{Concept, LocationKey, NormalizedRecord, ScraperError};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{join_url, Capability, SourceAdapter, SourceDescriptor};
use crate::acquisition::FetchClient;

pub const DEFAULT_BASE_URL: &str = "https://api.postcodes.io";

const NUMBER_FIELDS: &[&str] = &["latitude", "longitude"];
const TEXT_FIELDS: &[&str] = &["admin_district", "region", "country"];

/// A string, or the first string of an array.
fn text_field(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(Value::as_str),
        _ => None,
    }
}

/// Read the `result` object of a postcodes.io response.
pub fn parse_lookup(body: &str, key: &LocationKey) -> Result<NormalizedRecord, ScraperError> {
    let doc: Value = serde_json::from_str(body)
        .map_err(|e| ScraperError::parsing("postcodes-io", key, format!("invalid JSON: {e}")))?;
    let result = doc
        .get("result")
        .filter(|r| r.is_object())
        .ok_or_else(|| ScraperError::parsing("postcodes-io", key, "response has no result"))?;

    let mut record = NormalizedRecord::new();
    for field in NUMBER_FIELDS {
        if let Some(v) = result.get(*field).and_then(Value::as_f64) {
            record.insert(*field, v);
        }
    }
    for field in TEXT_FIELDS {
        if let Some(v) = result.get(*field).and_then(text_field) {
            record.insert(*field, v);
        }
    }

    if record.is_empty() {
        return Err(ScraperError::parsing("postcodes-io", key, "result has no location fields"));
    }
    Ok(record.conform(Concept::Geocoding.schema()))
}

/// Coordinates and administrative area for a key.
pub struct PostcodesIoSource {
    descriptor: SourceDescriptor,
    client: FetchClient,
    base_url: String,
}

impl PostcodesIoSource {
    pub fn new(client: FetchClient) -> Self {
        Self {
            descriptor: SourceDescriptor::new(
                "postcodes-io",
                Concept::Geocoding,
                Capability::Network,
                0,
            ),
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn lookup_url(&self, key: &LocationKey) -> String {
        if key.is_district() {
            join_url(&self.base_url, &format!("outcodes/{}", key.outward()))
        } else {
            join_url(&self.base_url, &format!("postcodes/{}", key.compact()))
        }
    }
}

#[async_trait]
impl SourceAdapter for PostcodesIoSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn scrape(&self, key: &LocationKey) -> Result<NormalizedRecord, ScraperError> {
        let url = self.lookup_url(key);
        info!("geocoding {key} via {url}");
        let body = self.client.get_text(&url).await?;
        parse_lookup(&body, key)
    }
}
