//! Nearby venues from Google Maps search results.
//!
//! One search per category ("universities near UB5 5AF"), all in the same
//! browser session. Only the first page of results is read, so counts are
//! capped at [`MAX_RESULTS`].

use areascope::normalize::clean_text;
use areascope::{BlockReason, BrowserConfig, Concept, LocationKey, NormalizedRecord, ScraperError};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{join_url, Capability, SourceAdapter, SourceDescriptor};
use crate::renderer::{BrowserSessionManager, SessionLauncher};

pub const DEFAULT_BASE_URL: &str = "https://www.google.com/maps/search";

/// Results read per category.
pub const MAX_RESULTS: usize = 10;

const UNUSUAL_TRAFFIC_MARKER: &str = "unusual traffic";
const NO_RESULTS_MARKER: &str = "No results found";

/// A search term and the record field its count lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCategory {
    pub query: String,
    pub field: String,
}

impl PlaceCategory {
    pub fn new(query: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            field: field.into(),
        }
    }

    /// Universities, hospitals and major businesses.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("universities", "universities"),
            Self::new("hospitals", "hospitals"),
            Self::new("major businesses", "major_businesses"),
        ]
    }
}

/// One search result card.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    /// `0.0` when the card shows no rating.
    pub rating: f64,
    pub reviews: i64,
}

/// Up to [`MAX_RESULTS`] result cards, in page order.
pub fn parse_results(html: &str) -> Vec<Place> {
    let doc = Html::parse_document(html);
    let Ok(cards) = Selector::parse("a.hfpxzc") else {
        return Vec::new();
    };
    let rating_re = Regex::new(r"(\d\.\d)\s*\((\d[\d,]*)\)").expect("rating regex is valid");

    doc.select(&cards)
        .take(MAX_RESULTS)
        .map(|card| {
            let name = card
                .value()
                .attr("aria-label")
                .map(clean_text)
                .unwrap_or_else(|| "Unknown".into());
            // Rating and review count live beside the anchor, not inside it.
            let container = card.parent().and_then(ElementRef::wrap).unwrap_or(card);
            let text = container.text().collect::<Vec<_>>().join(" ");
            let (rating, reviews) = rating_re
                .captures(&text)
                .map(|c| {
                    (
                        c[1].parse::<f64>().unwrap_or(0.0),
                        c[2].replace(',', "").parse::<i64>().unwrap_or(0),
                    )
                })
                .unwrap_or((0.0, 0));
            Place { name, rating, reviews }
        })
        .collect()
}

/// Record for the places concept from per-category results.
///
/// Missing categories stay neutral. The average rating covers rated places
/// only.
pub fn places_record(results: &[(&PlaceCategory, Vec<Place>)]) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();
    let mut rated = Vec::new();
    let mut total_reviews = 0;
    for (category, places) in results {
        record.insert(&category.field, places.len() as i64);
        rated.extend(places.iter().filter(|p| p.rating > 0.0).map(|p| p.rating));
        total_reviews += places.iter().map(|p| p.reviews).sum::<i64>();
    }
    if !rated.is_empty() {
        let avg = rated.iter().sum::<f64>() / rated.len() as f64;
        record.insert("avg_place_rating", (avg * 100.0).round() / 100.0);
    }
    record.insert("total_reviews", total_reviews);
    record.conform(Concept::Places.schema())
}

/// Google Maps category searches as a source adapter.
pub struct GoogleMapsPlacesSource {
    descriptor: SourceDescriptor,
    launcher: Arc<dyn SessionLauncher>,
    config: BrowserConfig,
    base_url: String,
    categories: Vec<PlaceCategory>,
    headless: bool,
}

impl GoogleMapsPlacesSource {
    pub fn new(launcher: Arc<dyn SessionLauncher>, config: BrowserConfig) -> Self {
        let headless = config.headless;
        Self {
            descriptor: SourceDescriptor::new(
                "google_maps",
                Concept::Places,
                Capability::Browser,
                0,
            ),
            launcher,
            config,
            base_url: DEFAULT_BASE_URL.to_string(),
            categories: PlaceCategory::defaults(),
            headless,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_categories(mut self, categories: Vec<PlaceCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// `{base}/{query}+near+{postcode}/`
    pub fn search_url(&self, category: &PlaceCategory, key: &LocationKey) -> String {
        let query = format!("{} near {}", category.query, key.as_str()).replace(' ', "+");
        format!("{}/", join_url(&self.base_url, &query))
    }

    async fn search(
        &self,
        manager: &mut BrowserSessionManager,
        category: &PlaceCategory,
        key: &LocationKey,
    ) -> Result<Vec<Place>, ScraperError> {
        let url = self.search_url(category, key);
        let session = manager.acquire(self.headless).await?;
        debug!("navigating to {url} (session {})", session.id());
        session.navigate(&url, self.config.page_load_timeout()).await?;
        let html = session.content().await?;

        if html.contains(UNUSUAL_TRAFFIC_MARKER) {
            return Err(ScraperError::Blocked {
                url,
                reason: BlockReason::SoftBlock(UNUSUAL_TRAFFIC_MARKER.to_string()),
            });
        }
        let places = parse_results(&html);
        if places.is_empty() && !html.contains(NO_RESULTS_MARKER) {
            return Err(ScraperError::parsing(
                self.name(),
                key,
                format!("no result cards for '{}'", category.query),
            ));
        }
        Ok(places)
    }
}

#[async_trait]
impl SourceAdapter for GoogleMapsPlacesSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn scrape(&self, key: &LocationKey) -> Result<NormalizedRecord, ScraperError> {
        let mut manager = BrowserSessionManager::new(self.launcher.clone(), self.config.clone());
        let mut found = Vec::with_capacity(self.categories.len());
        let mut last_error = None;
        for category in &self.categories {
            match self.search(&mut manager, category, key).await {
                Ok(places) => found.push((category, places)),
                // A block or a missing browser affects every category alike.
                Err(e @ (ScraperError::Blocked { .. } | ScraperError::Session(_))) => {
                    manager.release().await;
                    return Err(e);
                }
                Err(e) => {
                    warn!("{} search '{}' failed for {key}: {e}", self.name(), category.query);
                    last_error = Some(e);
                }
            }
        }
        manager.release().await;

        if found.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ScraperError::parsing(self.name(), key, "no place categories configured")
            }));
        }
        info!(
            "{} read {}/{} categories for {key}",
            self.name(),
            found.len(),
            self.categories.len()
        );
        Ok(places_record(&found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use areascope::FieldValue;

    const RESULTS: &str = r#"<div role="feed">
      <div><a class="hfpxzc" aria-label="Brunel University London" href="/a"></a>
        <span>4.5</span><span>(1,234)</span></div>
      <div><a class="hfpxzc" aria-label="University of West London" href="/b"></a>
        <span>3.9 (87)</span></div>
      <div><a class="hfpxzc" aria-label="Language School" href="/c"></a><span>No reviews</span></div>
    </div>"#;

    fn key() -> LocationKey {
        LocationKey::parse("UB5 5AF").unwrap()
    }

    #[test]
    fn test_parse_results() {
        let places = parse_results(RESULTS);
        assert_eq!(places.len(), 3);
        assert_eq!(places[0].name, "Brunel University London");
        assert_eq!(places[0].rating, 4.5);
        assert_eq!(places[0].reviews, 1234);
        assert_eq!(places[1].reviews, 87);
        assert_eq!(places[2].rating, 0.0);
        assert_eq!(places[2].reviews, 0);
    }

    #[test]
    fn test_parse_results_caps_at_first_page() {
        let card = r#"<div><a class="hfpxzc" aria-label="Clinic"></a></div>"#;
        let html = card.repeat(14);
        assert_eq!(parse_results(&html).len(), MAX_RESULTS);
    }

    #[test]
    fn test_search_url() {
        let launcher = Arc::new(crate::renderer::NoopLauncher);
        let source = GoogleMapsPlacesSource::new(launcher, BrowserConfig::default());
        let category = PlaceCategory::new("major businesses", "major_businesses");
        let url = source.search_url(&category, &key());
        assert_eq!(url, "https://www.google.com/maps/search/major+businesses+near+UB5+5AF/");
    }

    #[test]
    fn test_places_record_skips_unrated_places() {
        let categories = PlaceCategory::defaults();
        let record = places_record(&[
            (&categories[0], parse_results(RESULTS)),
            (&categories[1], Vec::new()),
        ]);
        assert_eq!(record.get("universities"), Some(&FieldValue::Integer(3)));
        assert_eq!(record.get("hospitals"), Some(&FieldValue::Integer(0)));
        assert_eq!(record.get("avg_place_rating"), Some(&FieldValue::Number(4.2)));
        assert_eq!(record.get("total_reviews"), Some(&FieldValue::Integer(1321)));
        // Category never searched.
        assert_eq!(record.get("major_businesses"), Some(&FieldValue::Integer(0)));
    }
}
