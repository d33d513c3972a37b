//! Demographics from postcodearea.co.uk district pages.
//!
//! Page URLs embed the postal town (`/postaltowns/{town}/{outward}/`), and
//! the site serves its default town's page for districts it cannot place.
//! The adapter therefore only claims keys in its [`CoverageTable`].

use areascope::normalize::parse_float;
use areascope::{Concept, LocationKey, NormalizedRecord, ScraperError};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::{join_url, Capability, CoverageTable, SourceAdapter, SourceDescriptor};
use crate::acquisition::FetchClient;

pub const DEFAULT_BASE_URL: &str = "https://www.postcodearea.co.uk";

/// Row label (lowercase, as shown on the page) to canonical field.
const LABELS: &[(&str, &str)] = &[
    ("population", "population"),
    ("households", "households"),
    ("average household income", "avg_household_income"),
    ("unemployment rate", "unemployment_rate"),
    ("working", "working"),
    ("unemployed", "unemployed"),
    ("ab", "ab"),
    ("c1/c2", "c1_c2"),
    ("de", "de"),
    ("white", "white"),
    ("non-white", "non_white"),
];

/// Map a row label to its field. Labels may carry a trailing year or unit,
/// e.g. `Average household income (2020)`.
fn field_for(label: &str) -> Option<&'static str> {
    let label = label.trim().trim_end_matches(':').to_lowercase();
    let label = match label.find('(') {
        Some(i) => label[..i].trim_end().to_string(),
        None => label,
    };
    LABELS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, field)| *field)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    areascope::normalize::clean_text(&cell.text().collect::<String>())
}

/// Read every recognised `label | value` row from a district page.
///
/// Rows may be `<tr><th>label</th><td>value</td></tr>` or two `<td>`s.
pub fn parse_district_page(
    html: &str,
    key: &LocationKey,
) -> Result<NormalizedRecord, ScraperError> {
    let doc = Html::parse_document(html);
    let mut record = NormalizedRecord::new();

    if let (Ok(rows), Ok(cells)) = (Selector::parse("tr"), Selector::parse("th, td")) {
        for row in doc.select(&rows) {
            let mut cells = row.select(&cells);
            let (Some(label), Some(value)) = (cells.next(), cells.next()) else {
                continue;
            };
            let Some(field) = field_for(&cell_text(label)) else {
                continue;
            };
            let raw = cell_text(value);
            match parse_float(&raw) {
                Some(v) => record.insert(field, v),
                None => debug!("postcodearea: unreadable {field} value {raw:?} for {key}"),
            }
        }
    }

    if record.is_empty() {
        return Err(ScraperError::parsing(
            "postcodearea",
            key,
            "no demographic rows on district page",
        ));
    }
    Ok(record.conform(Concept::Demographics.schema()))
}

/// District-level demographics for keys in the coverage table.
pub struct PostcodeAreaSource {
    descriptor: SourceDescriptor,
    client: FetchClient,
    base_url: String,
    coverage: CoverageTable,
}

impl PostcodeAreaSource {
    pub fn new(client: FetchClient) -> Self {
        Self {
            descriptor: SourceDescriptor::new(
                "postcodearea",
                Concept::Demographics,
                Capability::Network,
                0,
            ),
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            coverage: CoverageTable::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_coverage(mut self, coverage: CoverageTable) -> Self {
        self.coverage = coverage;
        self
    }

    /// District page URL, or `None` outside coverage.
    pub fn page_url(&self, key: &LocationKey) -> Option<String> {
        let town = self.coverage.town_for(key)?;
        Some(join_url(
            &self.base_url,
            &format!("postaltowns/{town}/{}/", key.outward().to_lowercase()),
        ))
    }
}

#[async_trait]
impl SourceAdapter for PostcodeAreaSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn covers(&self, key: &LocationKey) -> bool {
        self.coverage.contains(key)
    }

    async fn scrape(&self, key: &LocationKey) -> Result<NormalizedRecord, ScraperError> {
        let url = self.page_url(key).ok_or_else(|| {
            ScraperError::parsing("postcodearea", key, "district has no known postal town")
        })?;
        info!("fetching demographics for {key} from {url}");
        let body = self.client.get_text(&url).await?;
        parse_district_page(&body, key)
    }
}
