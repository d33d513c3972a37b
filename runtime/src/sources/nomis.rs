//! Census 2021 demographics from the Nomis REST API.
//!
//! Five topic-summary datasets are queried as CSV for the output area
//! containing the key:
//!
//! | Dataset     | Table | Fields                                  |
//! |-------------|-------|-----------------------------------------|
//! | `NM_2021_1` | TS001 | population                              |
//! | `NM_2023_1` | TS003 | households                              |
//! | `NM_2041_1` | TS021 | white, non_white                        |
//! | `NM_2083_1` | TS066 | working, unemployed, unemployment_rate  |
//! | `NM_2079_1` | TS062 | ab, c1_c2, de (NS-SeC mapped to grades) |
//!
//! A dataset that fails leaves its fields neutral; the record fails only
//! when every dataset fails or the API blocks us. Average household income
//! comes from Doogal, best effort.

use areascope::normalize::pct;
use areascope::{Concept, LocationKey, NormalizedRecord, ScraperError};
use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info, warn};

use super::{doogal, join_url, Capability, SourceAdapter, SourceDescriptor};
use crate::acquisition::{FetchClient, RequestOptions};

pub const DEFAULT_BASE_URL: &str = "https://www.nomisweb.co.uk/api/v01/dataset";

/// Census 2021 output areas.
const GEOGRAPHY_TYPE: u32 = 150;
/// Counts (as opposed to percentages).
const MEASURE_COUNT: &str = "20100";

const DS_POPULATION: &str = "NM_2021_1";
const DS_HOUSEHOLDS: &str = "NM_2023_1";
const DS_ETHNICITY: &str = "NM_2041_1";
const DS_NSSEC: &str = "NM_2079_1";
const DS_ECONOMIC: &str = "NM_2083_1";

const EMPLOYED_LABELS: &[&str] = &[
    "Economically active (excluding full-time students):In employment",
    "Economically active and a full-time student:In employment",
];
const UNEMPLOYED_LABELS: &[&str] = &[
    "Economically active (excluding full-time students): Unemployed",
    "Economically active and a full-time student: Unemployed",
];

/// NS-SeC label fragments grouped into traditional social grades.
const GRADE_AB: &[&str] = &["L1, L2 and L3", "L4, L5 and L6"];
const GRADE_C1_C2: &[&str] = &["L7 Intermediate", "L8 and L9", "L10 and L11"];
const GRADE_DE: &[&str] = &["L12 Semi-routine", "L13 Routine", "L14"];

/// One dataset response: header row plus data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CensusTable {
    /// Parse a Nomis CSV body. Empty bodies and header-only bodies are
    /// parsing failures.
    pub fn parse(dataset: &str, key: &LocationKey, body: &str) -> Result<Self, ScraperError> {
        let adapter = "nomis";
        if body.trim().is_empty() {
            return Err(ScraperError::parsing(adapter, key, format!("{dataset} returned no data")));
        }

        let mut reader = csv::Reader::from_reader(body.trim().as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| ScraperError::parsing(adapter, key, format!("{dataset} CSV header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let rows = reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect::<Vec<_>>()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ScraperError::parsing(adapter, key, format!("{dataset} CSV row: {e}")))?;

        if rows.is_empty() {
            let reason = format!("{dataset} CSV had no data rows");
            return Err(ScraperError::parsing(adapter, key, reason));
        }
        if !headers.iter().any(|h| h == "OBS_VALUE") {
            let reason = format!("{dataset} CSV has no OBS_VALUE column");
            return Err(ScraperError::parsing(adapter, key, reason));
        }

        Ok(Self { headers, rows })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// The category label column, whose name varies by classification
    /// variant (`C2021_ETH_20_NAME`, `C2021_ETH_9_NAME`, ...).
    fn name_column(&self, prefix: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.starts_with(prefix) && h.ends_with("_NAME"))
    }

    fn value(&self, row: &[String]) -> i64 {
        self.column("OBS_VALUE")
            .and_then(|i| row.get(i))
            .and_then(|v| areascope::normalize::parse_int(v))
            .unwrap_or(0)
    }

    /// The first row is always the total.
    pub fn total(&self) -> i64 {
        self.rows.first().map(|row| self.value(row)).unwrap_or(0)
    }

    /// `(label, value)` pairs for the category column starting with `prefix`.
    fn labelled(&self, prefix: &str) -> Vec<(&str, i64)> {
        let Some(name_col) = self.name_column(prefix) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| {
                let label = row.get(name_col)?.trim();
                Some((label, self.value(row)))
            })
            .collect()
    }
}

fn apply_population(record: &mut NormalizedRecord, table: &CensusTable) {
    record.insert("population", table.total());
}

fn apply_households(record: &mut NormalizedRecord, table: &CensusTable) {
    record.insert("households", table.total());
}

fn apply_ethnicity(record: &mut NormalizedRecord, table: &CensusTable) {
    let total = table.total() as f64;
    let white = table
        .labelled("C2021_ETH")
        .into_iter()
        .find(|(label, _)| *label == "White")
        .map_or(0, |(_, v)| v) as f64;
    record.insert("white", pct(white, total));
    record.insert("non_white", pct(total - white, total));
}

fn apply_economic_activity(record: &mut NormalizedRecord, table: &CensusTable) {
    let total = table.total() as f64;
    let (mut employed, mut unemployed) = (0i64, 0i64);
    for (label, value) in table.labelled("C2021_EASTAT") {
        if EMPLOYED_LABELS.contains(&label) {
            employed += value;
        } else if UNEMPLOYED_LABELS.contains(&label) {
            unemployed += value;
        }
    }
    let unemployed_pct = pct(unemployed as f64, total);
    record.insert("working", pct(employed as f64, total));
    record.insert("unemployed", unemployed_pct);
    record.insert("unemployment_rate", unemployed_pct);
}

fn apply_social_grades(record: &mut NormalizedRecord, table: &CensusTable) {
    let total = table.total() as f64;
    let (mut ab, mut c1_c2, mut de) = (0i64, 0i64, 0i64);
    let matches = |label: &str, group: &[&str]| group.iter().any(|g| label.contains(g));
    for (label, value) in table.labelled("C2021_NSSEC") {
        if matches(label, GRADE_AB) {
            ab += value;
        } else if matches(label, GRADE_C1_C2) {
            c1_c2 += value;
        } else if matches(label, GRADE_DE) {
            de += value;
        }
    }
    record.insert("ab", pct(ab as f64, total));
    record.insert("c1_c2", pct(c1_c2 as f64, total));
    record.insert("de", pct(de as f64, total));
}

type Apply = fn(&mut NormalizedRecord, &CensusTable);

const DATASETS: &[(&str, Apply)] = &[
    (DS_POPULATION, apply_population),
    (DS_HOUSEHOLDS, apply_households),
    (DS_ETHNICITY, apply_ethnicity),
    (DS_ECONOMIC, apply_economic_activity),
    (DS_NSSEC, apply_social_grades),
];

/// Demographics from official Census tables, enriched with Doogal income.
pub struct NomisCensusSource {
    descriptor: SourceDescriptor,
    client: FetchClient,
    base_url: String,
    doogal_url: Option<String>,
}

impl NomisCensusSource {
    pub fn new(client: FetchClient) -> Self {
        Self {
            descriptor: SourceDescriptor::new(
                "nomis",
                Concept::Demographics,
                Capability::Network,
                1,
            ),
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            doogal_url: Some(doogal::DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Where to look up income; `None` skips the lookup.
    pub fn with_income_source(mut self, base_url: Option<String>) -> Self {
        self.doogal_url = base_url;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.descriptor.priority = priority;
        self
    }

    async fn dataset(&self, dataset: &str, key: &LocationKey) -> Result<CensusTable, ScraperError> {
        let url = join_url(&self.base_url, &format!("{dataset}.data.csv"));
        let options = RequestOptions::default()
            .query("geography", format!("POSTCODE|{};{GEOGRAPHY_TYPE}", key.as_str()))
            .query("measures", MEASURE_COUNT);
        debug!("Nomis request: {url} ({dataset}, {key})");
        let response = self.client.request(&url, Method::GET, &options).await?;
        CensusTable::parse(dataset, key, &response.body)
    }

    async fn income(&self, key: &LocationKey) -> i64 {
        let Some(base) = &self.doogal_url else {
            return 0;
        };
        match doogal::fetch_income(&self.client, base, key).await {
            Ok(Some(income)) => income,
            Ok(None) => {
                warn!("could not find household income on Doogal for {key}");
                0
            }
            Err(e) => {
                warn!("Doogal income lookup failed for {key}: {e}");
                0
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for NomisCensusSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn scrape(&self, key: &LocationKey) -> Result<NormalizedRecord, ScraperError> {
        info!("fetching demographics for {key} via Nomis");
        let mut record = NormalizedRecord::new();
        let mut last_error = None;

        for (dataset, apply) in DATASETS {
            match self.dataset(dataset, key).await {
                Ok(table) => apply(&mut record, &table),
                Err(e @ ScraperError::Blocked { .. }) => return Err(e),
                Err(e) => {
                    warn!("Nomis {dataset} failed for {key}: {e}");
                    last_error = Some(e);
                }
            }
        }

        if record.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ScraperError::parsing("nomis", key, "no dataset returned data")
            }));
        }

        record.insert("avg_household_income", self.income(key).await);
        Ok(record.conform(Concept::Demographics.schema()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use areascope::FieldValue;

    fn key() -> LocationKey {
        LocationKey::parse("UB5 5AF").unwrap()
    }

    #[test]
    fn test_parse_rejects_empty_and_header_only() {
        assert!(matches!(
            CensusTable::parse(DS_POPULATION, &key(), "  "),
            Err(ScraperError::Parsing { .. })
        ));
        assert!(matches!(
            CensusTable::parse(DS_POPULATION, &key(), "GEOGRAPHY_NAME,OBS_VALUE\n"),
            Err(ScraperError::Parsing { .. })
        ));
    }

    #[test]
    fn test_ethnicity_percentages() {
        let csv = "GEOGRAPHY_NAME,C2021_ETH_20_NAME,OBS_VALUE\n\
                   E00000001,Total: All usual residents,300\n\
                   E00000001,Asian,60\n\
                   E00000001,White,210\n\
                   E00000001,Other ethnic group,30\n";
        let table = CensusTable::parse(DS_ETHNICITY, &key(), csv).unwrap();
        let mut record = NormalizedRecord::new();
        apply_ethnicity(&mut record, &table);
        assert_eq!(record.get("white"), Some(&FieldValue::Number(70.0)));
        assert_eq!(record.get("non_white"), Some(&FieldValue::Number(30.0)));
    }

    #[test]
    fn test_economic_activity() {
        let csv = "GEOGRAPHY_NAME,C2021_EASTAT_20_NAME,OBS_VALUE\n\
                   E00000001,Total: All usual residents aged 16 years and over,200\n\
                   E00000001,Economically active (excluding full-time students):In employment,110\n\
                   E00000001,Economically active and a full-time student:In employment,10\n\
                   E00000001,Economically active (excluding full-time students): Unemployed,8\n\
                   E00000001,Economically active and a full-time student: Unemployed,2\n\
                   E00000001,Economically inactive,70\n";
        let table = CensusTable::parse(DS_ECONOMIC, &key(), csv).unwrap();
        let mut record = NormalizedRecord::new();
        apply_economic_activity(&mut record, &table);
        assert_eq!(record.get("working"), Some(&FieldValue::Number(60.0)));
        assert_eq!(record.get("unemployed"), Some(&FieldValue::Number(5.0)));
        assert_eq!(record.get("unemployment_rate"), Some(&FieldValue::Number(5.0)));
    }

    #[test]
    fn test_social_grades() {
        let csv = "GEOGRAPHY_NAME,C2021_NSSEC_10_NAME,OBS_VALUE\n\
                   E00000001,Total: All usual residents aged 16 years and over,100\n\
                   E00000001,\"L1, L2 and L3 Higher managerial, administrative and professional occupations\",20\n\
                   E00000001,\"L4, L5 and L6 Lower managerial, administrative and professional occupations\",15\n\
                   E00000001,L7 Intermediate occupations,10\n\
                   E00000001,L8 and L9 Small employers and own account workers,10\n\
                   E00000001,L10 and L11 Lower supervisory and technical occupations,5\n\
                   E00000001,L12 Semi-routine occupations,10\n\
                   E00000001,L13 Routine occupations,10\n\
                   E00000001,\"L14.1 and L14.2 Never worked and long-term unemployed\",5\n\
                   E00000001,L15 Full-time students,15\n";
        let table = CensusTable::parse(DS_NSSEC, &key(), csv).unwrap();
        let mut record = NormalizedRecord::new();
        apply_social_grades(&mut record, &table);
        assert_eq!(record.get("ab"), Some(&FieldValue::Number(35.0)));
        assert_eq!(record.get("c1_c2"), Some(&FieldValue::Number(25.0)));
        assert_eq!(record.get("de"), Some(&FieldValue::Number(25.0)));
    }

    #[test]
    fn test_missing_name_column_leaves_zero_grades() {
        let csv = "GEOGRAPHY_NAME,OBS_VALUE\nE00000001,100\n";
        let table = CensusTable::parse(DS_NSSEC, &key(), csv).unwrap();
        let mut record = NormalizedRecord::new();
        apply_social_grades(&mut record, &table);
        assert_eq!(record.get("ab"), Some(&FieldValue::Number(0.0)));
    }
}
