//! CrystalRoof postcode reports, rendered in a browser.
//!
//! The site limits page views per browser session and sheds load with a
//! "Too many requests" page. Every attempt therefore runs in a brand-new
//! session, and a soft block is retried on a fixed schedule
//! ([`SoftBlockPolicy`]) until the attempt ceiling.

use areascope::normalize::{clean_text, parse_float};
use areascope::{BlockReason, BrowserConfig, Concept, LocationKey, NormalizedRecord, ScraperError};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{document_text, join_url, Capability, SoftBlockPolicy, SourceAdapter, SourceDescriptor};
use crate::renderer::{BrowserSessionManager, SessionLauncher};

pub const DEFAULT_BASE_URL: &str = "https://crystalroof.co.uk/report/postcode";

/// Load-shedding page.
const SOFT_BLOCK_MARKER: &str = "Too many requests";
/// Unknown or terminated-without-data postcode.
const NO_REPORT_MARKER: &str = "No report found";

/// Expands every collapsed amenities list before the page is read.
const SHOW_MORE_SCRIPT: &str = r#"(() => {
  let clicked = 0;
  for (const b of document.querySelectorAll('button')) {
    if (b.textContent && b.textContent.includes('Show more')) { b.click(); clicked++; }
  }
  return clicked;
})()"#;

const UNDERGROUND_LINES: &[&str] = &[
    "underground", "tube", "metropolitan", "central", "northern", "piccadilly", "jubilee",
    "victoria", "circle", "district", "hammersmith", "bakerloo", "elizabeth",
];
const OVERGROUND_LINES: &[&str] = &["overground", "dlr", "tram"];

/// Bars on the occupation tab that compare against other areas.
const COMPARISON_LABELS: &[&str] = &["neighbourhood", "borough", "london", "immediate area"];

/// Which report section an instance reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrystalRoofReport {
    /// Ethnicity chart, household income and occupation (NS-SeC) mix.
    Demographics,
    /// Transport score, stations and nearby amenities.
    Transport,
}

impl CrystalRoofReport {
    pub fn concept(self) -> Concept {
        match self {
            Self::Demographics => Concept::Demographics,
            Self::Transport => Concept::Transport,
        }
    }

    fn adapter_name(self) -> &'static str {
        match self {
            Self::Demographics => "crystalroof-demographics",
            Self::Transport => "crystalroof-transport",
        }
    }

    fn default_priority(self) -> u8 {
        match self {
            Self::Demographics => 2,
            Self::Transport => 0,
        }
    }

    /// Report pages visited, in order.
    fn sections(self) -> &'static [&'static str] {
        match self {
            Self::Demographics => &["demographics", "affluence", "affluence?tab=occupation"],
            Self::Transport => &["transport", "amenities"],
        }
    }
}

/// One station row from the transport report.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub miles: f64,
    /// Line and service labels shown for the station.
    pub lines: Vec<String>,
    pub kind: &'static str,
}

/// Everything read from the transport report page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportPage {
    pub score: Option<i64>,
    pub zone: Option<String>,
    /// Nearest first.
    pub stations: Vec<Station>,
}

/// Amenity counts from the amenities page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Amenities {
    pub pubs: i64,
    pub restaurants: i64,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Classify the page: a soft block is retryable, a missing report is not.
pub fn check_markers(html: &str, url: &str, key: &LocationKey) -> Result<(), ScraperError> {
    if html.contains(SOFT_BLOCK_MARKER) {
        return Err(ScraperError::Blocked {
            url: url.to_string(),
            reason: BlockReason::SoftBlock(SOFT_BLOCK_MARKER.to_string()),
        });
    }
    if html.contains(NO_REPORT_MARKER) {
        return Err(ScraperError::parsing("crystalroof", key, "no report found"));
    }
    Ok(())
}

/// `(label, percent)` for every bar of a bar chart, labels lowercased.
fn bar_chart(html: &str) -> Vec<(String, f64)> {
    let doc = Html::parse_document(html);
    let (Some(items), Some(label_sel), Some(value_sel)) = (
        selector("div[data-bar-chart-item]"),
        selector("span[data-bar-chart-label]"),
        selector("span[data-bar-chart-value]"),
    ) else {
        return Vec::new();
    };

    doc.select(&items)
        .filter_map(|item| {
            let label = item.select(&label_sel).next()?;
            let value = item.select(&value_sel).next()?;
            Some((
                element_text(label).to_lowercase(),
                parse_float(&element_text(value)).unwrap_or(0.0),
            ))
        })
        .collect()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// `(white, non_white)` percentages from the ethnicity bar chart, or `None`
/// when the chart is absent.
pub fn parse_ethnicity(html: &str) -> Option<(f64, f64)> {
    let bars = bar_chart(html);
    if bars.is_empty() {
        return None;
    }
    let white: f64 = bars
        .iter()
        .filter(|(label, _)| label.contains("white") && !label.contains("mixed"))
        .map(|(_, pct)| pct)
        .sum();
    Some((round1(white), round1((100.0 - white).max(0.0))))
}

/// Average household income in pounds from the affluence page.
pub fn parse_affluence(html: &str) -> Option<i64> {
    let doc = Html::parse_document(html);
    let pounds = Regex::new(r"£\s*([\d,]+)").expect("pound regex is valid");
    let amount = |text: &str| -> Option<i64> {
        pounds.captures(text)?.get(1)?.as_str().replace(',', "").parse().ok()
    };

    // The headline tile first, then any headline number on the page.
    for css in [r#"p[data-tile-value="true"]"#, r#"span[class*="headlineNumber"]"#] {
        let Some(sel) = selector(css) else {
            continue;
        };
        if let Some(found) = doc.select(&sel).find_map(|el| amount(&element_text(el))) {
            return Some(found);
        }
    }
    None
}

/// `(ab, c1_c2, de)` social grade percentages from the occupation tab.
///
/// Managerial and professional is AB, intermediate is C1/C2, routine and
/// manual plus never worked is DE. Students are left out.
pub fn parse_occupation(html: &str) -> Option<(f64, f64, f64)> {
    let bars: Vec<_> = bar_chart(html)
        .into_iter()
        .filter(|(label, _)| !COMPARISON_LABELS.iter().any(|c| label.contains(c)))
        .collect();
    if bars.is_empty() {
        return None;
    }
    let share = |fragments: &[&str]| -> f64 {
        bars.iter()
            .filter(|(label, _)| fragments.iter().any(|f| label.contains(f)))
            .map(|(_, pct)| pct)
            .sum()
    };
    Some((
        round1(share(&["managerial and professional"])),
        round1(share(&["intermediate"])),
        round1(share(&["routine and manual", "never worked"])),
    ))
}

fn station_kind(text: &str) -> &'static str {
    let text = text.to_lowercase();
    if UNDERGROUND_LINES.iter().any(|kw| text.contains(kw)) {
        "Underground"
    } else if OVERGROUND_LINES.iter().any(|kw| text.contains(kw)) {
        "Overground"
    } else {
        "Train"
    }
}

pub fn parse_transport(html: &str) -> TransportPage {
    let doc = Html::parse_document(html);
    let text = document_text(&doc);
    let mut page = TransportPage::default();

    let score_re =
        Regex::new(r"(?i)transport\s+score.*?(\d)\s*/\s*9").expect("score regex is valid");
    page.score = score_re
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());

    let zone_re = Regex::new(r"(?i)travel\s+zones?\s*:?\s*(\d(?:\s*(?:/|-|and)\s*\d)?)")
        .expect("zone regex is valid");
    page.zone = zone_re
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| clean_text(m.as_str()));

    let miles_re = Regex::new(r"([\d.]+)\s*miles?").expect("miles regex is valid");
    if let (Some(items), Some(para), Some(span)) = (
        selector(r#"ul[data-transport-stations-list="true"] li"#),
        selector("p"),
        selector("span"),
    ) {
        for item in doc.select(&items) {
            let full = element_text(item);
            let Some(caps) = miles_re.captures(&full) else {
                continue;
            };
            let miles = caps[1].parse().unwrap_or(0.0);
            let heading = item
                .select(&para)
                .next()
                .map(element_text)
                .unwrap_or_else(|| full.clone());
            let name = clean_text(&miles_re.replace(&heading, ""));
            // The name is plain text; only the service labels decide the kind.
            let lines: Vec<String> = item
                .select(&span)
                .map(element_text)
                .filter(|t| !t.is_empty() && !t.to_lowercase().contains("mile"))
                .collect();
            let kind = station_kind(&lines.join(" "));
            page.stations.push(Station {
                name,
                miles,
                lines,
                kind,
            });
        }
    }
    page.stations.sort_by(|a, b| a.miles.total_cmp(&b.miles));
    page
}

/// Count listed pubs/bars and restaurants/cafés.
pub fn parse_amenities(html: &str) -> Amenities {
    let doc = Html::parse_document(html);
    let mut counts = Amenities::default();
    let (Some(titles), Some(items)) = (
        selector(r#"[data-items-list-title="true"]"#),
        selector(r#"li[data-unordered-item="true"]"#),
    ) else {
        return counts;
    };

    for title in doc.select(&titles) {
        let heading = element_text(title).to_lowercase();
        let is_pub = heading.contains("bar") || heading.contains("pub");
        let is_restaurant = heading.contains("restaurant") || heading.contains("cafe");
        if !is_pub && !is_restaurant {
            continue;
        }
        let Some(container) = title.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let n = container.select(&items).count() as i64;
        if is_pub {
            counts.pubs += n;
        } else {
            counts.restaurants += n;
        }
    }
    counts
}

fn transport_record(page: &TransportPage, amenities: Amenities) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();
    if let Some(score) = page.score {
        record.insert("transport_score", score);
    }
    if let Some(zone) = &page.zone {
        record.insert("travel_zone", zone.as_str());
    }
    if let Some(nearest) = page.stations.first() {
        record.insert("distance_to_nearest", nearest.miles);
        record.insert("nearest_type", nearest.kind);
    }
    record.insert("station_count", page.stations.len() as i64);
    record.insert("pubs", amenities.pubs);
    record.insert("restaurants", amenities.restaurants);
    record.conform(Concept::Transport.schema())
}

/// A CrystalRoof report as a source adapter.
pub struct CrystalRoofSource {
    descriptor: SourceDescriptor,
    report: CrystalRoofReport,
    launcher: Arc<dyn SessionLauncher>,
    config: BrowserConfig,
    base_url: String,
    policy: SoftBlockPolicy,
    headless: bool,
}

impl CrystalRoofSource {
    pub fn new(
        report: CrystalRoofReport,
        launcher: Arc<dyn SessionLauncher>,
        config: BrowserConfig,
    ) -> Self {
        let headless = config.headless;
        Self {
            descriptor: SourceDescriptor::new(
                report.adapter_name(),
                report.concept(),
                Capability::Browser,
                report.default_priority(),
            ),
            report,
            launcher,
            config,
            base_url: DEFAULT_BASE_URL.to_string(),
            policy: SoftBlockPolicy::default(),
            headless,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_policy(mut self, policy: SoftBlockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.descriptor.priority = priority;
        self
    }

    pub fn policy(&self) -> SoftBlockPolicy {
        self.policy
    }

    fn section_url(&self, key: &LocationKey, section: &str) -> String {
        join_url(&self.base_url, &format!("{}/{section}", key.compact()))
    }

    /// Render every section of the report in one session.
    async fn render(
        &self,
        manager: &mut BrowserSessionManager,
        key: &LocationKey,
    ) -> Result<Vec<String>, ScraperError> {
        let timeout = self.config.page_load_timeout();
        let mut pages = Vec::with_capacity(self.report.sections().len());
        for section in self.report.sections() {
            let url = self.section_url(key, section);
            let session = manager.acquire(self.headless).await?;
            debug!("navigating to {url} (session {})", session.id());
            session.navigate(&url, timeout).await?;
            if *section == "amenities" {
                if let Err(e) = session.execute_js(SHOW_MORE_SCRIPT).await {
                    debug!("could not expand amenities lists: {e}");
                }
            }
            let html = session.content().await?;
            check_markers(&html, &url, key)?;
            pages.push(html);
        }
        Ok(pages)
    }

    fn extract(
        &self,
        pages: &[String],
        key: &LocationKey,
    ) -> Result<NormalizedRecord, ScraperError> {
        match self.report {
            CrystalRoofReport::Demographics => {
                let page = |i: usize| pages.get(i).map(String::as_str).unwrap_or_default();
                let (white, non_white) = parse_ethnicity(page(0)).ok_or_else(|| {
                    ScraperError::parsing("crystalroof", key, "ethnicity chart not found")
                })?;
                let mut record = NormalizedRecord::new()
                    .with("white", white)
                    .with("non_white", non_white);
                match parse_affluence(page(1)) {
                    Some(income) => record.insert("avg_household_income", income),
                    None => debug!("no household income on affluence page for {key}"),
                }
                match parse_occupation(page(2)) {
                    Some((ab, c1_c2, de)) => {
                        record.insert("ab", ab);
                        record.insert("c1_c2", c1_c2);
                        record.insert("de", de);
                    }
                    None => debug!("no occupation chart for {key}"),
                }
                Ok(record.conform(Concept::Demographics.schema()))
            }
            CrystalRoofReport::Transport => {
                let first = pages.first().map(String::as_str).unwrap_or_default();
                let transport = parse_transport(first);
                if transport.score.is_none() && transport.stations.is_empty() {
                    return Err(ScraperError::parsing(
                        "crystalroof",
                        key,
                        "no transport score or stations on page",
                    ));
                }
                let amenities = pages.get(1).map(|html| parse_amenities(html)).unwrap_or_default();
                Ok(transport_record(&transport, amenities))
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for CrystalRoofSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn scrape(&self, key: &LocationKey) -> Result<NormalizedRecord, ScraperError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            // A fresh session per attempt: the view limit is per session.
            let mut manager =
                BrowserSessionManager::new(self.launcher.clone(), self.config.clone());
            let rendered = self.render(&mut manager, key).await;
            manager.release().await;

            match rendered {
                Ok(pages) => {
                    info!("{} report for {key} read on attempt {attempt}", self.name());
                    return self.extract(&pages, key);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "{} attempt {attempt}/{max_attempts} for {key} failed: {e}; retrying in {:?}",
                        self.name(),
                        self.policy.spacing
                    );
                    tokio::time::sleep(self.policy.spacing).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
