//! Browser-rendered sources against a scripted fake browser.

mod common;

use areascope::{BlockReason, BrowserConfig, FieldValue, ScraperError};
use areascope_runtime::renderer::NoopLauncher;
use areascope_runtime::sources::{
    CrystalRoofReport, CrystalRoofSource, GoogleMapsPlacesSource, SoftBlockPolicy, SourceAdapter,
};
use common::{key, FakeLauncher};
use std::sync::Arc;
use std::time::Duration;

const SOFT_BLOCK: &str = "<html><body><h1>Too many requests</h1></body></html>";

const ETHNICITY: &str = r#"<main>
  <div data-bar-chart-item="1"><span data-bar-chart-label="1">White</span><span data-bar-chart-value="1">62.5%</span></div>
  <div data-bar-chart-item="1"><span data-bar-chart-label="1">Asian</span><span data-bar-chart-value="1">37.5%</span></div>
</main>"#;

const AFFLUENCE: &str = r#"<main>
  <div><h3>Household Income</h3><p data-tile-value="true"><span>£57,900</span></p></div>
</main>"#;

const OCCUPATION: &str = r#"<main>
  <div data-bar-chart-item="1"><span data-bar-chart-label="1">Managerial and professional</span><span data-bar-chart-value="1">45%</span></div>
  <div data-bar-chart-item="1"><span data-bar-chart-label="1">Intermediate occupations</span><span data-bar-chart-value="1">25%</span></div>
  <div data-bar-chart-item="1"><span data-bar-chart-label="1">Routine and manual</span><span data-bar-chart-value="1">18%</span></div>
  <div data-bar-chart-item="1"><span data-bar-chart-label="1">Never worked and long-term unemployed</span><span data-bar-chart-value="1">4%</span></div>
</main>"#;

const TRANSPORT: &str = r#"<main>
  <div><h2>Transport score</h2><span>7/9</span></div>
  <div>Travel zone <div>2</div></div>
  <ul data-transport-stations-list="true">
    <li><p>Northolt <span>0.6 miles</span></p><span>Central</span></li>
    <li><p>Northolt Park <span>0.9 miles</span></p><span>Chiltern Railways</span></li>
  </ul>
</main>"#;

const AMENITIES: &str = r#"<main>
  <div><h3 data-items-list-title="true">Pubs and bars</h3>
    <ul><li data-unordered-item="true">The Crown</li></ul></div>
  <div><h3 data-items-list-title="true">Restaurants</h3>
    <ul><li data-unordered-item="true">A</li><li data-unordered-item="true">B</li></ul></div>
</main>"#;

fn fast_policy(max_attempts: u32) -> SoftBlockPolicy {
    SoftBlockPolicy {
        max_attempts,
        spacing: Duration::from_millis(1),
    }
}

fn source(
    report: CrystalRoofReport,
    launcher: &Arc<FakeLauncher>,
    max_attempts: u32,
) -> CrystalRoofSource {
    CrystalRoofSource::new(report, launcher.clone(), BrowserConfig::default())
        .with_base_url("https://reports.test/report/postcode")
        .with_policy(fast_policy(max_attempts))
}

#[tokio::test]
async fn test_soft_block_retries_with_fresh_sessions() {
    let launcher =
        FakeLauncher::with_pages([SOFT_BLOCK, SOFT_BLOCK, ETHNICITY, AFFLUENCE, OCCUPATION]);
    let adapter = source(CrystalRoofReport::Demographics, &launcher, 15);

    let record = adapter.scrape(&key("SW1A 1AA")).await.unwrap();

    assert_eq!(record.get("white"), Some(&FieldValue::Number(62.5)));
    assert_eq!(record.get("non_white"), Some(&FieldValue::Number(37.5)));
    assert_eq!(record.get("avg_household_income"), Some(&FieldValue::Integer(57_900)));
    assert_eq!(record.get("ab"), Some(&FieldValue::Number(45.0)));
    assert_eq!(record.get("c1_c2"), Some(&FieldValue::Number(25.0)));
    assert_eq!(record.get("de"), Some(&FieldValue::Number(22.0)));
    // One brand-new session per attempt; blocked attempts stop at the first page.
    assert_eq!(launcher.launched(), 3);
    assert_eq!(launcher.closed(), 3);
    assert_eq!(launcher.navigations_per_session(), vec![1, 1, 3]);
    assert_eq!(
        launcher.visited().split_off(2),
        vec![
            "https://reports.test/report/postcode/SW1A1AA/demographics",
            "https://reports.test/report/postcode/SW1A1AA/affluence",
            "https://reports.test/report/postcode/SW1A1AA/affluence?tab=occupation",
        ]
    );
}

#[tokio::test]
async fn test_soft_block_gives_up_at_attempt_ceiling() {
    let launcher = FakeLauncher::with_pages([SOFT_BLOCK; 5]);
    let adapter = source(CrystalRoofReport::Demographics, &launcher, 3);

    let err = adapter.scrape(&key("SW1A 1AA")).await.unwrap_err();

    assert!(matches!(
        err,
        ScraperError::Blocked {
            reason: BlockReason::SoftBlock(_),
            ..
        }
    ));
    assert_eq!(launcher.launched(), 3);
    assert_eq!(launcher.closed(), 3);
}

#[tokio::test]
async fn test_missing_report_is_not_retried() {
    let launcher = FakeLauncher::with_pages(["<p>No report found</p>", ETHNICITY]);
    let adapter = source(CrystalRoofReport::Demographics, &launcher, 15);

    let err = adapter.scrape(&key("ZZ9 9ZZ")).await.unwrap_err();

    assert!(matches!(err, ScraperError::Parsing { .. }));
    assert_eq!(launcher.launched(), 1);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn test_transport_report_reads_both_sections_in_one_session() {
    let launcher = FakeLauncher::with_pages([TRANSPORT, AMENITIES]);
    let adapter = source(CrystalRoofReport::Transport, &launcher, 15);

    let record = adapter.scrape(&key("UB5 5AF")).await.unwrap();

    assert_eq!(record.get("transport_score"), Some(&FieldValue::Integer(7)));
    assert_eq!(record.get("travel_zone"), Some(&FieldValue::Text("2".into())));
    assert_eq!(record.get("distance_to_nearest"), Some(&FieldValue::Number(0.6)));
    assert_eq!(record.get("nearest_type"), Some(&FieldValue::Text("Underground".into())));
    assert_eq!(record.get("station_count"), Some(&FieldValue::Integer(2)));
    assert_eq!(record.get("pubs"), Some(&FieldValue::Integer(1)));
    assert_eq!(record.get("restaurants"), Some(&FieldValue::Integer(2)));

    assert_eq!(
        launcher.visited(),
        vec![
            "https://reports.test/report/postcode/UB55AF/transport",
            "https://reports.test/report/postcode/UB55AF/amenities",
        ]
    );
    assert_eq!(launcher.navigations_per_session(), vec![2]);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn test_without_browser_fails_with_session_error() {
    let adapter = CrystalRoofSource::new(
        CrystalRoofReport::Transport,
        Arc::new(NoopLauncher),
        BrowserConfig::default(),
    )
    .with_policy(fast_policy(15));

    let err = adapter.scrape(&key("UB5 5AF")).await.unwrap_err();
    assert!(matches!(err, ScraperError::Session(_)));
}

const UNIVERSITIES: &str = r#"<div role="feed">
  <div><a class="hfpxzc" aria-label="Brunel University London"></a><span>4.4 (2,100)</span></div>
  <div><a class="hfpxzc" aria-label="Imperial College"></a><span>4.6 (900)</span></div>
</div>"#;

const HOSPITALS: &str = r#"<div role="feed">
  <div><a class="hfpxzc" aria-label="Ealing Hospital"></a><span>2.9 (1,000)</span></div>
</div>"#;

fn places(launcher: &Arc<FakeLauncher>) -> GoogleMapsPlacesSource {
    GoogleMapsPlacesSource::new(launcher.clone(), BrowserConfig::default())
        .with_base_url("https://maps.test/maps/search")
}

#[tokio::test]
async fn test_places_searches_every_category_in_one_session() {
    let launcher = FakeLauncher::with_pages([
        UNIVERSITIES,
        HOSPITALS,
        "<div>No results found</div>",
    ]);

    let record = places(&launcher).scrape(&key("UB5 5AF")).await.unwrap();

    assert_eq!(record.get("universities"), Some(&FieldValue::Integer(2)));
    assert_eq!(record.get("hospitals"), Some(&FieldValue::Integer(1)));
    assert_eq!(record.get("major_businesses"), Some(&FieldValue::Integer(0)));
    assert_eq!(record.get("avg_place_rating"), Some(&FieldValue::Number(3.97)));
    assert_eq!(record.get("total_reviews"), Some(&FieldValue::Integer(4_000)));
    assert_eq!(
        launcher.visited(),
        vec![
            "https://maps.test/maps/search/universities+near+UB5+5AF/",
            "https://maps.test/maps/search/hospitals+near+UB5+5AF/",
            "https://maps.test/maps/search/major+businesses+near+UB5+5AF/",
        ]
    );
    assert_eq!(launcher.navigations_per_session(), vec![3]);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn test_places_failed_category_stays_neutral() {
    let launcher = FakeLauncher::with_pages([UNIVERSITIES, "<div>Loading</div>", HOSPITALS]);

    let record = places(&launcher).scrape(&key("UB5 5AF")).await.unwrap();

    assert_eq!(record.get("universities"), Some(&FieldValue::Integer(2)));
    assert_eq!(record.get("hospitals"), Some(&FieldValue::Integer(0)));
    // The third search landed on the hospitals fixture.
    assert_eq!(record.get("major_businesses"), Some(&FieldValue::Integer(1)));
}

#[tokio::test]
async fn test_places_unusual_traffic_is_a_block() {
    let launcher = FakeLauncher::with_pages([
        "<p>Our systems have detected unusual traffic from your computer network.</p>",
        UNIVERSITIES,
    ]);

    let err = places(&launcher).scrape(&key("UB5 5AF")).await.unwrap_err();

    assert!(matches!(
        err,
        ScraperError::Blocked {
            reason: BlockReason::SoftBlock(_),
            ..
        }
    ));
    assert_eq!(launcher.visited().len(), 1);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn test_places_every_category_failing_is_an_error() {
    let launcher = FakeLauncher::with_pages(["<div></div>"; 3]);

    let err = places(&launcher).scrape(&key("UB5 5AF")).await.unwrap_err();
    assert!(matches!(err, ScraperError::Parsing { .. }));
}
