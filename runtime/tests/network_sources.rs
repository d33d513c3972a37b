//! HTTP source adapters against a local mock server.

mod common;

use areascope::{Concept, ErrorKind, FetchConfig, FieldValue};
use areascope_runtime::acquisition::FetchClient;
use areascope_runtime::sources::{
    NomisCensusSource, PostcodeAreaSource, PostcodesIoSource, SourceAdapter,
};
use common::key;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> FetchClient {
    FetchClient::new(FetchConfig::immediate()).unwrap()
}

async fn mount_csv(server: &MockServer, dataset: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/{dataset}.data.csv")))
        .and(query_param("geography", "POSTCODE|UB5 5AF;150"))
        .and(query_param("measures", "20100"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_nomis_census_with_income() {
    let server = MockServer::start().await;
    mount_csv(
        &server,
        "NM_2021_1",
        "GEOGRAPHY_NAME,C2021_RESTYPE_3_NAME,OBS_VALUE\nE00000001,Total,320\n",
    )
    .await;
    mount_csv(&server, "NM_2023_1", "GEOGRAPHY_NAME,OBS_VALUE\nE00000001,128\n").await;
    mount_csv(
        &server,
        "NM_2041_1",
        "GEOGRAPHY_NAME,C2021_ETH_20_NAME,OBS_VALUE\nE00000001,Total,320\nE00000001,White,224\n",
    )
    .await;
    // Economic activity and NS-SeC unavailable for this area.
    Mock::given(method("GET"))
        .and(path("/api/NM_2083_1.data.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/NM_2079_1.data.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ShowMap"))
        .and(query_param("postcode", "UB5 5AF"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<table><tr><th>Average household income</th><td><span class=\"show\">£52,300</span></td></tr></table>",
        ))
        .mount(&server)
        .await;

    let source = NomisCensusSource::new(client())
        .with_base_url(format!("{}/api", server.uri()))
        .with_income_source(Some(server.uri()));
    let record = source.scrape(&key("ub5 5af")).await.unwrap();

    assert_eq!(record.get("population"), Some(&FieldValue::Integer(320)));
    assert_eq!(record.get("households"), Some(&FieldValue::Integer(128)));
    assert_eq!(record.get("white"), Some(&FieldValue::Number(70.0)));
    assert_eq!(record.get("non_white"), Some(&FieldValue::Number(30.0)));
    assert_eq!(record.get("avg_household_income"), Some(&FieldValue::Integer(52_300)));
    // Failed datasets leave neutral values.
    assert_eq!(record.get("working"), Some(&FieldValue::Number(0.0)));
    assert_eq!(record.len(), Concept::Demographics.schema().len());
}

#[tokio::test]
async fn test_nomis_blocked_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let source = NomisCensusSource::new(client())
        .with_base_url(server.uri())
        .with_income_source(None);
    let err = source.scrape(&key("UB5 5AF")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Blocked);
}

#[tokio::test]
async fn test_nomis_all_datasets_failing_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let source = NomisCensusSource::new(client())
        .with_base_url(server.uri())
        .with_income_source(None);
    let err = source.scrape(&key("UB5 5AF")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parsing);
}

#[tokio::test]
async fn test_postcodearea_district_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postaltowns/northolt/ub5/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<table><tr><th>Population</th><td>24,812</td></tr><tr><th>White</th><td>38.6%</td></tr></table>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let source = PostcodeAreaSource::new(client()).with_base_url(server.uri());
    let record = source.scrape(&key("UB5 5AF")).await.unwrap();
    assert_eq!(record.get("population"), Some(&FieldValue::Integer(24_812)));
    assert_eq!(record.get("white"), Some(&FieldValue::Number(38.6)));
}

#[tokio::test]
async fn test_postcodes_io_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postcodes/SW1A1AA"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"status":200,"result":{"latitude":51.501009,"longitude":-0.141588,
                "admin_district":"Westminster","region":"London","country":"England"}}"#,
        ))
        .mount(&server)
        .await;

    let source = PostcodesIoSource::new(client()).with_base_url(server.uri());
    let record = source.scrape(&key("SW1A 1AA")).await.unwrap();
    assert_eq!(record.get("longitude"), Some(&FieldValue::Number(-0.141588)));
    assert_eq!(record.get("region"), Some(&FieldValue::Text("London".into())));
}

#[tokio::test]
async fn test_postcodes_io_unknown_postcode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = PostcodesIoSource::new(client()).with_base_url(server.uri());
    let err = source.scrape(&key("ZZ9 9ZZ")).await.unwrap_err();
    // 404 is neither a deny nor success: retried, then exhausted.
    assert_eq!(err.kind(), ErrorKind::TimeoutExhausted);
}
