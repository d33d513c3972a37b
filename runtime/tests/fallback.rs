//! Fallback chain behaviour: live order, cache write-back, stale reads,
//! exhaustion and coverage routing.

mod common;

use areascope::{Concept, ErrorKind, NormalizedRecord, ScraperError};
use areascope_runtime::sources::SourceAdapter;
use areascope_runtime::{FallbackOrchestrator, Origin};
use common::{blocked, key, parsing, temp_cache, ScriptedAdapter};
use std::sync::Arc;

fn demographics(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    cache: Arc<areascope::CacheStore>,
) -> FallbackOrchestrator {
    FallbackOrchestrator::new(Concept::Demographics, adapters, cache)
}

#[tokio::test]
async fn test_blocked_primary_falls_back_and_caches() {
    let (_dir, cache) = temp_cache();
    let expected = NormalizedRecord::new()
        .with("population", 50_000)
        .with("white", 70.0);
    let primary = ScriptedAdapter::failing("primary", Concept::Demographics, 0, blocked());
    let secondary = ScriptedAdapter::ok("secondary", Concept::Demographics, 1, expected.clone());

    let orchestrator = demographics(vec![primary.clone(), secondary.clone()], cache.clone());
    let k = key("UB5 5AF");
    let acquired = orchestrator.acquire(&k).await.unwrap();

    assert_eq!(acquired.record, expected);
    assert_eq!(
        acquired.origin,
        Origin::Live {
            adapter: "secondary".into()
        }
    );
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
    let cached: Option<NormalizedRecord> = cache.get(&Concept::Demographics.category(), &k);
    assert_eq!(cached, Some(expected));
}

#[tokio::test]
async fn test_first_success_stops_the_chain() {
    let (_dir, cache) = temp_cache();
    let first = ScriptedAdapter::ok(
        "first",
        Concept::Demographics,
        0,
        NormalizedRecord::new().with("population", 1),
    );
    let second = ScriptedAdapter::ok(
        "second",
        Concept::Demographics,
        1,
        NormalizedRecord::new().with("population", 2),
    );

    let orchestrator = demographics(vec![second.clone(), first.clone()], cache);
    let record = orchestrator.scrape_with_fallback(&key("UB5")).await.unwrap();

    assert_eq!(record.get("population").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
async fn test_all_fail_serves_cached_payload() {
    let (_dir, cache) = temp_cache();
    let k = key("SW1A 1AA");
    let cached = NormalizedRecord::new().with("population", 12_345);
    cache.set(&Concept::Demographics.category(), &k, &cached).unwrap();

    let orchestrator = demographics(
        vec![
            ScriptedAdapter::failing("a", Concept::Demographics, 0, blocked()),
            ScriptedAdapter::failing("b", Concept::Demographics, 1, parsing()),
        ],
        cache,
    );
    let acquired = orchestrator.acquire(&k).await.unwrap();

    assert_eq!(acquired.record, cached);
    assert_eq!(acquired.origin, Origin::Cache { stale: true });
}

#[tokio::test]
async fn test_all_fail_without_cache_is_exhausted() {
    let (_dir, cache) = temp_cache();
    let orchestrator = demographics(
        vec![
            ScriptedAdapter::failing("a", Concept::Demographics, 0, blocked()),
            ScriptedAdapter::failing("b", Concept::Demographics, 1, parsing()),
        ],
        cache,
    );

    let err = orchestrator.scrape_with_fallback(&key("SW1A 1AA")).await.unwrap_err();
    match err {
        ScraperError::FallbackExhausted {
            concept,
            key,
            failures,
        } => {
            assert_eq!(concept, Concept::Demographics);
            assert_eq!(key, "SW1A 1AA");
            let kinds: Vec<_> = failures.iter().map(|f| (f.adapter.as_str(), f.kind)).collect();
            assert_eq!(kinds, vec![("a", ErrorKind::Blocked), ("b", ErrorKind::Parsing)]);
        }
        other => panic!("expected FallbackExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_uncovered_adapter_is_skipped() {
    let (_dir, cache) = temp_cache();
    let wrong_area = ScriptedAdapter::uncovered(
        "district-pages",
        Concept::Demographics,
        0,
        NormalizedRecord::new().with("population", 999),
    );
    let census = ScriptedAdapter::ok(
        "census",
        Concept::Demographics,
        1,
        NormalizedRecord::new().with("population", 50_000),
    );

    let orchestrator = demographics(vec![wrong_area.clone(), census], cache);
    let acquired = orchestrator.acquire(&key("M1 1AE")).await.unwrap();

    assert_eq!(wrong_area.calls(), 0);
    assert_eq!(acquired.record.get("population").and_then(|v| v.as_i64()), Some(50_000));
}

#[tokio::test]
async fn test_skipped_adapters_are_not_failures() {
    let (_dir, cache) = temp_cache();
    let orchestrator = demographics(
        vec![ScriptedAdapter::uncovered(
            "district-pages",
            Concept::Demographics,
            0,
            NormalizedRecord::new(),
        )],
        cache,
    );

    match orchestrator.acquire(&key("M1 1AE")).await {
        Err(ScraperError::FallbackExhausted { failures, .. }) => assert!(failures.is_empty()),
        other => panic!("expected FallbackExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_end_to_end_blocked_then_white_share() {
    let (_dir, cache) = temp_cache();
    let record = NormalizedRecord::new().with("white", 70.0);
    let orchestrator = demographics(
        vec![
            ScriptedAdapter::failing("adapter-1", Concept::Demographics, 0, blocked()),
            ScriptedAdapter::ok("adapter-2", Concept::Demographics, 1, record.clone()),
        ],
        cache.clone(),
    );

    let result = orchestrator.scrape_with_fallback(&key("SW1A 1AA")).await.unwrap();
    assert_eq!(result, record);

    // Lookup through a differently formatted key hits the same entry.
    let cached: Option<NormalizedRecord> =
        cache.get(&Concept::Demographics.category(), &key("sw1a 1aa"));
    assert_eq!(cached, Some(record));
}
