//! Label resolution against a batch-rejecting lookup service

use std::collections::BTreeSet;
use std::sync::Arc;

use market_history_ingest::identifier::{placeholder_label, IdResolver, ResolveError};
use market_history_ingest::{IdKind, NumericId};

use crate::support::FakeLookup;

#[tokio::test]
async fn test_cached_ids_skip_the_network() {
    let lookup = Arc::new(FakeLookup::knowing([]));
    let resolver = IdResolver::new(lookup.clone());
    resolver.seed(IdKind::Type, [(34, "Tritanium".to_string()), (35, "Pyerite".to_string())]);

    let resolution = resolver.resolve_many(IdKind::Type, &[34, 35, 34]).await.unwrap();

    assert_eq!(resolution.labels.len(), 2);
    assert_eq!(resolution.labels[&34], "Tritanium");
    assert_eq!(lookup.call_count(), 0);
}

#[tokio::test]
async fn test_single_unknown_costs_logarithmic_calls() {
    let known: Vec<NumericId> = (1..=64).filter(|id| *id != 40).collect();
    let lookup = Arc::new(FakeLookup::knowing(known));
    let resolver = IdResolver::new(lookup.clone());

    let ids: Vec<NumericId> = (1..=64).collect();
    let resolution = resolver.resolve_many(IdKind::Type, &ids).await.unwrap();

    assert_eq!(resolution.labels.len(), 64);
    assert_eq!(resolution.labels[&40], placeholder_label(40));
    assert_eq!(resolution.labels[&39], "label-39");
    // One rejected batch per level plus its accepted sibling
    assert_eq!(lookup.call_count(), 1 + 2 * 6);
}

#[tokio::test]
async fn test_all_unknown_batch_resolves_to_placeholders() {
    let lookup = Arc::new(FakeLookup::knowing([]));
    let resolver = IdResolver::new(lookup.clone());

    let resolution = resolver
        .resolve_many(IdKind::Region, &[5000, 5001, 5002, 5003])
        .await
        .unwrap();

    for id in 5000..=5003 {
        assert_eq!(resolution.labels[&id], format!("unknownID_{id}"));
    }
    assert_eq!(lookup.call_count(), 1 + 2 + 4);

    // Placeholders are cached like any other label
    resolver.resolve_many(IdKind::Region, &[5001]).await.unwrap();
    assert_eq!(lookup.call_count(), 7);
}

#[tokio::test]
async fn test_resolved_ids_are_never_resent() {
    let lookup = Arc::new(FakeLookup::knowing([1, 2, 3]));
    let resolver = IdResolver::new(lookup.clone());

    resolver.resolve_many(IdKind::Type, &[1, 2, 5000]).await.unwrap();
    let calls_before = lookup.call_count();

    resolver.resolve_many(IdKind::Type, &[1, 2, 3, 5000]).await.unwrap();

    let calls = lookup.calls();
    assert_eq!(calls.len(), calls_before + 1);
    assert_eq!(calls.last().unwrap(), &vec![3]);
}

#[tokio::test]
async fn test_duplicates_collapse_into_one_request() {
    let lookup = Arc::new(FakeLookup::knowing([7, 8]));
    let resolver = IdResolver::new(lookup.clone());

    let resolution = resolver.resolve_many(IdKind::Type, &[8, 7, 7, 8, 7]).await.unwrap();

    assert_eq!(resolution.labels.len(), 2);
    assert_eq!(lookup.calls(), vec![vec![7, 8]]);
}

#[tokio::test]
async fn test_batches_never_exceed_service_limit() {
    let lookup = Arc::new(FakeLookup::knowing(1..=2500));
    let resolver = IdResolver::new(lookup.clone());

    let ids: Vec<NumericId> = (1..=2500).collect();
    resolver.resolve_many(IdKind::Type, &ids).await.unwrap();

    let sizes: Vec<usize> = lookup.calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![1000, 1000, 500]);
}

#[tokio::test]
async fn test_service_error_propagates_without_caching() {
    let lookup = Arc::new(FakeLookup::knowing([1, 2]));
    lookup.set_failing(true);
    let resolver = IdResolver::new(lookup.clone());

    let result = resolver.resolve_many(IdKind::Type, &[1, 2]).await;
    assert!(matches!(
        result,
        Err(ResolveError::Lookup {
            kind: IdKind::Type,
            ..
        })
    ));
    assert_eq!(lookup.call_count(), 1);
    assert_eq!(resolver.cached(IdKind::Type, 1), None);

    lookup.set_failing(false);
    let resolution = resolver.resolve_many(IdKind::Type, &[1, 2]).await.unwrap();
    assert_eq!(resolution.labels[&1], "label-1");
}

#[tokio::test]
async fn test_concurrent_resolution_is_consistent() {
    let lookup = Arc::new(FakeLookup::knowing(0..200));
    let resolver = Arc::new(IdResolver::with_max_batch(lookup.clone(), 16));

    let mut handles = Vec::new();
    for worker in 0..8u32 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move {
            let ids: Vec<NumericId> = (worker * 20..worker * 20 + 60).collect();
            resolver.resolve_many(IdKind::Type, &ids).await.unwrap()
        }));
    }

    let mut union = BTreeSet::new();
    for handle in handles {
        let resolution = handle.await.unwrap();
        for (id, label) in &resolution.labels {
            assert_eq!(label, &format!("label-{id}"));
            union.insert(*id);
        }
    }

    assert_eq!(resolver.cached_len(IdKind::Type), union.len());
    assert_eq!(resolver.cached_len(IdKind::Region), 0);
}
