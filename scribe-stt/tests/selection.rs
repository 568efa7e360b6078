//! Integration tests for provider selection through the factory, plus
//! property tests of the selection engine.

mod common;

use std::collections::HashSet;

use proptest::prelude::*;

use scribe_common::{AbTestSettings, SelectionStrategy, SettingsStore};
use scribe_stt::{
    Candidate, Error, EventNotifier, PerformanceProfile, SelectionContext, SelectionEngine,
    SpeedTier, TranscriptionEvent,
};

use common::{factory, request, settings, Behavior, MockProvider};

// ============================================================================
// Factory Selection
// ============================================================================

#[tokio::test]
async fn test_get_provider_never_returns_disabled() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);

    for strategy in [
        SelectionStrategy::CostOptimized,
        SelectionStrategy::PerformanceOptimized,
        SelectionStrategy::QualityOptimized,
        SelectionStrategy::RoundRobin,
        SelectionStrategy::AbTest,
    ] {
        let (factory, _) = factory(settings(strategy, true), &whisper, &deepgram);
        factory.toggle_provider("deepgram", false).await.unwrap();

        for _ in 0..4 {
            let provider = factory.get_provider(None).await.unwrap();
            assert_eq!(provider.name(), "whisper", "strategy {strategy}");
        }
    }
}

#[tokio::test]
async fn test_round_robin_visits_each_provider_once_per_cycle() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::RoundRobin, true), &whisper, &deepgram);

    let available = factory.available_providers().await;
    for _ in 0..3 {
        let mut seen = HashSet::new();
        for _ in 0..available.len() {
            seen.insert(factory.get_provider(None).await.unwrap().name().to_string());
        }
        assert_eq!(seen.len(), available.len());
    }
}

#[tokio::test]
async fn test_ab_test_is_stable_per_key() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::AbTest, true), &whisper, &deepgram);

    for key in ["user-1", "user-2", "session-abc"] {
        let req = request(1024, "mp3").with_selection_key(key);
        let first = factory.transcribe(&req, None).await.unwrap().provider;
        for _ in 0..5 {
            assert_eq!(factory.transcribe(&req, None).await.unwrap().provider, first);
        }
    }
}

#[tokio::test]
async fn test_manual_unavailable_preference_without_fallback_fails() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::Manual, false), &whisper, &deepgram);
    factory.toggle_provider("whisper", false).await.unwrap();

    let err = factory.get_provider(Some("whisper")).await.err();
    assert!(matches!(err, Some(Error::NoProviderAvailable(_))));

    let err = factory
        .transcribe(&request(1024, "mp3"), Some("whisper"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoProviderAvailable(_)));
    assert_eq!(whisper.call_count(), 0);
    assert_eq!(deepgram.call_count(), 0);
}

#[tokio::test]
async fn test_manual_unavailable_preference_with_fallback_substitutes() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::Manual, true), &whisper, &deepgram);
    factory.toggle_provider("whisper", false).await.unwrap();

    let (notifier, mut rx) = EventNotifier::channel();
    let factory = factory.with_notifier(notifier);

    let result = factory
        .transcribe(&request(1024, "mp3"), Some("whisper"))
        .await
        .unwrap();
    assert_eq!(result.provider, "deepgram");

    match rx.recv().await.unwrap() {
        TranscriptionEvent::ProviderSubstituted { preferred, provider, .. } => {
            assert_eq!(preferred, "whisper");
            assert_eq!(provider, "deepgram");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_manual_uses_default_provider() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::Manual, true), &whisper, &deepgram);

    assert_eq!(factory.get_provider(None).await.unwrap().name(), "whisper");

    factory.set_default_provider("deepgram").await.unwrap();
    assert_eq!(factory.get_provider(None).await.unwrap().name(), "deepgram");
}

#[tokio::test]
async fn test_explicit_preference_overrides_strategy() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );

    assert_eq!(factory.get_provider(None).await.unwrap().name(), "deepgram");
    assert_eq!(factory.get_provider(Some("whisper")).await.unwrap().name(), "whisper");
}

#[tokio::test]
async fn test_settings_mutations_persist_and_apply() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, store) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );

    factory.set_strategy(SelectionStrategy::QualityOptimized).await.unwrap();
    assert_eq!(factory.get_provider(None).await.unwrap().name(), "whisper");

    factory.toggle_provider("whisper", false).await.unwrap();
    assert_eq!(factory.available_providers().await, vec!["deepgram"]);

    factory.set_default_provider("deepgram").await.unwrap();

    assert_eq!(store.save_count(), 3);
    let stored = store.load().unwrap();
    assert_eq!(stored.selection_strategy, SelectionStrategy::QualityOptimized);
    assert!(!stored.is_enabled("whisper"));
    assert_eq!(stored.default_provider, "deepgram");
}

#[tokio::test]
async fn test_cost_optimized_uses_request_duration() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::CostOptimized, true), &whisper, &deepgram);

    let req = request(1024, "mp3").with_duration(300.0);
    assert_eq!(factory.transcribe(&req, None).await.unwrap().provider, "deepgram");

    let cost = factory.estimate_cost("deepgram", 60.0, Some("nova-2")).await.unwrap();
    assert!((cost - 0.0043).abs() < 1e-4);
}

// ============================================================================
// Engine Properties
// ============================================================================

fn strategy() -> impl Strategy<Value = SelectionStrategy> {
    prop_oneof![
        Just(SelectionStrategy::Manual),
        Just(SelectionStrategy::CostOptimized),
        Just(SelectionStrategy::PerformanceOptimized),
        Just(SelectionStrategy::QualityOptimized),
        Just(SelectionStrategy::RoundRobin),
        Just(SelectionStrategy::AbTest),
    ]
}

fn speed() -> impl Strategy<Value = SpeedTier> {
    prop_oneof![Just(SpeedTier::Fast), Just(SpeedTier::Medium), Just(SpeedTier::Slow)]
}

fn candidate(index: usize) -> impl Strategy<Value = Candidate> {
    (0.0f64..100.0, speed(), 0u64..5000, 0.0f64..1.0, proptest::option::of(0.0f64..3000.0)).prop_map(
        move |(accuracy, speed, latency, cost, average)| Candidate {
            id: format!("provider-{index}"),
            profile: PerformanceProfile {
                accuracy,
                speed,
                typical_latency_ms: latency,
            },
            cost,
            average_latency_ms: average,
        },
    )
}

fn candidates() -> impl Strategy<Value = Vec<Candidate>> {
    (0usize..5).prop_flat_map(|n| (0..n).map(candidate).collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn prop_selection_returns_a_candidate(
        candidates in candidates(),
        strategy in strategy(),
        preferred in proptest::option::of(0usize..6),
        fallback_enabled in any::<bool>(),
        key in proptest::option::of("[a-z0-9]{1,12}"),
        split in 0.0f64..=1.0,
    ) {
        let ids: HashSet<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let ctx = SelectionContext {
            candidates,
            preferred: preferred.map(|i| format!("provider-{i}")),
            strategy,
            fallback_enabled,
            key,
            ab_test: AbTestSettings { split, ..AbTestSettings::default() },
        };

        let engine = SelectionEngine::new();
        for _ in 0..3 {
            if let Ok(selection) = engine.select(&ctx) {
                prop_assert!(ids.contains(&selection.provider));
            }
        }
    }

    #[test]
    fn prop_ab_selection_is_idempotent(
        candidates in candidates(),
        key in "[a-z0-9-]{1,24}",
        split in 0.0f64..=1.0,
    ) {
        let ctx = SelectionContext {
            candidates,
            preferred: None,
            strategy: SelectionStrategy::AbTest,
            fallback_enabled: true,
            key: Some(key),
            ab_test: AbTestSettings { split, ..AbTestSettings::default() },
        };

        let engine = SelectionEngine::new();
        let first = engine.select(&ctx);
        for _ in 0..3 {
            prop_assert_eq!(engine.select(&ctx), first.clone());
        }
    }

    #[test]
    fn prop_round_robin_cycles_through_all(candidates in candidates()) {
        prop_assume!(!candidates.is_empty());
        let n = candidates.len();
        let ctx = SelectionContext {
            candidates,
            preferred: None,
            strategy: SelectionStrategy::RoundRobin,
            fallback_enabled: true,
            key: None,
            ab_test: AbTestSettings::default(),
        };

        let engine = SelectionEngine::new();
        let seen: HashSet<String> = (0..n)
            .map(|_| engine.select(&ctx).map(|s| s.provider))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(seen.len(), n);
    }
}
