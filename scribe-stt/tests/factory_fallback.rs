//! Integration tests for provider fallback and pre-dispatch rejection.
//!
//! Verifies that retryable failures hop to exactly one other provider, that
//! non-retryable failures and rejected requests never do, and that metrics
//! are recorded before the fallback decision.

mod common;

use std::sync::Arc;

use scribe_common::SelectionStrategy;
use scribe_stt::{Error, ErrorKind, EventNotifier, TranscriptionEvent};

use common::{factory, request, settings, Behavior, MockProvider, MB};

// ============================================================================
// Retryable Failures
// ============================================================================

#[tokio::test]
async fn test_retryable_failure_falls_back_once() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::ServerError));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );

    let result = factory.transcribe(&request(1024, "mp3"), None).await.unwrap();

    assert_eq!(result.provider, "whisper");
    assert_eq!(deepgram.call_count(), 1);
    assert_eq!(whisper.call_count(), 1);

    let failed = factory.metrics("deepgram").await.unwrap();
    assert_eq!(failed.failed_requests, 1);
    assert!(failed.last_error.unwrap().message.contains("mock failure"));

    let succeeded = factory.metrics("whisper").await.unwrap();
    assert_eq!(succeeded.successful_requests, 1);
}

#[tokio::test]
async fn test_rate_limit_and_network_fall_back() {
    for kind in [ErrorKind::RateLimited, ErrorKind::Network] {
        let whisper = MockProvider::new("whisper", Behavior::Succeed);
        let deepgram = MockProvider::new("deepgram", Behavior::Fail(kind));
        let (factory, _) = factory(
            settings(SelectionStrategy::PerformanceOptimized, true),
            &whisper,
            &deepgram,
        );

        let result = factory.transcribe(&request(1024, "wav"), None).await.unwrap();
        assert_eq!(result.provider, "whisper", "kind {kind} should fall back");
    }
}

#[tokio::test]
async fn test_fallback_is_bounded_to_one_hop() {
    let whisper = MockProvider::new("whisper", Behavior::Fail(ErrorKind::ServerError));
    let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::Network));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );

    let err = factory.transcribe(&request(1024, "mp3"), None).await.unwrap_err();

    // The fallback provider's error is surfaced.
    match err {
        Error::Provider(e) => {
            assert_eq!(e.provider, "whisper");
            assert_eq!(e.kind, ErrorKind::ServerError);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(deepgram.call_count(), 1);
    assert_eq!(whisper.call_count(), 1);
}

#[tokio::test]
async fn test_fallback_disabled_surfaces_first_error() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::RateLimited));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, false),
        &whisper,
        &deepgram,
    );

    let err = factory.transcribe(&request(1024, "mp3"), None).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RateLimited));
    assert!(err.is_retryable());
    assert_eq!(whisper.call_count(), 0);
}

#[tokio::test]
async fn test_no_other_provider_surfaces_error() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::ServerError));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );
    factory.toggle_provider("whisper", false).await.unwrap();

    let err = factory.transcribe(&request(1024, "mp3"), None).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ServerError));
    assert_eq!(whisper.call_count(), 0);
}

#[tokio::test]
async fn test_fallback_skips_providers_that_would_reject() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::ServerError));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );

    // 30 MB is within Deepgram's limit but over Whisper's.
    let err = factory.transcribe(&request(30 * MB, "mp3"), None).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ServerError));
    assert_eq!(whisper.call_count(), 0);
}

// ============================================================================
// Non-retryable Failures
// ============================================================================

#[tokio::test]
async fn test_unauthorized_never_falls_back() {
    for fallback_enabled in [true, false] {
        let whisper = MockProvider::new("whisper", Behavior::Succeed);
        let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::Unauthorized));
        let (factory, _) = factory(
            settings(SelectionStrategy::PerformanceOptimized, fallback_enabled),
            &whisper,
            &deepgram,
        );

        let err = factory.transcribe(&request(1024, "mp3"), None).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));
        assert!(!err.is_retryable());
        assert_eq!(whisper.call_count(), 0);
        assert_eq!(factory.metrics("deepgram").await.unwrap().failed_requests, 1);
    }
}

#[tokio::test]
async fn test_cancelled_does_not_fall_back() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::Cancelled));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );

    let err = factory.transcribe(&request(1024, "mp3"), None).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Cancelled));
    assert_eq!(whisper.call_count(), 0);
}

// ============================================================================
// Pre-dispatch Rejection
// ============================================================================

#[tokio::test]
async fn test_unsupported_extension_never_reaches_adapter() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::Manual, true), &whisper, &deepgram);

    let err = factory
        .transcribe(&request(1024, "aiff"), Some("whisper"))
        .await
        .unwrap_err();

    match err {
        Error::Rejected { provider, kind, errors } => {
            assert_eq!(provider, "whisper");
            assert_eq!(kind, ErrorKind::Unsupported);
            assert!(errors[0].contains("aiff"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(whisper.call_count(), 0);
    assert_eq!(deepgram.call_count(), 0);
    assert!(factory.metrics("whisper").await.is_none());
}

#[tokio::test]
async fn test_oversized_file_rejected_with_sizes_in_mb() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Succeed);
    let (factory, _) = factory(settings(SelectionStrategy::Manual, true), &whisper, &deepgram);

    let err = factory
        .transcribe(&request(30 * MB, "mp3"), Some("whisper"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::PayloadTooLarge));
    let message = err.to_string();
    assert!(message.contains("30 MB"), "{message}");
    assert!(message.contains("25 MB"), "{message}");
    assert_eq!(whisper.call_count(), 0);

    // The same file is fine for Deepgram.
    let result = factory
        .transcribe(&request(30 * MB, "mp3"), Some("deepgram"))
        .await
        .unwrap();
    assert_eq!(result.provider, "deepgram");
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_fallback_emits_events() {
    let whisper = MockProvider::new("whisper", Behavior::Succeed);
    let deepgram = MockProvider::new("deepgram", Behavior::Fail(ErrorKind::ServerError));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );
    let (notifier, mut rx) = EventNotifier::channel();
    let factory = factory.with_notifier(notifier);

    factory.transcribe(&request(1024, "mp3"), None).await.unwrap();
    drop(factory);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(events[0], TranscriptionEvent::Started { ref provider, .. } if provider == "deepgram"));
    assert!(matches!(events[1], TranscriptionEvent::Failed { kind: ErrorKind::ServerError, .. }));
    assert!(matches!(
        events[2],
        TranscriptionEvent::FallbackTriggered { ref from, ref to, .. } if from == "deepgram" && to == "whisper"
    ));
    assert!(matches!(events[3], TranscriptionEvent::Started { ref provider, .. } if provider == "whisper"));
    assert!(matches!(events[4], TranscriptionEvent::Completed { .. }));

    let request_id = events[0].request_id().to_string();
    assert!(events.iter().all(|e| e.request_id() == request_id));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transcriptions_record_every_request() {
    let whisper = MockProvider::new("whisper", Behavior::Slow(std::time::Duration::from_millis(10)));
    let deepgram = MockProvider::new("deepgram", Behavior::Slow(std::time::Duration::from_millis(10)));
    let (factory, _) = factory(
        settings(SelectionStrategy::PerformanceOptimized, true),
        &whisper,
        &deepgram,
    );
    let factory = Arc::new(factory);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let factory = Arc::clone(&factory);
        handles.push(tokio::spawn(async move {
            factory.transcribe(&request(1024, "mp3"), None).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let metrics = factory.metrics("deepgram").await.unwrap();
    assert_eq!(metrics.total_requests, 20);
    assert_eq!(metrics.successful_requests, 20);
    assert_eq!(deepgram.call_count(), 20);
}
