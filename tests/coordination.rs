//! End-to-end tests of the coordination layer.

use std::sync::Arc;
use std::time::Duration;

use translation_coordinator::config::CoordinatorConfig;
use translation_coordinator::feedback::{LiveStreamObserver, SubscribeOutcome};
use translation_coordinator::persistence::MemoryResultStore;
use translation_coordinator::pubsub::{Channel, MessageBus};
use translation_coordinator::resilience::{Ambassador, CircuitBreaker, CircuitState, RetryPolicy};
use translation_coordinator::tracking::LifecycleTracker;
use translation_coordinator::translation::{FailureReason, GlossaryTranslator, TranslationResult};
use translation_coordinator::worker::RequestProcessor;
use translation_coordinator::{
    Coordinator, RequestId, SubmitError, TranslationRequest, TranslationState,
};

mod common;

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for(coordinator: &Coordinator, id: &RequestId) -> TranslationResult {
    coordinator
        .subject()
        .await_result(id, WAIT)
        .await
        .expect("result should be delivered")
}

#[tokio::test]
async fn test_hello_is_translated_with_full_history() {
    let coordinator = Coordinator::builder(common::test_config()).start().unwrap();

    let request = TranslationRequest::new("Hello", "en", "de").with_id("r1");
    let id = coordinator.submit(request).await.unwrap();
    let result = wait_for(&coordinator, &id).await;

    assert_eq!(result.state, TranslationState::Completed);
    assert_eq!(result.translated_text(), Some("Hallo"));
    assert_eq!(result.attempts, 1);

    let status = coordinator.status(&id).unwrap();
    assert_eq!(
        status.states(),
        vec![
            TranslationState::Pending,
            TranslationState::Processing,
            TranslationState::Completed
        ]
    );

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_failing_capability_opens_circuit() {
    let mut config = common::test_config();
    config.breaker.fail_max = 3;
    config.retries.max_attempts = 5;

    let translator = common::FailingTranslator::new();
    let coordinator = Coordinator::builder(config)
        .primary(translator.clone())
        .start()
        .unwrap();

    let id = coordinator
        .submit(TranslationRequest::new("Hello", "en", "de").with_id("r2"))
        .await
        .unwrap();
    let result = wait_for(&coordinator, &id).await;

    assert_eq!(result.state, TranslationState::Failed);
    assert_eq!(result.failure_reason(), Some(FailureReason::ServiceUnavailable));
    assert_eq!(
        result.failure_reason().unwrap().to_string(),
        "service temporarily unavailable"
    );
    assert_eq!(translator.calls(), 3, "circuit opening must stop the retries");

    let snapshots = coordinator.breaker_snapshots();
    let breaker = snapshots.iter().find(|s| s.dependency == "translation").unwrap();
    assert_eq!(breaker.state, CircuitState::Open);

    // Further requests fail fast without touching the capability.
    let id = coordinator
        .submit(TranslationRequest::new("Hello", "en", "de"))
        .await
        .unwrap();
    let result = wait_for(&coordinator, &id).await;
    assert_eq!(result.failure_reason(), Some(FailureReason::ServiceUnavailable));
    assert_eq!(result.attempts, 0);
    assert_eq!(translator.calls(), 3);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_pair_is_not_possible() {
    let coordinator = Coordinator::builder(common::test_config()).start().unwrap();

    let id = coordinator
        .submit(TranslationRequest::new("Hello", "en", "fr"))
        .await
        .unwrap();
    let result = wait_for(&coordinator, &id).await;

    assert_eq!(result.failure_reason(), Some(FailureReason::TranslationNotPossible));
    assert_eq!(result.attempts, 1);
    assert!(coordinator
        .breaker_snapshots()
        .iter()
        .all(|s| s.state == CircuitState::Closed && s.consecutive_failures == 0));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_falls_back_to_external_capability() {
    let primary = common::FailingTranslator::new();
    let external = common::FlakyTranslator::new("external_api", 0, "Hallo");
    let coordinator = Coordinator::builder(common::test_config())
        .primary(primary.clone())
        .fallback(external.clone())
        .start()
        .unwrap();

    let id = coordinator
        .submit(TranslationRequest::new("Hello", "en", "de"))
        .await
        .unwrap();
    let result = wait_for(&coordinator, &id).await;

    assert!(result.is_success());
    assert_eq!(result.translated_text(), Some("Hallo"));
    assert_eq!(result.attempts, 4);
    assert_eq!(primary.calls(), 3);
    assert_eq!(external.calls(), 1);
    match &result.outcome {
        translation_coordinator::translation::Outcome::Translated { provider, .. } => {
            assert_eq!(provider, "external_api")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_cache_serves_repeated_text() {
    let mut config = common::test_config();
    config.cache.enabled = true;
    let translator = common::FlakyTranslator::new("local_glossary", 0, "Hallo");
    let coordinator = Coordinator::builder(config)
        .primary(translator.clone())
        .start()
        .unwrap();

    let first = coordinator
        .submit(TranslationRequest::new("Hello", "en", "de"))
        .await
        .unwrap();
    let first = wait_for(&coordinator, &first).await;
    let second = coordinator
        .submit(TranslationRequest::new("Hello", "en", "de"))
        .await
        .unwrap();
    let second = wait_for(&coordinator, &second).await;

    assert_eq!(first.translated_text(), Some("Hallo"));
    assert_eq!(second.translated_text(), Some("Hallo"));
    assert_eq!(second.attempts, 0);
    assert!(matches!(
        second.outcome,
        translation_coordinator::translation::Outcome::Translated { cached: true, .. }
    ));
    assert_eq!(translator.calls(), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_invalid_requests_fail_at_ingestion() {
    let coordinator = Coordinator::builder(common::test_config()).start().unwrap();

    let err = coordinator
        .submit(TranslationRequest::new("   ", "en", "de").with_id("empty"))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Invalid { .. }));

    let long = "a".repeat(513);
    let err = coordinator
        .submit(TranslationRequest::new(long, "en", "de").with_id("long"))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Invalid { ref reason, .. } if reason.contains("512")));

    let id = RequestId::from("empty");
    let result = wait_for(&coordinator, &id).await;
    assert_eq!(result.failure_reason(), Some(FailureReason::TranslationNotPossible));
    assert_eq!(
        coordinator.status(&id).unwrap().states(),
        vec![TranslationState::Pending, TranslationState::Failed]
    );

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let coordinator = Coordinator::builder(common::test_config()).start().unwrap();

    let request = TranslationRequest::new("Hello", "en", "de").with_id("dup");
    coordinator.submit(request.clone()).await.unwrap();
    let err = coordinator.submit(request).await.unwrap_err();
    assert_eq!(err, SubmitError::Duplicate(RequestId::from("dup")));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_two_observers_each_receive_once() {
    let coordinator = Coordinator::builder(common::test_config()).start().unwrap();
    let id = RequestId::from("watched");

    let (a, mut rx_a) = LiveStreamObserver::channel(4);
    let (b, mut rx_b) = LiveStreamObserver::channel(4);
    assert!(matches!(
        coordinator.subject().subscribe(&id, Arc::new(a)),
        SubscribeOutcome::Registered(_)
    ));
    coordinator.subject().subscribe(&id, Arc::new(b));

    coordinator
        .submit(TranslationRequest::new("Hello", "en", "de").with_id("watched"))
        .await
        .unwrap();

    let from_a = tokio::time::timeout(WAIT, rx_a.recv()).await.unwrap().unwrap();
    let from_b = tokio::time::timeout(WAIT, rx_b.recv()).await.unwrap().unwrap();
    assert_eq!(from_a, from_b);
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_results_are_persisted() {
    let store = Arc::new(MemoryResultStore::new());
    let coordinator = Coordinator::builder(common::test_config())
        .store(store.clone())
        .start()
        .unwrap();

    let id = coordinator
        .submit(TranslationRequest::new("Hello", "en", "de").with_user("alice"))
        .await
        .unwrap();
    let delivered = wait_for(&coordinator, &id).await;

    assert_eq!(store.get(&id), Some(delivered));
    assert_eq!(store.history_for_user("alice").len(), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_duplicate_deliveries_yield_one_result() {
    let config = CoordinatorConfig::default();
    let tracker = Arc::new(LifecycleTracker::new());
    let bus = Arc::new(MessageBus::new(64));
    let store = Arc::new(MemoryResultStore::new());
    let translator = Arc::new(GlossaryTranslator::from_config(
        "local_glossary",
        &config.translator.glossary,
    ));
    let ambassador = Arc::new(Ambassador::new(
        translator,
        Arc::new(CircuitBreaker::new("translation", Default::default())),
        RetryPolicy::from(&config.retries),
    ));
    let processor = Arc::new(RequestProcessor::new(
        tracker.clone(),
        bus.clone(),
        store.clone(),
        ambassador,
    ));

    let mut results = bus.subscribe::<TranslationResult>(Channel::Results).unwrap();
    let request = TranslationRequest::new("Hello", "en", "de").with_id("same");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let processor = processor.clone();
            let request = request.clone();
            tokio::spawn(async move { processor.process(request).await })
        })
        .collect();

    let mut published = 0;
    for handle in handles {
        if let Ok(Some(_)) = handle.await.unwrap() {
            published += 1;
        }
    }

    assert_eq!(published, 1);
    assert_eq!(store.len(), 1);
    assert!(results.next().await.is_some());
    bus.close();
    assert!(results.next().await.is_none());
    assert_eq!(
        tracker.state(&RequestId::from("same")),
        Some(TranslationState::Completed)
    );
}

#[tokio::test]
async fn test_apply_config_updates_breakers() {
    let coordinator = Coordinator::builder(common::test_config()).start().unwrap();

    let mut reloaded = common::test_config();
    reloaded.breaker.fail_max = 9;
    reloaded.breaker.timeout_secs = 5;
    coordinator.apply_config(&reloaded);

    for snapshot in coordinator.breaker_snapshots() {
        assert_eq!(snapshot.fail_max, 9);
        assert_eq!(snapshot.open_duration, Duration::from_secs(5));
    }

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_burst_beyond_channel_capacity_reaches_terminal_state() {
    let mut config = common::test_config();
    config.pubsub.capacity = 2;
    config.workers.count = 1;
    config.retries.attempt_timeout_ms = 5_000;

    let translator = common::SlowTranslator::new(Duration::from_millis(50), "Hallo");
    let coordinator = Coordinator::builder(config)
        .primary(translator.clone())
        .start()
        .unwrap();

    let mut ids = Vec::new();
    for n in 0..10 {
        let request = TranslationRequest::new("Hello", "en", "de").with_id(format!("burst-{}", n));
        ids.push(coordinator.submit(request).await.unwrap());
    }

    for id in &ids {
        let result = coordinator
            .subject()
            .await_result(id, Duration::from_secs(30))
            .await
            .unwrap_or_else(|| panic!("no result for {}", id));
        assert_eq!(result.translated_text(), Some("Hallo"));
    }

    let counts = coordinator.tracker().counts();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.completed, 10);
    assert_eq!(translator.calls(), 10);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_redelivery_after_retention_publishes_nothing() {
    let translator = common::FlakyTranslator::new("local_glossary", 0, "Hallo");
    let coordinator = Coordinator::builder(common::test_config())
        .primary(translator.clone())
        .start()
        .unwrap();
    let mut results = coordinator
        .bus()
        .subscribe::<TranslationResult>(Channel::Results)
        .unwrap();

    let request = TranslationRequest::new("Hello", "en", "de").with_id("r1");
    let id = coordinator.submit(request.clone()).await.unwrap();
    assert_eq!(results.next().await.unwrap().request_id, id);

    tokio::time::advance(Duration::from_secs(3601)).await;
    coordinator.tracker().evict_terminal(Duration::from_secs(3600));
    assert!(coordinator.status(&id).is_none());

    coordinator
        .bus()
        .publish(Channel::Requests, &request)
        .await
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), results.next()).await;
    assert!(second.is_err(), "redelivery produced another result");

    assert_eq!(translator.calls(), 1);
    assert_eq!(coordinator.tracker().state(&id), Some(TranslationState::Completed));
    assert_eq!(
        coordinator.submit(request).await.unwrap_err(),
        SubmitError::Duplicate(id)
    );

    coordinator.shutdown().await;
}
