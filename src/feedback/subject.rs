//! Observer hub keyed by request id.
//!
//! # Design Decisions
//! - Lock order is registrations, then notified; `notify` never holds both
//! - A request id is notified at most once; later results are counted as duplicates

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::feedback::{
    FeedbackObserver, LiveStreamObserver, PollBufferObserver, ResultBuffer,
};
use crate::observability::metrics;
use crate::translation::{RequestId, TranslationResult};

/// Handle for unsubscribing one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// What `subscribe` did with the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Waiting for the result.
    Registered(ObserverId),
    /// The result already existed and was dispatched right away.
    Delivered,
}

/// Counters reported by [`TranslationSubject::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubjectStats {
    pub registrations: usize,
    pub observers: usize,
    pub notified: usize,
    pub buffered: usize,
    pub deliveries: u64,
    pub fallbacks: u64,
    pub duplicates: u64,
}

#[derive(Debug)]
struct Registration {
    id: ObserverId,
    observer: Arc<dyn FeedbackObserver>,
}

#[derive(Debug)]
struct Notified {
    result: TranslationResult,
    at: Instant,
}

/// Fans each finished request out to the observers waiting on it.
#[derive(Debug)]
pub struct TranslationSubject {
    registrations: DashMap<RequestId, Vec<Registration>>,
    notified: DashMap<RequestId, Notified>,
    buffer: Arc<ResultBuffer>,
    next_observer: AtomicU64,
    deliveries: AtomicU64,
    fallbacks: AtomicU64,
    duplicates: AtomicU64,
}

impl TranslationSubject {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            registrations: DashMap::new(),
            notified: DashMap::new(),
            buffer: Arc::new(ResultBuffer::new(buffer_capacity)),
            next_observer: AtomicU64::new(1),
            deliveries: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    pub fn buffer(&self) -> &Arc<ResultBuffer> {
        &self.buffer
    }

    /// Register `observer` for `request_id`, or deliver at once if the
    /// result has already been notified.
    pub fn subscribe(
        &self,
        request_id: &RequestId,
        observer: Arc<dyn FeedbackObserver>,
    ) -> SubscribeOutcome {
        let slot = self.registrations.entry(request_id.clone());

        let finished = self
            .notified
            .get(request_id)
            .map(|notified| notified.result.clone());
        if let Some(result) = finished {
            drop(slot);
            tracing::debug!(request_id = %request_id, "Late subscriber, delivering immediately");
            self.dispatch(observer.as_ref(), &result);
            return SubscribeOutcome::Delivered;
        }

        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(
            request_id = %request_id,
            observer = %id,
            kind = observer.kind().as_str(),
            "Observer registered"
        );
        slot.or_default().push(Registration { id, observer });
        SubscribeOutcome::Registered(id)
    }

    /// Register a poll-buffer observer for `request_id`.
    pub fn subscribe_poll(&self, request_id: &RequestId) -> SubscribeOutcome {
        let observer = PollBufferObserver::new(self.buffer.clone());
        self.subscribe(request_id, Arc::new(observer))
    }

    /// Remove one observer. Returns whether it was registered.
    pub fn unsubscribe(&self, request_id: &RequestId, observer: ObserverId) -> bool {
        let removed = match self.registrations.get_mut(request_id) {
            Some(mut registered) => {
                let before = registered.len();
                registered.retain(|registration| registration.id != observer);
                before != registered.len()
            }
            None => false,
        };
        self.registrations
            .remove_if(request_id, |_, registered| registered.is_empty());

        if removed {
            tracing::debug!(request_id = %request_id, observer = %observer, "Observer unsubscribed");
        }
        removed
    }

    /// Dispatch `result` to every observer registered for its id and clear
    /// the registrations. Returns the number of successful deliveries.
    pub fn notify(&self, result: &TranslationResult) -> usize {
        let request_id = &result.request_id;

        match self.notified.entry(request_id.clone()) {
            Entry::Occupied(_) => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(request_id = %request_id, "Duplicate result ignored");
                return 0;
            }
            Entry::Vacant(slot) => {
                slot.insert(Notified {
                    result: result.clone(),
                    at: Instant::now(),
                });
            }
        }

        let observers = self
            .registrations
            .remove(request_id)
            .map(|(_, registered)| registered)
            .unwrap_or_default();

        if observers.is_empty() {
            tracing::debug!(request_id = %request_id, "No observers registered");
            return 0;
        }

        let delivered = observers
            .iter()
            .filter(|registration| self.dispatch(registration.observer.as_ref(), result))
            .count();

        tracing::debug!(
            request_id = %request_id,
            observers = observers.len(),
            delivered,
            "Result dispatched"
        );
        delivered
    }

    fn dispatch(&self, observer: &dyn FeedbackObserver, result: &TranslationResult) -> bool {
        let kind = observer.kind().as_str();
        match observer.deliver(result) {
            Ok(()) => {
                self.deliveries.fetch_add(1, Ordering::Relaxed);
                metrics::record_delivery(kind, "delivered");
                true
            }
            Err(e) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                metrics::record_delivery(kind, "fallback");
                tracing::warn!(
                    request_id = %result.request_id,
                    kind,
                    error = %e,
                    "Delivery failed, result moved to poll buffer"
                );
                self.buffer.push(result.clone());
                false
            }
        }
    }

    /// Take a buffered result, or read one that was notified with nobody listening.
    pub fn poll(&self, request_id: &RequestId) -> Option<TranslationResult> {
        self.buffer.take(request_id).or_else(|| {
            self.notified
                .get(request_id)
                .map(|notified| notified.result.clone())
        })
    }

    /// Take every buffered result for `user_id`.
    pub fn poll_user(&self, user_id: &str) -> Vec<TranslationResult> {
        self.buffer.take_for_user(user_id)
    }

    /// Wait up to `timeout` for the result of `request_id` over a live stream.
    pub async fn await_result(
        &self,
        request_id: &RequestId,
        timeout: Duration,
    ) -> Option<TranslationResult> {
        let (observer, mut rx) = LiveStreamObserver::channel(1);

        match self.subscribe(request_id, Arc::new(observer)) {
            SubscribeOutcome::Delivered => {
                rx.recv().await.or_else(|| self.buffer.take(request_id))
            }
            SubscribeOutcome::Registered(observer_id) => {
                match tokio::time::timeout(timeout, rx.recv()).await {
                    Ok(Some(result)) => Some(result),
                    Ok(None) => self.buffer.take(request_id),
                    Err(_) => {
                        self.unsubscribe(request_id, observer_id);
                        tracing::debug!(request_id = %request_id, "Timed out waiting for result");
                        rx.try_recv().ok()
                    }
                }
            }
        }
    }

    /// Whether a result for `request_id` has already been dispatched.
    pub fn is_notified(&self, request_id: &RequestId) -> bool {
        self.notified.contains_key(request_id)
    }

    /// Forget notified ids older than `older_than`.
    pub fn evict_notified(&self, older_than: Duration) -> usize {
        let before = self.notified.len();
        self.notified
            .retain(|_, notified| notified.at.elapsed() < older_than);
        before.saturating_sub(self.notified.len())
    }

    pub fn observer_count(&self, request_id: &RequestId) -> usize {
        self.registrations
            .get(request_id)
            .map(|registered| registered.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> SubjectStats {
        SubjectStats {
            registrations: self.registrations.len(),
            observers: self.registrations.iter().map(|r| r.len()).sum(),
            notified: self.notified.len(),
            buffered: self.buffer.len(),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{Translation, TranslationRequest};

    fn result(id: &str) -> TranslationResult {
        let request = TranslationRequest::new("Hello", "en", "de").with_id(id);
        TranslationResult::completed(
            &request,
            Translation {
                text: "Hallo".into(),
                provider: "local_glossary".into(),
                cached: false,
                attempts: 1,
            },
        )
    }

    #[test]
    fn test_notify_without_observers_is_noop() {
        let subject = TranslationSubject::new(8);
        assert_eq!(subject.notify(&result("r1")), 0);
        assert_eq!(subject.stats().deliveries, 0);
    }

    #[test]
    fn test_two_observers_each_receive_once() {
        let subject = TranslationSubject::new(8);
        let id = RequestId::from("r1");
        let (a, mut rx_a) = LiveStreamObserver::channel(4);
        let (b, mut rx_b) = LiveStreamObserver::channel(4);
        subject.subscribe(&id, Arc::new(a));
        subject.subscribe(&id, Arc::new(b));

        assert_eq!(subject.notify(&result("r1")), 2);
        assert_eq!(subject.notify(&result("r1")), 0);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        let stats = subject.stats();
        assert_eq!(stats.registrations, 0);
        assert_eq!(stats.deliveries, 2);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_failed_delivery_falls_back_to_buffer() {
        let subject = TranslationSubject::new(8);
        let id = RequestId::from("r1");
        let (observer, rx) = LiveStreamObserver::channel(1);
        subject.subscribe(&id, Arc::new(observer));
        drop(rx);

        assert_eq!(subject.notify(&result("r1")), 0);
        assert_eq!(subject.stats().fallbacks, 1);
        assert!(subject.buffer().contains(&id));
        assert_eq!(subject.poll(&id).unwrap().request_id, id);
    }

    #[test]
    fn test_late_subscriber_is_served_immediately() {
        let subject = TranslationSubject::new(8);
        let id = RequestId::from("r1");
        subject.notify(&result("r1"));

        let (observer, mut rx) = LiveStreamObserver::channel(1);
        assert_eq!(
            subject.subscribe(&id, Arc::new(observer)),
            SubscribeOutcome::Delivered
        );
        assert!(rx.try_recv().is_ok());
        assert_eq!(subject.observer_count(&id), 0);
    }

    #[test]
    fn test_unsubscribe_removes_observer() {
        let subject = TranslationSubject::new(8);
        let id = RequestId::from("r1");
        let (observer, mut rx) = LiveStreamObserver::channel(1);
        let SubscribeOutcome::Registered(observer_id) = subject.subscribe(&id, Arc::new(observer))
        else {
            panic!("expected registration");
        };

        assert!(subject.unsubscribe(&id, observer_id));
        assert!(!subject.unsubscribe(&id, observer_id));
        assert_eq!(subject.stats().registrations, 0);

        subject.notify(&result("r1"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_poll_observer_parks_result() {
        let subject = TranslationSubject::new(8);
        let id = RequestId::from("r1");
        subject.subscribe_poll(&id);
        assert_eq!(subject.notify(&result("r1")), 1);
        assert!(subject.buffer().contains(&id));
        assert!(subject.poll(&id).is_some());
    }

    #[tokio::test]
    async fn test_await_result_receives_notification() {
        let subject = Arc::new(TranslationSubject::new(8));
        let id = RequestId::from("r1");

        let waiter = {
            let subject = subject.clone();
            let id = id.clone();
            tokio::spawn(async move { subject.await_result(&id, Duration::from_secs(5)).await })
        };
        while subject.observer_count(&id) == 0 {
            tokio::task::yield_now().await;
        }
        subject.notify(&result("r1"));

        let received = waiter.await.unwrap().unwrap();
        assert_eq!(received.translated_text(), Some("Hallo"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_result_times_out_and_unsubscribes() {
        let subject = TranslationSubject::new(8);
        let id = RequestId::from("r1");

        assert!(subject.await_result(&id, Duration::from_secs(60)).await.is_none());
        assert_eq!(subject.observer_count(&id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_notified() {
        let subject = TranslationSubject::new(8);
        subject.notify(&result("r1"));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(subject.evict_notified(Duration::from_secs(5)), 1);
        assert_eq!(subject.stats().notified, 0);
    }
}
