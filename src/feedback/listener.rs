//! Consumes the results channel and drives the observer hub.
//!
//! The results topic drops messages for a listener that falls behind. Every
//! published result is recorded by the tracker first, so after a lag the
//! listener re-notifies each finished request the hub has not seen yet.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::feedback::TranslationSubject;
use crate::observability::metrics;
use crate::pubsub::{Received, Subscription};
use crate::tracking::LifecycleTracker;
use crate::translation::TranslationResult;

/// Bridges the `results` channel to [`TranslationSubject::notify`].
pub struct ResultListener {
    subject: Arc<TranslationSubject>,
    tracker: Arc<LifecycleTracker>,
    results: Subscription<TranslationResult>,
}

impl ResultListener {
    pub fn new(
        subject: Arc<TranslationSubject>,
        tracker: Arc<LifecycleTracker>,
        results: Subscription<TranslationResult>,
    ) -> Self {
        Self {
            subject,
            tracker,
            results,
        }
    }

    /// Notify every finished request that the hub missed. Returns how many.
    fn recover(&self, skipped: u64) -> usize {
        let missed: Vec<TranslationResult> = self
            .tracker
            .finished_results()
            .into_iter()
            .filter(|result| !self.subject.is_notified(&result.request_id))
            .collect();

        for result in &missed {
            self.subject.notify(result);
        }
        tracing::info!(skipped, recovered = missed.len(), "Recovered results after lag");
        metrics::record_results_recovered(missed.len() as u64);
        missed.len()
    }

    /// Run until shutdown or until the bus closes.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!("Result listener started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("Result listener stopping");
                    break;
                }
                message = self.results.recv() => match message {
                    Some(Received::Message(result)) => {
                        self.subject.notify(&result);
                    }
                    Some(Received::Lagged(skipped)) => {
                        self.recover(skipped);
                    }
                    None => {
                        tracing::debug!("Results channel closed");
                        break;
                    }
                },
            }
        }
    }
}
