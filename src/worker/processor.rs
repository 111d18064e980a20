//! End-to-end handling of one translation request.

use std::sync::Arc;

use thiserror::Error;

use crate::persistence::ResultStore;
use crate::pubsub::{Channel, MessageBus, PubSubError};
use crate::resilience::{Ambassador, AmbassadorError, AmbassadorResponse};
use crate::tracking::{LifecycleError, LifecycleTracker, Transition};
use crate::translation::{
    Failure, FailureReason, TranslateError, Translation, TranslationCache, TranslationRequest,
    TranslationResult,
};

/// Provider name recorded on cache hits.
pub const CACHE_PROVIDER: &str = "cache";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("failed to publish result: {0}")]
    Publish(#[from] PubSubError),
}

/// Map an Ambassador error to the failure recorded on the request.
pub fn failure_from(error: &AmbassadorError) -> Failure {
    let reason = match error {
        AmbassadorError::CircuitOpen { .. } | AmbassadorError::Exhausted { .. } => {
            FailureReason::ServiceUnavailable
        }
        AmbassadorError::Rejected {
            error: TranslateError::UnsupportedLanguagePair { .. },
            ..
        } => FailureReason::TranslationNotPossible,
        AmbassadorError::Rejected { .. } => FailureReason::Internal,
    };
    Failure {
        reason,
        detail: error.to_string(),
        attempts: error.attempts(),
    }
}

/// Processes requests: claim, translate, record, persist, publish.
pub struct RequestProcessor {
    tracker: Arc<LifecycleTracker>,
    bus: Arc<MessageBus>,
    store: Arc<dyn ResultStore>,
    cache: Option<TranslationCache>,
    primary: Arc<Ambassador>,
    fallback: Option<Arc<Ambassador>>,
}

impl RequestProcessor {
    pub fn new(
        tracker: Arc<LifecycleTracker>,
        bus: Arc<MessageBus>,
        store: Arc<dyn ResultStore>,
        primary: Arc<Ambassador>,
    ) -> Self {
        Self {
            tracker,
            bus,
            store,
            cache: None,
            primary,
            fallback: None,
        }
    }

    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<Ambassador>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Drive `request` to a terminal state.
    ///
    /// Returns the published result, or `None` when the request had already
    /// finished (redelivery) or another call recorded the same outcome first.
    pub async fn process(
        &self,
        request: TranslationRequest,
    ) -> Result<Option<TranslationResult>, ProcessError> {
        let id = request.id.clone();
        // Requests published straight to the channel arrive unregistered.
        // Known and retired ids are left as they are.
        if self.tracker.register(request) {
            tracing::debug!(request_id = %id, "Registered request from the channel");
        }

        let request = match self.tracker.claim(&id) {
            Ok(request) => request,
            Err(LifecycleError::AlreadyClaimed { state, .. }) if state.is_terminal() => {
                tracing::debug!(request_id = %id, state = %state, "Redelivered request already finished");
                return Ok(None);
            }
            Err(LifecycleError::Retired { state, .. }) => {
                tracing::debug!(request_id = %id, state = %state, "Redelivered request already retired");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let transition = match self.translate(&request).await {
            Ok(translation) => self.tracker.complete(&id, translation)?,
            Err(failure) => self.tracker.fail(&id, failure)?,
        };

        match transition {
            Transition::Applied(result) => {
                self.persist(&result).await;
                self.bus.publish(Channel::Results, &result).await?;
                Ok(Some(result))
            }
            Transition::Duplicate(_) => Ok(None),
        }
    }

    async fn persist(&self, result: &TranslationResult) {
        if let Err(e) = self.store.save(result).await {
            tracing::warn!(request_id = %result.request_id, error = %e, "Failed to persist result");
        }
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<Translation, Failure> {
        if let Some(cache) = &self.cache {
            if let Some(text) = cache.get(&request.text, &request.source_lang, &request.target_lang)
            {
                tracing::debug!(request_id = %request.id, "Served from cache");
                return Ok(Translation {
                    text,
                    provider: CACHE_PROVIDER.to_string(),
                    cached: true,
                    attempts: 0,
                });
            }
        }

        let primary_error = match self.primary.call(request).await {
            Ok(response) => return Ok(self.remember(request, response, 0)),
            Err(e) => e,
        };

        let fallback = match &self.fallback {
            Some(fallback) if !matches!(primary_error, AmbassadorError::Rejected { .. }) => fallback,
            _ => return Err(failure_from(&primary_error)),
        };

        tracing::warn!(
            request_id = %request.id,
            primary = self.primary.provider(),
            fallback = fallback.provider(),
            error = %primary_error,
            "Primary translator failed, falling back"
        );

        let spent = primary_error.attempts();
        match fallback.call(request).await {
            Ok(response) => Ok(self.remember(request, response, spent)),
            Err(e) => {
                let mut failure = failure_from(&e);
                failure.attempts += spent;
                Err(failure)
            }
        }
    }

    fn remember(
        &self,
        request: &TranslationRequest,
        response: AmbassadorResponse,
        earlier_attempts: u32,
    ) -> Translation {
        if let Some(cache) = &self.cache {
            cache.put(
                &request.text,
                &request.source_lang,
                &request.target_lang,
                &response.text,
            );
        }
        Translation {
            text: response.text,
            provider: response.provider,
            cached: false,
            attempts: response.attempts + earlier_attempts,
        }
    }
}
