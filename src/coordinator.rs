//! Coordinator runtime.
//!
//! # Responsibilities
//! - Build every component from configuration
//! - Validate and ingest requests onto the requests channel
//! - Own the background tasks: workers, result listener, janitor
//! - Apply hot-reloaded resilience settings
//!
//! # Data Flow
//! ```text
//! submit(request)
//!     → tracker.register (pending)
//!     → validation (invalid → failed, result published)
//!     → message_queue breaker → publish(requests)
//! WorkerPool → results channel → ResultListener → TranslationSubject
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency: primary translator, external API, message queue
//! - `start` must run inside a Tokio runtime; it spawns the background tasks
//! - Shutdown stops intake first, then closes the bus and joins every task

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::CoordinatorConfig;
use crate::feedback::{ResultListener, TranslationSubject};
use crate::lifecycle::Shutdown;
use crate::persistence::{store_from_config, ResultStore};
use crate::pubsub::{Channel, MessageBus, PubSubError};
use crate::resilience::{
    Ambassador, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, RetryPolicy,
};
use crate::tracking::{LifecycleTracker, RequestStatus, Transition};
use crate::translation::{
    Failure, FailureReason, GlossaryTranslator, HttpTranslator, RequestId, TranslationCache,
    TranslationRequest, TranslationResult, Translator,
};
use crate::worker::{RequestProcessor, WorkerPool};

/// Breaker guarding the primary translation capability.
pub const TRANSLATION_BREAKER: &str = "translation";
/// Breaker guarding the external translation API.
pub const EXTERNAL_API_BREAKER: &str = "external_api";
/// Breaker guarding request publication.
pub const QUEUE_BREAKER: &str = "message_queue";

#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error("invalid external API endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error(transparent)]
    PubSub(#[from] PubSubError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why `submit` did not enqueue a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Rejected by validation; the request is recorded as failed.
    #[error("request {id} rejected: {reason}")]
    Invalid { id: RequestId, reason: String },

    /// The id is already known.
    #[error("request {0} already submitted")]
    Duplicate(RequestId),

    /// Publishing failed; the request is recorded as failed.
    #[error("request {id} could not be enqueued: {reason}")]
    Enqueue { id: RequestId, reason: String },
}

impl SubmitError {
    pub fn request_id(&self) -> &RequestId {
        match self {
            SubmitError::Invalid { id, .. }
            | SubmitError::Duplicate(id)
            | SubmitError::Enqueue { id, .. } => id,
        }
    }
}

/// Assembles a [`Coordinator`]; unset parts come from configuration.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    primary: Option<Arc<dyn Translator>>,
    fallback: Option<Arc<dyn Translator>>,
    store: Option<Arc<dyn ResultStore>>,
}

impl CoordinatorBuilder {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            primary: None,
            fallback: None,
            store: None,
        }
    }

    /// Override the primary translation capability.
    pub fn primary(mut self, translator: Arc<dyn Translator>) -> Self {
        self.primary = Some(translator);
        self
    }

    /// Override the fallback translation capability.
    pub fn fallback(mut self, translator: Arc<dyn Translator>) -> Self {
        self.fallback = Some(translator);
        self
    }

    pub fn store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the components and spawn the background tasks.
    pub fn start(self) -> Result<Coordinator, StartError> {
        let config = self.config;
        validate_config(&config).map_err(StartError::Config)?;

        let primary: Arc<dyn Translator> = match self.primary {
            Some(translator) => translator,
            None => Arc::new(GlossaryTranslator::from_config(
                config.translator.name.clone(),
                &config.translator.glossary,
            )),
        };
        let fallback: Option<Arc<dyn Translator>> = match self.fallback {
            Some(translator) => Some(translator),
            None if config.translator.external.enabled => {
                Some(Arc::new(HttpTranslator::new(&config.translator.external)?))
            }
            None => None,
        };
        let store = self
            .store
            .unwrap_or_else(|| store_from_config(&config.persistence));

        let breaker_config = CircuitBreakerConfig::from(&config.breaker);
        let policy = RetryPolicy::from(&config.retries);

        let primary = Arc::new(Ambassador::new(
            primary,
            Arc::new(CircuitBreaker::new(TRANSLATION_BREAKER, breaker_config)),
            policy,
        ));
        let fallback = fallback.map(|translator| {
            Arc::new(Ambassador::new(
                translator,
                Arc::new(CircuitBreaker::new(EXTERNAL_API_BREAKER, breaker_config)),
                policy,
            ))
        });
        let queue_breaker = Arc::new(CircuitBreaker::new(QUEUE_BREAKER, breaker_config));

        let cache = config
            .cache
            .enabled
            .then(|| TranslationCache::from_config(&config.cache));
        let tracker = Arc::new(LifecycleTracker::new());
        let bus = Arc::new(MessageBus::new(config.pubsub.capacity));
        let subject = Arc::new(TranslationSubject::new(config.feedback.buffer_capacity));
        let shutdown = Shutdown::new();

        let mut processor = RequestProcessor::new(
            tracker.clone(),
            bus.clone(),
            store.clone(),
            primary.clone(),
        );
        if let Some(cache) = &cache {
            processor = processor.with_cache(cache.clone());
        }
        if let Some(fallback) = &fallback {
            processor = processor.with_fallback(fallback.clone());
        }

        let mut tasks = WorkerPool::new(Arc::new(processor), config.workers.count)
            .spawn(bus.subscribe(Channel::Requests)?, &shutdown);

        let listener = ResultListener::new(
            subject.clone(),
            tracker.clone(),
            bus.subscribe(Channel::Results)?,
        );
        tasks.push(tokio::spawn(listener.run(shutdown.subscribe())));

        tasks.push(tokio::spawn(run_janitor(
            tracker.clone(),
            subject.clone(),
            cache.clone(),
            Duration::from_secs(config.tracker.retention_secs),
            Duration::from_secs(config.tracker.sweep_interval_secs),
            shutdown.subscribe(),
        )));

        tracing::info!(
            workers = config.workers.count,
            primary = primary.provider(),
            fallback = fallback.as_ref().map(|f| f.provider()).unwrap_or("none"),
            cache = cache.is_some(),
            "Coordinator started"
        );

        Ok(Coordinator {
            max_text_length: config.ingestion.max_text_length,
            stream_timeout: Duration::from_secs(config.feedback.stream_timeout_secs),
            tracker,
            bus,
            subject,
            store,
            primary,
            fallback,
            queue_breaker,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }
}

/// The running translation coordination layer.
pub struct Coordinator {
    max_text_length: usize,
    stream_timeout: Duration,
    tracker: Arc<LifecycleTracker>,
    bus: Arc<MessageBus>,
    subject: Arc<TranslationSubject>,
    store: Arc<dyn ResultStore>,
    primary: Arc<Ambassador>,
    fallback: Option<Arc<Ambassador>>,
    queue_breaker: Arc<CircuitBreaker>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// Register, validate and enqueue `request`.
    pub async fn submit(&self, request: TranslationRequest) -> Result<RequestId, SubmitError> {
        let id = request.id.clone();
        if !self.tracker.register(request.clone()) {
            return Err(SubmitError::Duplicate(id));
        }

        if let Err(reason) = self.validate(&request) {
            tracing::info!(request_id = %id, reason = %reason, "Request rejected");
            self.reject(&id, Failure::new(FailureReason::TranslationNotPossible, reason.clone()))
                .await;
            return Err(SubmitError::Invalid { id, reason });
        }

        let published = self
            .queue_breaker
            .execute(|| self.bus.publish(Channel::Requests, &request))
            .await;

        match published {
            Ok(receivers) => {
                tracing::debug!(request_id = %id, receivers, "Request enqueued");
                Ok(id)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(request_id = %id, error = %reason, "Failed to enqueue request");
                self.reject(&id, Failure::new(FailureReason::ServiceUnavailable, reason.clone()))
                    .await;
                Err(SubmitError::Enqueue { id, reason })
            }
        }
    }

    fn validate(&self, request: &TranslationRequest) -> Result<(), String> {
        if request.text.trim().is_empty() {
            return Err("text is empty".into());
        }
        let length = request.text.chars().count();
        if length > self.max_text_length {
            return Err(format!(
                "text is {} characters, limit is {}",
                length, self.max_text_length
            ));
        }
        if request.source_lang.trim().is_empty() || request.target_lang.trim().is_empty() {
            return Err("language code is empty".into());
        }
        Ok(())
    }

    async fn reject(&self, id: &RequestId, failure: Failure) {
        match self.tracker.fail(id, failure) {
            Ok(Transition::Applied(result)) => {
                if let Err(e) = self.store.save(&result).await {
                    tracing::warn!(request_id = %id, error = %e, "Failed to persist result");
                }
                if let Err(e) = self.bus.publish(Channel::Results, &result).await {
                    tracing::warn!(request_id = %id, error = %e, "Failed to publish rejection");
                    self.subject.notify(&result);
                }
            }
            Ok(Transition::Duplicate(_)) => {}
            Err(e) => tracing::error!(request_id = %id, error = %e, "Failed to record rejection"),
        }
    }

    pub fn status(&self, id: &RequestId) -> Option<RequestStatus> {
        self.tracker.status(id)
    }

    /// Wait for the result of `id` up to the configured stream timeout.
    pub async fn await_result(&self, id: &RequestId) -> Option<TranslationResult> {
        self.subject.await_result(id, self.stream_timeout).await
    }

    pub fn subject(&self) -> &Arc<TranslationSubject> {
        &self.subject
    }

    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        &self.tracker
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    fn breakers(&self) -> Vec<&Arc<CircuitBreaker>> {
        let mut breakers = vec![self.primary.breaker()];
        if let Some(fallback) = &self.fallback {
            breakers.push(fallback.breaker());
        }
        breakers.push(&self.queue_breaker);
        breakers
    }

    pub fn breaker_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers().into_iter().map(|b| b.snapshot()).collect()
    }

    /// Manually close the named breaker. Returns whether it exists.
    pub fn reset_breaker(&self, dependency: &str) -> bool {
        match self.breakers().into_iter().find(|b| b.name() == dependency) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Apply reloadable settings: retry policy and breaker thresholds.
    pub fn apply_config(&self, config: &CoordinatorConfig) {
        let policy = RetryPolicy::from(&config.retries);
        self.primary.update_policy(policy);
        if let Some(fallback) = &self.fallback {
            fallback.update_policy(policy);
        }

        let breaker_config = CircuitBreakerConfig::from(&config.breaker);
        for breaker in self.breakers() {
            breaker.reconfigure(breaker_config);
        }
        tracing::info!("Configuration reloaded");
    }

    /// Stop the background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        self.bus.close();

        let tasks = std::mem::take(&mut *self.tasks.lock().expect("task list mutex poisoned"));
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task panicked");
            }
        }
        tracing::info!("Coordinator stopped");
    }
}

async fn run_janitor(
    tracker: Arc<LifecycleTracker>,
    subject: Arc<TranslationSubject>,
    cache: Option<TranslationCache>,
    retention: Duration,
    every: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let requests = tracker.evict_terminal(retention);
                let notified = subject.evict_notified(retention);
                let cached = cache.as_ref().map(|c| c.purge_expired()).unwrap_or(0);
                if requests + notified + cached > 0 {
                    tracing::debug!(requests, notified, cached, "Janitor sweep");
                }
            }
        }
    }
}
