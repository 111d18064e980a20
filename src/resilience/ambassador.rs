//! Ambassador for calls to a translation capability.
//!
//! # Responsibilities
//! - Bound every attempt with a per-attempt timeout
//! - Retry failed attempts with exponential backoff
//! - Route every attempt through the dependency's circuit breaker
//! - Log and count each attempt and its outcome
//!
//! # Design Decisions
//! - An open circuit ends the call immediately, whether it was open before
//!   the attempt or the attempt itself tripped it
//! - Unsupported language pairs are client errors: no retry, no breaker failure
//! - The retry policy sits behind `ArcSwap` so config reloads apply to the next call

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::circuit_breaker::{BreakerError, CircuitBreaker, CircuitState};
use crate::translation::{TranslateError, TranslationRequest, Translator};

/// How an Ambassador retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            backoff: BackoffPolicy::from(config),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Errors surfaced by [`Ambassador::call`].
#[derive(Debug, Clone, Error)]
pub enum AmbassadorError {
    /// The dependency's circuit is open; no further attempts were made.
    #[error("circuit for {dependency} is open after {attempts} attempt(s), retry in {retry_after:?}")]
    CircuitOpen {
        dependency: String,
        attempts: u32,
        retry_after: Duration,
    },

    /// Every attempt failed.
    #[error("{dependency} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        dependency: String,
        attempts: u32,
        last_error: TranslateError,
    },

    /// The capability refused the input; retrying cannot help.
    #[error("{dependency} rejected the request: {error}")]
    Rejected {
        dependency: String,
        attempts: u32,
        error: TranslateError,
    },
}

impl AmbassadorError {
    /// Attempts that actually reached the capability.
    pub fn attempts(&self) -> u32 {
        match self {
            AmbassadorError::CircuitOpen { attempts, .. }
            | AmbassadorError::Exhausted { attempts, .. }
            | AmbassadorError::Rejected { attempts, .. } => *attempts,
        }
    }
}

/// A successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbassadorResponse {
    pub text: String,
    pub provider: String,
    pub attempts: u32,
}

/// Resilient proxy in front of one translation capability.
pub struct Ambassador {
    translator: Arc<dyn Translator>,
    breaker: Arc<CircuitBreaker>,
    policy: ArcSwap<RetryPolicy>,
}

impl std::fmt::Debug for Ambassador {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ambassador")
            .field("translator", &self.translator.name())
            .field("breaker", &self.breaker.name())
            .field("policy", &*self.policy.load())
            .finish()
    }
}

impl Ambassador {
    pub fn new(
        translator: Arc<dyn Translator>,
        breaker: Arc<CircuitBreaker>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            translator,
            breaker,
            policy: ArcSwap::from_pointee(policy),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn provider(&self) -> &str {
        self.translator.name()
    }

    pub fn policy(&self) -> RetryPolicy {
        **self.policy.load()
    }

    /// Replace the retry policy for subsequent calls.
    pub fn update_policy(&self, policy: RetryPolicy) {
        self.policy.store(Arc::new(policy));
        tracing::info!(
            provider = self.translator.name(),
            max_attempts = policy.max_attempts,
            "Retry policy updated"
        );
    }

    /// Translate `request` with retries, timeouts and circuit breaking.
    pub async fn call(
        &self,
        request: &TranslationRequest,
    ) -> Result<AmbassadorResponse, AmbassadorError> {
        let policy = self.policy();
        let dependency = self.breaker.name().to_string();
        let provider = self.translator.name();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = Instant::now();

            let translator = &self.translator;
            let deadline = policy.attempt_timeout;
            let result = self
                .breaker
                .execute_classified(
                    || async move {
                        let call = translator.translate(
                            &request.text,
                            &request.source_lang,
                            &request.target_lang,
                        );
                        match tokio::time::timeout(deadline, call).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(TranslateError::Timeout(deadline)),
                        }
                    },
                    TranslateError::is_retryable,
                )
                .await;

            let elapsed = started.elapsed();
            let error = match result {
                Ok(text) => {
                    metrics::record_ambassador_attempt(&dependency, "success", elapsed);
                    tracing::debug!(
                        request_id = %request.id,
                        provider,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Translation attempt succeeded"
                    );
                    return Ok(AmbassadorResponse {
                        text,
                        provider: provider.to_string(),
                        attempts: attempt,
                    });
                }
                Err(BreakerError::Open(open)) => {
                    metrics::record_ambassador_attempt(&dependency, "circuit_open", elapsed);
                    tracing::warn!(
                        request_id = %request.id,
                        dependency = %dependency,
                        "Circuit open, not calling dependency"
                    );
                    return Err(AmbassadorError::CircuitOpen {
                        dependency,
                        attempts: attempt - 1,
                        retry_after: open.retry_after,
                    });
                }
                Err(BreakerError::Inner(error)) => error,
            };

            if !error.is_retryable() {
                metrics::record_ambassador_attempt(&dependency, "rejected", elapsed);
                tracing::info!(request_id = %request.id, provider, error = %error, "Translation rejected");
                return Err(AmbassadorError::Rejected {
                    dependency,
                    attempts: attempt,
                    error,
                });
            }

            let outcome = if matches!(error, TranslateError::Timeout(_)) {
                "timeout"
            } else {
                "failure"
            };
            metrics::record_ambassador_attempt(&dependency, outcome, elapsed);
            tracing::warn!(
                request_id = %request.id,
                provider,
                attempt,
                max_attempts = policy.max_attempts,
                error = %error,
                "Translation attempt failed"
            );

            if self.breaker.state() == CircuitState::Open {
                return Err(AmbassadorError::CircuitOpen {
                    retry_after: self.breaker.open_error().retry_after,
                    dependency,
                    attempts: attempt,
                });
            }

            if attempt >= policy.max_attempts {
                tracing::error!(
                    request_id = %request.id,
                    provider,
                    attempts = attempt,
                    "Retries exhausted"
                );
                return Err(AmbassadorError::Exhausted {
                    dependency,
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = policy.backoff.delay(attempt);
            tracing::debug!(
                request_id = %request.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
