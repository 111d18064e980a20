//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Worker calls a translation capability:
//!     → ambassador.rs (per-attempt timeout, retry loop)
//!     → circuit_breaker.rs (gate each attempt, track consecutive failures)
//!     → On failure: backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Breakers are shared per dependency and injected into Ambassadors
//! - Retry policy and breaker thresholds are hot-reloadable

pub mod ambassador;
pub mod backoff;
pub mod circuit_breaker;

pub use ambassador::{Ambassador, AmbassadorError, AmbassadorResponse, RetryPolicy};
pub use backoff::BackoffPolicy;
pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitOpenError,
    CircuitState,
};
