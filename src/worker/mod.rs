//! Request workers.
//!
//! # Data Flow
//! ```text
//! requests channel
//!     → pool.rs (competing consumers)
//!     → processor.rs:
//!         register (idempotent, never for retired ids) → claim
//!         → cache → primary Ambassador → fallback Ambassador
//!         → complete / fail → save → publish to results channel
//! ```
//!
//! # Design Decisions
//! - Breaker and Ambassador errors become a `failed` request, never a worker error
//! - Lifecycle protocol errors abort only the current iteration
//! - Shutdown interrupts waiting for work, not work in progress

pub mod pool;
pub mod processor;

pub use pool::WorkerPool;
pub use processor::{failure_from, ProcessError, RequestProcessor, CACHE_PROVIDER};
