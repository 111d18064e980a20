//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, request_id on every line)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Logs go to stderr; stdout is reserved for CLI result output
//! - Every breaker transition and Ambassador attempt is both logged and counted

pub mod logging;
pub mod metrics;
