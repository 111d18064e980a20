//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CoordinatorConfig (validated, immutable)
//!     → handed to Coordinator at startup
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Coordinator::apply_config swaps retry policy and breaker thresholds
//! ```
//!
//! # Design Decisions
//! - Only resilience settings are hot-reloadable; pool size and channels need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, CacheConfig, CoordinatorConfig, ExternalApiConfig, FeedbackConfig,
    GlossaryPairConfig, IngestionConfig, LogFormat, ObservabilityConfig, PersistenceConfig,
    PubSubConfig, RetryConfig, StoreBackend, TrackerConfig, TranslatorConfig, WorkerConfig,
};
