//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the coordinator.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the translation coordinator.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Worker pool sizing.
    pub workers: WorkerConfig,

    /// In-process pub/sub transport settings.
    pub pubsub: PubSubConfig,

    /// Circuit breaker settings, shared by every protected dependency.
    pub breaker: BreakerConfig,

    /// Ambassador retry policy.
    pub retries: RetryConfig,

    /// Translation capabilities (local glossary, external API).
    pub translator: TranslatorConfig,

    /// Translation result cache.
    pub cache: CacheConfig,

    /// Feedback delivery (poll buffer, live streams).
    pub feedback: FeedbackConfig,

    /// Request lifecycle retention.
    pub tracker: TrackerConfig,

    /// Result persistence backend.
    pub persistence: PersistenceConfig,

    /// Ingestion validation.
    pub ingestion: IngestionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers consuming the request channel.
    pub count: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { count: 4 }
    }
}

/// Pub/sub transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PubSubConfig {
    /// Messages buffered per channel before slow subscribers start lagging.
    pub capacity: usize,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub fail_max: u32,

    /// Seconds the circuit stays open before admitting a trial call.
    pub timeout_secs: u64,
}

impl BreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: 5,
            timeout_secs: 60,
        }
    }
}

/// Retry configuration for Ambassador calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor applied to the delay after each failed attempt.
    pub multiplier: f64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Deadline for a single attempt in milliseconds.
    pub attempt_timeout_ms: u64,

    /// Add a small random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            attempt_timeout_ms: 30_000,
            jitter: true,
        }
    }
}

/// Translation capability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Name reported as the provider of local translations.
    pub name: String,

    /// Language pairs served by the local glossary translator.
    pub glossary: Vec<GlossaryPairConfig>,

    /// External translation API used as fallback.
    pub external: ExternalApiConfig,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        let entries = [
            ("hello", "Hallo"),
            ("good morning", "Guten Morgen"),
            ("thank you", "Danke"),
            ("world", "Welt"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            name: "local_glossary".to_string(),
            glossary: vec![GlossaryPairConfig {
                source: "en".to_string(),
                target: "de".to_string(),
                entries,
            }],
            external: ExternalApiConfig::default(),
        }
    }
}

/// Phrase table for a single language pair.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GlossaryPairConfig {
    /// Source language code (e.g., "en").
    pub source: String,

    /// Target language code (e.g., "de").
    pub target: String,

    /// Source phrase -> translated phrase.
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

/// External translation API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExternalApiConfig {
    /// Enable the external API as a fallback capability.
    pub enabled: bool,

    /// Name reported as the provider of external translations.
    pub name: String,

    /// Endpoint URL receiving translation POSTs.
    pub url: String,

    /// Bearer token sent with every call.
    pub api_key: Option<String>,
}

impl Default for ExternalApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "external_api".to_string(),
            url: "http://localhost:5005/translate".to_string(),
            api_key: None,
        }
    }
}

/// Translation cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache.
    pub enabled: bool,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Maximum cached translations.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 10_000,
        }
    }
}

/// Feedback delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Results kept for later polling before the oldest is evicted.
    pub buffer_capacity: usize,

    /// How long a live stream waits for its result, in seconds.
    pub stream_timeout_secs: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
            stream_timeout_secs: 60,
        }
    }
}

/// Lifecycle retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds a terminal request stays queryable.
    pub retention_secs: u64,

    /// Seconds between retention sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

/// Storage backend for translation results.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Keep results in process memory.
    #[default]
    Memory,
    /// Append results as JSON lines to `path`.
    Jsonl,
}

/// Result persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: StoreBackend,

    /// File used by the `jsonl` backend.
    pub path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: "translations.jsonl".to_string(),
        }
    }
}

/// Ingestion validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    /// Maximum accepted text length in characters.
    pub max_text_length: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_text_length: 512,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
            [breaker]
            fail_max = 3

            [retries]
            max_attempts = 5
            jitter = false
            "#,
        )
        .unwrap();

        assert_eq!(config.breaker.fail_max, 3);
        assert_eq!(config.breaker.timeout_secs, 60);
        assert_eq!(config.retries.max_attempts, 5);
        assert!(!config.retries.jitter);
        assert_eq!(config.workers.count, 4);
        assert_eq!(config.ingestion.max_text_length, 512);
    }

    #[test]
    fn test_glossary_and_backend_parse() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
            [persistence]
            backend = "jsonl"
            path = "/tmp/results.jsonl"

            [[translator.glossary]]
            source = "en"
            target = "fr"
            entries = { hello = "Bonjour" }
            "#,
        )
        .unwrap();

        assert_eq!(config.persistence.backend, StoreBackend::Jsonl);
        assert_eq!(config.translator.glossary.len(), 1);
        assert_eq!(config.translator.glossary[0].entries["hello"], "Bonjour");
    }
}
