//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0, addresses parse)
//! - Check the external API endpoint is a usable URL when enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CoordinatorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::CoordinatorConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn non_zero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &CoordinatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    non_zero(&mut errors, "workers.count", config.workers.count as u64);
    non_zero(&mut errors, "pubsub.capacity", config.pubsub.capacity as u64);
    non_zero(&mut errors, "breaker.fail_max", config.breaker.fail_max as u64);
    non_zero(&mut errors, "breaker.timeout_secs", config.breaker.timeout_secs);
    non_zero(&mut errors, "retries.max_attempts", config.retries.max_attempts as u64);
    non_zero(&mut errors, "retries.attempt_timeout_ms", config.retries.attempt_timeout_ms);
    non_zero(&mut errors, "retries.base_delay_ms", config.retries.base_delay_ms);
    non_zero(&mut errors, "feedback.buffer_capacity", config.feedback.buffer_capacity as u64);
    non_zero(&mut errors, "tracker.sweep_interval_secs", config.tracker.sweep_interval_secs);
    non_zero(&mut errors, "ingestion.max_text_length", config.ingestion.max_text_length as u64);

    // Retry delays must grow strictly between attempts.
    if config.retries.multiplier <= 1.0 || !config.retries.multiplier.is_finite() {
        errors.push(ValidationError::Invalid {
            field: "retries.multiplier",
            reason: format!("{} must be greater than 1.0", config.retries.multiplier),
        });
    }

    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::Invalid {
            field: "retries.max_delay_ms",
            reason: "must not be smaller than retries.base_delay_ms".to_string(),
        });
    }

    if config.cache.enabled {
        non_zero(&mut errors, "cache.max_entries", config.cache.max_entries as u64);
        non_zero(&mut errors, "cache.ttl_secs", config.cache.ttl_secs);
    }

    for (i, pair) in config.translator.glossary.iter().enumerate() {
        if pair.source.trim().is_empty() || pair.target.trim().is_empty() {
            errors.push(ValidationError::Invalid {
                field: "translator.glossary",
                reason: format!("entry {} has an empty language code", i),
            });
        }
    }

    let external = &config.translator.external;
    if external.enabled {
        if let Err(e) = url::Url::parse(&external.url) {
            errors.push(ValidationError::Invalid {
                field: "translator.external.url",
                reason: e.to_string(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Invalid {
            field: "observability.metrics_address",
            reason: format!("'{}' is not a socket address", config.observability.metrics_address),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CoordinatorConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = CoordinatorConfig::default();
        config.breaker.fail_max = 0;
        config.retries.max_attempts = 0;
        config.retries.multiplier = 0.5;
        config.translator.external.enabled = true;
        config.translator.external.url = "not a url".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero { field: "breaker.fail_max" }));
        assert!(errors
            .iter()
            .any(|e| e.to_string().starts_with("translator.external.url")));

        let mut config = CoordinatorConfig::default();
        config.retries.multiplier = 1.0;
        config.retries.base_delay_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::Zero {
            field: "retries.base_delay_ms"
        }));
        assert!(errors
            .iter()
            .any(|e| e.to_string().starts_with("retries.multiplier")));
    }

    #[test]
    fn test_disabled_cache_skips_cache_checks() {
        let mut config = CoordinatorConfig::default();
        config.cache.enabled = false;
        config.cache.max_entries = 0;
        assert!(validate_config(&config).is_ok());
    }
}
