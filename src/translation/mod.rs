//! Translation capability and shared data types.
//!
//! # Data Flow
//! ```text
//! Worker
//!     → cache.rs (hit: done, no external call)
//!     → Ambassador (resilience) → Translator::translate
//!         - glossary.rs (local phrase tables from config)
//!         - http.rs (external translation API)
//!     → cache.rs (store successful translation)
//! ```
//!
//! # Design Decisions
//! - The translation computation is a black box behind the `Translator` trait
//! - Capabilities never retry or time out on their own; the Ambassador does
//! - Unsupported language pairs are a distinct, non-retryable error

pub mod cache;
pub mod glossary;
pub mod http;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::TranslationCache;
pub use glossary::GlossaryTranslator;
pub use http::HttpTranslator;
pub use types::{
    now_millis, Failure, FailureReason, Outcome, RequestId, Translation, TranslationRequest,
    TranslationResult, TranslationState,
};

/// Errors produced by a translation capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslateError {
    /// The capability cannot translate between these languages.
    #[error("unsupported language pair {source_lang} -> {target_lang}")]
    UnsupportedLanguagePair {
        source_lang: String,
        target_lang: String,
    },

    /// The capability was reachable but could not produce a translation.
    #[error("translation failed: {0}")]
    Failure(String),

    /// A single attempt exceeded its deadline.
    #[error("translation timed out after {0:?}")]
    Timeout(Duration),
}

impl TranslateError {
    /// Client-input errors are neither retried nor counted against the breaker.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TranslateError::UnsupportedLanguagePair { .. })
    }

    pub fn unsupported(source_lang: &str, target_lang: &str) -> Self {
        TranslateError::UnsupportedLanguagePair {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        }
    }
}

/// A pluggable translation capability.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Provider name recorded on results.
    fn name(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError>;
}
