//! Request, state and result types shared by every subsystem.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Unique identifier of a translation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh UUID v4 identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A request to translate `text` from `source_lang` into `target_lang`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub id: RequestId,
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TranslationRequest {
    /// Create a request with a generated id.
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            created_at_ms: now_millis(),
            user_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranslationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationState::Pending => "pending",
            TranslationState::Processing => "processing",
            TranslationState::Completed => "completed",
            TranslationState::Failed => "failed",
        }
    }

    /// `completed` and `failed` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranslationState::Completed | TranslationState::Failed)
    }
}

impl fmt::Display for TranslationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing category of a failed translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The dependency is known-down or kept failing.
    ServiceUnavailable,
    /// The input cannot be translated (unsupported pair, invalid text).
    TranslationNotPossible,
    /// Anything else.
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ServiceUnavailable => "service temporarily unavailable",
            FailureReason::TranslationNotPossible => "translation not possible",
            FailureReason::Internal => "internal error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful translation produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub provider: String,
    pub cached: bool,
    pub attempts: u32,
}

/// Why a request could not be translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: FailureReason,
    pub detail: String,
    pub attempts: u32,
}

impl Failure {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            attempts: 0,
        }
    }
}

/// Payload of a terminal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Translated {
        text: String,
        provider: String,
        cached: bool,
    },
    Failed {
        reason: FailureReason,
        detail: String,
    },
}

/// The single terminal record of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub request_id: RequestId,
    pub state: TranslationState,
    pub outcome: Outcome,
    pub original_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub attempts: u32,
    pub completed_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TranslationResult {
    pub fn completed(request: &TranslationRequest, translation: Translation) -> Self {
        Self::build(
            request,
            TranslationState::Completed,
            Outcome::Translated {
                text: translation.text,
                provider: translation.provider,
                cached: translation.cached,
            },
            translation.attempts,
        )
    }

    pub fn failed(request: &TranslationRequest, failure: Failure) -> Self {
        Self::build(
            request,
            TranslationState::Failed,
            Outcome::Failed {
                reason: failure.reason,
                detail: failure.detail,
            },
            failure.attempts,
        )
    }

    fn build(
        request: &TranslationRequest,
        state: TranslationState,
        outcome: Outcome,
        attempts: u32,
    ) -> Self {
        Self {
            request_id: request.id.clone(),
            state,
            outcome,
            original_text: request.text.clone(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            attempts,
            completed_at_ms: now_millis(),
            user_id: request.user_id.clone(),
            metadata: request.metadata.clone(),
        }
    }

    pub fn translated_text(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Translated { text, .. } => Some(text),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match &self.outcome {
            Outcome::Translated { .. } => None,
            Outcome::Failed { reason, .. } => Some(*reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TranslationState::Completed
    }
}
