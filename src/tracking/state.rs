//! Lifecycle errors, transition outcomes and status views.

use serde::Serialize;
use thiserror::Error;

use crate::translation::{RequestId, TranslationRequest, TranslationResult, TranslationState};

/// Protocol violations detected by the tracker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("request {0} is not registered")]
    UnknownRequest(RequestId),

    #[error("request {id} already claimed (state: {state})")]
    AlreadyClaimed {
        id: RequestId,
        state: TranslationState,
    },

    /// The request finished and its details were evicted.
    #[error("request {id} already finished ({state}) and was evicted")]
    Retired {
        id: RequestId,
        state: TranslationState,
    },

    #[error("request {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RequestId,
        from: TranslationState,
        to: TranslationState,
    },
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Outcome of a terminal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the request into its terminal state.
    Applied(TranslationResult),
    /// The request was already in the same terminal state.
    Duplicate(TranslationResult),
}

impl Transition {
    pub fn result(&self) -> &TranslationResult {
        match self {
            Transition::Applied(result) | Transition::Duplicate(result) => result,
        }
    }

    pub fn into_result(self) -> TranslationResult {
        match self {
            Transition::Applied(result) | Transition::Duplicate(result) => result,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// One entry of a request's transition history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub state: TranslationState,
    pub at_ms: u64,
}

/// Read-only view returned by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestStatus {
    pub request: TranslationRequest,
    pub state: TranslationState,
    pub history: Vec<StateChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranslationResult>,
}

impl RequestStatus {
    pub fn states(&self) -> Vec<TranslationState> {
        self.history.iter().map(|change| change.state).collect()
    }
}

/// Number of tracked requests per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}
