//! Per-request state machine.

use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::tracking::state::{
    LifecycleError, RequestStatus, Result, StateChange, StateCounts, Transition,
};
use crate::translation::{
    now_millis, Failure, RequestId, Translation, TranslationRequest, TranslationResult,
    TranslationState,
};

#[derive(Debug)]
struct Entry {
    request: TranslationRequest,
    state: TranslationState,
    history: Vec<StateChange>,
    result: Option<TranslationResult>,
    updated: Instant,
}

impl Entry {
    fn advance(&mut self, state: TranslationState) {
        self.state = state;
        self.history.push(StateChange {
            state,
            at_ms: now_millis(),
        });
        self.updated = Instant::now();
        metrics::record_request_state(state.as_str());
        if state.is_terminal() {
            let elapsed = now_millis().saturating_sub(self.request.created_at_ms);
            metrics::record_request_duration(state.as_str(), elapsed);
        }
    }
}

/// Single writer of every request's lifecycle state.
///
/// Evicted terminal requests leave a tombstone with their final state, so a
/// redelivered id is never registered or processed again. Lock order is
/// entries, then retired.
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    entries: DashMap<RequestId, Entry>,
    retired: DashMap<RequestId, TranslationState>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request as `pending`.
    ///
    /// Returns `false` if the id is already known, including ids that
    /// finished and were evicted; redelivered requests keep their state.
    pub fn register(&self, request: TranslationRequest) -> bool {
        match self.entries.entry(request.id.clone()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(_) if self.retired.contains_key(&request.id) => {
                tracing::debug!(request_id = %request.id, "Retired request not registered again");
                false
            }
            MapEntry::Vacant(slot) => {
                let id = request.id.clone();
                let mut entry = Entry {
                    request,
                    state: TranslationState::Pending,
                    history: Vec::with_capacity(3),
                    result: None,
                    updated: Instant::now(),
                };
                entry.advance(TranslationState::Pending);
                slot.insert(entry);
                tracing::debug!(request_id = %id, "Request registered");
                true
            }
        }
    }

    /// Move `pending → processing`. Exactly one caller wins per id.
    pub fn claim(&self, id: &RequestId) -> Result<TranslationRequest> {
        let mut entry = self.entries.get_mut(id).ok_or_else(|| self.missing(id))?;

        if entry.state != TranslationState::Pending {
            return Err(LifecycleError::AlreadyClaimed {
                id: id.clone(),
                state: entry.state,
            });
        }

        entry.advance(TranslationState::Processing);
        tracing::debug!(request_id = %id, "Request claimed");
        Ok(entry.request.clone())
    }

    /// Move `processing → completed`.
    pub fn complete(&self, id: &RequestId, translation: Translation) -> Result<Transition> {
        self.finish(id, TranslationState::Completed, |request| {
            TranslationResult::completed(request, translation)
        })
    }

    /// Move `processing → failed` or `pending → failed`.
    pub fn fail(&self, id: &RequestId, failure: Failure) -> Result<Transition> {
        self.finish(id, TranslationState::Failed, |request| {
            TranslationResult::failed(request, failure)
        })
    }

    fn finish<F>(&self, id: &RequestId, to: TranslationState, build: F) -> Result<Transition>
    where
        F: FnOnce(&TranslationRequest) -> TranslationResult,
    {
        let mut entry = self.entries.get_mut(id).ok_or_else(|| self.missing(id))?;

        let from = entry.state;
        let allowed = match to {
            TranslationState::Completed => from == TranslationState::Processing,
            TranslationState::Failed => !from.is_terminal(),
            _ => false,
        };

        if !allowed {
            if from == to {
                if let Some(existing) = &entry.result {
                    tracing::debug!(request_id = %id, state = %to, "Duplicate terminal transition ignored");
                    return Ok(Transition::Duplicate(existing.clone()));
                }
            }
            return Err(LifecycleError::InvalidTransition {
                id: id.clone(),
                from,
                to,
            });
        }

        let result = build(&entry.request);
        entry.result = Some(result.clone());
        entry.advance(to);
        tracing::info!(
            request_id = %id,
            from = %from,
            to = %to,
            attempts = result.attempts,
            "Request finished"
        );
        Ok(Transition::Applied(result))
    }

    fn missing(&self, id: &RequestId) -> LifecycleError {
        match self.retired.get(id) {
            Some(state) => LifecycleError::Retired {
                id: id.clone(),
                state: *state,
            },
            None => LifecycleError::UnknownRequest(id.clone()),
        }
    }

    /// Current state; evicted requests report their final state.
    pub fn state(&self, id: &RequestId) -> Option<TranslationState> {
        self.entries
            .get(id)
            .map(|entry| entry.state)
            .or_else(|| self.retired.get(id).map(|state| *state))
    }

    /// Results of every finished request still held in full.
    pub fn finished_results(&self) -> Vec<TranslationResult> {
        self.entries
            .iter()
            .filter_map(|entry| entry.result.clone())
            .collect()
    }

    /// Status with history; `None` once the request has been evicted.
    pub fn status(&self, id: &RequestId) -> Option<RequestStatus> {
        self.entries.get(id).map(|entry| RequestStatus {
            request: entry.request.clone(),
            state: entry.state,
            history: entry.history.clone(),
            result: entry.result.clone(),
        })
    }

    /// Replace terminal entries not updated within `older_than` with tombstones.
    pub fn evict_terminal(&self, older_than: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, entry| {
            if entry.state.is_terminal() && entry.updated.elapsed() >= older_than {
                self.retired.insert(id.clone(), entry.state);
                false
            } else {
                true
            }
        });
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted terminal requests");
        }
        evicted
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for entry in self.entries.iter() {
            match entry.state {
                TranslationState::Pending => counts.pending += 1,
                TranslationState::Processing => counts.processing += 1,
                TranslationState::Completed => counts.completed += 1,
                TranslationState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Number of tombstones left by eviction.
    pub fn retired(&self) -> usize {
        self.retired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
