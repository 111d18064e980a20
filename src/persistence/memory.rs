//! In-memory result store.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::persistence::{Result, ResultStore};
use crate::translation::{RequestId, TranslationResult};

/// Keeps every saved result in a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: DashMap<RequestId, TranslationResult>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RequestId) -> Option<TranslationResult> {
        self.results.get(id).map(|r| r.value().clone())
    }

    /// Results saved for `user_id`, newest first.
    pub fn history_for_user(&self, user_id: &str) -> Vec<TranslationResult> {
        let mut history: Vec<_> = self
            .results
            .iter()
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .map(|r| r.value().clone())
            .collect();
        history.sort_by(|a, b| b.completed_at_ms.cmp(&a.completed_at_ms));
        history
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(&self, result: &TranslationResult) -> Result<()> {
        self.results.insert(result.request_id.clone(), result.clone());
        Ok(())
    }
}
