//! Bounded store of results waiting to be polled.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::translation::{RequestId, TranslationResult};

#[derive(Debug, Default)]
struct Inner {
    results: HashMap<RequestId, TranslationResult>,
    order: VecDeque<RequestId>,
}

/// Results parked for clients that poll. The oldest entry is evicted when full.
#[derive(Debug)]
pub struct ResultBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ResultBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("result buffer mutex poisoned")
    }

    pub fn push(&self, result: TranslationResult) {
        let mut inner = self.lock();
        let id = result.request_id.clone();
        if inner.results.insert(id.clone(), result).is_some() {
            return;
        }
        inner.order.push_back(id);

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.results.remove(&oldest);
                tracing::debug!(request_id = %oldest, "Poll buffer full, evicted oldest result");
            }
        }
    }

    /// Remove and return the result for `id`.
    pub fn take(&self, id: &RequestId) -> Option<TranslationResult> {
        let mut inner = self.lock();
        let result = inner.results.remove(id)?;
        inner.order.retain(|queued| queued != id);
        Some(result)
    }

    /// Remove and return every result belonging to `user_id`, oldest first.
    pub fn take_for_user(&self, user_id: &str) -> Vec<TranslationResult> {
        let mut inner = self.lock();
        let Inner { results, order } = &mut *inner;

        let mut taken = Vec::new();
        order.retain(|id| {
            let owned = results
                .get(id)
                .is_some_and(|r| r.user_id.as_deref() == Some(user_id));
            if owned {
                if let Some(result) = results.remove(id) {
                    taken.push(result);
                }
            }
            !owned
        });
        taken
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.lock().results.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
