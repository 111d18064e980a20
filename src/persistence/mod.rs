//! Durable record of finished translations.
//!
//! # Design Decisions
//! - Workers save a result after the tracker records it and before publishing
//! - A failed save is logged by the worker and never blocks publishing
//! - Stores are selected by `[persistence] backend`

pub mod jsonl;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{PersistenceConfig, StoreBackend};
use crate::translation::TranslationResult;

pub use jsonl::JsonLinesResultStore;
pub use memory::MemoryResultStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Sink for terminal translation results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, result: &TranslationResult) -> Result<()>;
}

/// Build the store named in the configuration.
pub fn store_from_config(config: &PersistenceConfig) -> Arc<dyn ResultStore> {
    match config.backend {
        StoreBackend::Memory => Arc::new(MemoryResultStore::new()),
        StoreBackend::Jsonl => Arc::new(JsonLinesResultStore::new(&config.path)),
    }
}
