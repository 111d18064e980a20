//! Resilient translation coordination layer.
//!
//! # Architecture Overview
//!
//! ```text
//!   submit ──▶ tracker (pending) ──▶ [message_queue breaker] ──▶ requests channel
//!                                                                     │
//!                                                                     ▼
//!                                                               worker pool
//!                                          claim (processing) ◀──────┘
//!                                                │
//!                           cache ─▶ Ambassador ─▶ [translation breaker] ─▶ Translator
//!                                        │ fallback
//!                                        └──▶ Ambassador ─▶ [external_api breaker] ─▶ HTTP API
//!                                                │
//!                         complete / fail ◀──────┘
//!                               │
//!                               ├──▶ ResultStore
//!                               ▼
//!                        results channel ──▶ ResultListener ──▶ TranslationSubject
//!                                                                 │
//!                                                 live stream / poll buffer observers
//! ```

pub mod config;
pub mod coordinator;
pub mod feedback;
pub mod lifecycle;
pub mod observability;
pub mod persistence;
pub mod pubsub;
pub mod resilience;
pub mod tracking;
pub mod translation;
pub mod worker;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, StartError, SubmitError};
pub use lifecycle::Shutdown;
pub use translation::{RequestId, TranslationRequest, TranslationResult, TranslationState};
