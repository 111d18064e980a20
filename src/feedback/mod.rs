//! Result feedback to waiting clients.
//!
//! # Data Flow
//! ```text
//! results channel
//!     → listener.rs (ResultListener)
//!     → subject.rs (TranslationSubject::notify, dedup by request id)
//!     → observers.rs (live stream or poll buffer per registration)
//!         - on delivery failure → buffer.rs (ResultBuffer)
//! ```
//!
//! # Design Decisions
//! - Observers are trait objects; the hub does not know delivery mechanics
//! - Registrations are one-shot: cleared once the result is dispatched
//! - A subscribe after notify is served immediately from the notified set
//! - No result is lost to a failed delivery; it lands in the poll buffer

pub mod buffer;
pub mod listener;
pub mod observers;
pub mod subject;

use std::fmt;

use thiserror::Error;

use crate::translation::TranslationResult;

pub use buffer::ResultBuffer;
pub use listener::ResultListener;
pub use observers::{LiveStreamObserver, PollBufferObserver};
pub use subject::{ObserverId, SubjectStats, SubscribeOutcome, TranslationSubject};

/// Delivery mechanism of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    PollBuffer,
    LiveStream,
}

impl ObserverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObserverKind::PollBuffer => "poll_buffer",
            ObserverKind::LiveStream => "live_stream",
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("client disconnected")]
    Disconnected,

    #[error("client is not keeping up")]
    Backpressure,
}

/// Something that wants to hear about a finished request.
pub trait FeedbackObserver: Send + Sync + fmt::Debug {
    fn kind(&self) -> ObserverKind;

    fn deliver(&self, result: &TranslationResult) -> Result<(), DeliveryError>;
}
