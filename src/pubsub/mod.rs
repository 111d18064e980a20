//! In-process publish/subscribe transport.
//!
//! # Data Flow
//! ```text
//! Coordinator::submit
//!     → publish(Requests, TranslationRequest)   JSON-encoded, waits when full
//!     → worker pool subscription (competing consumers)
//! Worker
//!     → publish(Results, TranslationResult)     after the tracker records it
//!     → result listener subscription → TranslationSubject::notify
//! ```
//!
//! # Design Decisions
//! - Messages cross the bus as JSON text, the same as over a broker
//! - `requests` is a bounded work queue: lossless, one consumer per message,
//!   and a full queue makes `publish` wait (backpressure on ingestion)
//! - `results` is a broadcast topic: publishing with no subscribers is not an
//!   error, and a slow subscriber loses the oldest messages and is told how many

pub mod bus;

use thiserror::Error;

pub use bus::{MessageBus, Received, Subscription};

/// Logical stream on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Requests,
    Results,
}

/// How a channel hands messages to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Each message to exactly one subscriber, never dropped.
    Queue,
    /// Each message to every current subscriber, oldest dropped when lagging.
    Broadcast,
}

impl Channel {
    pub fn delivery(&self) -> Delivery {
        match self {
            Channel::Requests => Delivery::Queue,
            Channel::Results => Delivery::Broadcast,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Requests => "translation_requests",
            Channel::Results => "translation_results",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("failed to encode message for {channel}: {source}")]
    Encode {
        channel: Channel,
        #[source]
        source: serde_json::Error,
    },

    #[error("message bus is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PubSubError>;
