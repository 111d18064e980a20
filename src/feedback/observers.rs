//! Poll-buffer and live-stream observers.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::feedback::{DeliveryError, FeedbackObserver, ObserverKind, ResultBuffer};
use crate::translation::TranslationResult;

/// Parks results in the shared buffer for a later `poll`.
#[derive(Debug, Clone)]
pub struct PollBufferObserver {
    buffer: Arc<ResultBuffer>,
}

impl PollBufferObserver {
    pub fn new(buffer: Arc<ResultBuffer>) -> Self {
        Self { buffer }
    }
}

impl FeedbackObserver for PollBufferObserver {
    fn kind(&self) -> ObserverKind {
        ObserverKind::PollBuffer
    }

    fn deliver(&self, result: &TranslationResult) -> Result<(), DeliveryError> {
        self.buffer.push(result.clone());
        Ok(())
    }
}

/// Pushes results to a connected client over a channel.
#[derive(Debug, Clone)]
pub struct LiveStreamObserver {
    tx: mpsc::Sender<TranslationResult>,
}

impl LiveStreamObserver {
    pub fn new(tx: mpsc::Sender<TranslationResult>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end for the client.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TranslationResult>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl FeedbackObserver for LiveStreamObserver {
    fn kind(&self) -> ObserverKind {
        ObserverKind::LiveStream
    }

    fn deliver(&self, result: &TranslationResult) -> Result<(), DeliveryError> {
        self.tx.try_send(result.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backpressure,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{Failure, FailureReason, TranslationRequest};

    fn result() -> TranslationResult {
        let request = TranslationRequest::new("Hello", "en", "de").with_id("r1");
        TranslationResult::failed(&request, Failure::new(FailureReason::Internal, "boom"))
    }

    #[test]
    fn test_live_stream_reports_disconnect_and_backpressure() {
        let (observer, rx) = LiveStreamObserver::channel(1);
        assert!(observer.deliver(&result()).is_ok());
        assert_eq!(observer.deliver(&result()), Err(DeliveryError::Backpressure));
        drop(rx);
        assert_eq!(observer.deliver(&result()), Err(DeliveryError::Disconnected));
    }

    #[test]
    fn test_poll_buffer_observer_parks_result() {
        let buffer = Arc::new(ResultBuffer::new(4));
        let observer = PollBufferObserver::new(buffer.clone());
        observer.deliver(&result()).unwrap();
        assert_eq!(buffer.len(), 1);
    }
}
