//! Pool of workers consuming the requests channel.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::pubsub::Subscription;
use crate::translation::TranslationRequest;
use crate::worker::RequestProcessor;

type SharedRequests = Arc<Mutex<Subscription<TranslationRequest>>>;

/// N workers sharing one subscription as competing consumers.
pub struct WorkerPool {
    processor: Arc<RequestProcessor>,
    size: usize,
}

impl WorkerPool {
    pub fn new(processor: Arc<RequestProcessor>, size: usize) -> Self {
        Self {
            processor,
            size: size.max(1),
        }
    }

    /// Start the workers. Each exits on shutdown or when the bus closes.
    pub fn spawn(
        self,
        requests: Subscription<TranslationRequest>,
        shutdown: &Shutdown,
    ) -> Vec<JoinHandle<()>> {
        let requests: SharedRequests = Arc::new(Mutex::new(requests));
        tracing::info!(workers = self.size, "Starting worker pool");

        (0..self.size)
            .map(|worker| {
                let processor = self.processor.clone();
                let requests = requests.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(run_worker(worker, processor, requests, shutdown))
            })
            .collect()
    }
}

async fn run_worker(
    worker: usize,
    processor: Arc<RequestProcessor>,
    requests: SharedRequests,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::debug!(worker, "Worker started");
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            next = async { requests.lock().await.next().await } => match next {
                Some(request) => request,
                None => break,
            },
        };

        let request_id = request.id.clone();
        match processor.process(request).await {
            Ok(Some(result)) => {
                tracing::debug!(worker, request_id = %request_id, state = %result.state, "Request processed");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(worker, request_id = %request_id, error = %e, "Worker iteration aborted");
            }
        }
    }
    tracing::debug!(worker, "Worker stopped");
}
