//! Message bus: a bounded work queue for requests, broadcast topics for results.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, Mutex, Notify};

use crate::observability::metrics;
use crate::pubsub::{Channel, Delivery, PubSubError, Result};

type Payload = Arc<str>;

/// Both ends of a work queue. The bus owns the only long-lived sender.
#[derive(Debug, Clone)]
struct Queue {
    tx: mpsc::Sender<Payload>,
    rx: Arc<Mutex<mpsc::Receiver<Payload>>>,
}

/// Named channels carrying JSON-encoded messages.
#[derive(Debug)]
pub struct MessageBus {
    capacity: usize,
    topics: RwLock<HashMap<Channel, broadcast::Sender<Payload>>>,
    queues: RwLock<HashMap<Channel, Queue>>,
    closed: AtomicBool,
    closing: Notify,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            closing: Notify::new(),
        }
    }

    fn topic(&self, channel: Channel) -> Result<broadcast::Sender<Payload>> {
        if self.is_closed() {
            return Err(PubSubError::Closed);
        }
        if let Some(sender) = self
            .topics
            .read()
            .expect("message bus lock poisoned")
            .get(&channel)
        {
            return Ok(sender.clone());
        }

        let mut topics = self.topics.write().expect("message bus lock poisoned");
        let sender = topics
            .entry(channel)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.clone())
    }

    fn queue(&self, channel: Channel) -> Result<Queue> {
        if self.is_closed() {
            return Err(PubSubError::Closed);
        }
        if let Some(queue) = self
            .queues
            .read()
            .expect("message bus lock poisoned")
            .get(&channel)
        {
            return Ok(queue.clone());
        }

        let mut queues = self.queues.write().expect("message bus lock poisoned");
        let queue = queues.entry(channel).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.capacity);
            Queue {
                tx,
                rx: Arc::new(Mutex::new(rx)),
            }
        });
        Ok(queue.clone())
    }

    /// Encode and publish `message`.
    ///
    /// On a work queue this waits for a free slot and returns 1; the message
    /// is kept until a consumer takes it. On a topic it returns the number of
    /// subscribers that will see it, and zero subscribers is not an error.
    pub async fn publish<T: Serialize>(&self, channel: Channel, message: &T) -> Result<usize> {
        let encoded = serde_json::to_string(message)
            .map_err(|source| PubSubError::Encode { channel, source })?;
        let payload = Payload::from(encoded);

        let receivers = match channel.delivery() {
            Delivery::Broadcast => self.topic(channel)?.send(payload).unwrap_or(0),
            Delivery::Queue => {
                let tx = self.queue(channel)?.tx;
                if tx.capacity() == 0 {
                    metrics::record_pubsub_backpressure(channel.name());
                    tracing::debug!(channel = %channel, "Queue full, waiting for a consumer");
                }

                let closing = self.closing.notified();
                tokio::pin!(closing);
                closing.as_mut().enable();
                if self.is_closed() {
                    return Err(PubSubError::Closed);
                }

                tokio::select! {
                    sent = tx.send(payload) => sent.map_err(|_| PubSubError::Closed)?,
                    _ = closing => return Err(PubSubError::Closed),
                }
                1
            }
        };
        tracing::trace!(channel = %channel, receivers, "Message published");
        Ok(receivers)
    }

    /// Subscribe to `channel`.
    ///
    /// Work-queue subscriptions compete: each message goes to exactly one of
    /// them, including messages published before they subscribed. Topic
    /// subscriptions see every message published from now on.
    pub fn subscribe<T: DeserializeOwned>(&self, channel: Channel) -> Result<Subscription<T>> {
        let source = match channel.delivery() {
            Delivery::Broadcast => Source::Topic(self.topic(channel)?.subscribe()),
            Delivery::Queue => Source::Queue(self.queue(channel)?.rx),
        };
        tracing::debug!(channel = %channel, "Subscribed");
        Ok(Subscription {
            channel,
            source,
            _message: PhantomData,
        })
    }

    /// Close every channel. Blocked publishers fail with [`PubSubError::Closed`];
    /// subscribers drain what is buffered and then end.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.closing.notify_waiters();
        self.topics
            .write()
            .expect("message bus lock poisoned")
            .clear();
        self.queues
            .write()
            .expect("message bus lock poisoned")
            .clear();
        tracing::info!("Message bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// One delivery from a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    Message(T),
    /// A topic subscriber fell behind and this many messages were lost.
    Lagged(u64),
}

#[derive(Debug)]
enum Source {
    Topic(broadcast::Receiver<Payload>),
    Queue(Arc<Mutex<mpsc::Receiver<Payload>>>),
}

/// A typed view of one channel.
#[derive(Debug)]
pub struct Subscription<T> {
    channel: Channel,
    source: Source,
    _message: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Wait for the next decodable message or a lag report. `None` once the
    /// bus is closed and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Received<T>> {
        loop {
            let payload = match &mut self.source {
                Source::Topic(receiver) => match receiver.recv().await {
                    Ok(payload) => payload,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %self.channel, skipped, "Subscriber lagged, messages dropped");
                        metrics::record_pubsub_lagged(self.channel.name(), skipped);
                        return Some(Received::Lagged(skipped));
                    }
                    Err(RecvError::Closed) => return None,
                },
                Source::Queue(receiver) => receiver.lock().await.recv().await?,
            };

            match serde_json::from_str::<T>(&payload) {
                Ok(message) => return Some(Received::Message(message)),
                Err(e) => {
                    tracing::warn!(channel = %self.channel, error = %e, "Skipping undecodable message");
                }
            }
        }
    }

    /// Wait for the next decodable message, passing over lag reports.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.recv().await? {
                Received::Message(message) => return Some(message),
                Received::Lagged(_) => {}
            }
        }
    }

    /// Another subscription to the same channel. On a topic it starts at the
    /// newest message; on a work queue it competes with this one.
    pub fn resubscribe(&self) -> Self {
        let source = match &self.source {
            Source::Topic(receiver) => Source::Topic(receiver.resubscribe()),
            Source::Queue(receiver) => Source::Queue(receiver.clone()),
        };
        Self {
            channel: self.channel,
            source,
            _message: PhantomData,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|message| (message, subscription))
        })
    }
}
