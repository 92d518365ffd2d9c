//! Outbound publish queue.
//!
//! Publishes attempted while the broker session is down are parked here
//! and drained strictly in arrival order once the session is connected
//! again. The queue is mutated by the publish call path and drained by
//! the reconnect handler; the mutex keeps FIFO order intact when an
//! enqueue races a drain.

use crate::error::BridgeResult;
use std::collections::VecDeque;
use tokio::sync::{oneshot, Mutex};

/// One pending outbound message.
pub struct PendingPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Fired with the publish outcome when the item is drained (or when
    /// its failure is propagated). Dropped senders are fine, completion
    /// is optional.
    pub completion: Option<oneshot::Sender<BridgeResult<()>>>,
}

impl PendingPublish {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            completion: None,
        }
    }

    pub fn with_completion(mut self, completion: oneshot::Sender<BridgeResult<()>>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Fire the completion callback, if any, with the publish outcome.
    pub fn complete(self, outcome: BridgeResult<()>) {
        if let Some(tx) = self.completion {
            let _ = tx.send(outcome);
        }
    }
}

impl std::fmt::Debug for PendingPublish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPublish")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

/// FIFO buffer of pending outbound messages.
#[derive(Default)]
pub struct PublishQueue {
    inner: Mutex<VecDeque<PendingPublish>>,
}

impl PublishQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a message at the back of the queue.
    pub async fn push(&self, item: PendingPublish) {
        self.inner.lock().await.push_back(item);
    }

    /// Take the oldest pending message, if any.
    pub async fn pop(&self) -> Option<PendingPublish> {
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
