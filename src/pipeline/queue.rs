//! Typed FIFO queues between stages.
//!
//! Sends never block; the channels are unbounded, trading memory growth
//! under a stalled consumer for simplicity. Receives always time out, so a
//! worker blocked on an empty queue can periodically observe the stop flag.

use crate::pipeline::messages::StageMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Create a new stage queue.
pub fn queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            tx,
            depth: Arc::clone(&depth),
        },
        QueueReceiver { rx, depth },
    )
}

/// Producer handle. Cloneable; each clone is a distinct producer and owes
/// the queue exactly one final [`StageMessage::Sentinel`].
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<StageMessage<T>>,
    depth: Arc<AtomicUsize>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            depth: Arc::clone(&self.depth),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue a payload. Returns `false` when the consumer is gone.
    pub fn send(&self, value: T) -> bool {
        let sent = self.tx.send(StageMessage::Payload(value)).is_ok();
        if sent {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
        sent
    }

    /// Enqueue the end-of-stream marker. Returns `false` when the consumer
    /// is gone.
    pub fn send_sentinel(&self) -> bool {
        self.tx.send(StageMessage::Sentinel).is_ok()
    }

    /// Payloads enqueued but not yet received. Sentinels are not counted.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Outcome of a timed receive.
#[derive(Debug, PartialEq)]
pub enum Received<T> {
    /// A payload arrived.
    Payload(T),
    /// A producer signalled end-of-stream.
    Sentinel,
    /// Nothing arrived within the timeout.
    Empty,
    /// Every producer dropped without a sentinel; treated as end-of-stream.
    Closed,
}

/// Consumer handle. Exactly one per queue.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<StageMessage<T>>,
    depth: Arc<AtomicUsize>,
}

impl<T> QueueReceiver<T> {
    /// Wait up to `timeout` for the next message.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Received<T> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Received::Empty,
            Ok(None) => Received::Closed,
            Ok(Some(StageMessage::Sentinel)) => Received::Sentinel,
            Ok(Some(StageMessage::Payload(value))) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Received::Payload(value)
            }
        }
    }
}
