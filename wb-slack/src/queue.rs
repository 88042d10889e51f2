//! Bounded FIFO of outbound frames.
//!
//! Producers only ever push unassigned messages. The single
//! [`OutboundReceiver`] stamps identifiers as it dequeues, so identifiers
//! follow transport write order.

use crate::error::{Result, SlackError};
use crate::types::OutboundMessage;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Producer handle. Cheap to clone; all clones share one close switch.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: Arc<Mutex<Option<mpsc::Sender<OutboundMessage>>>>,
}

pub struct OutboundReceiver {
    rx: mpsc::Receiver<OutboundMessage>,
    last_id: u64,
}

impl OutboundQueue {
    pub fn bounded(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            OutboundReceiver { rx, last_id: 0 },
        )
    }

    /// Enqueue, waiting for space when the buffer is full.
    pub async fn push(&self, message: OutboundMessage) -> Result<()> {
        ensure_unassigned(&message)?;
        let tx = self.sender().await?;
        tx.send(message).await.map_err(|_| SlackError::QueueClosed)
    }

    /// Enqueue without waiting.
    pub async fn try_push(&self, message: OutboundMessage) -> Result<()> {
        ensure_unassigned(&message)?;
        let tx = self.sender().await?;
        tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SlackError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SlackError::QueueClosed,
        })
    }

    /// Stop accepting messages. Already queued messages stay readable.
    /// Returns `true` only for the call that actually closed the queue.
    pub async fn close(&self) -> bool {
        self.tx.lock().await.take().is_some()
    }

    pub async fn is_closed(&self) -> bool {
        self.tx.lock().await.is_none()
    }

    async fn sender(&self) -> Result<mpsc::Sender<OutboundMessage>> {
        self.tx.lock().await.clone().ok_or(SlackError::QueueClosed)
    }
}

fn ensure_unassigned(message: &OutboundMessage) -> Result<()> {
    match message.id() {
        0 => Ok(()),
        id => Err(SlackError::IdAlreadyAssigned(id)),
    }
}

impl OutboundReceiver {
    /// Next message in FIFO order with its identifier assigned. `None` once
    /// the queue is closed and drained.
    pub async fn next(&mut self) -> Option<OutboundMessage> {
        let mut message = self.rx.recv().await?;
        let id = self.last_id + 1;
        let assigned = message.assign_id(id);
        debug_assert!(assigned, "producers only enqueue unassigned messages");
        self.last_id = id;
        Some(message)
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }
}
