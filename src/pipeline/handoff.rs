//! Blocking FIFO handoff between one producer role and one consumer role.
//!
//! Pushing never blocks: back-pressure comes from the fixed number of bundles
//! the execution node cycles through the pipeline, not from queue capacity.
//! Popping blocks until an item arrives or the queue is closed.

use crate::error::{PrefetchError, Result};
use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Thread-safe FIFO queue with blocking pop and explicit close.
///
/// Every pushed item is delivered to exactly one caller of
/// [`get_next_available`](Self::get_next_available). Once the queue is
/// closed, already queued items are still delivered in order, after which
/// pops fail with [`PrefetchError::QueueClosed`].
pub struct HandoffQueue<T> {
    items_tx: Sender<T>,
    items_rx: Receiver<T>,
    /// Dropped by `close()`, which disconnects `closed_rx` and wakes waiters
    close_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        let (items_tx, items_rx) = unbounded();
        let (close_tx, closed_rx) = unbounded();
        Self {
            items_tx,
            items_rx,
            close_tx: Mutex::new(Some(close_tx)),
            closed_rx,
        }
    }

    /// Append an item at the tail. Never blocks.
    pub fn push(&self, item: T) {
        if self.is_closed() {
            tracing::trace!("Push onto closed handoff queue");
        }
        // Both channel ends live in `self`, so the send cannot disconnect
        let _ = self.items_tx.send(item);
    }

    /// Remove and return the head item, blocking until one is available.
    pub fn get_next_available(&self) -> Result<T> {
        if let Ok(item) = self.items_rx.try_recv() {
            return Ok(item);
        }
        select! {
            recv(self.items_rx) -> item => item.map_err(|_| PrefetchError::QueueClosed),
            recv(self.closed_rx) -> _ => self.drain_one(),
        }
    }

    /// Like [`get_next_available`](Self::get_next_available) but gives up
    /// after `timeout`.
    pub fn get_next_available_timeout(&self, timeout: Duration) -> Result<T> {
        if let Ok(item) = self.items_rx.try_recv() {
            return Ok(item);
        }
        let deadline = Instant::now() + timeout;
        select! {
            recv(self.items_rx) -> item => item.map_err(|_| PrefetchError::QueueClosed),
            recv(self.closed_rx) -> _ => self.drain_one(),
            default(deadline.saturating_duration_since(Instant::now())) => {
                // An item may have raced the deadline
                match self.items_rx.recv_timeout(Duration::ZERO) {
                    Ok(item) => Ok(item),
                    Err(RecvTimeoutError::Timeout) => Err(PrefetchError::Timeout(format!(
                        "no item available after {:?}",
                        timeout
                    ))),
                    Err(RecvTimeoutError::Disconnected) => Err(PrefetchError::QueueClosed),
                }
            }
        }
    }

    /// Remove and return the head item if one is queued.
    pub fn try_get_next_available(&self) -> Option<T> {
        self.items_rx.try_recv().ok()
    }

    /// Wake all blocked consumers and make future pops on an empty queue fail.
    pub fn close(&self) {
        let mut close_tx = self.close_tx.lock().unwrap_or_else(|e| e.into_inner());
        if close_tx.take().is_some() {
            tracing::debug!(pending = self.items_rx.len(), "Handoff queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_tx
            .lock()
            .map(|tx| tx.is_none())
            .unwrap_or_else(|e| e.into_inner().is_none())
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items_rx.is_empty()
    }

    fn drain_one(&self) -> Result<T> {
        self.items_rx.try_recv().map_err(|_| PrefetchError::QueueClosed)
    }
}
