//! Ingest queue between the ingestion and reconstruction flows
//!
//! A FIFO of decoded messages behind a single mutex. The producer holds the
//! lock only to push; the consumer holds it only to drain. Decoding and
//! applying both happen outside the lock.
//!
//! Overload accounting: while draining, every pop that leaves more than
//! `overload_threshold` messages still queued raises one overload signal.
//! The popped message is applied regardless; nothing is shed. The signals
//! feed the `updates_dropped` metric.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use book_types::message::UpdateMessage;

/// Queue depth above which a dequeue counts as overloaded.
pub const DEFAULT_OVERLOAD_THRESHOLD: usize = 1000;

/// Everything taken from the queue in one drain.
#[derive(Debug, Default)]
pub struct DrainedBatch {
    /// Messages in arrival order.
    pub messages: Vec<UpdateMessage>,
    /// Pops that happened while the queue was above the threshold.
    pub overload_signals: u64,
}

/// FIFO of decoded update messages shared by producer and consumer.
#[derive(Debug)]
pub struct IngestQueue {
    messages: Mutex<VecDeque<UpdateMessage>>,
    overload_threshold: usize,
}

impl IngestQueue {
    pub fn new(overload_threshold: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            overload_threshold,
        }
    }

    /// Create a queue with the default overload threshold.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_OVERLOAD_THRESHOLD)
    }

    /// Append one message.
    pub fn push(&self, message: UpdateMessage) {
        self.lock().push_back(message);
    }

    /// Append several messages under a single lock acquisition.
    pub fn push_all(&self, messages: impl IntoIterator<Item = UpdateMessage>) {
        self.lock().extend(messages);
    }

    /// Take every queued message in FIFO order.
    pub fn drain(&self) -> DrainedBatch {
        let mut queue = self.lock();
        let mut batch = DrainedBatch {
            messages: Vec::with_capacity(queue.len()),
            overload_signals: 0,
        };

        while let Some(message) = queue.pop_front() {
            if queue.len() > self.overload_threshold {
                batch.overload_signals += 1;
            }
            batch.messages.push(message);
        }

        batch
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn overload_threshold(&self) -> usize {
        self.overload_threshold
    }

    // Poisoning ignored: a push or drain never leaves the deque half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<UpdateMessage>> {
        match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::with_defaults()
    }
}
