//! Ingestion Queue
//!
//! Bounded channel of addresses awaiting enrichment. Producers block while
//! the queue is full and nothing is ever dropped. Every enqueue is delivered
//! to exactly one `dequeue`.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Bounded FIFO of pending addresses
///
/// Holds both channel ends, so it never disconnects while alive.
pub struct IngestionQueue {
    sender: Sender<String>,
    receiver: Receiver<String>,
    capacity: usize,
}

impl IngestionQueue {
    /// Create a queue holding up to `capacity` addresses (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Append an address, blocking while the queue is full
    pub fn enqueue(&self, address: String) {
        if let Err(e) = self.sender.send(address) {
            // Unreachable while `self` owns the receiver
            tracing::error!("Ingestion queue disconnected, lost {}", e.into_inner());
        }
    }

    /// Take the next address, blocking until one is available
    pub fn dequeue(&self) -> Option<String> {
        self.receiver.recv().ok()
    }

    /// Take the next address if one is queued
    pub fn try_dequeue(&self) -> Option<String> {
        match self.receiver.try_recv() {
            Ok(address) => Some(address),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
