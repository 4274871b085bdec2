//! Persistence Batcher
//!
//! Writes accumulated peers to storage in one upsert per batch. A failed
//! write keeps the batch for the next flush, up to `max_attempts`
//! consecutive failures; after that the batch is dropped so it cannot grow
//! without bound while storage is down.

use async_trait::async_trait;
use peerbook_common::{Peer, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Backing store for peers
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// Every stored peer
    async fn load_all(&self) -> Result<Vec<Peer>>;

    /// Upsert keyed on address, overwriting the enrichment fields
    async fn save_batch(&self, batch: &[Peer]) -> Result<()>;
}

/// What a flush did with the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to write
    Empty,
    /// Written; the batch is now empty
    Saved(usize),
    /// Write failed; the batch is kept for another attempt
    Retained { attempt: u32 },
    /// Write failed too many times in a row; the batch was discarded
    Dropped(usize),
}

impl FlushOutcome {
    /// True when the batch is now empty
    pub fn is_settled(&self) -> bool {
        !matches!(self, FlushOutcome::Retained { .. })
    }
}

pub struct PersistenceBatcher {
    store: Arc<dyn PeerStore>,
    max_attempts: u32,
    failed_attempts: u32,
}

impl PersistenceBatcher {
    pub fn new(store: Arc<dyn PeerStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            failed_attempts: 0,
        }
    }

    /// Write `batch` to storage
    ///
    /// On success the batch is cleared in place, keeping its capacity.
    pub async fn flush(&mut self, batch: &mut Vec<Peer>) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = batch.len();
        debug!(count, "Saving batch of peers");

        match self.store.save_batch(batch).await {
            Ok(()) => {
                if self.failed_attempts > 0 {
                    info!(
                        count,
                        failed_attempts = self.failed_attempts,
                        "Peer batch saved after retry"
                    );
                } else {
                    info!(count, "Peer batch saved");
                }
                self.failed_attempts = 0;
                batch.clear();
                FlushOutcome::Saved(count)
            }
            Err(e) => {
                self.failed_attempts += 1;
                if self.failed_attempts >= self.max_attempts {
                    error!(
                        count,
                        attempts = self.failed_attempts,
                        error = %e,
                        "Dropping peer batch after repeated save failures"
                    );
                    self.failed_attempts = 0;
                    batch.clear();
                    FlushOutcome::Dropped(count)
                } else {
                    warn!(
                        count,
                        attempt = self.failed_attempts,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Failed to save peer batch, keeping it for retry"
                    );
                    FlushOutcome::Retained {
                        attempt: self.failed_attempts,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerbook_common::Error;
    use std::sync::Mutex;

    /// Fails the first `failures` saves, records the rest
    struct FlakyStore {
        failures: Mutex<u32>,
        saved: Mutex<Vec<Vec<Peer>>>,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                saved: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PeerStore for FlakyStore {
        async fn load_all(&self) -> Result<Vec<Peer>> {
            Ok(Vec::new())
        }

        async fn save_batch(&self, batch: &[Peer]) -> Result<()> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Internal("disk full".to_string()));
            }
            self.saved.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn batch_of(n: usize) -> Vec<Peer> {
        let mut batch = Vec::with_capacity(16);
        batch.extend((0..n).map(|i| Peer::new(format!("0x{:040x}", i))));
        batch
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = Arc::new(FlakyStore::new(0));
        let mut batcher = PersistenceBatcher::new(store.clone(), 3);

        let mut batch = Vec::new();
        assert_eq!(batcher.flush(&mut batch).await, FlushOutcome::Empty);
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_clears_and_keeps_capacity() {
        let store = Arc::new(FlakyStore::new(0));
        let mut batcher = PersistenceBatcher::new(store.clone(), 3);

        let mut batch = batch_of(3);
        let capacity = batch.capacity();

        assert_eq!(batcher.flush(&mut batch).await, FlushOutcome::Saved(3));
        assert!(batch.is_empty());
        assert_eq!(batch.capacity(), capacity);
        assert_eq!(store.saved.lock().unwrap()[0].len(), 3);
    }

    #[tokio::test]
    async fn test_failure_retains_batch() {
        let store = Arc::new(FlakyStore::new(1));
        let mut batcher = PersistenceBatcher::new(store.clone(), 3);

        let mut batch = batch_of(2);
        assert_eq!(
            batcher.flush(&mut batch).await,
            FlushOutcome::Retained { attempt: 1 }
        );
        assert_eq!(batch.len(), 2);

        assert_eq!(batcher.flush(&mut batch).await, FlushOutcome::Saved(2));
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_failure_drops_batch() {
        let store = Arc::new(FlakyStore::new(10));
        let mut batcher = PersistenceBatcher::new(store.clone(), 2);

        let mut batch = batch_of(4);
        assert!(!batcher.flush(&mut batch).await.is_settled());
        assert_eq!(batcher.flush(&mut batch).await, FlushOutcome::Dropped(4));
        assert!(batch.is_empty());

        // Counter resets for the next batch
        let mut next = batch_of(1);
        assert_eq!(
            batcher.flush(&mut next).await,
            FlushOutcome::Retained { attempt: 1 }
        );
    }
}
