//! Startup reload of the registry from storage

use crate::batcher::PeerStore;
use crate::registry::Registry;
use peerbook_common::Result;
use std::sync::Arc;
use tracing::info;

/// Build the registry from every stored peer
///
/// Incomplete peers are queued for enrichment again. The ingestion queue
/// holds at least `min_queue_capacity` addresses and always fits the whole
/// backlog.
pub async fn load_registry(
    store: &dyn PeerStore,
    min_queue_capacity: usize,
) -> Result<Arc<Registry>> {
    let peers = store.load_all().await?;
    let loaded = peers.len();

    let registry = Registry::with_peers(peers, min_queue_capacity);
    info!(
        loaded,
        requeued = registry.pending_len(),
        "Reloaded peers from storage"
    );

    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use peerbook_common::{Error, Peer};

    struct FixedStore(Vec<Peer>);

    #[async_trait]
    impl PeerStore for FixedStore {
        async fn load_all(&self) -> Result<Vec<Peer>> {
            Ok(self.0.clone())
        }

        async fn save_batch(&self, _batch: &[Peer]) -> Result<()> {
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl PeerStore for BrokenStore {
        async fn load_all(&self) -> Result<Vec<Peer>> {
            Err(Error::Internal("database locked".to_string()))
        }

        async fn save_batch(&self, _batch: &[Peer]) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_incomplete_peers_are_requeued() {
        let complete = Peer {
            address: "0xaa".to_string(),
            primary_name: "a.eth".to_string(),
            secondary_name: "a.loopring.eth".to_string(),
            account_id: 10,
        };
        let missing_id = Peer {
            address: "0xbb".to_string(),
            account_id: -1,
            ..complete.clone()
        };
        let fresh = Peer::new("0xcc");

        let store = FixedStore(vec![complete, missing_id, fresh]);
        let registry = load_registry(&store, 1).await.unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.pending_len(), 2);
        assert_eq!(registry.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        assert!(load_registry(&BrokenStore, 10).await.is_err());
    }
}
