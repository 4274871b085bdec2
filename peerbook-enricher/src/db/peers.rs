//! Peer persistence

use crate::batcher::PeerStore;
use async_trait::async_trait;
use peerbook_common::{Peer, Result};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

/// SQLite caps bound parameters per statement at 32766; each row binds 4
const MAX_ROWS_PER_STATEMENT: usize = 8000;

/// `peers` table access
#[derive(Clone)]
pub struct SqlitePeerStore {
    pool: SqlitePool,
}

impl SqlitePeerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load one peer by address
    pub async fn load(&self, address: &str) -> Result<Option<Peer>> {
        let row = sqlx::query(
            "SELECT address, primary_name, secondary_name, account_id FROM peers WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| peer_from_row(&row)))
    }
}

fn peer_from_row(row: &sqlx::sqlite::SqliteRow) -> Peer {
    Peer {
        address: row.get("address"),
        primary_name: row.get("primary_name"),
        secondary_name: row.get("secondary_name"),
        account_id: row.get("account_id"),
    }
}

#[async_trait]
impl PeerStore for SqlitePeerStore {
    async fn load_all(&self) -> Result<Vec<Peer>> {
        let rows =
            sqlx::query("SELECT address, primary_name, secondary_name, account_id FROM peers")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.iter().map(peer_from_row).collect())
    }

    async fn save_batch(&self, batch: &[Peer]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in batch.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO peers (address, primary_name, secondary_name, account_id) ",
            );
            builder.push_values(chunk, |mut row, peer| {
                row.push_bind(peer.address.clone())
                    .push_bind(peer.primary_name.clone())
                    .push_bind(peer.secondary_name.clone())
                    .push_bind(peer.account_id);
            });
            builder.push(
                " ON CONFLICT(address) DO UPDATE SET \
                 primary_name = excluded.primary_name, \
                 secondary_name = excluded.secondary_name, \
                 account_id = excluded.account_id",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!(count = batch.len(), "Upserted peers");
        Ok(())
    }
}
