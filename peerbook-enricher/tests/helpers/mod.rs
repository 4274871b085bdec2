//! Test Helper Utilities
//!
//! In-memory gateways and stores for driving the enrichment pipeline
//! without network or disk.

#![allow(dead_code)]

use async_trait::async_trait;
use peerbook_common::config::TerminationPolicy;
use peerbook_common::{Error, Peer, Result};
use peerbook_enricher::batcher::{PeerStore, PersistenceBatcher};
use peerbook_enricher::gateway::{
    AccountDirectory, EnrichSettings, Enricher, GatewayError, GatewayResult, NameResolver,
};
use peerbook_enricher::registry::Registry;
use peerbook_enricher::worker::{EnrichmentWorker, WorkerSettings};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Well-formed address number `i`
pub fn address(i: usize) -> String {
    format!("0x{:040x}", i)
}

/// Account id the mock directory assigns to `address`
pub fn account_id_for(address: &str) -> i64 {
    i64::from_str_radix(&address[34..], 16).unwrap() + 1
}

/// Reverse records `peer<N>.eth` for every address
pub struct StaticNames;

#[async_trait]
impl NameResolver for StaticNames {
    async fn reverse_resolve(&self, address: &str) -> GatewayResult<Option<String>> {
        Ok(Some(format!("peer{}.eth", account_id_for(address) - 1)))
    }

    async fn resolve(&self, _name: &str) -> GatewayResult<Option<String>> {
        Ok(None)
    }
}

/// Resolver whose every call fails
pub struct FailingNames;

#[async_trait]
impl NameResolver for FailingNames {
    async fn reverse_resolve(&self, _address: &str) -> GatewayResult<Option<String>> {
        Err(GatewayError::Network("connection refused".to_string()))
    }

    async fn resolve(&self, _name: &str) -> GatewayResult<Option<String>> {
        Err(GatewayError::Network("connection refused".to_string()))
    }
}

/// Resolver that parks its first reverse lookup until released
pub struct GatedNames {
    pub entered: Notify,
    pub release: Notify,
    gated: AtomicBool,
}

impl GatedNames {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
            gated: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl NameResolver for GatedNames {
    async fn reverse_resolve(&self, address: &str) -> GatewayResult<Option<String>> {
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        StaticNames.reverse_resolve(address).await
    }

    async fn resolve(&self, _name: &str) -> GatewayResult<Option<String>> {
        Ok(None)
    }
}

/// Directory that knows every address
pub struct StaticAccounts {
    pub account_calls: AtomicUsize,
}

impl StaticAccounts {
    pub fn new() -> Self {
        Self {
            account_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AccountDirectory for StaticAccounts {
    async fn platform_name(&self, owner: &str) -> GatewayResult<Option<String>> {
        Ok(Some(format!("peer{}.loopring.eth", account_id_for(owner) - 1)))
    }

    async fn account_id(&self, owner: &str) -> GatewayResult<Option<i64>> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(account_id_for(owner)))
    }

    async fn owner_of(&self, account_id: i64) -> GatewayResult<Option<String>> {
        Ok(usize::try_from(account_id - 1).ok().map(address))
    }
}

/// Store that records every saved batch
#[derive(Default)]
pub struct RecordingStore {
    pub stored: Vec<Peer>,
    pub batches: Mutex<Vec<Vec<Peer>>>,
}

impl RecordingStore {
    pub fn with_peers(stored: Vec<Peer>) -> Self {
        Self {
            stored,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn saved(&self) -> Vec<Peer> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl PeerStore for RecordingStore {
    async fn load_all(&self) -> Result<Vec<Peer>> {
        Ok(self.stored.clone())
    }

    async fn save_batch(&self, batch: &[Peer]) -> Result<()> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

/// Store whose first `failures` saves fail
pub struct FlakyStore {
    failures: AtomicU32,
    pub attempts: AtomicU32,
    pub inner: RecordingStore,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
            inner: RecordingStore::default(),
        }
    }
}

#[async_trait]
impl PeerStore for FlakyStore {
    async fn load_all(&self) -> Result<Vec<Peer>> {
        Ok(Vec::new())
    }

    async fn save_batch(&self, batch: &[Peer]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Internal("database is locked".to_string()));
        }
        self.inner.save_batch(batch).await
    }
}

/// Store that rejects every save until `outage` has passed since creation
pub struct OutageStore {
    until: Instant,
    pub attempts: AtomicU32,
    pub inner: RecordingStore,
}

impl OutageStore {
    pub fn new(outage: Duration) -> Self {
        Self {
            until: Instant::now() + outage,
            attempts: AtomicU32::new(0),
            inner: RecordingStore::default(),
        }
    }
}

#[async_trait]
impl PeerStore for OutageStore {
    async fn load_all(&self) -> Result<Vec<Peer>> {
        Ok(Vec::new())
    }

    async fn save_batch(&self, batch: &[Peer]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if Instant::now() < self.until {
            return Err(Error::Internal("database is locked".to_string()));
        }
        self.inner.save_batch(batch).await
    }
}

pub fn enricher(
    names: Arc<dyn NameResolver>,
    accounts: Arc<dyn AccountDirectory>,
) -> Arc<Enricher> {
    Arc::new(Enricher::new(names, accounts, EnrichSettings::default()))
}

pub fn static_enricher() -> Arc<Enricher> {
    enricher(Arc::new(StaticNames), Arc::new(StaticAccounts::new()))
}

pub struct WorkerOptions {
    pub batch_size: usize,
    pub termination: TerminationPolicy,
    pub max_flush_attempts: u32,
    pub flush_retry_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            termination: TerminationPolicy::UntilDrained,
            max_flush_attempts: 5,
            flush_retry_interval: Duration::from_millis(10),
        }
    }
}

pub fn worker(
    registry: Arc<Registry>,
    enricher: Arc<Enricher>,
    store: Arc<dyn PeerStore>,
    options: WorkerOptions,
) -> EnrichmentWorker {
    EnrichmentWorker::new(
        registry,
        enricher,
        PersistenceBatcher::new(store, options.max_flush_attempts),
        WorkerSettings {
            batch_size: options.batch_size,
            termination: options.termination,
            flush_retry_interval: options.flush_retry_interval,
        },
    )
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
