//! Peer Registry
//!
//! In-memory map from address to [`Peer`] plus the ordered list of addresses
//! still pending enrichment. Both live behind one mutex; a condition variable
//! wakes the enrichment worker when new work arrives.
//!
//! The registry also owns the [`IngestionQueue`] that delivers pending
//! addresses to the worker. The queue is only touched with the registry lock
//! released, so a producer blocked on a full queue never stalls lookups or
//! the worker.
//!
//! Lookups are linear scans under the lock. There is no secondary index.

use crate::queue::IngestionQueue;
use peerbook_common::peer::{is_resolved_name, normalize, ACCOUNT_ID_UNSET};
use peerbook_common::{Enrichment, Peer};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key for [`Registry::get`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// Exact address, falling back to a name match
    Address(String),
    /// Primary or secondary name
    Name(String),
    /// Platform account id
    AccountId(i64),
}

impl LookupKey {
    /// Empty and sentinel keys would match every unresolved peer
    fn is_supported(&self) -> bool {
        match self {
            LookupKey::Address(value) | LookupKey::Name(value) => {
                is_resolved_name(&normalize(value))
            }
            LookupKey::AccountId(id) => *id > ACCOUNT_ID_UNSET,
        }
    }
}

impl From<&str> for LookupKey {
    /// `0x`-prefixed text is an address, anything else a name
    fn from(value: &str) -> Self {
        let value = normalize(value);
        if value.starts_with("0x") {
            LookupKey::Address(value)
        } else {
            LookupKey::Name(value)
        }
    }
}

impl From<i64> for LookupKey {
    fn from(id: i64) -> Self {
        LookupKey::AccountId(id)
    }
}

/// Field selector for [`Registry::get`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerField {
    /// The whole record
    #[default]
    Record,
    Address,
    PrimaryName,
    SecondaryName,
    AccountId,
}

impl PeerField {
    fn extract(self, peer: &Peer) -> FieldValue {
        match self {
            PeerField::Record => FieldValue::Peer(peer.clone()),
            PeerField::Address => FieldValue::Text(peer.address.clone()),
            PeerField::PrimaryName => FieldValue::Text(peer.primary_name.clone()),
            PeerField::SecondaryName => FieldValue::Text(peer.secondary_name.clone()),
            PeerField::AccountId => FieldValue::AccountId(peer.account_id),
        }
    }
}

impl std::str::FromStr for PeerField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record" => Ok(PeerField::Record),
            "address" => Ok(PeerField::Address),
            "primary_name" => Ok(PeerField::PrimaryName),
            "secondary_name" => Ok(PeerField::SecondaryName),
            "account_id" => Ok(PeerField::AccountId),
            other => Err(format!(
                "unknown field '{}' (expected record, address, primary_name, secondary_name or account_id)",
                other
            )),
        }
    }
}

/// Result of a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Peer(Peer),
    Text(String),
    AccountId(i64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// State guarded by the registry lock
pub(crate) struct RegistryState {
    peers: HashMap<String, Peer>,
    pending: VecDeque<String>,
}

impl RegistryState {
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop `address` from the pending list once the worker has dequeued it
    pub(crate) fn take_pending(&mut self, address: &str) {
        if let Some(pos) = self.pending.iter().position(|a| a == address) {
            self.pending.remove(pos);
        }
    }

    fn find(&self, key: &LookupKey) -> Option<&Peer> {
        match key {
            LookupKey::Address(address) => {
                let address = normalize(address);
                self.peers
                    .get(&address)
                    .or_else(|| self.find_by_name(&address))
            }
            LookupKey::Name(name) => self.find_by_name(&normalize(name)),
            LookupKey::AccountId(id) => self.peers.values().find(|p| p.account_id == *id),
        }
    }

    fn find_by_name(&self, name: &str) -> Option<&Peer> {
        self.peers
            .values()
            .find(|p| p.primary_name == name || p.secondary_name == name)
    }
}

/// Registry of all known peers
pub struct Registry {
    state: Mutex<RegistryState>,
    work_ready: Condvar,
    queue: IngestionQueue,
    stopping: AtomicBool,
}

impl Registry {
    /// Empty registry whose ingestion queue holds `queue_capacity` addresses
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                peers: HashMap::new(),
                pending: VecDeque::new(),
            }),
            work_ready: Condvar::new(),
            queue: IngestionQueue::with_capacity(queue_capacity),
            stopping: AtomicBool::new(false),
        }
    }

    /// Registry seeded from storage
    ///
    /// Stored addresses are normalized on load; rows that collapse to the
    /// same address keep the last one. Incomplete peers become the initial
    /// backlog. The queue is sized to hold the whole backlog, so seeding
    /// never blocks.
    pub fn with_peers(peers: Vec<Peer>, min_queue_capacity: usize) -> Self {
        let mut loaded: HashMap<String, Peer> = HashMap::with_capacity(peers.len());
        for mut peer in peers {
            peer.address = normalize(&peer.address);
            if peer.address.is_empty() {
                warn!("Skipping stored peer with empty address");
                continue;
            }
            loaded.insert(peer.address.clone(), peer);
        }

        let backlog: Vec<String> = loaded
            .values()
            .filter(|p| !p.is_complete())
            .map(|p| p.address.clone())
            .collect();

        let registry = Self::new(backlog.len().max(min_queue_capacity));
        {
            let mut state = registry.lock_state();
            state.peers = loaded;
            state.pending.extend(backlog.iter().cloned());
            info!(
                peers = state.peers.len(),
                backlog = backlog.len(),
                "Registry seeded from storage"
            );
        }

        for address in backlog {
            registry.queue.enqueue(address);
        }
        registry
    }

    /// Register `address` unless already known
    ///
    /// New peers are queued for enrichment and the worker is woken. Returns
    /// `true` when the address was new. May block while the ingestion queue
    /// is full.
    pub fn add_if_absent(&self, address: &str) -> bool {
        let address = normalize(address);
        if address.is_empty() {
            warn!("Ignoring empty peer address");
            return false;
        }

        {
            let mut state = self.lock_state();
            if state.peers.contains_key(&address) {
                return false;
            }
            state.peers.insert(address.clone(), Peer::new(address.clone()));
            state.pending.push_back(address.clone());
        }

        debug!(address = %address, "Added peer");
        self.queue.enqueue(address);
        self.work_ready.notify_all();
        true
    }

    /// Register every unknown address from one observation (e.g. one block)
    ///
    /// Returns the number of newly added peers.
    pub fn add_all<I, S>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        {
            let mut state = self.lock_state();
            for address in addresses {
                let address = normalize(address.as_ref());
                if address.is_empty() || state.peers.contains_key(&address) {
                    continue;
                }
                state.peers.insert(address.clone(), Peer::new(address.clone()));
                state.pending.push_back(address.clone());
                added.push(address);
            }
        }

        let count = added.len();
        if count > 0 {
            debug!(count, "Added peers");
            for address in added {
                self.queue.enqueue(address);
            }
            self.work_ready.notify_all();
        }
        count
    }

    /// Look up a peer by address, name or account id and return one field
    ///
    /// Unknown keys and unsupported (empty or sentinel) keys yield `None`.
    pub fn get(&self, key: &LookupKey, field: PeerField) -> Option<FieldValue> {
        if !key.is_supported() {
            warn!(?key, "Unsupported peer lookup key");
            return None;
        }

        let state = self.lock_state();
        match state.find(key) {
            Some(peer) => Some(field.extract(peer)),
            None => {
                debug!(?key, "Peer not found");
                None
            }
        }
    }

    /// First address carrying `account_id`, or an empty string
    pub fn get_address_by_account_id(&self, account_id: i64) -> String {
        let state = self.lock_state();
        match state.peers.values().find(|p| p.account_id == account_id) {
            Some(peer) => peer.address.clone(),
            None => {
                debug!(account_id, "No peer found with account id");
                String::new()
            }
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.lock_state().peers.contains_key(&normalize(address))
    }

    pub fn len(&self) -> usize {
        self.lock_state().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().peers.is_empty()
    }

    /// Addresses registered but not yet picked up by the worker
    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Copy of every peer, sorted by address
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.lock_state().peers.values().cloned().collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    /// Ask the worker to flush and exit
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        // Taking the lock orders the flag store before a parked worker's recheck
        drop(self.lock_state());
        self.work_ready.notify_all();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    // Worker-side access

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park until notified; the lock is released while parked
    pub(crate) fn wait<'a>(
        &self,
        guard: MutexGuard<'a, RegistryState>,
    ) -> MutexGuard<'a, RegistryState> {
        self.work_ready
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Park until notified or `timeout` elapses
    pub(crate) fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, RegistryState>,
        timeout: Duration,
    ) -> MutexGuard<'a, RegistryState> {
        match self.work_ready.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    pub(crate) fn queue(&self) -> &IngestionQueue {
        &self.queue
    }

    /// Write an enrichment into the stored peer and return a copy for the batch
    pub(crate) fn apply_enrichment(&self, address: &str, enrichment: &Enrichment) -> Option<Peer> {
        let mut state = self.lock_state();
        let peer = state.peers.get_mut(address)?;
        peer.apply(enrichment);
        Some(peer.clone())
    }
}
