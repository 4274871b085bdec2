//! Enrichment Gateway
//!
//! Maps an address to its three identity fields using external services:
//! - primary name: ENS reverse record ([`NameResolver`])
//! - secondary name: Loopring name ([`AccountDirectory`])
//! - account id: Loopring account id ([`AccountDirectory`])
//!
//! Every failure (transport error, malformed payload, empty result, timeout)
//! becomes the field's "not found" sentinel. Nothing here returns an error
//! to the enrichment pipeline.

pub mod ens;
pub mod loopring;

use async_trait::async_trait;
use peerbook_common::peer::{
    is_hex_address, normalize, ACCOUNT_ID_NOT_FOUND, NOT_FOUND, UNRESOLVED_ADDRESS,
};
use peerbook_common::Enrichment;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use ens::EnsClient;
pub use loopring::LoopringClient;

/// External lookup errors
///
/// Distinct from "not found", which lookups report as `Ok(None)`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON-RPC error {0}: {1}")]
    Rpc(i64, String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Parse(e.to_string())
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Forward and reverse name resolution (ENS)
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Address -> primary name
    async fn reverse_resolve(&self, address: &str) -> GatewayResult<Option<String>>;

    /// Name -> address
    async fn resolve(&self, name: &str) -> GatewayResult<Option<String>>;
}

/// Platform account lookups (Loopring)
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Owner address -> platform name
    async fn platform_name(&self, owner: &str) -> GatewayResult<Option<String>>;

    /// Owner address -> account id
    async fn account_id(&self, owner: &str) -> GatewayResult<Option<i64>>;

    /// Account id -> owner address
    async fn owner_of(&self, account_id: i64) -> GatewayResult<Option<String>>;
}

/// Limits applied to external calls
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    /// Upper bound for each external call
    pub call_timeout: Duration,
    /// Attempts for the account id lookup (no backoff between attempts)
    pub account_id_attempts: u32,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            account_id_attempts: 3,
        }
    }
}

/// Combines the name resolver and the account directory
pub struct Enricher {
    names: Arc<dyn NameResolver>,
    accounts: Arc<dyn AccountDirectory>,
    settings: EnrichSettings,
}

impl Enricher {
    pub fn new(
        names: Arc<dyn NameResolver>,
        accounts: Arc<dyn AccountDirectory>,
        settings: EnrichSettings,
    ) -> Self {
        Self {
            names,
            accounts,
            settings,
        }
    }

    /// Resolve all three identity fields for `address`
    ///
    /// Lookups run one after another; a failure in one does not affect the
    /// others. Malformed addresses get sentinels without any external call.
    pub async fn enrich(&self, address: &str) -> Enrichment {
        if !is_hex_address(address) {
            debug!(address, "Malformed address, skipping external lookups");
            return Enrichment::not_found();
        }

        Enrichment {
            primary_name: self.primary_name(address).await,
            secondary_name: self.secondary_name(address).await,
            account_id: self.account_id(address).await,
        }
    }

    /// Address -> ENS name or `"."`
    pub async fn primary_name(&self, address: &str) -> String {
        if !is_hex_address(address) {
            return NOT_FOUND.to_string();
        }
        let result = self.bounded(self.names.reverse_resolve(address)).await;
        name_or_sentinel(result, address, "reverse resolution")
    }

    /// Address -> platform name or `"."`
    pub async fn secondary_name(&self, address: &str) -> String {
        if !is_hex_address(address) {
            return NOT_FOUND.to_string();
        }
        let result = self.bounded(self.accounts.platform_name(address)).await;
        name_or_sentinel(result, address, "platform name lookup")
    }

    /// Address -> account id or `-1`
    ///
    /// Errors and timeouts are retried up to `account_id_attempts` times in
    /// total. A definitive "no account" answer is not retried.
    pub async fn account_id(&self, address: &str) -> i64 {
        if !is_hex_address(address) {
            return ACCOUNT_ID_NOT_FOUND;
        }

        let attempts = self.settings.account_id_attempts.max(1);
        for attempt in 1..=attempts {
            match self.bounded(self.accounts.account_id(address)).await {
                Ok(Some(id)) if id > 0 => return id,
                Ok(_) => return ACCOUNT_ID_NOT_FOUND,
                Err(e) => {
                    debug!(address, attempt, attempts, error = %e, "Account id lookup failed");
                }
            }
        }

        warn!(address, attempts, "Account id lookup gave up");
        ACCOUNT_ID_NOT_FOUND
    }

    /// Name -> address, or `"!"` when it cannot be resolved
    pub async fn address_for_name(&self, name: &str) -> String {
        let name = normalize(name);
        match self.bounded(self.names.resolve(&name)).await {
            Ok(Some(address)) if is_hex_address(&address) => normalize(&address),
            Ok(_) => UNRESOLVED_ADDRESS.to_string(),
            Err(e) => {
                debug!(name = %name, error = %e, "Forward resolution failed");
                UNRESOLVED_ADDRESS.to_string()
            }
        }
    }

    /// Account id -> owner address, or `"!"` when it cannot be resolved
    pub async fn address_for_account_id(&self, account_id: i64) -> String {
        if account_id <= 0 {
            return UNRESOLVED_ADDRESS.to_string();
        }
        match self.bounded(self.accounts.owner_of(account_id)).await {
            Ok(Some(owner)) if is_hex_address(&owner) => normalize(&owner),
            Ok(_) => UNRESOLVED_ADDRESS.to_string(),
            Err(e) => {
                debug!(account_id, error = %e, "Owner lookup failed");
                UNRESOLVED_ADDRESS.to_string()
            }
        }
    }

    async fn bounded<T, F>(&self, call: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let limit = self.settings.call_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(limit)),
        }
    }
}

fn name_or_sentinel(result: GatewayResult<Option<String>>, address: &str, what: &str) -> String {
    match result {
        Ok(Some(name)) if !name.trim().is_empty() => normalize(&name),
        Ok(_) => NOT_FOUND.to_string(),
        Err(e) => {
            debug!(address, error = %e, "{} failed", what);
            NOT_FOUND.to_string()
        }
    }
}
