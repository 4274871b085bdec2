//! Peer records and the sentinel values used by enrichment
//!
//! A peer is one observed blockchain address plus three identity fields
//! resolved from external services. Every field distinguishes "never
//! attempted" from "looked up, nothing found":
//!
//! | Field            | Not attempted | Not found |
//! |------------------|---------------|-----------|
//! | `primary_name`   | `""`          | `"."`     |
//! | `secondary_name` | `""`          | `"."`     |
//! | `account_id`     | `0`           | `-1`      |

use serde::{Deserialize, Serialize};

/// Name sentinel: looked up, nothing found
pub const NOT_FOUND: &str = ".";

/// Address sentinel: resolution to an address failed
///
/// Older databases also carry this value in the name columns as a failure
/// marker; it is treated like [`NOT_FOUND`] there.
pub const UNRESOLVED_ADDRESS: &str = "!";

/// Account id sentinel: looked up (or attempted) and nothing found
pub const ACCOUNT_ID_NOT_FOUND: i64 = -1;

/// Account id of a peer that has never been enriched
pub const ACCOUNT_ID_UNSET: i64 = 0;

/// One registered address and its resolved identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub address: String,
    pub primary_name: String,
    pub secondary_name: String,
    pub account_id: i64,
}

/// Result of enriching one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub primary_name: String,
    pub secondary_name: String,
    pub account_id: i64,
}

impl Enrichment {
    /// Enrichment with every field set to its "not found" sentinel
    pub fn not_found() -> Self {
        Self {
            primary_name: NOT_FOUND.to_string(),
            secondary_name: NOT_FOUND.to_string(),
            account_id: ACCOUNT_ID_NOT_FOUND,
        }
    }
}

impl Peer {
    /// Create a peer with only its address set
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            primary_name: String::new(),
            secondary_name: String::new(),
            account_id: ACCOUNT_ID_UNSET,
        }
    }

    /// True when all three identity fields hold real values
    ///
    /// Incomplete peers loaded from storage are queued for re-enrichment.
    pub fn is_complete(&self) -> bool {
        is_resolved_name(&self.primary_name)
            && is_resolved_name(&self.secondary_name)
            && self.account_id > ACCOUNT_ID_UNSET
    }

    /// Overwrite the enrichment fields in place (last writer wins)
    pub fn apply(&mut self, enrichment: &Enrichment) {
        self.primary_name.clone_from(&enrichment.primary_name);
        self.secondary_name.clone_from(&enrichment.secondary_name);
        self.account_id = enrichment.account_id;
    }
}

/// True when `name` is an actual resolved name rather than empty or a sentinel
pub fn is_resolved_name(name: &str) -> bool {
    !name.is_empty() && name != NOT_FOUND && name != UNRESOLVED_ADDRESS
}

/// Canonical form used for every address and name before storage or comparison
///
/// Lowercasing (plus trimming surrounding whitespace) is the only
/// canonicalization performed. Hex addresses and `.eth` names take the same
/// path as everything else; checksummed addresses lose their checksum.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Check for `0x` followed by exactly 40 hex digits
pub fn is_hex_address(value: &str) -> bool {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}
