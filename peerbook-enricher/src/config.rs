//! Runtime configuration for peerbook-enricher
//!
//! Turns the bootstrap [`TomlConfig`] into the settings each component takes
//! and resolves the Loopring API key (environment over TOML).

use crate::gateway::EnrichSettings;
use crate::worker::WorkerSettings;
use peerbook_common::config::TomlConfig;
use tracing::{info, warn};

/// Environment variable holding the Loopring API key
pub const API_KEY_ENV_VAR: &str = "PEERBOOK_LOOPRING_API_KEY";

/// Resolve the Loopring API key
///
/// **Priority:** ENV -> TOML. `None` when neither holds a usable key; the
/// client then sends requests without one.
pub fn resolve_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|key| is_valid_key(key));
    let toml_key = toml_config
        .account_directory
        .api_key
        .clone()
        .filter(|key| is_valid_key(key));

    match (env_key, toml_key) {
        (Some(key), toml_key) => {
            if toml_key.is_some() {
                warn!("Loopring API key found in environment and TOML, using environment");
            }
            info!("Loopring API key loaded from environment variable");
            Some(key)
        }
        (None, Some(key)) => {
            info!("Loopring API key loaded from TOML config");
            Some(key)
        }
        (None, None) => {
            warn!(
                "Loopring API key not configured (set {} or account_directory.api_key)",
                API_KEY_ENV_VAR
            );
            None
        }
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

pub fn enrich_settings(toml_config: &TomlConfig) -> EnrichSettings {
    EnrichSettings {
        call_timeout: toml_config.worker.call_timeout(),
        account_id_attempts: toml_config.worker.account_id_attempts,
    }
}

pub fn worker_settings(toml_config: &TomlConfig) -> WorkerSettings {
    WorkerSettings {
        batch_size: toml_config.worker.batch_size,
        termination: toml_config.worker.termination,
        flush_retry_interval: toml_config.worker.flush_retry_interval(),
    }
}
