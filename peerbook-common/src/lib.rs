//! # peerbook Common Library
//!
//! Shared code for the peerbook services including:
//! - Peer data model, sentinel values and address normalization
//! - Bootstrap configuration loading (TOML + environment)
//! - Logging initialization
//! - SQLite database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod peer;

pub use error::{Error, Result};
pub use peer::{Enrichment, Peer};
