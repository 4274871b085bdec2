//! Database access for peerbook-enricher

pub mod peers;

pub use peers::SqlitePeerStore;
