//! Database access shared by peerbook crates

pub mod init;

pub use init::{init_database, init_memory_database};
