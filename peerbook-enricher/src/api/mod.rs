//! HTTP API handlers for peerbook-enricher

pub mod health;
pub mod peers;

pub use health::health_routes;
pub use peers::peer_routes;
