//! Security Graph Library
//!
//! Resolves the effective per-route security configuration of cross-chain
//! messaging applications (protocol defaults merged with application
//! overrides) and assembles the routes between applications into an
//! annotated security graph for auditing.

pub mod address;
pub mod api;
pub mod config;
pub mod graph;
pub mod names;
pub mod protocol;
pub mod resolver;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use address::{AddressError, AddressMarkers, NodeId, RouteKey};
pub use config::Config;
pub use graph::{GraphAnalyzer, GraphCrawler, PeerResolver, SecurityGraph};
pub use protocol::ProtocolSettings;
pub use resolver::{CascadeRecomputer, ConfigMergeEngine, EffectiveConfig};
pub use service::SecurityGraphService;
pub use store::{GraphqlStore, InMemoryStore, SecurityStore};
