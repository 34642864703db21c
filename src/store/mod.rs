//! Security Store Module
//!
//! The query boundary between the resolver/crawler and whatever backs the
//! indexed records. Implementations only need set-membership filtering and
//! must return every matching row; there is no pagination in the contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::address::NodeId;
use crate::graph::generic::{PeerRecord, RouteStat};
use crate::resolver::generic::{DefaultConfig, DefaultScope, EffectiveConfig, OverrideConfig};

mod graphql;
mod memory;
mod ranking;

pub use graphql::GraphqlStore;
pub use memory::InMemoryStore;
pub use ranking::order_by_packets_received;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors returned by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure talking to the indexer
    #[error("indexer request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Indexer answered with GraphQL errors
    #[error("indexer query failed: {0}")]
    Query(String),
    /// Indexer answered with an unexpected payload
    #[error("failed to decode indexer response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Write was rejected by the backing store
    #[error("store write rejected: {0}")]
    Write(String),
}

// ============================================================================
// BATCH QUERY TYPES
// ============================================================================

/// Batched read request: a set of node ids and the set of their local eids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Node ids to fetch (sorted, unique)
    pub node_ids: Vec<NodeId>,
    /// Local eids of those nodes (sorted, unique)
    pub local_eids: Vec<u32>,
}

impl BatchRequest {
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a NodeId>) -> Self {
        let node_ids: BTreeSet<NodeId> = ids.into_iter().cloned().collect();
        let local_eids: BTreeSet<u32> = node_ids.iter().map(|id| id.local_eid).collect();
        Self {
            node_ids: node_ids.into_iter().collect(),
            local_eids: local_eids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_ids.binary_search(id).is_ok()
    }
}

/// Rows returned for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    /// Effective configs of the requested nodes
    pub effective_configs: Vec<EffectiveConfig>,
    /// Peer records owned by the requested nodes (inbound routes)
    pub peers: Vec<PeerRecord>,
    /// Peer records of other nodes whose peer points at a requested node (outbound routes)
    pub referencing_peers: Vec<PeerRecord>,
    /// Route statistics of the requested nodes
    pub route_stats: Vec<RouteStat>,
    /// Current defaults for the requested local eids
    pub defaults: Vec<DefaultConfig>,
}

/// Aggregate packet statistics of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAppStats {
    /// Application id
    pub id: NodeId,
    /// Packets received across all routes
    pub total_packets_received: u64,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Read/write access to indexed security records.
#[async_trait]
pub trait SecurityStore: Send + Sync {
    /// Fetches every row for exactly the requested node ids and local eids.
    async fn fetch_batch(&self, request: &BatchRequest) -> Result<BatchResponse, StoreError>;

    /// Fetches the current default of one pathway.
    async fn fetch_default(&self, scope: &DefaultScope) -> Result<Option<DefaultConfig>, StoreError>;

    /// Fetches every override record on a chain.
    async fn fetch_overrides_for_chain(&self, local_eid: u32) -> Result<Vec<OverrideConfig>, StoreError>;

    /// Fetches every effective config on a chain.
    async fn fetch_effective_for_chain(&self, local_eid: u32) -> Result<Vec<EffectiveConfig>, StoreError>;

    /// Inserts or replaces one effective config.
    async fn upsert_effective(&self, config: &EffectiveConfig) -> Result<(), StoreError>;

    /// Fetches per-application packet statistics.
    async fn fetch_oapp_stats(&self) -> Result<Vec<OAppStats>, StoreError>;

    /// Fetches the ids of applications with at least one route on the default config.
    ///
    /// May contain duplicates (one entry per route).
    async fn fetch_default_config_oapps(&self) -> Result<Vec<NodeId>, StoreError>;
}
