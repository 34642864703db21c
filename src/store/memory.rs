//! In-memory security store
//!
//! Table-per-record-type store guarded by a `tokio::sync::RwLock`. Backs the
//! test suite and local runs without an indexer. Also keeps the append-only
//! history of default changes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BatchRequest, BatchResponse, OAppStats, SecurityStore, StoreError};
use crate::address::{bytes32_to_address, NodeId, RouteKey};
use crate::graph::generic::{PeerRecord, RouteStat};
use crate::resolver::generic::{
    DefaultConfig, DefaultConfigChange, DefaultScope, EffectiveConfig, OverrideConfig,
};

#[derive(Debug, Default)]
struct Tables {
    defaults: BTreeMap<DefaultScope, DefaultConfig>,
    default_history: Vec<DefaultConfigChange>,
    overrides: BTreeMap<RouteKey, OverrideConfig>,
    effective: BTreeMap<RouteKey, EffectiveConfig>,
    peers: BTreeMap<RouteKey, PeerRecord>,
    route_stats: BTreeMap<RouteKey, RouteStat>,
    oapp_stats: Vec<OAppStats>,
}

/// In-memory implementation of [`SecurityStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current default of a pathway without touching history.
    pub async fn insert_default(&self, config: DefaultConfig) {
        let mut tables = self.tables.write().await;
        tables.defaults.insert(config.scope(), config);
    }

    /// Applies a default change: advances the current default and appends history.
    ///
    /// # Returns
    ///
    /// The scope whose dependents need recomputation.
    pub async fn record_default_change(&self, change: DefaultConfigChange) -> DefaultScope {
        let mut tables = self.tables.write().await;
        let scope = change.config.scope();
        tables.defaults.insert(scope, change.config.clone());
        tables.default_history.push(change);
        scope
    }

    /// Returns the history of one pathway in append order.
    pub async fn default_history(&self, scope: &DefaultScope) -> Vec<DefaultConfigChange> {
        let tables = self.tables.read().await;
        tables
            .default_history
            .iter()
            .filter(|change| change.config.scope() == *scope)
            .cloned()
            .collect()
    }

    pub async fn insert_override(&self, config: OverrideConfig) {
        let mut tables = self.tables.write().await;
        tables.overrides.insert(config.route_key(), config);
    }

    pub async fn insert_effective(&self, config: EffectiveConfig) {
        let mut tables = self.tables.write().await;
        tables.effective.insert(config.route_key(), config);
    }

    pub async fn insert_peer(&self, record: PeerRecord) {
        let mut tables = self.tables.write().await;
        tables.peers.insert(record.route_key(), record);
    }

    pub async fn insert_route_stat(&self, stat: RouteStat) {
        let mut tables = self.tables.write().await;
        let key = RouteKey::new(stat.oapp_id.clone(), stat.src_eid);
        tables.route_stats.insert(key, stat);
    }

    pub async fn insert_oapp_stats(&self, stats: OAppStats) {
        let mut tables = self.tables.write().await;
        tables.oapp_stats.push(stats);
    }

    pub async fn effective(&self, route: &RouteKey) -> Option<EffectiveConfig> {
        let tables = self.tables.read().await;
        tables.effective.get(route).cloned()
    }
}

/// Remote node a peer record points at, if the pointer parses.
fn peer_target(record: &PeerRecord) -> Option<NodeId> {
    let raw = record.peer.as_deref()?;
    let address = bytes32_to_address(raw).ok()?;
    Some(NodeId {
        local_eid: record.src_eid,
        address,
    })
}

#[async_trait]
impl SecurityStore for InMemoryStore {
    async fn fetch_batch(&self, request: &BatchRequest) -> Result<BatchResponse, StoreError> {
        let tables = self.tables.read().await;

        let effective_configs = tables
            .effective
            .values()
            .filter(|c| request.contains(&c.oapp_id))
            .cloned()
            .collect();
        let peers = tables
            .peers
            .values()
            .filter(|p| request.contains(&p.oapp_id))
            .cloned()
            .collect();
        let referencing_peers = tables
            .peers
            .values()
            .filter(|p| !request.contains(&p.oapp_id))
            .filter(|p| peer_target(p).map(|t| request.contains(&t)).unwrap_or(false))
            .cloned()
            .collect();
        let route_stats = tables
            .route_stats
            .values()
            .filter(|s| request.contains(&s.oapp_id))
            .cloned()
            .collect();
        let defaults = tables
            .defaults
            .values()
            .filter(|d| request.local_eids.binary_search(&d.local_eid).is_ok())
            .cloned()
            .collect();

        debug!("In-memory batch fetch for {} node(s)", request.node_ids.len());

        Ok(BatchResponse {
            effective_configs,
            peers,
            referencing_peers,
            route_stats,
            defaults,
        })
    }

    async fn fetch_default(&self, scope: &DefaultScope) -> Result<Option<DefaultConfig>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.defaults.get(scope).cloned())
    }

    async fn fetch_overrides_for_chain(&self, local_eid: u32) -> Result<Vec<OverrideConfig>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .overrides
            .values()
            .filter(|o| o.oapp_id.local_eid == local_eid)
            .cloned()
            .collect())
    }

    async fn fetch_effective_for_chain(&self, local_eid: u32) -> Result<Vec<EffectiveConfig>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .effective
            .values()
            .filter(|c| c.oapp_id.local_eid == local_eid)
            .cloned()
            .collect())
    }

    async fn upsert_effective(&self, config: &EffectiveConfig) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.effective.insert(config.route_key(), config.clone());
        Ok(())
    }

    async fn fetch_oapp_stats(&self) -> Result<Vec<OAppStats>, StoreError> {
        let tables = self.tables.read().await;
        let mut stats = tables.oapp_stats.clone();
        stats.sort_by(|a, b| b.total_packets_received.cmp(&a.total_packets_received));
        Ok(stats)
    }

    async fn fetch_default_config_oapps(&self) -> Result<Vec<NodeId>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .effective
            .values()
            .filter(|c| c.uses_default_config)
            .map(|c| c.oapp_id.clone())
            .collect())
    }
}
