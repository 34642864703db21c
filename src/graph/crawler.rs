//! Graph Crawler
//!
//! Breadth-first traversal of application-to-application message routes,
//! starting from a seed application. Each round drains up to `batch_size`
//! pending nodes from the frontier and issues one batched store read for
//! them. Batches run strictly one after another, so for fixed data the
//! visitation order and the output ordering are reproducible.
//!
//! Nodes live in an arena: a `Vec` of slots, a `HashMap` from node id to slot
//! index and a `VecDeque` frontier of slot indices. Every node moves through
//! `Pending -> Fetched -> Expanded`. Nodes of a batch are built into a staging
//! area first and committed only after the whole batch succeeded.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::{NodeId, RouteKey};
use crate::graph::generic::{
    EdgeKey, GraphEdge, GraphNode, PeerInfo, PeerRecord, PeerState, RouteSecurityConfig, RouteStat,
    SkippedItem,
};
use crate::graph::peer::PeerResolver;
use crate::names::DvnDirectory;
use crate::protocol::ProtocolSettings;
use crate::resolver::generic::{DefaultConfig, DefaultScope, EffectiveConfig};
use crate::resolver::merge::ConfigMergeEngine;
use crate::store::{BatchRequest, BatchResponse, SecurityStore, StoreError};

// ============================================================================
// ERRORS AND RESULT
// ============================================================================

/// Fatal crawl errors. No node of the failing batch is committed.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error("batch {batch} fetch failed: {source}")]
    Fetch {
        batch: usize,
        #[source]
        source: StoreError,
    },
    #[error("batch {batch} timed out after {timeout_ms} ms")]
    BatchTimeout { batch: usize, timeout_ms: u64 },
}

/// Nodes and edges discovered by one crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    /// Visited nodes in visitation order, then dangling nodes sorted by id
    pub nodes: Vec<GraphNode>,
    /// Edges in discovery order
    pub edges: Vec<GraphEdge>,
    /// Routes and records that could not be processed
    pub skipped: Vec<SkippedItem>,
    /// Number of batched fetches issued
    pub batches: usize,
}

// ============================================================================
// ARENA
// ============================================================================

/// Lifecycle of a node inside one crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Queued in the frontier
    Pending,
    /// Rows received, node being built
    Fetched,
    /// Node committed and neighbors enqueued
    Expanded,
}

#[derive(Debug)]
struct Slot {
    id: NodeId,
    depth: u32,
    status: NodeStatus,
    node: Option<GraphNode>,
}

/// Working state of one crawl. Owned by a single `crawl` call.
#[derive(Debug, Default)]
struct CrawlState {
    slots: Vec<Slot>,
    index: HashMap<NodeId, usize>,
    frontier: VecDeque<usize>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<EdgeKey, usize>,
    /// Every peer record seen, for the symmetry pass
    peer_book: HashMap<RouteKey, PeerRecord>,
    /// Routes of committed nodes backed by a stored effective config
    stored_routes: HashSet<RouteKey>,
    skipped: Vec<SkippedItem>,
}

impl CrawlState {
    /// Queues `id` unless it was already visited or queued.
    fn enqueue(&mut self, id: NodeId, depth: u32) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        let slot = self.slots.len();
        self.index.insert(id.clone(), slot);
        self.slots.push(Slot {
            id,
            depth,
            status: NodeStatus::Pending,
            node: None,
        });
        self.frontier.push_back(slot);
        true
    }

    /// Adds an edge, or enriches the earlier edge with the same key.
    fn add_edge(&mut self, edge: GraphEdge) {
        let key = edge.key();
        match self.edge_index.get(&key) {
            Some(&i) => self.edges[i].enrich_from(&edge),
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(edge);
            }
        }
    }
}

/// Node built from one batch, not yet committed.
#[derive(Debug)]
struct StagedNode {
    slot: usize,
    node: GraphNode,
    edges: Vec<GraphEdge>,
    discovered: Vec<NodeId>,
    stored_routes: Vec<RouteKey>,
}

/// Batch rows of one node, keyed by source eid.
#[derive(Debug, Default)]
struct NodeRows<'a> {
    configs: BTreeMap<u32, &'a EffectiveConfig>,
    peers: BTreeMap<u32, &'a PeerRecord>,
    stats: BTreeMap<u32, &'a RouteStat>,
    /// Records of other nodes pointing here, with their resolved state
    referencing: Vec<(&'a PeerRecord, PeerInfo)>,
}

// ============================================================================
// GRAPH CRAWLER
// ============================================================================

/// Batched breadth-first crawler over a [`SecurityStore`].
pub struct GraphCrawler {
    store: Arc<dyn SecurityStore>,
    engine: ConfigMergeEngine,
    resolver: PeerResolver,
    settings: Arc<ProtocolSettings>,
    directory: Arc<DvnDirectory>,
    batch_timeout: Option<Duration>,
}

impl GraphCrawler {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        engine: ConfigMergeEngine,
        settings: Arc<ProtocolSettings>,
        directory: Arc<DvnDirectory>,
    ) -> Self {
        Self {
            store,
            engine,
            resolver: PeerResolver::new(settings.markers.clone()),
            settings,
            directory,
            batch_timeout: None,
        }
    }

    /// Fails a batch whose fetch takes longer than `timeout`.
    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Crawls the route graph around `seed`.
    ///
    /// # Arguments
    ///
    /// * `seed` - Starting application (depth 0)
    /// * `max_depth` - Neighbors are only enqueued from nodes with `depth < max_depth`
    /// * `batch_size` - Maximum number of nodes per batched fetch
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - Best-effort graph with skipped items
    /// * `Err(CrawlError)` - A batched fetch failed or timed out
    pub async fn crawl(&self, seed: &NodeId, max_depth: u32, batch_size: usize) -> Result<CrawlResult, CrawlError> {
        if batch_size == 0 {
            return Err(CrawlError::InvalidBatchSize);
        }

        info!(
            "Starting crawl from {} (max_depth={}, batch_size={})",
            seed, max_depth, batch_size
        );

        let mut state = CrawlState::default();
        state.enqueue(seed.clone(), 0);
        let mut batches = 0;

        while !state.frontier.is_empty() {
            batches += 1;
            let take = batch_size.min(state.frontier.len());
            let batch: Vec<usize> = state.frontier.drain(..take).collect();
            let request = BatchRequest::new(batch.iter().map(|&slot| &state.slots[slot].id));

            debug!("Batch {}: fetching {} node(s)", batches, request.node_ids.len());
            let response = self.fetch(batches, &request).await?;

            for &slot in &batch {
                state.slots[slot].status = NodeStatus::Fetched;
            }

            let staged = self.stage_batch(&mut state, &batch, &response, max_depth);
            for staged_node in staged {
                self.commit(&mut state, staged_node);
            }
        }

        self.mark_stale_peers(&mut state);
        mark_synthetic_edges(&mut state);

        let mut nodes: Vec<GraphNode> = state.slots.into_iter().filter_map(|slot| slot.node).collect();
        let visited: BTreeSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let dangling: BTreeSet<NodeId> = state
            .edges
            .iter()
            .flat_map(|e| [&e.from, &e.to])
            .filter(|id| !visited.contains(id))
            .cloned()
            .collect();
        nodes.extend(dangling.into_iter().map(GraphNode::dangling));

        info!(
            "Crawl from {} finished: {} node(s), {} edge(s), {} skipped, {} batch(es)",
            seed,
            nodes.len(),
            state.edges.len(),
            state.skipped.len(),
            batches
        );

        Ok(CrawlResult {
            nodes,
            edges: state.edges,
            skipped: state.skipped,
            batches,
        })
    }

    async fn fetch(&self, batch: usize, request: &BatchRequest) -> Result<BatchResponse, CrawlError> {
        let fetch = self.store.fetch_batch(request);
        let result = match self.batch_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fetch)
                .await
                .map_err(|_| CrawlError::BatchTimeout {
                    batch,
                    timeout_ms: timeout.as_millis() as u64,
                })?,
            None => fetch.await,
        };
        result.map_err(|source| CrawlError::Fetch { batch, source })
    }

    /// Builds every node of a batch without touching the arena's nodes or edges.
    fn stage_batch(
        &self,
        state: &mut CrawlState,
        batch: &[usize],
        response: &BatchResponse,
        max_depth: u32,
    ) -> Vec<StagedNode> {
        let defaults: HashMap<DefaultScope, &DefaultConfig> =
            response.defaults.iter().map(|d| (d.scope(), d)).collect();
        let mut rows: HashMap<NodeId, NodeRows> = HashMap::new();

        for config in &response.effective_configs {
            rows.entry(config.oapp_id.clone())
                .or_default()
                .configs
                .insert(config.src_eid, config);
        }
        for record in &response.peers {
            state.peer_book.insert(record.route_key(), record.clone());
            rows.entry(record.oapp_id.clone())
                .or_default()
                .peers
                .insert(record.src_eid, record);
        }
        for stat in &response.route_stats {
            rows.entry(stat.oapp_id.clone())
                .or_default()
                .stats
                .insert(stat.src_eid, stat);
        }

        let mut referencing: Vec<&PeerRecord> = response.referencing_peers.iter().collect();
        referencing.sort_by(|a, b| (&a.oapp_id, a.src_eid).cmp(&(&b.oapp_id, b.src_eid)));
        for record in referencing {
            state.peer_book.insert(record.route_key(), record.clone());
            let info = match self.resolver.resolve_peer(record) {
                Ok(info) => info,
                Err(e) => {
                    warn!("Skipping referencing peer of {}: {}", record.route_key(), e);
                    state.skipped.push(SkippedItem {
                        node: record.oapp_id.clone(),
                        src_eid: Some(record.src_eid),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let Some(target) = info.remote.clone() else { continue };
            if batch.iter().any(|&slot| state.slots[slot].id == target) {
                rows.entry(target).or_default().referencing.push((record, info));
            }
        }

        let mut staged = Vec::with_capacity(batch.len());
        for &slot in batch {
            let id = state.slots[slot].id.clone();
            let depth = state.slots[slot].depth;
            let node_rows = rows.remove(&id).unwrap_or_default();
            staged.push(self.build_node(state, slot, id, depth, node_rows, &defaults, max_depth));
        }
        staged
    }

    /// Builds one node, its inbound and outbound edges and its discovered neighbors.
    #[allow(clippy::too_many_arguments)]
    fn build_node(
        &self,
        state: &mut CrawlState,
        slot: usize,
        id: NodeId,
        depth: u32,
        rows: NodeRows,
        defaults: &HashMap<DefaultScope, &DefaultConfig>,
        max_depth: u32,
    ) -> StagedNode {
        let can_expand = depth < max_depth;
        let stored_routes = rows
            .configs
            .keys()
            .map(|&src_eid| RouteKey::new(id.clone(), src_eid))
            .collect();
        let mut security_configs = Vec::new();
        let mut edges = Vec::new();
        let mut discovered = Vec::new();

        let routes: BTreeSet<u32> = rows.configs.keys().chain(rows.peers.keys()).copied().collect();

        for src_eid in routes {
            let route = RouteKey::new(id.clone(), src_eid);

            let peer = match rows.peers.get(&src_eid) {
                Some(record) => match self.resolver.resolve_peer(record) {
                    Ok(info) => Some(info),
                    Err(e) => {
                        warn!("Skipping route {}: malformed peer ({})", route, e);
                        state.skipped.push(SkippedItem {
                            node: id.clone(),
                            src_eid: Some(src_eid),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
                None => None,
            };

            let (config, synthetic) = match rows.configs.get(&src_eid) {
                Some(config) => ((*config).clone(), false),
                None => {
                    let scope = DefaultScope {
                        local_eid: id.local_eid,
                        src_eid,
                    };
                    let default = defaults.get(&scope).copied();
                    (self.engine.merge(&route, default, None), true)
                }
            };

            if !synthetic || self.include_synthetic(&config, peer.as_ref()) {
                security_configs.push(RouteSecurityConfig::from_effective(
                    &config,
                    peer.as_ref().map(|p| p.state),
                    synthetic,
                ));
            } else {
                debug!("Omitting uninformative synthetic route {}", route);
            }

            let Some(info) = peer else { continue };
            let Some(remote) = info.remote.clone() else { continue };

            edges.push(
                GraphEdge::new(remote.clone(), id.clone(), src_eid, &info, synthetic)
                    .with_stat(rows.stats.get(&src_eid).copied()),
            );
            if info.state == PeerState::Resolved && can_expand {
                discovered.push(remote);
            }
        }

        // synthetic is settled once the receiving side is known, see mark_synthetic_edges
        for (record, info) in rows.referencing {
            edges.push(GraphEdge::new(id.clone(), record.oapp_id.clone(), record.src_eid, &info, true));
            if info.state == PeerState::Resolved && can_expand {
                discovered.push(record.oapp_id.clone());
            }
        }

        let total_packets_received = rows.stats.values().map(|s| s.packet_count).sum();
        let last_packet_timestamp = rows.stats.values().filter_map(|s| s.last_packet_timestamp).max();

        let node = GraphNode {
            is_tracked: security_configs.iter().any(|c| c.is_config_tracked),
            id,
            depth: i32::try_from(depth).unwrap_or(i32::MAX),
            is_dangling: false,
            security_configs,
            total_packets_received,
            last_packet_timestamp,
            is_blocked: false,
        };

        StagedNode {
            slot,
            node,
            edges,
            discovered,
            stored_routes,
        }
    }

    /// A route without a stored config is kept only if it says something.
    fn include_synthetic(&self, config: &EffectiveConfig, peer: Option<&PeerInfo>) -> bool {
        if peer.map(|p| p.state == PeerState::ExplicitBlocked).unwrap_or(false) {
            return true;
        }
        let local_eid = config.oapp_id.local_eid;
        config
            .required_dvns
            .iter()
            .any(|dvn| self.settings.is_blocking_dvn(dvn, self.directory.name_of(local_eid, dvn)))
    }

    fn commit(&self, state: &mut CrawlState, staged: StagedNode) {
        debug_assert_eq!(state.slots[staged.slot].status, NodeStatus::Fetched);
        let depth = state.slots[staged.slot].depth;
        for edge in staged.edges {
            state.add_edge(edge);
        }
        state.stored_routes.extend(staged.stored_routes);
        for neighbor in staged.discovered {
            if state.enqueue(neighbor.clone(), depth + 1) {
                debug!("Enqueued {} at depth {}", neighbor, depth + 1);
            }
        }
        let slot = &mut state.slots[staged.slot];
        slot.node = Some(staged.node);
        slot.status = NodeStatus::Expanded;
    }

    /// Downgrades resolved edges whose remote side points elsewhere.
    fn mark_stale_peers(&self, state: &mut CrawlState) {
        for i in 0..state.edges.len() {
            let edge = &state.edges[i];
            if edge.peer_state != PeerState::Resolved {
                continue;
            }
            let info = PeerInfo {
                state: edge.peer_state,
                remote: Some(edge.from.clone()),
                reason: None,
            };
            let reverse = state
                .peer_book
                .get(&RouteKey::new(edge.from.clone(), edge.to.local_eid));
            let checked = self.resolver.check_symmetry(info, &edge.to, reverse);
            if checked.state != PeerState::StalePeer {
                continue;
            }

            warn!(
                "Stale peer on {} -> {} (src_eid={}): {}",
                edge.from,
                edge.to,
                edge.src_eid,
                checked.reason.as_deref().unwrap_or("asymmetric peers")
            );
            let (to, src_eid) = (edge.to.clone(), edge.src_eid);
            let edge = &mut state.edges[i];
            edge.peer_state = PeerState::StalePeer;
            edge.block_reason_hint = checked.reason;

            if let Some(node) = state
                .index
                .get(&to)
                .and_then(|&slot| state.slots[slot].node.as_mut())
            {
                for config in node.security_configs.iter_mut().filter(|c| c.src_eid == src_eid) {
                    config.peer_state = Some(PeerState::StalePeer);
                }
            }
        }
    }
}

/// An edge is synthetic unless its receiving route has a stored config.
///
/// Receivers that were never visited have no stored config in the graph.
fn mark_synthetic_edges(state: &mut CrawlState) {
    for edge in &mut state.edges {
        let route = RouteKey::new(edge.to.clone(), edge.src_eid);
        edge.synthetic = !state.stored_routes.contains(&route);
    }
}
