//! Generic graph structures
//!
//! Peer and route-stat records read from the store, the resolved peer state of
//! a route, and the node/edge types of the security graph handed to renderers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::{NodeId, RouteKey};
use crate::resolver::generic::{EffectiveConfig, FallbackField};

// ============================================================================
// STORE RECORDS
// ============================================================================

/// Peer state as reported by the indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerStateHint {
    Resolved,
    ExplicitBlocked,
    ImplicitBlocked,
    #[default]
    NotConfigured,
}

/// Peer pointer of one route as indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Receiving application
    pub oapp_id: NodeId,
    /// Source endpoint the peer lives on
    pub src_eid: u32,
    /// Raw bytes32 peer pointer (or the delivering sender for inferred routes)
    #[serde(default)]
    pub peer: Option<String>,
    /// Indexer's classification of the pointer
    #[serde(default)]
    pub state_hint: PeerStateHint,
    /// Route known only from message delivery, never from a peer-set event
    #[serde(default)]
    pub inferred_from_delivery: bool,
}

impl PeerRecord {
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.oapp_id.clone(), self.src_eid)
    }
}

/// Packet statistics of one route. Used for edge weighting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStat {
    pub oapp_id: NodeId,
    pub src_eid: u32,
    pub packet_count: u64,
    #[serde(default)]
    pub last_packet_block: Option<u64>,
    #[serde(default)]
    pub last_packet_timestamp: Option<u64>,
}

// ============================================================================
// PEER RESOLUTION
// ============================================================================

/// Resolved state of a route's peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerState {
    /// Peer points at a concrete remote application
    Resolved,
    /// Peer set to zero, or indexer reports it blocked
    ExplicitBlocked,
    /// No peer set, route known only from delivery evidence
    ImplicitBlocked,
    /// No peer pointer at all
    NotConfigured,
    /// Remote application's peer points somewhere else
    StalePeer,
}

impl PeerState {
    /// Returns true if messages on this route cannot be accepted.
    pub fn is_blocked(&self) -> bool {
        !matches!(self, PeerState::Resolved)
    }
}

/// Outcome of resolving one peer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub state: PeerState,
    /// Remote application the route connects to, when derivable
    pub remote: Option<NodeId>,
    /// Human-readable reason for a non-resolved state
    pub reason: Option<String>,
}

// ============================================================================
// GRAPH NODES AND EDGES
// ============================================================================

/// Security config of one route as carried by a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSecurityConfig {
    pub src_eid: u32,
    #[serde(rename = "requiredDVNCount")]
    pub required_dvn_count: Option<u8>,
    #[serde(rename = "requiredDVNs")]
    pub required_dvns: Vec<String>,
    #[serde(rename = "optionalDVNCount")]
    pub optional_dvn_count: Option<u8>,
    #[serde(rename = "optionalDVNs")]
    pub optional_dvns: Vec<String>,
    #[serde(rename = "optionalDVNThreshold")]
    pub optional_dvn_threshold: Option<u8>,
    #[serde(rename = "usesRequiredDVNSentinel")]
    pub uses_required_dvn_sentinel: bool,
    pub library: Option<String>,
    pub confirmations: Option<u64>,
    pub is_config_tracked: bool,
    pub uses_default_config: bool,
    pub fallback_fields: Vec<FallbackField>,
    /// Resolved peer state of the route, if a peer record exists
    pub peer_state: Option<PeerState>,
    /// Built from defaults because no effective config row existed
    pub synthetic: bool,
}

impl RouteSecurityConfig {
    pub fn from_effective(config: &EffectiveConfig, peer_state: Option<PeerState>, synthetic: bool) -> Self {
        Self {
            src_eid: config.src_eid,
            required_dvn_count: config.required_dvn_count,
            required_dvns: config.required_dvns.clone(),
            optional_dvn_count: config.optional_dvn_count,
            optional_dvns: config.optional_dvns.clone(),
            optional_dvn_threshold: config.optional_dvn_threshold,
            uses_required_dvn_sentinel: config.uses_required_dvn_sentinel,
            library: config.library.clone(),
            confirmations: config.confirmations,
            is_config_tracked: config.is_config_tracked,
            uses_default_config: config.uses_default_config,
            fallback_fields: config.fallback_fields.clone(),
            peer_state,
            synthetic,
        }
    }
}

/// One application in the security graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    /// BFS depth from the seed; -1 for dangling nodes
    pub depth: i32,
    pub is_tracked: bool,
    pub is_dangling: bool,
    /// Route configs, sorted by source eid
    pub security_configs: Vec<RouteSecurityConfig>,
    pub total_packets_received: u64,
    pub last_packet_timestamp: Option<u64>,
    /// Set by the analyzer
    #[serde(default)]
    pub is_blocked: bool,
}

impl GraphNode {
    /// Creates a node known only from edge references.
    pub fn dangling(id: NodeId) -> Self {
        Self {
            id,
            depth: -1,
            is_tracked: false,
            is_dangling: true,
            security_configs: Vec::new(),
            total_packets_received: 0,
            last_packet_timestamp: None,
            is_blocked: false,
        }
    }

    pub fn config_for(&self, src_eid: u32) -> Option<&RouteSecurityConfig> {
        self.security_configs.iter().find(|c| c.src_eid == src_eid)
    }
}

/// Deduplication key of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeKey {
    pub from: NodeId,
    pub to: NodeId,
    pub src_eid: u32,
}

/// Verifier-set fingerprint of a route.
///
/// Derived ordering compares required count, then names, then the sentinel flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierFingerprint {
    pub required_count: u8,
    /// Sorted, lowercased DVN names (raw addresses when unnamed)
    pub verifiers: Vec<String>,
    pub sentinel: bool,
}

/// Directed message route `from -> to`, received on `to` from `src_eid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub src_eid: u32,
    pub peer_state: PeerState,
    pub block_reason_hint: Option<String>,
    pub synthetic: bool,
    pub route_packet_count: Option<u64>,
    pub last_packet_timestamp: Option<u64>,
    /// Set by the analyzer
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub fingerprint: Option<VerifierFingerprint>,
    #[serde(default)]
    pub differs_from_popular: bool,
    #[serde(default)]
    pub differences: Vec<String>,
}

impl GraphEdge {
    pub fn new(from: NodeId, to: NodeId, src_eid: u32, peer: &PeerInfo, synthetic: bool) -> Self {
        Self {
            from,
            to,
            src_eid,
            peer_state: peer.state,
            block_reason_hint: peer.reason.clone(),
            synthetic,
            route_packet_count: None,
            last_packet_timestamp: None,
            is_blocked: false,
            fingerprint: None,
            differs_from_popular: false,
            differences: Vec::new(),
        }
    }

    pub fn with_stat(mut self, stat: Option<&RouteStat>) -> Self {
        if let Some(stat) = stat {
            self.route_packet_count = Some(stat.packet_count);
            self.last_packet_timestamp = stat.last_packet_timestamp;
        }
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from.clone(),
            to: self.to.clone(),
            src_eid: self.src_eid,
        }
    }

    /// Fills missing optional fields from a duplicate of the same edge.
    ///
    /// Existing values are never overwritten, except that the higher packet
    /// count and the later timestamp win. The synthetic flag is left to the
    /// crawler, which settles it from the receiving route.
    pub fn enrich_from(&mut self, other: &GraphEdge) {
        if self.block_reason_hint.is_none() {
            self.block_reason_hint = other.block_reason_hint.clone();
        }
        self.route_packet_count = match (self.route_packet_count, other.route_packet_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.last_packet_timestamp = match (self.last_packet_timestamp, other.last_packet_timestamp) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Item skipped during a crawl, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedItem {
    pub node: NodeId,
    pub src_eid: Option<u32>,
    pub reason: String,
}

/// Most common non-blocked fingerprint of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DominantCombination {
    pub fingerprint: VerifierFingerprint,
    pub edge_count: usize,
}

/// Output graph handed to renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGraph {
    pub crawl_id: Uuid,
    pub seed: NodeId,
    pub crawl_depth: u32,
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub dominant_combination: Option<DominantCombination>,
    pub skipped: Vec<SkippedItem>,
}
