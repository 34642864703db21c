//! Unit tests for the graph analyzer
//!
//! These tests verify blocked-edge detection, verifier fingerprints, the
//! dominant combination with its difference reasons and node blocking rules.

use security_graph::address::{NodeId, RouteKey};
use security_graph::graph::{
    GraphAnalyzer, GraphEdge, GraphNode, PeerInfo, PeerState, RouteSecurityConfig, VerifierFingerprint,
};

#[path = "mod.rs"]
mod test_helpers;
use test_helpers::{
    create_default_config, node, test_directory, test_engine, test_settings, DUMMY_DEAD_ADDRESS, DUMMY_DVN_A,
    DUMMY_DVN_B, DUMMY_DVN_C, DUMMY_DVN_DEAD_LABEL, DUMMY_LOCAL_EID, DUMMY_OAPP_SEED, DUMMY_REMOTE_EID,
    DUMMY_UNTRACKED_LIB,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn analyzer() -> GraphAnalyzer {
    GraphAnalyzer::new(test_settings(), test_directory())
}

fn seed() -> NodeId {
    node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED)
}

/// Target application `n` on the remote chain
fn target_id(n: u16) -> NodeId {
    node(DUMMY_REMOTE_EID, &format!("0x{:04x}", 0x1000 + n))
}

/// Route config of `id` receiving from the seed chain with `required` DVNs
fn route_config(id: &NodeId, required: &[&str]) -> RouteSecurityConfig {
    let default = create_default_config(id.local_eid, DUMMY_LOCAL_EID, required);
    let effective = test_engine().merge(&RouteKey::new(id.clone(), DUMMY_LOCAL_EID), Some(&default), None);
    RouteSecurityConfig::from_effective(&effective, Some(PeerState::Resolved), false)
}

fn graph_node(id: NodeId, depth: i32, configs: Vec<RouteSecurityConfig>) -> GraphNode {
    GraphNode {
        is_tracked: configs.iter().any(|c| c.is_config_tracked),
        id,
        depth,
        is_dangling: false,
        security_configs: configs,
        total_packets_received: 0,
        last_packet_timestamp: None,
        is_blocked: false,
    }
}

fn edge(from: &NodeId, to: &NodeId, state: PeerState) -> GraphEdge {
    let info = PeerInfo {
        state,
        remote: Some(from.clone()),
        reason: None,
    };
    GraphEdge::new(from.clone(), to.clone(), from.local_eid, &info, false)
}

/// Seed plus one target per DVN set, each with a resolved edge from the seed
fn star(dvn_sets: &[&[&str]]) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let mut nodes = vec![graph_node(seed(), 0, Vec::new())];
    let mut edges = Vec::new();
    for (i, required) in dvn_sets.iter().enumerate() {
        let id = target_id(i as u16);
        nodes.push(graph_node(id.clone(), 1, vec![route_config(&id, required)]));
        edges.push(edge(&seed(), &id, PeerState::Resolved));
    }
    (nodes, edges)
}

fn fingerprint(count: u8, names: &[&str]) -> VerifierFingerprint {
    VerifierFingerprint {
        required_count: count,
        verifiers: names.iter().map(|n| n.to_string()).collect(),
        sentinel: false,
    }
}

// ============================================================================
// DOMINANT COMBINATION TESTS
// ============================================================================

/// What is tested: Three {2, [alpha, beta]} routes dominate one {1, [alpha]} route
/// Why: The minority route must be flagged with a required count reason
#[test]
fn test_dominant_combination_and_differences() {
    let (nodes, edges) = star(&[
        &[DUMMY_DVN_A, DUMMY_DVN_B],
        &[DUMMY_DVN_B, DUMMY_DVN_A],
        &[DUMMY_DVN_A, DUMMY_DVN_B],
        &[DUMMY_DVN_A],
    ]);

    let annotations = analyzer().analyze(&nodes, &edges);

    let dominant = annotations.dominant.unwrap();
    assert_eq!(dominant.fingerprint, fingerprint(2, &["alpha", "beta"]));
    assert_eq!(dominant.edge_count, 3);

    assert!(annotations.edges[..3].iter().all(|a| !a.differs_from_popular));
    let minority = &annotations.edges[3];
    assert!(minority.differs_from_popular);
    assert_eq!(minority.fingerprint, Some(fingerprint(1, &["alpha"])));
    assert!(minority.differences.contains(&"required count 1 vs dominant 2".to_string()));
    assert!(minority
        .differences
        .contains(&"verifier set [alpha] vs dominant [alpha, beta]".to_string()));
    assert!(minority
        .differences
        .contains(&"required count 1 below maximum observed 2".to_string()));
}

/// What is tested: Unnamed DVNs fingerprint by address
/// Why: Names are optional, and raw addresses must still compare consistently
#[test]
fn test_fingerprint_falls_back_to_address() {
    let id = target_id(0);
    let config = route_config(&id, &[DUMMY_DVN_C, DUMMY_DVN_A]);

    let fp = analyzer().fingerprint(DUMMY_REMOTE_EID, &config);

    assert_eq!(fp, fingerprint(2, &[DUMMY_DVN_C, "alpha"]));
}

/// What is tested: Blocked and untracked routes get no fingerprint
/// Why: Only live, tracked routes take part in the popularity vote
#[test]
fn test_no_fingerprint_for_blocked_or_untracked() {
    let (mut nodes, mut edges) = star(&[&[DUMMY_DVN_A], &[DUMMY_DVN_A]]);
    edges[0].peer_state = PeerState::ImplicitBlocked;
    nodes[2].security_configs[0].is_config_tracked = false;
    nodes[2].security_configs[0].library = Some(DUMMY_UNTRACKED_LIB.to_string());

    let annotations = analyzer().analyze(&nodes, &edges);

    assert!(annotations.edges.iter().all(|a| a.fingerprint.is_none()));
    assert!(annotations.dominant.is_none());
}

// ============================================================================
// BLOCKING TESTS
// ============================================================================

/// What is tested: Blocking DVNs block the edge, by label or by dead address
/// Why: A pathway that requires a dead DVN can never verify a message
#[test]
fn test_blocking_dvns_block_edges() {
    let (nodes, edges) = star(&[&[DUMMY_DVN_A, DUMMY_DVN_DEAD_LABEL], &[DUMMY_DEAD_ADDRESS], &[DUMMY_DVN_A]]);

    let annotations = analyzer().analyze(&nodes, &edges);

    assert!(annotations.edges[0].is_blocked);
    assert_eq!(annotations.edges[0].block_reason.as_deref(), Some("blocking DVN LZDeadDVN"));
    assert!(annotations.edges[1].is_blocked);
    assert_eq!(
        annotations.edges[1].block_reason,
        Some(format!("blocking DVN {}", DUMMY_DEAD_ADDRESS))
    );
    assert!(!annotations.edges[2].is_blocked);
    assert_eq!(annotations.dominant.unwrap().edge_count, 1);
}

/// What is tested: Blocked peer states block the edge with a reason
/// Why: The crawler's hint is kept, and a generic reason is produced without one
#[test]
fn test_blocked_peer_states() {
    let (nodes, mut edges) = star(&[&[DUMMY_DVN_A], &[DUMMY_DVN_A]]);
    edges[0].peer_state = PeerState::StalePeer;
    edges[0].block_reason_hint = Some("remote peer points elsewhere".to_string());
    edges[1].peer_state = PeerState::NotConfigured;

    let annotations = analyzer().analyze(&nodes, &edges);

    assert_eq!(
        annotations.edges[0].block_reason.as_deref(),
        Some("remote peer points elsewhere")
    );
    assert_eq!(annotations.edges[1].block_reason.as_deref(), Some("peer not configured"));
    assert!(annotations.edges.iter().all(|a| a.is_blocked));
}

/// What is tested: Node blocking rules for blocked inbound edges, dangling nodes and the seed
/// Why: A node is unreachable only when nothing can deliver to it, and the seed is always shown live
#[test]
fn test_node_blocking_rules() {
    let (mut nodes, mut edges) = star(&[&[DUMMY_DVN_A], &[DUMMY_DVN_A]]);
    edges[0].peer_state = PeerState::ExplicitBlocked;

    let dangling = GraphNode::dangling(target_id(9));
    edges.push(edge(&target_id(1), &seed(), PeerState::ImplicitBlocked));
    nodes.push(dangling);

    let mut annotations_edges = edges.clone();
    let annotations = analyzer().analyze(&nodes, &edges);
    annotations.apply(&mut nodes, &mut annotations_edges);

    assert!(!nodes[0].is_blocked, "seed with only blocked inbound edges");
    assert!(nodes[1].is_blocked, "only inbound edge blocked");
    assert!(!nodes[2].is_blocked, "live inbound edge");
    assert!(nodes[3].is_blocked, "dangling without inbound edges");
    assert!(annotations_edges[0].is_blocked);
    assert_eq!(
        annotations_edges[0].block_reason_hint.as_deref(),
        Some("peer explicitly blocked")
    );
}
