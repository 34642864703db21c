//! Graph Analyzer
//!
//! Post-crawl annotation of the security graph:
//!
//! - blocked edges (blocked peer, or a blocking DVN in the required set)
//! - verifier-set fingerprints and the dominant combination
//! - edges that differ from the dominant combination, with reasons
//! - structurally blocked nodes

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::address::NodeId;
use crate::graph::generic::{
    DominantCombination, EdgeKey, GraphEdge, GraphNode, PeerState, RouteSecurityConfig, VerifierFingerprint,
};
use crate::names::DvnDirectory;
use crate::protocol::ProtocolSettings;

// ============================================================================
// ANNOTATIONS
// ============================================================================

/// Analysis result of one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeAnnotation {
    pub key: EdgeKey,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    /// Set for non-blocked edges whose destination route has a tracked config
    pub fingerprint: Option<VerifierFingerprint>,
    pub differs_from_popular: bool,
    pub differences: Vec<String>,
}

/// Analysis result of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAnnotation {
    pub id: NodeId,
    pub is_blocked: bool,
}

/// Annotations of a whole graph, in the order of the analyzed slices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphAnnotations {
    pub dominant: Option<DominantCombination>,
    pub edges: Vec<EdgeAnnotation>,
    pub nodes: Vec<NodeAnnotation>,
}

impl GraphAnnotations {
    /// Writes the annotations onto the analyzed nodes and edges.
    ///
    /// `nodes` and `edges` must be the slices passed to [`GraphAnalyzer::analyze`].
    pub fn apply(&self, nodes: &mut [GraphNode], edges: &mut [GraphEdge]) {
        for (edge, annotation) in edges.iter_mut().zip(&self.edges) {
            edge.is_blocked = annotation.is_blocked;
            if edge.block_reason_hint.is_none() {
                edge.block_reason_hint = annotation.block_reason.clone();
            }
            edge.fingerprint = annotation.fingerprint.clone();
            edge.differs_from_popular = annotation.differs_from_popular;
            edge.differences = annotation.differences.clone();
        }
        for (node, annotation) in nodes.iter_mut().zip(&self.nodes) {
            node.is_blocked = annotation.is_blocked;
        }
    }
}

// ============================================================================
// GRAPH ANALYZER
// ============================================================================

/// Stateless analyzer of crawled graphs.
pub struct GraphAnalyzer {
    settings: Arc<ProtocolSettings>,
    directory: Arc<DvnDirectory>,
}

impl GraphAnalyzer {
    pub fn new(settings: Arc<ProtocolSettings>, directory: Arc<DvnDirectory>) -> Self {
        Self { settings, directory }
    }

    /// Annotates a crawled graph.
    ///
    /// The seed is the node at depth 0 and is never marked blocked.
    pub fn analyze(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> GraphAnnotations {
        let by_id: HashMap<&NodeId, &GraphNode> = nodes.iter().map(|n| (&n.id, n)).collect();

        let mut annotations: Vec<EdgeAnnotation> = edges
            .iter()
            .map(|edge| {
                let config = by_id.get(&edge.to).and_then(|n| n.config_for(edge.src_eid));
                self.annotate_edge(edge, config)
            })
            .collect();

        let dominant = dominant_combination(&annotations);
        if let Some(dominant) = &dominant {
            let max_required = annotations
                .iter()
                .filter_map(|a| a.fingerprint.as_ref())
                .map(|f| f.required_count)
                .max()
                .unwrap_or(0);
            for annotation in annotations.iter_mut() {
                let Some(fingerprint) = &annotation.fingerprint else { continue };
                if *fingerprint == dominant.fingerprint {
                    continue;
                }
                annotation.differences = differences(fingerprint, &dominant.fingerprint, max_required);
                annotation.differs_from_popular = true;
            }
        }

        let node_annotations = nodes
            .iter()
            .map(|node| NodeAnnotation {
                id: node.id.clone(),
                is_blocked: node.depth != 0 && structurally_blocked(node, edges, &annotations),
            })
            .collect();

        debug!(
            "Analyzed graph: {} node(s), {} edge(s), dominant {:?}",
            nodes.len(),
            edges.len(),
            dominant.as_ref().map(|d| &d.fingerprint)
        );

        GraphAnnotations {
            dominant,
            edges: annotations,
            nodes: node_annotations,
        }
    }

    fn annotate_edge(&self, edge: &GraphEdge, config: Option<&RouteSecurityConfig>) -> EdgeAnnotation {
        let eid = edge.to.local_eid;
        let blocking_dvn = config.and_then(|c| {
            c.required_dvns
                .iter()
                .find(|dvn| self.settings.is_blocking_dvn(dvn, self.directory.name_of(eid, dvn)))
        });

        let (is_blocked, block_reason) = if edge.peer_state.is_blocked() {
            let reason = edge
                .block_reason_hint
                .clone()
                .unwrap_or_else(|| format!("peer {}", peer_state_label(edge.peer_state)));
            (true, Some(reason))
        } else if let Some(dvn) = blocking_dvn {
            (true, Some(format!("blocking DVN {}", self.directory.display_name(eid, dvn))))
        } else {
            (false, None)
        };

        let fingerprint = match config {
            Some(config) if !is_blocked && config.is_config_tracked => Some(self.fingerprint(eid, config)),
            _ => None,
        };

        EdgeAnnotation {
            key: edge.key(),
            is_blocked,
            block_reason,
            fingerprint,
            differs_from_popular: false,
            differences: Vec::new(),
        }
    }

    /// `(required count, sorted lowercased DVN names, sentinel)` of a route.
    pub fn fingerprint(&self, eid: u32, config: &RouteSecurityConfig) -> VerifierFingerprint {
        let mut verifiers: Vec<String> = config
            .required_dvns
            .iter()
            .map(|dvn| self.directory.display_name(eid, dvn).to_lowercase())
            .collect();
        verifiers.sort();
        VerifierFingerprint {
            required_count: config.required_dvn_count.unwrap_or(0),
            verifiers,
            sentinel: config.uses_required_dvn_sentinel,
        }
    }
}

/// Largest fingerprint group, preferring non-sentinel groups.
///
/// Ties go to the higher required count, then to the smaller fingerprint.
fn dominant_combination(annotations: &[EdgeAnnotation]) -> Option<DominantCombination> {
    let mut groups: BTreeMap<&VerifierFingerprint, usize> = BTreeMap::new();
    for fingerprint in annotations.iter().filter_map(|a| a.fingerprint.as_ref()) {
        *groups.entry(fingerprint).or_default() += 1;
    }

    let has_regular = groups.keys().any(|f| !f.sentinel);
    let mut best: Option<(&VerifierFingerprint, usize)> = None;
    // ascending key order, so strict comparison keeps the smaller fingerprint on ties
    for (fingerprint, count) in groups.into_iter().filter(|(f, _)| !has_regular || !f.sentinel) {
        let better = match best {
            None => true,
            Some((current, current_count)) => {
                (count, fingerprint.required_count) > (current_count, current.required_count)
            }
        };
        if better {
            best = Some((fingerprint, count));
        }
    }

    best.map(|(fingerprint, edge_count)| DominantCombination {
        fingerprint: fingerprint.clone(),
        edge_count,
    })
}

/// Human-readable reasons why `fingerprint` differs from the dominant one.
fn differences(fingerprint: &VerifierFingerprint, dominant: &VerifierFingerprint, max_required: u8) -> Vec<String> {
    let mut reasons = Vec::new();
    if fingerprint.required_count != dominant.required_count {
        reasons.push(format!(
            "required count {} vs dominant {}",
            fingerprint.required_count, dominant.required_count
        ));
    }
    if fingerprint.verifiers != dominant.verifiers {
        reasons.push(format!(
            "verifier set [{}] vs dominant [{}]",
            fingerprint.verifiers.join(", "),
            dominant.verifiers.join(", ")
        ));
    }
    if fingerprint.sentinel && !dominant.sentinel {
        reasons.push("uses sentinel quorum (zero required DVNs)".to_string());
    }
    if fingerprint.required_count < max_required {
        reasons.push(format!(
            "required count {} below maximum observed {}",
            fingerprint.required_count, max_required
        ));
    }
    reasons
}

/// All inbound edges blocked, or dangling with no inbound edge.
fn structurally_blocked(node: &GraphNode, edges: &[GraphEdge], annotations: &[EdgeAnnotation]) -> bool {
    let mut inbound = edges
        .iter()
        .zip(annotations)
        .filter(|(edge, _)| edge.to == node.id)
        .peekable();

    if inbound.peek().is_none() {
        return node.is_dangling;
    }
    inbound.all(|(_, annotation)| annotation.is_blocked)
}

fn peer_state_label(state: PeerState) -> &'static str {
    match state {
        PeerState::Resolved => "resolved",
        PeerState::ExplicitBlocked => "explicitly blocked",
        PeerState::ImplicitBlocked => "implicitly blocked",
        PeerState::NotConfigured => "not configured",
        PeerState::StalePeer => "stale",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(count: u8, names: &[&str], sentinel: bool) -> VerifierFingerprint {
        VerifierFingerprint {
            required_count: count,
            verifiers: names.iter().map(|n| n.to_string()).collect(),
            sentinel,
        }
    }

    fn annotated(fingerprint: VerifierFingerprint) -> EdgeAnnotation {
        EdgeAnnotation {
            key: EdgeKey {
                from: NodeId::new(1, "0x01").unwrap(),
                to: NodeId::new(2, "0x02").unwrap(),
                src_eid: 1,
            },
            is_blocked: false,
            block_reason: None,
            fingerprint: Some(fingerprint),
            differs_from_popular: false,
            differences: Vec::new(),
        }
    }

    #[test]
    fn test_dominant_prefers_higher_required_count_on_tie() {
        let annotations = vec![annotated(fp(1, &["a"], false)), annotated(fp(2, &["a", "b"], false))];
        let dominant = dominant_combination(&annotations).unwrap();
        assert_eq!(dominant.fingerprint, fp(2, &["a", "b"], false));
    }

    #[test]
    fn test_dominant_ignores_sentinel_groups_when_others_exist() {
        let annotations = vec![
            annotated(fp(0, &[], true)),
            annotated(fp(0, &[], true)),
            annotated(fp(1, &["a"], false)),
        ];
        let dominant = dominant_combination(&annotations).unwrap();
        assert_eq!(dominant.fingerprint, fp(1, &["a"], false));
        assert_eq!(dominant.edge_count, 1);
    }

    #[test]
    fn test_dominant_falls_back_to_sentinel_groups() {
        let annotations = vec![annotated(fp(0, &[], true))];
        assert!(dominant_combination(&annotations).unwrap().fingerprint.sentinel);
    }
}
