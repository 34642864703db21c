//! Ranking of applications by received packets.

use std::collections::{HashMap, HashSet};

use super::OAppStats;
use crate::address::NodeId;

/// Orders application ids by their rank in `stats` and removes duplicates.
///
/// `stats` is expected in descending packet order. Ids without stats go last,
/// keeping their input order. The first occurrence of an id wins.
pub fn order_by_packets_received(stats: &[OAppStats], oapp_ids: Vec<NodeId>) -> Vec<NodeId> {
    let rank: HashMap<&NodeId, usize> = stats
        .iter()
        .enumerate()
        .map(|(i, s)| (&s.id, i))
        .rev()
        .collect();

    let mut ordered: Vec<(usize, usize, NodeId)> = oapp_ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| (rank.get(&id).copied().unwrap_or(usize::MAX), i, id))
        .collect();
    // stable on input position for equal ranks
    ordered.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter_map(|(_, _, id)| if seen.insert(id.clone()) { Some(id) } else { None })
        .collect()
}
