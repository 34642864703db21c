//! Peer Resolver
//!
//! Classifies the peer pointer of a route and derives the remote application
//! it connects to. The symmetry check compares a resolved route against the
//! remote application's own record for the reverse direction.

use tracing::debug;

use crate::address::{bytes32_to_address, AddressError, AddressMarkers, NodeId};
use crate::graph::generic::{PeerInfo, PeerRecord, PeerState, PeerStateHint};

/// Stateless classifier of peer records.
#[derive(Debug, Clone, Default)]
pub struct PeerResolver {
    markers: AddressMarkers,
}

impl PeerResolver {
    pub fn new(markers: AddressMarkers) -> Self {
        Self { markers }
    }

    /// Classifies one peer record.
    ///
    /// Decision order:
    /// 1. zero pointer or explicit-blocked hint: explicit-blocked
    /// 2. route inferred from delivery only: resolved if a peer can be derived
    ///    and the hint does not say implicit-blocked, otherwise implicit-blocked
    /// 3. implicit-blocked hint: implicit-blocked
    /// 4. no pointer: not-configured
    /// 5. anything else: resolved to `(src_eid, pointer address)`
    ///
    /// # Returns
    ///
    /// * `Ok(PeerInfo)` - Classified route
    /// * `Err(AddressError)` - The pointer cannot be parsed; the caller skips the route
    pub fn resolve_peer(&self, record: &PeerRecord) -> Result<PeerInfo, AddressError> {
        let derived = match record.peer.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(bytes32_to_address(raw)?),
            _ => None,
        };
        let is_zero = derived.as_deref().map(|a| a == self.markers.zero).unwrap_or(false);
        let remote = derived
            .filter(|a| *a != self.markers.zero)
            .map(|address| NodeId {
                local_eid: record.src_eid,
                address,
            });

        let info = if is_zero || record.state_hint == PeerStateHint::ExplicitBlocked {
            PeerInfo {
                state: PeerState::ExplicitBlocked,
                remote,
                reason: Some("peer explicitly set to zero".to_string()),
            }
        } else if record.inferred_from_delivery {
            match remote {
                Some(remote) if record.state_hint != PeerStateHint::ImplicitBlocked => PeerInfo {
                    state: PeerState::Resolved,
                    remote: Some(remote),
                    reason: None,
                },
                remote => PeerInfo {
                    state: PeerState::ImplicitBlocked,
                    remote,
                    reason: Some("no peer set; route inferred from delivery".to_string()),
                },
            }
        } else if record.state_hint == PeerStateHint::ImplicitBlocked {
            PeerInfo {
                state: PeerState::ImplicitBlocked,
                remote,
                reason: Some("no peer set for source endpoint".to_string()),
            }
        } else if remote.is_none() {
            PeerInfo {
                state: PeerState::NotConfigured,
                remote: None,
                reason: Some("peer not configured".to_string()),
            }
        } else {
            PeerInfo {
                state: PeerState::Resolved,
                remote,
                reason: None,
            }
        };

        debug!("Resolved peer of {}: {:?}", record.route_key(), info.state);
        Ok(info)
    }

    /// Checks that the remote application's record points back at `observed`.
    ///
    /// Only resolved routes are checked. If the remote's record for the
    /// reverse direction points at a different application, the route becomes
    /// stale. A missing or unparseable reverse record leaves the route as is.
    ///
    /// # Arguments
    ///
    /// * `info` - Resolved state of the route received by `observed`
    /// * `observed` - Application that owns the route
    /// * `reverse` - Remote application's record for source `observed.local_eid`
    pub fn check_symmetry(&self, info: PeerInfo, observed: &NodeId, reverse: Option<&PeerRecord>) -> PeerInfo {
        if info.state != PeerState::Resolved {
            return info;
        }
        let Some(reverse) = reverse else {
            return info;
        };
        let Ok(reverse_info) = self.resolve_peer(reverse) else {
            return info;
        };

        match reverse_info.remote {
            Some(back) if back != *observed => PeerInfo {
                state: PeerState::StalePeer,
                remote: info.remote,
                reason: Some(format!("remote peer points at {} instead", back)),
            },
            _ => info,
        }
    }
}
