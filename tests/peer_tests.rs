//! Unit tests for peer resolution
//!
//! These tests verify the classification order of peer records and the
//! symmetry check against the remote application's reverse record.

use security_graph::address::{AddressError, AddressMarkers};
use security_graph::graph::{PeerResolver, PeerState, PeerStateHint};

#[path = "mod.rs"]
mod test_helpers;
use test_helpers::{
    create_peer, create_peer_with_hint, node, to_bytes32, DUMMY_LOCAL_EID, DUMMY_OAPP_OTHER, DUMMY_OAPP_PEER,
    DUMMY_OAPP_SEED, DUMMY_REMOTE_EID,
};

const ZERO_BYTES32: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

fn resolver() -> PeerResolver {
    PeerResolver::new(AddressMarkers::default())
}

// ============================================================================
// CLASSIFICATION TESTS
// ============================================================================

/// What is tested: A bytes32 pointer resolves to the remote application
/// Why: The padding must be stripped so the remote id matches its own records
#[test]
fn test_resolved_peer() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let remote = node(DUMMY_REMOTE_EID, DUMMY_OAPP_PEER);

    let info = resolver().resolve_peer(&create_peer(&owner, &remote)).unwrap();

    assert_eq!(info.state, PeerState::Resolved);
    assert_eq!(info.remote, Some(remote));
    assert!(info.reason.is_none());
}

/// What is tested: A zero pointer is explicitly blocked, whatever the hint says
/// Why: Setting the peer to zero is the protocol's way to close a pathway
#[test]
fn test_zero_pointer_is_explicit_blocked() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let record = create_peer_with_hint(&owner, DUMMY_REMOTE_EID, Some(ZERO_BYTES32), PeerStateHint::Resolved, true);

    let info = resolver().resolve_peer(&record).unwrap();

    assert_eq!(info.state, PeerState::ExplicitBlocked);
    assert!(info.remote.is_none());
    assert_eq!(info.reason.as_deref(), Some("peer explicitly set to zero"));
}

/// What is tested: The explicit-blocked hint keeps the derivable remote
/// Why: The edge can still be drawn to the remote while being marked blocked
#[test]
fn test_explicit_hint_keeps_remote() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let pointer = to_bytes32(DUMMY_OAPP_PEER);
    let record = create_peer_with_hint(
        &owner,
        DUMMY_REMOTE_EID,
        Some(&pointer),
        PeerStateHint::ExplicitBlocked,
        false,
    );

    let info = resolver().resolve_peer(&record).unwrap();

    assert_eq!(info.state, PeerState::ExplicitBlocked);
    assert_eq!(info.remote, Some(node(DUMMY_REMOTE_EID, DUMMY_OAPP_PEER)));
}

/// What is tested: Delivery-inferred routes resolve unless the hint says implicit-blocked
/// Why: A delivered message proves the route, but an unset peer still rejects traffic
#[test]
fn test_inferred_from_delivery() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let pointer = to_bytes32(DUMMY_OAPP_PEER);

    let resolved = create_peer_with_hint(&owner, DUMMY_REMOTE_EID, Some(&pointer), PeerStateHint::Resolved, true);
    assert_eq!(resolver().resolve_peer(&resolved).unwrap().state, PeerState::Resolved);

    let blocked = create_peer_with_hint(
        &owner,
        DUMMY_REMOTE_EID,
        Some(&pointer),
        PeerStateHint::ImplicitBlocked,
        true,
    );
    let info = resolver().resolve_peer(&blocked).unwrap();
    assert_eq!(info.state, PeerState::ImplicitBlocked);
    assert_eq!(info.remote, Some(node(DUMMY_REMOTE_EID, DUMMY_OAPP_PEER)));
    assert_eq!(info.reason.as_deref(), Some("no peer set; route inferred from delivery"));

    let no_sender = create_peer_with_hint(&owner, DUMMY_REMOTE_EID, None, PeerStateHint::Resolved, true);
    let info = resolver().resolve_peer(&no_sender).unwrap();
    assert_eq!(info.state, PeerState::ImplicitBlocked);
    assert!(info.remote.is_none());
}

/// What is tested: Implicit-blocked hint without delivery evidence
/// Why: The indexer's classification applies when no pointer was ever set
#[test]
fn test_implicit_hint() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let record = create_peer_with_hint(&owner, DUMMY_REMOTE_EID, None, PeerStateHint::ImplicitBlocked, false);

    let info = resolver().resolve_peer(&record).unwrap();

    assert_eq!(info.state, PeerState::ImplicitBlocked);
    assert_eq!(info.reason.as_deref(), Some("no peer set for source endpoint"));
}

/// What is tested: Missing or blank pointer is not configured
/// Why: Blank strings from the indexer must not be parsed as addresses
#[test]
fn test_missing_pointer_not_configured() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    for pointer in [None, Some("  ")] {
        let record = create_peer_with_hint(&owner, DUMMY_REMOTE_EID, pointer, PeerStateHint::NotConfigured, false);
        let info = resolver().resolve_peer(&record).unwrap();
        assert_eq!(info.state, PeerState::NotConfigured);
        assert!(info.state.is_blocked());
    }
}

/// What is tested: A malformed pointer is an error, not a state
/// Why: The crawler skips such routes and reports them
#[test]
fn test_malformed_pointer_is_error() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let record = create_peer_with_hint(&owner, DUMMY_REMOTE_EID, Some("0xnothex"), PeerStateHint::Resolved, false);

    let result = resolver().resolve_peer(&record);

    assert!(matches!(result, Err(AddressError::InvalidHex(_))));
}

// ============================================================================
// SYMMETRY TESTS
// ============================================================================

/// What is tested: A reverse record pointing elsewhere makes the route stale
/// Why: Asymmetric peers mean the two applications do not accept each other
#[test]
fn test_symmetry_detects_stale_peer() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let remote = node(DUMMY_REMOTE_EID, DUMMY_OAPP_PEER);
    let elsewhere = node(DUMMY_LOCAL_EID, DUMMY_OAPP_OTHER);
    let resolver = resolver();

    let info = resolver.resolve_peer(&create_peer(&owner, &remote)).unwrap();
    let reverse = create_peer(&remote, &elsewhere);
    let checked = resolver.check_symmetry(info, &owner, Some(&reverse));

    assert_eq!(checked.state, PeerState::StalePeer);
    assert_eq!(checked.remote, Some(remote));
    assert_eq!(
        checked.reason,
        Some(format!("remote peer points at {} instead", elsewhere))
    );
}

/// What is tested: Symmetric, missing and non-resolved cases are left alone
/// Why: Only a positive mismatch downgrades a route
#[test]
fn test_symmetry_keeps_consistent_routes() {
    let owner = node(DUMMY_LOCAL_EID, DUMMY_OAPP_SEED);
    let remote = node(DUMMY_REMOTE_EID, DUMMY_OAPP_PEER);
    let resolver = resolver();
    let info = resolver.resolve_peer(&create_peer(&owner, &remote)).unwrap();

    let reverse = create_peer(&remote, &owner);
    assert_eq!(
        resolver.check_symmetry(info.clone(), &owner, Some(&reverse)).state,
        PeerState::Resolved
    );
    assert_eq!(resolver.check_symmetry(info, &owner, None).state, PeerState::Resolved);

    let blocked = resolver
        .resolve_peer(&create_peer_with_hint(
            &owner,
            DUMMY_REMOTE_EID,
            None,
            PeerStateHint::ImplicitBlocked,
            false,
        ))
        .unwrap();
    let elsewhere = create_peer(&remote, &node(DUMMY_LOCAL_EID, DUMMY_OAPP_OTHER));
    assert_eq!(
        resolver.check_symmetry(blocked, &owner, Some(&elsewhere)).state,
        PeerState::ImplicitBlocked
    );
}
