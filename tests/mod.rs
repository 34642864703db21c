//! Test module organization
//!
//! This module re-exports test helpers for use in test files.

mod helpers;

#[allow(unused_imports)]
pub use helpers::{
    build_test_config, build_test_config_with_indexer, create_default_config, create_override,
    create_peer, create_peer_with_hint, create_route_stat, library_for, node, test_directory,
    test_engine, test_settings, to_bytes32, DUMMY_DEAD_ADDRESS, DUMMY_DVN_A, DUMMY_DVN_B,
    DUMMY_DVN_C, DUMMY_DVN_DEAD_LABEL, DUMMY_LOCAL_EID, DUMMY_OAPP_OTHER, DUMMY_OAPP_PEER,
    DUMMY_OAPP_SEED, DUMMY_RECEIVE_LIB_LOCAL, DUMMY_RECEIVE_LIB_REMOTE, DUMMY_RECEIVE_LIB_THIRD,
    DUMMY_REMOTE_EID, DUMMY_THIRD_EID, DUMMY_UNTRACKED_LIB,
};
