//! Shared test helpers for unit tests
//!
//! This module provides helper functions used by unit tests.
//!
//! The module is organized into several categories:
//! - **Constants**: Dummy eids, libraries, DVNs and application addresses
//! - **Configuration Builders**: Functions to create test configurations and components
//! - **Record Builders**: Functions to create default, override, peer and stat records

use std::sync::Arc;

use security_graph::address::NodeId;
use security_graph::config::{
    ApiConfig, ChainConfig, Config, CrawlerConfig, DvnNameConfig, IndexerConfig, ProtocolConfig,
};
use security_graph::graph::{PeerRecord, PeerStateHint, RouteStat};
use security_graph::names::DvnDirectory;
use security_graph::protocol::ProtocolSettings;
use security_graph::resolver::{ConfigMergeEngine, DefaultConfig, OverrideConfig, UlnConfig};

// ============================================================================
// CONSTANTS
// ============================================================================

// --------------------------------- EIDS ---------------------------------

/// Local endpoint id used for most applications under test
pub const DUMMY_LOCAL_EID: u32 = 30101;

/// Remote endpoint id
pub const DUMMY_REMOTE_EID: u32 = 30110;

/// Third endpoint id, for dangling and multi-hop graphs
#[allow(dead_code)]
pub const DUMMY_THIRD_EID: u32 = 30184;

// ------------------------------ LIBRARIES -------------------------------

/// Recognized receive library on DUMMY_LOCAL_EID
pub const DUMMY_RECEIVE_LIB_LOCAL: &str = "0x00000000000000000000000000000000000001b1";

/// Recognized receive library on DUMMY_REMOTE_EID
pub const DUMMY_RECEIVE_LIB_REMOTE: &str = "0x00000000000000000000000000000000000001b2";

/// Recognized receive library on DUMMY_THIRD_EID
pub const DUMMY_RECEIVE_LIB_THIRD: &str = "0x00000000000000000000000000000000000001b3";

/// Library that no chain recognizes
#[allow(dead_code)]
pub const DUMMY_UNTRACKED_LIB: &str = "0x00000000000000000000000000000000000001ff";

// --------------------------------- DVNS ---------------------------------

/// DVN named "Alpha" on every test chain
pub const DUMMY_DVN_A: &str = "0x00000000000000000000000000000000000000a1";

/// DVN named "Beta" on every test chain
pub const DUMMY_DVN_B: &str = "0x00000000000000000000000000000000000000b1";

/// DVN without a display name
#[allow(dead_code)]
pub const DUMMY_DVN_C: &str = "0x00000000000000000000000000000000000000c1";

/// DVN whose display name carries a blocking label
pub const DUMMY_DVN_DEAD_LABEL: &str = "0x00000000000000000000000000000000000000d1";

/// Protocol dead address
#[allow(dead_code)]
pub const DUMMY_DEAD_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

// ----------------------------- APPLICATIONS -----------------------------

/// Seed application address
#[allow(dead_code)]
pub const DUMMY_OAPP_SEED: &str = "0x0000000000000000000000000000000000005eed";

/// Peer application address
#[allow(dead_code)]
pub const DUMMY_OAPP_PEER: &str = "0x000000000000000000000000000000000000beef";

/// Third application address
#[allow(dead_code)]
pub const DUMMY_OAPP_OTHER: &str = "0x000000000000000000000000000000000000c0de";

// ============================================================================
// CONFIGURATION BUILDERS
// ============================================================================

/// Build a test configuration with three chains, DVN names and a local indexer URL
#[allow(dead_code)]
pub fn build_test_config() -> Config {
    build_test_config_with_indexer("http://127.0.0.1:8080/v1/graphql")
}

/// Build a test configuration pointing at a (mock) indexer URL
pub fn build_test_config_with_indexer(graphql_url: &str) -> Config {
    let mut config = Config::default();
    config.indexer = IndexerConfig {
        graphql_url: graphql_url.to_string(),
        admin_secret: None,
        request_timeout_ms: 5000,
    };
    config.protocol = ProtocolConfig {
        dead_address: "0x000000000000000000000000000000000000dead".to_string(),
        blocking_dvn_labels: vec!["lzdeaddvn".to_string()],
        blocking_dvn_addresses: vec![],
        chains: vec![
            ChainConfig {
                eid: DUMMY_LOCAL_EID,
                name: "local".to_string(),
                receive_libraries: vec![DUMMY_RECEIVE_LIB_LOCAL.to_string()],
            },
            ChainConfig {
                eid: DUMMY_REMOTE_EID,
                name: "remote".to_string(),
                receive_libraries: vec![DUMMY_RECEIVE_LIB_REMOTE.to_string()],
            },
            ChainConfig {
                eid: DUMMY_THIRD_EID,
                name: "third".to_string(),
                receive_libraries: vec![DUMMY_RECEIVE_LIB_THIRD.to_string()],
            },
        ],
    };
    config.crawler = CrawlerConfig::default();
    config.api = ApiConfig {
        host: "127.0.0.1".to_string(),
        port: 3340,
        cors_origins: vec!["*".to_string()],
    };
    config.dvn_names = [DUMMY_LOCAL_EID, DUMMY_REMOTE_EID, DUMMY_THIRD_EID]
        .into_iter()
        .flat_map(|eid| {
            [
                (DUMMY_DVN_A, "Alpha"),
                (DUMMY_DVN_B, "Beta"),
                (DUMMY_DVN_DEAD_LABEL, "LZDeadDVN"),
            ]
            .into_iter()
            .map(move |(address, name)| DvnNameConfig {
                eid,
                address: address.to_string(),
                name: name.to_string(),
            })
        })
        .collect();
    config
}

/// Protocol settings of the test configuration
#[allow(dead_code)]
pub fn test_settings() -> Arc<ProtocolSettings> {
    Arc::new(ProtocolSettings::from_config(&build_test_config().protocol).unwrap())
}

/// DVN directory of the test configuration
#[allow(dead_code)]
pub fn test_directory() -> Arc<DvnDirectory> {
    Arc::new(DvnDirectory::from_config(&build_test_config().dvn_names).unwrap())
}

/// Merge engine over the test settings
#[allow(dead_code)]
pub fn test_engine() -> ConfigMergeEngine {
    ConfigMergeEngine::new(test_settings())
}

// ============================================================================
// RECORD BUILDERS
// ============================================================================

/// Node id from an eid and an address
pub fn node(eid: u32, address: &str) -> NodeId {
    NodeId::new(eid, address).unwrap()
}

/// Left-pads a 20-byte address to a bytes32 peer pointer
pub fn to_bytes32(address: &str) -> String {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    format!("0x{:0>64}", stripped)
}

/// Recognized library of a test chain
pub fn library_for(eid: u32) -> &'static str {
    match eid {
        DUMMY_LOCAL_EID => DUMMY_RECEIVE_LIB_LOCAL,
        DUMMY_REMOTE_EID => DUMMY_RECEIVE_LIB_REMOTE,
        _ => DUMMY_RECEIVE_LIB_THIRD,
    }
}

/// Default ULN config with the chain's recognized library and required DVNs
#[allow(dead_code)]
pub fn create_default_config(local_eid: u32, src_eid: u32, required: &[&str]) -> DefaultConfig {
    DefaultConfig {
        local_eid,
        src_eid,
        config: UlnConfig {
            library: Some(library_for(local_eid).to_string()),
            confirmations: Some(15),
            required_dvn_count: Some(required.len() as u8),
            required_dvns: required.iter().map(|a| a.to_string()).collect(),
            ..UlnConfig::default()
        },
    }
}

/// Override record with the given fields
#[allow(dead_code)]
pub fn create_override(oapp: &NodeId, src_eid: u32, config: UlnConfig) -> OverrideConfig {
    OverrideConfig {
        oapp_id: oapp.clone(),
        src_eid,
        config,
    }
}

/// Resolved peer record: `owner` receives from `remote`
#[allow(dead_code)]
pub fn create_peer(owner: &NodeId, remote: &NodeId) -> PeerRecord {
    PeerRecord {
        oapp_id: owner.clone(),
        src_eid: remote.local_eid,
        peer: Some(to_bytes32(&remote.address)),
        state_hint: PeerStateHint::Resolved,
        inferred_from_delivery: false,
    }
}

/// Peer record with an arbitrary pointer and hint
#[allow(dead_code)]
pub fn create_peer_with_hint(
    owner: &NodeId,
    src_eid: u32,
    peer: Option<&str>,
    state_hint: PeerStateHint,
    inferred_from_delivery: bool,
) -> PeerRecord {
    PeerRecord {
        oapp_id: owner.clone(),
        src_eid,
        peer: peer.map(str::to_string),
        state_hint,
        inferred_from_delivery,
    }
}

/// Route stat with a packet count
#[allow(dead_code)]
pub fn create_route_stat(owner: &NodeId, src_eid: u32, packet_count: u64) -> RouteStat {
    RouteStat {
        oapp_id: owner.clone(),
        src_eid,
        packet_count,
        last_packet_block: Some(1000 + packet_count),
        last_packet_timestamp: Some(1_700_000_000 + packet_count),
    }
}
