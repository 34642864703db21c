//! Address Normalization Module
//!
//! Canonicalizes on-chain identifiers so that records coming from different
//! indexer tables (20-byte addresses, bytes32 peer pointers, mixed case hex)
//! compare equal. Also defines the node and route identifiers used by the
//! resolver and the graph crawler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Canonical zero address (reserved, never a valid DVN or peer)
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Canonical "dead" address used by the protocol to block pathways
pub const DEAD_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

/// Bytes in an address
const ADDRESS_BYTES: usize = 20;

/// Bytes in a bytes32 value
const BYTES32_BYTES: usize = 32;

/// Hex characters in a bytes32 value (without the 0x prefix)
const BYTES32_HEX_LEN: usize = 64;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors produced while parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Input was empty (or only a `0x` prefix)
    #[error("empty address")]
    Empty,
    /// Input contained non-hex characters
    #[error("invalid hex in address '{0}'")]
    InvalidHex(String),
    /// Input is wider than a bytes32 value
    #[error("address '{0}' is wider than 32 bytes")]
    TooLong(String),
    /// Node id is not of the form `{eid}_{address}`
    #[error("malformed node id '{0}'")]
    MalformedNodeId(String),
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalizes an address or bytes32 pointer to lowercase `0x`-prefixed hex.
///
/// Values that fit in 20 bytes become `0x` + 40 hex chars: shorter inputs are
/// left-padded and the zero padding of bytes32 peer pointers is stripped.
/// Wider values (32-byte addresses of Move chains, for example) keep their
/// full width as `0x` + 64 hex chars, so distinct applications never collide.
///
/// # Arguments
///
/// * `input` - Address with or without the `0x` prefix
///
/// # Returns
///
/// * `Ok(String)` - Normalized address
/// * `Err(AddressError)` - Input is empty, not hex, or wider than 32 bytes
pub fn normalize_address(input: &str) -> Result<String, AddressError> {
    let trimmed = input.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if stripped.is_empty() {
        return Err(AddressError::Empty);
    }
    if stripped.len() > BYTES32_HEX_LEN {
        return Err(AddressError::TooLong(input.to_string()));
    }

    // hex::decode wants whole bytes
    let padded = format!("{:0>width$}", stripped, width = stripped.len() + stripped.len() % 2);
    let bytes = hex::decode(&padded).map_err(|_| AddressError::InvalidHex(input.to_string()))?;

    let high = bytes.len().saturating_sub(ADDRESS_BYTES);
    if bytes[..high].iter().all(|&b| b == 0) {
        Ok(format!("0x{:0>40}", hex::encode(&bytes[high..])))
    } else {
        Ok(format!("0x{:0>width$}", hex::encode(&bytes), width = BYTES32_BYTES * 2))
    }
}

/// Reduces a bytes32 peer pointer to an address.
///
/// Same as [`normalize_address`]; kept as a separate name so call sites read
/// as what they decode.
pub fn bytes32_to_address(peer: &str) -> Result<String, AddressError> {
    normalize_address(peer)
}

/// Normalizes a list of addresses, reporting the first malformed entry.
pub fn normalize_addresses(inputs: &[String]) -> Result<Vec<String>, AddressError> {
    inputs.iter().map(|a| normalize_address(a)).collect()
}

// ============================================================================
// RESERVED ADDRESS MARKERS
// ============================================================================

/// Reserved marker addresses, passed to components at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMarkers {
    /// Zero address (normalized)
    pub zero: String,
    /// Dead address (normalized)
    pub dead: String,
}

impl Default for AddressMarkers {
    fn default() -> Self {
        Self {
            zero: ZERO_ADDRESS.to_string(),
            dead: DEAD_ADDRESS.to_string(),
        }
    }
}

impl AddressMarkers {
    /// Builds markers from a configured dead address.
    pub fn with_dead_address(dead: &str) -> Result<Self, AddressError> {
        Ok(Self {
            zero: ZERO_ADDRESS.to_string(),
            dead: normalize_address(dead)?,
        })
    }

    /// Returns true if the input normalizes to the zero address.
    ///
    /// Unparseable input is not considered zero.
    pub fn is_zero(&self, address: &str) -> bool {
        normalize_address(address).map(|a| a == self.zero).unwrap_or(false)
    }

    /// Returns true if the input normalizes to the dead address.
    pub fn is_dead(&self, address: &str) -> bool {
        normalize_address(address).map(|a| a == self.dead).unwrap_or(false)
    }

    /// Returns true for either reserved marker.
    pub fn is_reserved(&self, address: &str) -> bool {
        self.is_zero(address) || self.is_dead(address)
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Identifier of an application endpoint: `(localEid, address)`.
///
/// Serialized as `"{eid}_{address}"`, the id format used by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    /// Endpoint id of the chain the application lives on
    pub local_eid: u32,
    /// Normalized application address
    pub address: String,
}

impl NodeId {
    /// Creates a node id, normalizing the address.
    pub fn new(local_eid: u32, address: &str) -> Result<Self, AddressError> {
        Ok(Self {
            local_eid,
            address: normalize_address(address)?,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.local_eid, self.address)
    }
}

impl FromStr for NodeId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (eid, address) = s
            .split_once('_')
            .ok_or_else(|| AddressError::MalformedNodeId(s.to_string()))?;
        let local_eid = eid
            .parse::<u32>()
            .map_err(|_| AddressError::MalformedNodeId(s.to_string()))?;
        Self::new(local_eid, address)
    }
}

impl TryFrom<String> for NodeId {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// Scope of one route: the receiving node and the source endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    /// Receiving application
    pub node: NodeId,
    /// Source endpoint id
    pub src_eid: u32,
}

impl RouteKey {
    pub fn new(node: NodeId, src_eid: u32) -> Self {
        Self { node, src_eid }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<-{}", self.node, self.src_eid)
    }
}
