//! Generic resolver structures
//!
//! Record types shared by the merge engine, the cascade recomputer and the
//! stores: protocol defaults, per-application overrides and the derived
//! effective configuration. Field names serialize in the indexer's camelCase
//! form so GraphQL rows deserialize directly into these types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::{NodeId, RouteKey};

// ============================================================================
// RAW CONFIG RECORDS
// ============================================================================

/// ULN security fields shared by default and override records.
///
/// Every field is optional. A zero value means "inherit the default"; the max
/// value of the field type means "explicitly zero".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlnConfig {
    /// Receive library address
    #[serde(default)]
    pub library: Option<String>,
    /// Block confirmations required before verification
    #[serde(default)]
    pub confirmations: Option<u64>,
    /// Number of required DVNs (255 = explicitly none)
    #[serde(rename = "requiredDVNCount", default)]
    pub required_dvn_count: Option<u8>,
    /// Required DVN addresses
    #[serde(rename = "requiredDVNs", default)]
    pub required_dvns: Vec<String>,
    /// Number of optional DVNs (255 = explicitly none)
    #[serde(rename = "optionalDVNCount", default)]
    pub optional_dvn_count: Option<u8>,
    /// Optional DVN addresses
    #[serde(rename = "optionalDVNs", default)]
    pub optional_dvns: Vec<String>,
    /// Optional DVN signatures required
    #[serde(rename = "optionalDVNThreshold", default)]
    pub optional_dvn_threshold: Option<u8>,
}

/// Scope of a protocol default: the pathway `srcEid -> localEid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultScope {
    /// Receiving endpoint
    pub local_eid: u32,
    /// Source endpoint
    pub src_eid: u32,
}

impl fmt::Display for DefaultScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<-{}", self.local_eid, self.src_eid)
    }
}

/// Current protocol default for one pathway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultConfig {
    /// Receiving endpoint
    #[serde(rename = "eid")]
    pub local_eid: u32,
    /// Source endpoint
    pub src_eid: u32,
    /// Default security fields
    #[serde(flatten)]
    pub config: UlnConfig,
}

impl DefaultConfig {
    pub fn scope(&self) -> DefaultScope {
        DefaultScope {
            local_eid: self.local_eid,
            src_eid: self.src_eid,
        }
    }
}

/// Immutable history entry appended on every default change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultConfigChange {
    /// Id of the event that changed the default
    pub event_id: String,
    /// Block the event was emitted in
    pub block_number: u64,
    /// Default after the change
    pub config: DefaultConfig,
}

/// One application's explicit security choice for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConfig {
    /// Receiving application
    pub oapp_id: NodeId,
    /// Source endpoint
    pub src_eid: u32,
    /// Override security fields
    #[serde(flatten)]
    pub config: UlnConfig,
}

impl OverrideConfig {
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.oapp_id.clone(), self.src_eid)
    }
}

// ============================================================================
// EFFECTIVE CONFIG
// ============================================================================

/// Field of an effective config that deferred to the protocol default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FallbackField {
    #[serde(rename = "library")]
    Library,
    #[serde(rename = "confirmations")]
    Confirmations,
    #[serde(rename = "requiredDVNCount")]
    RequiredDvnCount,
    #[serde(rename = "requiredDVNs")]
    RequiredDvns,
    #[serde(rename = "optionalDVNCount")]
    OptionalDvnCount,
    #[serde(rename = "optionalDVNs")]
    OptionalDvns,
    #[serde(rename = "optionalDVNThreshold")]
    OptionalDvnThreshold,
}

impl FallbackField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackField::Library => "library",
            FallbackField::Confirmations => "confirmations",
            FallbackField::RequiredDvnCount => "requiredDVNCount",
            FallbackField::RequiredDvns => "requiredDVNs",
            FallbackField::OptionalDvnCount => "optionalDVNCount",
            FallbackField::OptionalDvns => "optionalDVNs",
            FallbackField::OptionalDvnThreshold => "optionalDVNThreshold",
        }
    }
}

impl fmt::Display for FallbackField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merged, queryable security posture for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    /// Receiving application
    pub oapp_id: NodeId,
    /// Source endpoint
    pub src_eid: u32,
    /// Effective receive library
    #[serde(default)]
    pub library: Option<String>,
    /// Library came from the protocol default
    #[serde(default)]
    pub uses_default_library: bool,
    /// Library is a recognized verification library on this chain
    #[serde(default)]
    pub is_config_tracked: bool,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub uses_confirmations_sentinel: bool,
    #[serde(rename = "requiredDVNCount", default)]
    pub required_dvn_count: Option<u8>,
    #[serde(rename = "requiredDVNs", default)]
    pub required_dvns: Vec<String>,
    #[serde(rename = "optionalDVNCount", default)]
    pub optional_dvn_count: Option<u8>,
    #[serde(rename = "optionalDVNs", default)]
    pub optional_dvns: Vec<String>,
    #[serde(rename = "optionalDVNThreshold", default)]
    pub optional_dvn_threshold: Option<u8>,
    /// Threshold before it was capped to the optional count (audit only)
    #[serde(rename = "optionalDVNThresholdUncapped", default)]
    pub optional_dvn_threshold_uncapped: Option<u8>,
    #[serde(rename = "usesRequiredDVNSentinel", default)]
    pub uses_required_dvn_sentinel: bool,
    #[serde(rename = "usesOptionalDVNSentinel", default)]
    pub uses_optional_dvn_sentinel: bool,
    /// Fields whose override deferred to the default, in field order
    #[serde(default)]
    pub fallback_fields: Vec<FallbackField>,
    /// Security posture is identical to the protocol default
    #[serde(default)]
    pub uses_default_config: bool,
}

impl EffectiveConfig {
    /// Creates an untracked config with every security field unset.
    pub fn untracked(route: &RouteKey) -> Self {
        Self {
            oapp_id: route.node.clone(),
            src_eid: route.src_eid,
            library: None,
            uses_default_library: false,
            is_config_tracked: false,
            confirmations: None,
            uses_confirmations_sentinel: false,
            required_dvn_count: None,
            required_dvns: Vec::new(),
            optional_dvn_count: None,
            optional_dvns: Vec::new(),
            optional_dvn_threshold: None,
            optional_dvn_threshold_uncapped: None,
            uses_required_dvn_sentinel: false,
            uses_optional_dvn_sentinel: false,
            fallback_fields: Vec::new(),
            uses_default_config: false,
        }
    }

    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.oapp_id.clone(), self.src_eid)
    }

    /// Compares the security posture field by field.
    ///
    /// Includes sentinel flags; DVN lists are compared in order.
    pub fn same_security_posture(&self, other: &EffectiveConfig) -> bool {
        self.library == other.library
            && self.confirmations == other.confirmations
            && self.uses_confirmations_sentinel == other.uses_confirmations_sentinel
            && self.required_dvn_count == other.required_dvn_count
            && self.required_dvns == other.required_dvns
            && self.optional_dvn_count == other.optional_dvn_count
            && self.optional_dvns == other.optional_dvns
            && self.optional_dvn_threshold == other.optional_dvn_threshold
            && self.uses_required_dvn_sentinel == other.uses_required_dvn_sentinel
            && self.uses_optional_dvn_sentinel == other.uses_optional_dvn_sentinel
    }
}
