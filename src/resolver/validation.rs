//! Non-blocking config validation
//!
//! Checks raw and effective configs for inconsistencies. Warnings are logged
//! by the caller and never stop a merge or a crawl.

use thiserror::Error;

use crate::address::AddressMarkers;
use crate::protocol::DVN_COUNT_SENTINEL;
use crate::resolver::generic::{EffectiveConfig, FallbackField, UlnConfig};

/// Inconsistency found in a config record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    /// Declared DVN count disagrees with the number of listed DVNs
    #[error("{field} declares {declared} DVNs but lists {listed}")]
    CountMismatch {
        field: FallbackField,
        declared: u8,
        listed: usize,
    },
    /// Optional threshold exceeds the optional DVN count
    #[error("optional threshold {threshold} exceeds optional DVN count {count}")]
    ThresholdExceedsCount { threshold: u8, count: u8 },
    /// Zero address present in a DVN list
    #[error("zero address listed in {field}")]
    ZeroAddressInList { field: FallbackField },
    /// Dead address present in a DVN list; the pathway can never verify
    #[error("dead address listed in {field}")]
    DeadAddressInList { field: FallbackField },
}

/// Validates a raw default or override record.
pub fn validate_uln_config(config: &UlnConfig, markers: &AddressMarkers) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    check_count(
        FallbackField::RequiredDvns,
        config.required_dvn_count,
        &config.required_dvns,
        &mut warnings,
    );
    check_count(
        FallbackField::OptionalDvns,
        config.optional_dvn_count,
        &config.optional_dvns,
        &mut warnings,
    );

    if let (Some(threshold), Some(count)) = (config.optional_dvn_threshold, config.optional_dvn_count) {
        if count != 0 && count != DVN_COUNT_SENTINEL && threshold > count {
            warnings.push(ConfigWarning::ThresholdExceedsCount { threshold, count });
        }
    }

    check_reserved(FallbackField::RequiredDvns, &config.required_dvns, markers, &mut warnings);
    check_reserved(FallbackField::OptionalDvns, &config.optional_dvns, markers, &mut warnings);

    warnings
}

/// Validates a merged config.
///
/// Threshold capping happens during the merge, so a threshold above the count
/// can only show up here if the record was built elsewhere.
pub fn validate_effective_config(
    config: &EffectiveConfig,
    markers: &AddressMarkers,
) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    if !config.is_config_tracked {
        return warnings;
    }

    check_count(
        FallbackField::RequiredDvns,
        config.required_dvn_count,
        &config.required_dvns,
        &mut warnings,
    );
    check_count(
        FallbackField::OptionalDvns,
        config.optional_dvn_count,
        &config.optional_dvns,
        &mut warnings,
    );

    let count = config.optional_dvn_count.unwrap_or(0);
    if let Some(threshold) = config.optional_dvn_threshold {
        if threshold > count {
            warnings.push(ConfigWarning::ThresholdExceedsCount { threshold, count });
        }
    }

    check_reserved(FallbackField::RequiredDvns, &config.required_dvns, markers, &mut warnings);
    check_reserved(FallbackField::OptionalDvns, &config.optional_dvns, markers, &mut warnings);

    warnings
}

fn check_count(
    field: FallbackField,
    declared: Option<u8>,
    listed: &[String],
    warnings: &mut Vec<ConfigWarning>,
) {
    match declared {
        // sentinel and "inherit" carry no list of their own
        Some(DVN_COUNT_SENTINEL) | Some(0) | None => {}
        Some(declared) if declared as usize != listed.len() => {
            warnings.push(ConfigWarning::CountMismatch {
                field,
                declared,
                listed: listed.len(),
            });
        }
        Some(_) => {}
    }
}

fn check_reserved(
    field: FallbackField,
    listed: &[String],
    markers: &AddressMarkers,
    warnings: &mut Vec<ConfigWarning>,
) {
    if listed.iter().any(|dvn| markers.is_zero(dvn)) {
        warnings.push(ConfigWarning::ZeroAddressInList { field });
    }
    if listed.iter().any(|dvn| markers.is_dead(dvn)) {
        warnings.push(ConfigWarning::DeadAddressInList { field });
    }
}
