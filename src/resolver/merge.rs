//! Config Merge Engine
//!
//! Merges the protocol default of a pathway with an application's override
//! into one [`EffectiveConfig`]. Each field is resolved independently with
//! three-state semantics:
//!
//! - zero / absent: inherit the default
//! - any other value: override
//! - max value of the field type (sentinel): explicitly zero
//!
//! The merge never fails. Malformed or inconsistent inputs are merged as given
//! and reported through [`validation`](super::validation) warnings.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::address::{normalize_address, RouteKey};
use crate::protocol::{ProtocolSettings, CONFIRMATIONS_SENTINEL, DVN_COUNT_SENTINEL};
use crate::resolver::generic::{
    DefaultConfig, EffectiveConfig, FallbackField, OverrideConfig, UlnConfig,
};
use crate::resolver::validation::{validate_effective_config, validate_uln_config};

/// Pure, stateless merge of default and override records.
#[derive(Debug, Clone)]
pub struct ConfigMergeEngine {
    settings: Arc<ProtocolSettings>,
}

impl ConfigMergeEngine {
    pub fn new(settings: Arc<ProtocolSettings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// Merges the default and override of one route.
    ///
    /// # Arguments
    ///
    /// * `route` - Receiving application and source endpoint
    /// * `defaults` - Current protocol default for the pathway, if any
    /// * `overrides` - The application's override record, if any
    ///
    /// # Returns
    ///
    /// The effective config. `fallback_fields` is empty when `overrides` is `None`.
    pub fn merge(
        &self,
        route: &RouteKey,
        defaults: Option<&DefaultConfig>,
        overrides: Option<&OverrideConfig>,
    ) -> EffectiveConfig {
        let default_fields = defaults.map(|d| &d.config);
        let override_fields = overrides.map(|o| &o.config);

        for (kind, fields) in [("default", default_fields), ("override", override_fields)] {
            if let Some(fields) = fields {
                for warning in validate_uln_config(fields, &self.settings.markers) {
                    warn!("Config validation ({}) for route {}: {}", kind, route, warning);
                }
            }
        }

        let mut effective = self.merge_fields(route, default_fields, override_fields);

        if effective.is_config_tracked {
            effective.uses_default_config = match override_fields {
                None => true,
                Some(_) => {
                    let baseline = self.merge_fields(route, default_fields, None);
                    baseline.is_config_tracked && effective.same_security_posture(&baseline)
                }
            };
        }

        for warning in validate_effective_config(&effective, &self.settings.markers) {
            warn!("Effective config validation for route {}: {}", route, warning);
        }

        effective
    }

    fn merge_fields(
        &self,
        route: &RouteKey,
        defaults: Option<&UlnConfig>,
        overrides: Option<&UlnConfig>,
    ) -> EffectiveConfig {
        let has_override = overrides.is_some();
        let mut fallback = FallbackRecorder::new(has_override);
        let mut effective = EffectiveConfig::untracked(route);

        // Library
        let markers = &self.settings.markers;
        let override_library = overrides
            .and_then(|o| o.library.as_deref())
            .filter(|l| !markers.is_zero(l));
        let default_library = defaults
            .and_then(|d| d.library.as_deref())
            .filter(|l| !markers.is_zero(l));
        let library = match (override_library, default_library) {
            (Some(library), _) => Some(library),
            (None, Some(library)) => {
                fallback.record(FallbackField::Library);
                effective.uses_default_library = true;
                Some(library)
            }
            (None, None) => None,
        };
        effective.library = library.map(canonical_address);

        let tracked = effective
            .library
            .as_deref()
            .map(|l| self.settings.is_tracked_library(route.node.local_eid, l))
            .unwrap_or(false);
        if !tracked {
            debug!(
                "Route {} uses unrecognized library {:?}; security fields left unset",
                route, effective.library
            );
            effective.fallback_fields = fallback.into_fields();
            return effective;
        }
        effective.is_config_tracked = true;

        // Confirmations
        let confirmations = match overrides.and_then(|o| o.confirmations).filter(|c| *c != 0) {
            Some(value) => Some(value),
            None => {
                let value = defaults.and_then(|d| d.confirmations);
                if value.is_some() {
                    fallback.record(FallbackField::Confirmations);
                }
                value
            }
        };
        effective.uses_confirmations_sentinel = confirmations == Some(CONFIRMATIONS_SENTINEL);
        effective.confirmations = if effective.uses_confirmations_sentinel {
            Some(0)
        } else {
            confirmations
        };

        // Required DVNs
        let required = merge_dvn_set(
            overrides.map(|o| (o.required_dvn_count, o.required_dvns.as_slice())),
            defaults.map(|d| (d.required_dvn_count, d.required_dvns.as_slice())),
            (FallbackField::RequiredDvnCount, FallbackField::RequiredDvns),
            &mut fallback,
        );
        effective.required_dvn_count = required.count;
        effective.required_dvns = required.dvns;
        effective.uses_required_dvn_sentinel = required.sentinel;

        // Optional DVNs
        let optional = merge_dvn_set(
            overrides.map(|o| (o.optional_dvn_count, o.optional_dvns.as_slice())),
            defaults.map(|d| (d.optional_dvn_count, d.optional_dvns.as_slice())),
            (FallbackField::OptionalDvnCount, FallbackField::OptionalDvns),
            &mut fallback,
        );
        effective.optional_dvn_count = optional.count;
        effective.optional_dvns = optional.dvns;
        effective.uses_optional_dvn_sentinel = optional.sentinel;

        // Optional threshold
        let threshold = match overrides.and_then(|o| o.optional_dvn_threshold).filter(|t| *t != 0) {
            Some(value) => Some(value),
            None => {
                let value = defaults.and_then(|d| d.optional_dvn_threshold);
                if value.is_some() {
                    fallback.record(FallbackField::OptionalDvnThreshold);
                }
                value
            }
        };
        let threshold = if optional.sentinel || threshold == Some(DVN_COUNT_SENTINEL) {
            threshold.map(|_| 0)
        } else {
            threshold
        };
        effective.optional_dvn_threshold = threshold;

        let count = effective.optional_dvn_count.unwrap_or(0);
        if let Some(threshold) = effective.optional_dvn_threshold {
            if threshold > count {
                warn!(
                    "Route {}: capping optional DVN threshold {} to optional DVN count {}",
                    route, threshold, count
                );
                effective.optional_dvn_threshold_uncapped = Some(threshold);
                effective.optional_dvn_threshold = Some(count);
            }
        }

        effective.fallback_fields = fallback.into_fields();
        effective
    }
}

// ============================================================================
// DVN SET MERGE
// ============================================================================

/// Result of merging one DVN count + list pair.
struct MergedDvnSet {
    count: Option<u8>,
    dvns: Vec<String>,
    sentinel: bool,
}

/// Merges a DVN count and its address list.
///
/// The count follows the three-state rule; the sentinel discards any list.
/// Otherwise the override's non-empty list wins, then the default's. When the
/// resolved list is non-empty its length replaces the declared count.
fn merge_dvn_set(
    overrides: Option<(Option<u8>, &[String])>,
    defaults: Option<(Option<u8>, &[String])>,
    (count_field, list_field): (FallbackField, FallbackField),
    fallback: &mut FallbackRecorder,
) -> MergedDvnSet {
    let override_count = overrides.and_then(|(count, _)| count).filter(|c| *c != 0);
    let default_count = defaults.and_then(|(count, _)| count);

    let count = match override_count {
        Some(count) => Some(count),
        None => {
            if default_count.is_some() {
                fallback.record(count_field);
            }
            default_count
        }
    };

    if count == Some(DVN_COUNT_SENTINEL) {
        return MergedDvnSet {
            count: Some(0),
            dvns: Vec::new(),
            sentinel: true,
        };
    }

    let override_list = overrides.map(|(_, list)| list).filter(|l| !l.is_empty());
    let default_list = defaults.map(|(_, list)| list).unwrap_or(&[]);
    let default_counts = default_count
        .map(|c| c > 0 && c != DVN_COUNT_SENTINEL)
        .unwrap_or(false);

    let dvns: Vec<String> = match override_list {
        Some(list) => list.iter().map(|a| canonical_address(a)).collect(),
        None if !default_list.is_empty() || default_counts => {
            fallback.record(list_field);
            default_list.iter().map(|a| canonical_address(a)).collect()
        }
        None => Vec::new(),
    };

    let count = if dvns.is_empty() {
        count
    } else {
        Some(u8::try_from(dvns.len()).unwrap_or(u8::MAX - 1))
    };

    MergedDvnSet {
        count,
        dvns,
        sentinel: false,
    }
}

/// Collects fallback fields, only while an override record exists.
struct FallbackRecorder {
    enabled: bool,
    fields: Vec<FallbackField>,
}

impl FallbackRecorder {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fields: Vec::new(),
        }
    }

    fn record(&mut self, field: FallbackField) {
        if self.enabled && !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    fn into_fields(self) -> Vec<FallbackField> {
        self.fields
    }
}

/// Normalizes an address, keeping malformed input lowercased as given.
fn canonical_address(address: &str) -> String {
    normalize_address(address).unwrap_or_else(|_| address.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_recorder_disabled_without_override() {
        let mut recorder = FallbackRecorder::new(false);
        recorder.record(FallbackField::Library);
        assert!(recorder.into_fields().is_empty());
    }

    #[test]
    fn test_fallback_recorder_keeps_first_insertion_order() {
        let mut recorder = FallbackRecorder::new(true);
        recorder.record(FallbackField::RequiredDvnCount);
        recorder.record(FallbackField::RequiredDvns);
        recorder.record(FallbackField::RequiredDvnCount);
        assert_eq!(
            recorder.into_fields(),
            vec![FallbackField::RequiredDvnCount, FallbackField::RequiredDvns]
        );
    }
}
