//! Cascade Recomputer
//!
//! When a protocol default changes, every application route on that pathway
//! that inherits from it may change too. The recomputer re-merges each
//! affected route and writes the result back to the store.
//!
//! Fetch failures abort the run. Failures of individual routes are logged,
//! collected into the report and never stop the remaining routes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::address::{normalize_address, normalize_addresses, AddressError, NodeId, RouteKey};
use crate::resolver::generic::{DefaultConfig, DefaultScope, EffectiveConfig, OverrideConfig};
use crate::resolver::merge::ConfigMergeEngine;
use crate::store::{SecurityStore, StoreError};

// ============================================================================
// ERRORS AND REPORT
// ============================================================================

/// Fatal error of a cascade run.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// Reading the affected records failed
    #[error(transparent)]
    Fetch(#[from] StoreError),
}

/// Failure of one route during a cascade run.
#[derive(Debug, Error)]
enum ItemError {
    #[error("malformed override record: {0}")]
    Malformed(#[from] AddressError),
    #[error("failed to store effective config: {0}")]
    Store(#[from] StoreError),
}

/// One route that could not be recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeFailure {
    pub oapp_id: NodeId,
    pub src_eid: u32,
    pub error: String,
}

/// Outcome of a cascade run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeReport {
    pub scope: DefaultScope,
    /// Routes considered
    pub total: usize,
    /// Routes whose effective config changed
    pub changed: usize,
    /// Routes recomputed to an identical config
    pub unchanged: usize,
    pub failures: Vec<RecomputeFailure>,
}

// ============================================================================
// CASCADE RECOMPUTER
// ============================================================================

/// Re-merges every route affected by a default change.
pub struct CascadeRecomputer {
    store: Arc<dyn SecurityStore>,
    engine: ConfigMergeEngine,
}

impl CascadeRecomputer {
    pub fn new(store: Arc<dyn SecurityStore>, engine: ConfigMergeEngine) -> Self {
        Self { store, engine }
    }

    /// Recomputes every effective config on the pathway `scope`.
    ///
    /// Affected routes are the union of applications with an override record
    /// and applications with an existing effective config for `scope.src_eid`
    /// on `scope.local_eid`. They are processed in node id order.
    ///
    /// # Returns
    ///
    /// * `Ok(RecomputeReport)` - Run completed; per-route failures are in the report
    /// * `Err(CascadeError)` - Fetching the affected records failed
    pub async fn on_default_changed(&self, scope: DefaultScope) -> Result<RecomputeReport, CascadeError> {
        info!("Default changed for pathway {}, recomputing dependents", scope);

        let default = self.store.fetch_default(&scope).await?;
        let overrides: BTreeMap<NodeId, OverrideConfig> = self
            .store
            .fetch_overrides_for_chain(scope.local_eid)
            .await?
            .into_iter()
            .filter(|o| o.src_eid == scope.src_eid)
            .map(|o| (o.oapp_id.clone(), o))
            .collect();
        let existing: BTreeMap<NodeId, EffectiveConfig> = self
            .store
            .fetch_effective_for_chain(scope.local_eid)
            .await?
            .into_iter()
            .filter(|c| c.src_eid == scope.src_eid)
            .map(|c| (c.oapp_id.clone(), c))
            .collect();

        let targets: BTreeSet<&NodeId> = overrides.keys().chain(existing.keys()).collect();

        let mut report = RecomputeReport {
            scope,
            total: targets.len(),
            changed: 0,
            unchanged: 0,
            failures: Vec::new(),
        };

        for oapp_id in targets {
            let route = RouteKey::new(oapp_id.clone(), scope.src_eid);
            match self
                .recompute_route(&route, default.as_ref(), overrides.get(oapp_id), existing.get(oapp_id))
                .await
            {
                Ok(true) => report.changed += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => {
                    error!(
                        "Failed to recompute effective config (local_eid={}, src_eid={}, oapp={}): {}",
                        scope.local_eid, scope.src_eid, oapp_id, e
                    );
                    report.failures.push(RecomputeFailure {
                        oapp_id: oapp_id.clone(),
                        src_eid: scope.src_eid,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Recomputed pathway {}: {} route(s), {} changed, {} unchanged, {} failed",
            scope,
            report.total,
            report.changed,
            report.unchanged,
            report.failures.len()
        );

        Ok(report)
    }

    /// Re-merges one route and writes it back.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Stored config changed
    /// * `Ok(false)` - Stored config was already up to date
    async fn recompute_route(
        &self,
        route: &RouteKey,
        default: Option<&DefaultConfig>,
        overrides: Option<&OverrideConfig>,
        existing: Option<&EffectiveConfig>,
    ) -> Result<bool, ItemError> {
        if let Some(record) = overrides {
            check_override_addresses(record)?;
        }

        let effective = self.engine.merge(route, default, overrides);
        if existing == Some(&effective) {
            return Ok(false);
        }

        self.store.upsert_effective(&effective).await?;
        Ok(true)
    }
}

/// Rejects override records whose addresses cannot be parsed.
fn check_override_addresses(record: &OverrideConfig) -> Result<(), AddressError> {
    if let Some(library) = &record.config.library {
        normalize_address(library)?;
    }
    normalize_addresses(&record.config.required_dvns)?;
    normalize_addresses(&record.config.optional_dvns)?;
    Ok(())
}
