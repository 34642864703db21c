//! Effective Configuration Resolver
//!
//! Merges protocol defaults with per-application overrides into one
//! effective security config per route, and recomputes dependents when a
//! default changes.

pub mod cascade;
pub mod generic;
pub mod merge;
pub mod validation;

pub use cascade::{CascadeError, CascadeRecomputer, RecomputeFailure, RecomputeReport};
pub use generic::{
    DefaultConfig, DefaultConfigChange, DefaultScope, EffectiveConfig, FallbackField, OverrideConfig, UlnConfig,
};
pub use merge::ConfigMergeEngine;
pub use validation::{validate_effective_config, validate_uln_config, ConfigWarning};
