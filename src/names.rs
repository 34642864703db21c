//! DVN naming directory
//!
//! Maps `(localEid, dvnAddress)` to a display name. Every lookup has a raw
//! address fallback so the resolver and the analyzer work with no names at all.

use std::collections::HashMap;

use crate::address::{normalize_address, AddressError};
use crate::config::DvnNameConfig;

/// Read-only directory of DVN display names.
#[derive(Debug, Clone, Default)]
pub struct DvnDirectory {
    names: HashMap<(u32, String), String>,
}

impl DvnDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from `[[dvn_names]]` entries.
    pub fn from_config(entries: &[DvnNameConfig]) -> Result<Self, AddressError> {
        let mut directory = Self::new();
        for entry in entries {
            directory.insert(entry.eid, &entry.address, &entry.name)?;
        }
        Ok(directory)
    }

    /// Registers a display name; later entries replace earlier ones.
    pub fn insert(&mut self, eid: u32, address: &str, name: &str) -> Result<(), AddressError> {
        self.names
            .insert((eid, normalize_address(address)?), name.to_string());
        Ok(())
    }

    /// Returns the display name of a DVN, if known.
    pub fn name_of(&self, eid: u32, address: &str) -> Option<&str> {
        let normalized = normalize_address(address).ok()?;
        self.names.get(&(eid, normalized)).map(String::as_str)
    }

    /// Returns the display name of a DVN, falling back to its address.
    pub fn display_name(&self, eid: u32, address: &str) -> String {
        self.name_of(eid, address)
            .map(str::to_string)
            .unwrap_or_else(|| address.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
