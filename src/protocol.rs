//! Protocol Settings
//!
//! Immutable protocol constants handed to the merge engine, the peer resolver
//! and the graph analyzer at construction: sentinel values, reserved marker
//! addresses, recognized verification libraries per chain and the markers of
//! blocking ("dead") DVNs.

use std::collections::{HashMap, HashSet};

use crate::address::{normalize_address, AddressError, AddressMarkers};
use crate::config::ProtocolConfig;

/// Confirmations value meaning "explicitly zero confirmations"
pub const CONFIRMATIONS_SENTINEL: u64 = u64::MAX;

/// DVN count value meaning "explicitly zero DVNs"
pub const DVN_COUNT_SENTINEL: u8 = u8::MAX;

/// Resolved protocol constants.
#[derive(Debug, Clone, Default)]
pub struct ProtocolSettings {
    /// Zero and dead marker addresses
    pub markers: AddressMarkers,
    /// Recognized receive libraries, keyed by local eid
    tracked_libraries: HashMap<u32, HashSet<String>>,
    /// Lowercased display-name labels of blocking DVNs
    blocking_labels: Vec<String>,
    /// Normalized addresses of blocking DVNs
    blocking_addresses: HashSet<String>,
}

impl ProtocolSettings {
    /// Creates settings with the given markers and no chains.
    pub fn new(markers: AddressMarkers) -> Self {
        Self {
            markers,
            ..Self::default()
        }
    }

    /// Builds settings from the `[protocol]` configuration section.
    ///
    /// # Returns
    ///
    /// * `Ok(ProtocolSettings)` - All addresses normalized
    /// * `Err(AddressError)` - A configured address is malformed
    pub fn from_config(config: &ProtocolConfig) -> Result<Self, AddressError> {
        let mut settings = Self::new(AddressMarkers::with_dead_address(&config.dead_address)?);
        for chain in &config.chains {
            settings = settings.with_chain(chain.eid, &chain.receive_libraries)?;
        }
        for address in &config.blocking_dvn_addresses {
            settings.blocking_addresses.insert(normalize_address(address)?);
        }
        settings.blocking_labels = config
            .blocking_dvn_labels
            .iter()
            .map(|l| l.to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        Ok(settings)
    }

    /// Registers recognized receive libraries for a chain.
    pub fn with_chain(mut self, eid: u32, libraries: &[String]) -> Result<Self, AddressError> {
        let entry = self.tracked_libraries.entry(eid).or_default();
        for library in libraries {
            entry.insert(normalize_address(library)?);
        }
        Ok(self)
    }

    /// Adds a display-name label that marks a blocking DVN.
    pub fn with_blocking_label(mut self, label: &str) -> Self {
        self.blocking_labels.push(label.to_lowercase());
        self
    }

    /// Returns true if `library` is a recognized verification library on `eid`.
    pub fn is_tracked_library(&self, eid: u32, library: &str) -> bool {
        let Ok(library) = normalize_address(library) else {
            return false;
        };
        self.tracked_libraries
            .get(&eid)
            .map(|libs| libs.contains(&library))
            .unwrap_or(false)
    }

    /// Returns true if a DVN (by address or display name) blocks the pathway.
    ///
    /// The dead address, configured blocking addresses and any display name
    /// containing a configured label all count as blocking.
    pub fn is_blocking_dvn(&self, address: &str, name: Option<&str>) -> bool {
        if self.markers.is_dead(address) {
            return true;
        }
        if let Ok(normalized) = normalize_address(address) {
            if self.blocking_addresses.contains(&normalized) {
                return true;
            }
        }
        match name {
            Some(name) => {
                let lower = name.to_lowercase();
                self.blocking_labels.iter().any(|label| lower.contains(label))
            }
            None => false,
        }
    }
}
