//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the security graph service.
//! Configuration includes the indexer endpoint, protocol markers and recognized
//! verification libraries per chain, crawler limits, DVN display names and API settings.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::address::{normalize_address, DEAD_ADDRESS};

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
///
/// This structure holds configuration for:
/// - Indexer (GraphQL) connection details
/// - Protocol constants (dead address, blocking DVNs, recognized libraries per chain)
/// - Crawler defaults and limits
/// - API server configuration
/// - DVN display names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Indexer GraphQL endpoint configuration
    pub indexer: IndexerConfig,
    /// Protocol-wide constants and chain registry
    pub protocol: ProtocolConfig,
    /// Crawler defaults (depth, batch size, timeout)
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// API server configuration (host, port, CORS settings)
    pub api: ApiConfig,
    /// Display names for DVN addresses, keyed by chain
    #[serde(default)]
    pub dvn_names: Vec<DvnNameConfig>,
}

/// Configuration for the indexer GraphQL endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// GraphQL endpoint URL (e.g., a Hasura `/v1/graphql` URL)
    pub graphql_url: String,
    /// Optional Hasura admin secret sent as `x-hasura-admin-secret`
    #[serde(default)]
    pub admin_secret: Option<String>,
    /// Timeout for a single indexer request in milliseconds
    pub request_timeout_ms: u64,
}

/// Protocol constants shared by the resolver and the crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Address the protocol uses to mark dead pathways
    #[serde(default = "default_dead_address")]
    pub dead_address: String,
    /// DVN display-name labels that mark a blocking verifier (case-insensitive substring match)
    #[serde(default)]
    pub blocking_dvn_labels: Vec<String>,
    /// DVN addresses that always block a pathway
    #[serde(default)]
    pub blocking_dvn_addresses: Vec<String>,
    /// Chains known to the service
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// Configuration for one chain (endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Endpoint id of the chain
    pub eid: u32,
    /// Human-readable name for the chain
    pub name: String,
    /// Receive libraries recognized as verification libraries (e.g., ReceiveUln302)
    #[serde(default)]
    pub receive_libraries: Vec<String>,
}

/// Crawler defaults and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Default traversal depth when a request does not specify one
    pub max_depth: u32,
    /// Hard upper bound on requested traversal depth
    pub max_depth_cap: u32,
    /// Number of nodes fetched per batched query
    pub batch_size: usize,
    /// Timeout for one batched fetch in milliseconds (no timeout if unset)
    #[serde(default)]
    pub batch_timeout_ms: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_depth_cap: 10,
            batch_size: 16,
            batch_timeout_ms: None,
        }
    }
}

/// API server configuration for external communication.
///
/// Controls how the service exposes its REST API endpoints
/// and handles cross-origin requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host address to bind the API server to
    pub host: String,
    /// Port number to bind the API server to
    pub port: u16,
    /// Allowed CORS origins for cross-origin requests
    pub cors_origins: Vec<String>,
}

/// Display name for one DVN deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DvnNameConfig {
    /// Endpoint id the DVN contract is deployed on
    pub eid: u32,
    /// DVN contract address
    pub address: String,
    /// Display name (e.g., "LayerZero Labs")
    pub name: String,
}

fn default_dead_address() -> String {
    DEAD_ADDRESS.to_string()
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Validates the configuration.
    ///
    /// This function ensures that:
    /// - Chain eids are unique
    /// - Dead address, library and DVN addresses parse as addresses
    /// - Crawler batch size is non-zero and the default depth is within the cap
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - Validation failed
    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.indexer.graphql_url)
            .map_err(|e| anyhow::anyhow!("Invalid indexer.graphql_url: {}", e))?;

        normalize_address(&self.protocol.dead_address)
            .map_err(|e| anyhow::anyhow!("Invalid protocol.dead_address: {}", e))?;

        let mut seen_eids = HashSet::new();
        for chain in &self.protocol.chains {
            if !seen_eids.insert(chain.eid) {
                anyhow::bail!(
                    "Configuration error: eid {} is configured more than once. Each chain must have a unique eid.",
                    chain.eid
                );
            }
            for library in &chain.receive_libraries {
                normalize_address(library).map_err(|e| {
                    anyhow::anyhow!("Invalid receive library for chain {}: {}", chain.name, e)
                })?;
            }
        }

        for address in &self.protocol.blocking_dvn_addresses {
            normalize_address(address)
                .map_err(|e| anyhow::anyhow!("Invalid blocking DVN address: {}", e))?;
        }

        for entry in &self.dvn_names {
            normalize_address(&entry.address).map_err(|e| {
                anyhow::anyhow!("Invalid DVN address for '{}' on eid {}: {}", entry.name, entry.eid, e)
            })?;
        }

        if self.crawler.batch_size == 0 {
            anyhow::bail!("Configuration error: crawler.batch_size must be greater than zero");
        }
        if self.crawler.max_depth > self.crawler.max_depth_cap {
            anyhow::bail!(
                "Configuration error: crawler.max_depth {} exceeds crawler.max_depth_cap {}",
                self.crawler.max_depth,
                self.crawler.max_depth_cap
            );
        }

        Ok(())
    }

    /// Loads configuration from the TOML file, layered with environment overrides.
    ///
    /// This function:
    /// 1. Checks if config/security_graph.toml (or `SECURITY_GRAPH_CONFIG_PATH`) exists
    /// 2. Loads the file and applies `SECURITY_GRAPH__SECTION__KEY` environment overrides
    /// 3. Validates the configuration
    /// 4. If the file doesn't exist, returns an error asking user to copy template
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - Failed to load configuration, file doesn't exist, or validation failed
    pub fn load() -> anyhow::Result<Self> {
        // Check for custom config path via environment variable (for tests)
        let config_path = std::env::var("SECURITY_GRAPH_CONFIG_PATH")
            .unwrap_or_else(|_| "config/security_graph.toml".to_string());

        if !std::path::Path::new(&config_path).exists() {
            // Configuration file doesn't exist - user needs to copy template
            return Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/security_graph.template.toml config/security_graph.toml\n\
                Then edit config/security_graph.toml with your actual values.",
                config_path
            ));
        }

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::new(&config_path, ::config::FileFormat::Toml).required(true),
            )
            .add_source(::config::Environment::with_prefix("SECURITY_GRAPH").separator("__"))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Creates a default configuration with placeholder values.
    ///
    /// This configuration is suitable for local development and testing.
    /// For production use, the indexer URL and chain registry must be replaced
    /// with actual values.
    #[allow(dead_code)]
    pub fn default() -> Self {
        Self {
            indexer: IndexerConfig {
                graphql_url: "http://127.0.0.1:8080/v1/graphql".to_string(),
                admin_secret: None,
                request_timeout_ms: 30000,
            },
            protocol: ProtocolConfig {
                dead_address: DEAD_ADDRESS.to_string(),
                blocking_dvn_labels: vec!["lzdeaddvn".to_string(), "dead dvn".to_string()],
                blocking_dvn_addresses: vec![],
                chains: vec![], // Should be set in config/security_graph.toml
            },
            crawler: CrawlerConfig::default(),
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 3340,
                cors_origins: vec!["http://localhost:3340".to_string()],
            },
            dvn_names: vec![],
        }
    }
}
