//! Security Graph Service
//!
//! Serves effective OApp security configs and cross-chain security graphs
//! computed from an indexer's GraphQL API.
//!
//! ## Overview
//!
//! The service:
//! 1. Loads the protocol constants, chain registry and DVN names from TOML
//! 2. Connects to the indexer GraphQL endpoint
//! 3. Serves effective configs, crawled security graphs and cascade
//!    recomputation over a REST API

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use security_graph::api::ApiServer;
use security_graph::{Config, GraphqlStore, SecurityGraphService};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point that initializes and runs the service.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Security Graph Service");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("Security Graph Service");
        println!();
        println!("Usage: security-graph [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config <path>   Use custom config file path");
        println!("  --help, -h        Show this help message");
        println!();
        println!("Environment variables:");
        println!("  SECURITY_GRAPH_CONFIG_PATH        Path to config file");
        println!("  SECURITY_GRAPH__<SECTION>__<KEY>  Override a single config value");
        return Ok(());
    }

    // Check for custom config path
    let mut config_path = None;
    for (i, arg) in args.iter().enumerate() {
        if arg == "--config" && i + 1 < args.len() {
            config_path = Some(args[i + 1].clone());
            break;
        }
    }
    if let Some(path) = config_path {
        std::env::set_var("SECURITY_GRAPH_CONFIG_PATH", &path);
        info!("Using custom config: {}", path);
    }

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let store = GraphqlStore::new(&config.indexer).context("Failed to create indexer client")?;
    info!("Indexer client created for {}", config.indexer.graphql_url);

    let service = SecurityGraphService::new(config, Arc::new(store))?;
    let api_server = ApiServer::new(service);

    // Run the service (this blocks until shutdown)
    api_server.run().await?;

    Ok(())
}
