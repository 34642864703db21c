//! Generic API structures and handlers
//!
//! Response wrapper, rejection types, CORS and the route handlers of the
//! security graph service.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;
use warp::{
    http::{Method, StatusCode},
    Filter, Rejection, Reply,
};

use crate::address::NodeId;
use crate::graph::CrawlError;
use crate::resolver::DefaultScope;
use crate::service::SecurityGraphService;

/// Number of applications returned by `/oapps/popular` when no limit is given
const DEFAULT_POPULAR_LIMIT: usize = 20;

// ============================================================================
// SHARED REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// Standardized response structure for all API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (if successful)
    pub data: Option<T>,
    /// Error message (if failed)
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> warp::reply::Json {
        warp::reply::json(&ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

// ============================================================================
// CUSTOM REJECTION TYPES
// ============================================================================

/// Custom rejection for malformed path or query input
#[derive(Debug)]
pub struct InvalidRequest(pub String);

impl warp::reject::Reject for InvalidRequest {}

/// Custom rejection for indexer failures
#[derive(Debug)]
pub struct UpstreamError(pub String);

impl warp::reject::Reject for UpstreamError {}

fn invalid(message: impl Into<String>) -> Rejection {
    warp::reject::custom(InvalidRequest(message.into()))
}

fn upstream(message: impl ToString) -> Rejection {
    warp::reject::custom(UpstreamError(message.to_string()))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Handler for `GET /config/{localEid}/{oapp}`.
///
/// # Returns
///
/// * `Ok(warp::Reply)` - Effective configs of the application, by source eid
/// * `Err(warp::Rejection)` - Malformed address or indexer failure
pub async fn get_config_handler(
    local_eid: u32,
    oapp: String,
    service: Arc<SecurityGraphService>,
) -> Result<impl Reply, Rejection> {
    let id = NodeId::new(local_eid, &oapp).map_err(|e| invalid(format!("Invalid oapp address: {}", e)))?;
    let configs = service.effective_configs(&id).await.map_err(upstream)?;
    Ok(ApiResponse::ok(configs))
}

/// Handler for `GET /graph?seed={eid}_{address}&depth=&batch=`.
///
/// `depth` and `batch` fall back to the configured crawler defaults.
pub async fn get_graph_handler(query: String, service: Arc<SecurityGraphService>) -> Result<impl Reply, Rejection> {
    let parsed = Url::parse(&format!("http://dummy?{}", query))
        .map_err(|e| invalid(format!("Invalid query string: {}", e)))?;
    let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

    let seed: NodeId = params
        .get("seed")
        .ok_or_else(|| invalid("Missing seed parameter"))?
        .parse()
        .map_err(|e| invalid(format!("Invalid seed: {}", e)))?;
    let depth = params
        .get("depth")
        .map(|d| d.parse::<u32>())
        .transpose()
        .map_err(|e| invalid(format!("Invalid depth: {}", e)))?;
    let batch = params
        .get("batch")
        .map(|b| b.parse::<usize>())
        .transpose()
        .map_err(|e| invalid(format!("Invalid batch: {}", e)))?;

    match service.build_graph(&seed, depth, batch).await {
        Ok(graph) => Ok(ApiResponse::ok(graph)),
        Err(CrawlError::InvalidBatchSize) => Err(invalid("batch must be at least 1")),
        Err(e) => {
            warn!("Crawl from {} failed: {}", seed, e);
            Err(upstream(e))
        }
    }
}

/// Handler for `POST /defaults/{localEid}/{srcEid}/recompute`.
pub async fn recompute_handler(
    local_eid: u32,
    src_eid: u32,
    service: Arc<SecurityGraphService>,
) -> Result<impl Reply, Rejection> {
    let report = service
        .recompute_defaults(DefaultScope { local_eid, src_eid })
        .await
        .map_err(upstream)?;
    Ok(ApiResponse::ok(report))
}

/// Handler for `GET /oapps/popular?limit=`.
pub async fn get_popular_handler(
    params: HashMap<String, String>,
    service: Arc<SecurityGraphService>,
) -> Result<impl Reply, Rejection> {
    let limit = match params.get("limit") {
        Some(limit) => limit
            .parse::<usize>()
            .map_err(|e| invalid(format!("Invalid limit: {}", e)))?,
        None => DEFAULT_POPULAR_LIMIT,
    };
    let oapps = service.popular_default_oapps(limit).await.map_err(upstream)?;
    Ok(ApiResponse::ok(oapps))
}

// ============================================================================
// WARP FILTER HELPERS
// ============================================================================

/// Creates a warp filter that provides access to the service.
pub fn with_service(
    service: Arc<SecurityGraphService>,
) -> impl Filter<Extract = (Arc<SecurityGraphService>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || service.clone())
}

// ============================================================================
// CORS CONFIGURATION
// ============================================================================

/// Creates a CORS filter based on the configured allowed origins.
fn create_cors_filter(allowed_origins: &[String]) -> warp::cors::Builder {
    let methods = vec![Method::GET, Method::POST, Method::OPTIONS];

    if allowed_origins.iter().any(|o| o == "*") {
        warp::cors()
            .allow_any_origin()
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    } else {
        let origins: Vec<&str> = allowed_origins.iter().map(|s| s.as_str()).collect();
        warp::cors()
            .allow_origins(origins)
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    }
}

// ============================================================================
// REJECTION HANDLER
// ============================================================================

/// Global rejection handler for all API routes.
///
/// Converts rejections into [`ApiResponse`] errors with matching status codes.
pub async fn handle_rejection(rej: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if let Some(err) = rej.find::<InvalidRequest>() {
        (StatusCode::BAD_REQUEST, err.0.clone())
    } else if let Some(err) = rej.find::<UpstreamError>() {
        (StatusCode::BAD_GATEWAY, err.0.clone())
    } else if let Some(err) = rej.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Invalid query: {}", err))
    } else if rej.is_not_found() {
        (StatusCode::NOT_FOUND, "Endpoint not found".to_string())
    } else if rej.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rej);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
        status,
    ))
}

// ============================================================================
// API SERVER IMPLEMENTATION
// ============================================================================

/// REST API server for the security graph service.
pub struct ApiServer {
    service: Arc<SecurityGraphService>,
}

impl ApiServer {
    pub fn new(service: SecurityGraphService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Starts the API server on the configured host and port.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Server stopped
    /// * `Err(anyhow::Error)` - Failed to parse the bind address
    pub async fn run(&self) -> Result<()> {
        let api = &self.service.config().api;
        info!("Starting API server on {}:{}", api.host, api.port);

        let routes = self.create_routes();

        let addr: std::net::SocketAddr = format!("{}:{}", api.host, api.port)
            .parse()
            .context("Failed to parse API server address")?;

        warp::serve(routes).run(addr).await;

        Ok(())
    }

    /// Creates all API routes for the server.
    pub(crate) fn create_routes(&self) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        let service = self.service.clone();

        // Health check endpoint - returns service status
        let health = warp::path("health").and(warp::get()).map(|| {
            ApiResponse::ok("Security graph service is running".to_string())
        });

        // GET /config/:eid/:oapp - effective configs of one application
        let config = warp::path!("config" / u32 / String)
            .and(warp::get())
            .and(with_service(service.clone()))
            .and_then(get_config_handler);

        // GET /graph?seed=... - crawl and analyze
        let graph = warp::path("graph")
            .and(warp::path::end())
            .and(warp::get())
            .and(warp::query::raw())
            .and(with_service(service.clone()))
            .and_then(get_graph_handler);

        // POST /defaults/:eid/:src_eid/recompute - cascade recompute
        let recompute = warp::path!("defaults" / u32 / u32 / "recompute")
            .and(warp::post())
            .and(with_service(service.clone()))
            .and_then(recompute_handler);

        // GET /oapps/popular - default-config applications by packets received
        let popular = warp::path!("oapps" / "popular")
            .and(warp::get())
            .and(warp::query::<HashMap<String, String>>())
            .and(with_service(service.clone()))
            .and_then(get_popular_handler);

        health
            .or(config)
            .or(graph)
            .or(recompute)
            .or(popular)
            .with(create_cors_filter(&self.service.config().api.cors_origins))
            .recover(handle_rejection)
    }

    /// Public method for testing - exposes routes for integration tests
    #[allow(dead_code)] // Used by tests
    pub fn test_routes(&self) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        self.create_routes()
    }
}
