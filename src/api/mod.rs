//! REST API Server Module
//!
//! Exposes effective configs, security graphs, cascade recomputation and the
//! popular default-config applications over HTTP.

mod generic;

// Re-export ApiServer for convenience
pub use generic::ApiServer;
// Re-export ApiResponse for testing
#[allow(unused_imports)]
pub use generic::ApiResponse;
