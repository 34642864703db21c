//! Security Graph Module
//!
//! Crawls application-to-application routes into a security graph and
//! annotates it for auditing.

pub mod analyzer;
pub mod crawler;
pub mod generic;
pub mod peer;

pub use analyzer::{EdgeAnnotation, GraphAnalyzer, GraphAnnotations, NodeAnnotation};
pub use crawler::{CrawlError, CrawlResult, GraphCrawler, NodeStatus};
pub use generic::{
    DominantCombination, EdgeKey, GraphEdge, GraphNode, PeerInfo, PeerRecord, PeerState, PeerStateHint,
    RouteSecurityConfig, RouteStat, SecurityGraph, SkippedItem, VerifierFingerprint,
};
pub use peer::PeerResolver;
