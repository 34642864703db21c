//! Security Graph Service
//!
//! Wires the store, the merge engine, the crawler, the analyzer and the
//! cascade recomputer together from one [`Config`]. The API server and the
//! tests drive the crate through this type.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::address::NodeId;
use crate::config::Config;
use crate::graph::{CrawlError, GraphAnalyzer, GraphCrawler, SecurityGraph};
use crate::names::DvnDirectory;
use crate::protocol::ProtocolSettings;
use crate::resolver::{CascadeError, CascadeRecomputer, ConfigMergeEngine, DefaultScope, EffectiveConfig, RecomputeReport};
use crate::store::{order_by_packets_received, BatchRequest, OAppStats, SecurityStore, StoreError};

/// Entry point for resolving configs, building graphs and recomputing defaults.
pub struct SecurityGraphService {
    config: Arc<Config>,
    store: Arc<dyn SecurityStore>,
    crawler: GraphCrawler,
    analyzer: GraphAnalyzer,
    cascade: CascadeRecomputer,
}

impl SecurityGraphService {
    /// Creates the service on top of `store`.
    ///
    /// # Returns
    ///
    /// * `Ok(SecurityGraphService)` - All components initialized
    /// * `Err(anyhow::Error)` - Protocol constants or DVN names are malformed
    pub fn new(config: Config, store: Arc<dyn SecurityStore>) -> Result<Self> {
        let settings = Arc::new(
            ProtocolSettings::from_config(&config.protocol).context("Failed to load protocol settings")?,
        );
        let directory = Arc::new(DvnDirectory::from_config(&config.dvn_names).context("Failed to load DVN names")?);
        let engine = ConfigMergeEngine::new(settings.clone());

        let crawler = GraphCrawler::new(store.clone(), engine.clone(), settings.clone(), directory.clone())
            .with_batch_timeout(config.crawler.batch_timeout_ms.map(Duration::from_millis));
        let analyzer = GraphAnalyzer::new(settings, directory.clone());
        let cascade = CascadeRecomputer::new(store.clone(), engine);

        info!(
            "Security graph service initialized ({} chain(s), {} DVN name(s))",
            config.protocol.chains.len(),
            directory.len()
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            crawler,
            analyzer,
            cascade,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the stored effective configs of one application, by source eid.
    pub async fn effective_configs(&self, oapp: &NodeId) -> Result<Vec<EffectiveConfig>, StoreError> {
        let response = self.store.fetch_batch(&BatchRequest::new([oapp])).await?;
        let mut configs: Vec<EffectiveConfig> = response
            .effective_configs
            .into_iter()
            .filter(|c| c.oapp_id == *oapp)
            .collect();
        configs.sort_by_key(|c| c.src_eid);
        Ok(configs)
    }

    /// Crawls and analyzes the security graph around `seed`.
    ///
    /// # Arguments
    ///
    /// * `seed` - Starting application
    /// * `depth` - Traversal depth; configured default when `None`, capped by `max_depth_cap`
    /// * `batch_size` - Nodes per batched fetch; configured default when `None`
    pub async fn build_graph(
        &self,
        seed: &NodeId,
        depth: Option<u32>,
        batch_size: Option<usize>,
    ) -> Result<SecurityGraph, CrawlError> {
        let crawler_config = &self.config.crawler;
        let depth = depth
            .unwrap_or(crawler_config.max_depth)
            .min(crawler_config.max_depth_cap);
        let batch_size = batch_size.unwrap_or(crawler_config.batch_size);

        let mut result = self.crawler.crawl(seed, depth, batch_size).await?;
        let annotations = self.analyzer.analyze(&result.nodes, &result.edges);
        annotations.apply(&mut result.nodes, &mut result.edges);

        Ok(SecurityGraph {
            crawl_id: Uuid::new_v4(),
            seed: seed.clone(),
            crawl_depth: depth,
            timestamp: Utc::now(),
            nodes: result.nodes,
            edges: result.edges,
            dominant_combination: annotations.dominant,
            skipped: result.skipped,
        })
    }

    /// Recomputes every effective config depending on one default.
    pub async fn recompute_defaults(&self, scope: DefaultScope) -> Result<RecomputeReport, CascadeError> {
        self.cascade.on_default_changed(scope).await
    }

    /// Applications on the default config, most packets received first.
    ///
    /// Applications without stats go last with a zero total.
    pub async fn popular_default_oapps(&self, limit: usize) -> Result<Vec<OAppStats>, StoreError> {
        let (ids, stats) = futures::future::try_join(
            self.store.fetch_default_config_oapps(),
            self.store.fetch_oapp_stats(),
        )
        .await?;

        Ok(order_by_packets_received(&stats, ids)
            .into_iter()
            .take(limit)
            .map(|id| {
                let total_packets_received = stats
                    .iter()
                    .find(|s| s.id == id)
                    .map(|s| s.total_packets_received)
                    .unwrap_or(0);
                OAppStats {
                    id,
                    total_packets_received,
                }
            })
            .collect())
    }
}
