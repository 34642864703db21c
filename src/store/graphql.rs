//! GraphQL security store
//!
//! Reads indexed security records from a Hasura GraphQL endpoint. Entity and
//! column names follow the indexer schema; rows deserialize into the resolver
//! and graph record types one at a time, so a row whose application id is not
//! a valid node id is skipped instead of failing the whole response.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{BatchRequest, BatchResponse, OAppStats, SecurityStore, StoreError};
use crate::address::NodeId;
use crate::config::IndexerConfig;
use crate::graph::generic::{PeerRecord, RouteStat};
use crate::resolver::generic::{DefaultConfig, DefaultScope, EffectiveConfig, OverrideConfig};

// ============================================================================
// QUERY DOCUMENTS
// ============================================================================

const EFFECTIVE_FIELDS: &str = "oappId srcEid library usesDefaultLibrary isConfigTracked \
    confirmations usesConfirmationsSentinel requiredDVNCount requiredDVNs optionalDVNCount \
    optionalDVNs optionalDVNThreshold optionalDVNThresholdUncapped usesRequiredDVNSentinel \
    usesOptionalDVNSentinel fallbackFields usesDefaultConfig";

const ULN_FIELDS: &str = "srcEid library confirmations requiredDVNCount requiredDVNs \
    optionalDVNCount optionalDVNs optionalDVNThreshold";

const PEER_FIELDS: &str = "oappId srcEid peer stateHint inferredFromDelivery";

const ROUTE_STAT_FIELDS: &str = "oappId srcEid packetCount lastPacketBlock lastPacketTimestamp";

/// Columns refreshed when an effective config row already exists.
const EFFECTIVE_UPDATE_COLUMNS: &str = "[library, usesDefaultLibrary, isConfigTracked, \
    confirmations, usesConfirmationsSentinel, requiredDVNCount, requiredDVNs, optionalDVNCount, \
    optionalDVNs, optionalDVNThreshold, optionalDVNThresholdUncapped, usesRequiredDVNSentinel, \
    usesOptionalDVNSentinel, fallbackFields, usesDefaultConfig]";

// ============================================================================
// RESPONSE STRUCTURES
// ============================================================================

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// Rows keyed by application id are kept raw until [`decode_rows`] checks the id.
#[derive(Debug, Deserialize)]
struct BatchRows {
    #[serde(rename = "OAppSecurityConfig")]
    security_configs: Vec<Value>,
    #[serde(rename = "OAppPeer")]
    peers: Vec<Value>,
    #[serde(rename = "OAppRouteStats")]
    route_stats: Vec<Value>,
    #[serde(rename = "DefaultUlnConfig")]
    defaults: Vec<DefaultConfig>,
}

#[derive(Debug, Deserialize)]
struct ReferencingRows {
    #[serde(rename = "OAppPeer")]
    peers: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct DefaultRows {
    #[serde(rename = "DefaultUlnConfig")]
    defaults: Vec<DefaultConfig>,
}

#[derive(Debug, Deserialize)]
struct OverrideRows {
    #[serde(rename = "OAppUlnConfig")]
    overrides: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct EffectiveRows {
    #[serde(rename = "OAppSecurityConfig")]
    configs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct OAppIdRow {
    #[serde(rename = "oappId")]
    oapp_id: NodeId,
}

#[derive(Debug, Deserialize)]
struct DefaultConfigOAppRows {
    #[serde(rename = "OAppSecurityConfig")]
    rows: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct OAppStatsRows {
    #[serde(rename = "OAppStats")]
    stats: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct UpsertResult {
    #[serde(rename = "insert_OAppSecurityConfig_one")]
    inserted: Option<OAppIdRow>,
}

// ============================================================================
// ROW DECODING
// ============================================================================

/// Decodes rows of `table` one by one.
///
/// A row whose `id_field` is not a valid node id (non-hex addresses of
/// non-EVM chains, for example) is logged and skipped. Any other decoding
/// failure still fails the whole response.
///
/// # Arguments
///
/// * `table` - Entity name, for logging
/// * `id_field` - Column holding the application id
/// * `rows` - Raw rows as returned by the indexer
///
/// # Returns
///
/// * `Ok(Vec<T>)` - Decoded rows, in indexer order, without the skipped ones
/// * `Err(StoreError)` - A row with a valid id failed to decode
fn decode_rows<T: DeserializeOwned>(
    table: &str,
    id_field: &str,
    rows: Vec<Value>,
) -> Result<Vec<T>, StoreError> {
    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(raw) = row.get(id_field).and_then(Value::as_str) {
            if let Err(e) = raw.parse::<NodeId>() {
                warn!("Skipping {} row with malformed {} '{}': {}", table, id_field, raw, e);
                continue;
            }
        }
        decoded.push(serde_json::from_value(row)?);
    }
    Ok(decoded)
}

// ============================================================================
// GRAPHQL STORE IMPLEMENTATION
// ============================================================================

/// Store backed by the indexer's Hasura GraphQL API.
pub struct GraphqlStore {
    /// HTTP client for making requests
    client: Client,
    /// GraphQL endpoint URL
    url: String,
    /// Optional Hasura admin secret
    admin_secret: Option<String>,
}

impl GraphqlStore {
    /// Creates a new store for the configured indexer.
    ///
    /// # Returns
    ///
    /// * `Ok(GraphqlStore)` - Successfully created client
    /// * `Err(StoreError)` - Failed to build the HTTP client
    pub fn new(config: &IndexerConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .no_proxy() // Avoid macOS system-configuration issues in tests
            .build()?;

        Ok(Self {
            client,
            url: config.graphql_url.clone(),
            admin_secret: config.admin_secret.clone(),
        })
    }

    /// Posts a GraphQL document and decodes its `data` field.
    async fn query<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: serde_json::Value,
    ) -> Result<T, StoreError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({ "query": document, "variables": variables }));
        if let Some(secret) = &self.admin_secret {
            request = request.header("x-hasura-admin-secret", secret);
        }

        let bytes = request.send().await?.error_for_status()?.bytes().await?;
        let response: GraphqlResponse<T> = serde_json::from_slice(&bytes)?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(StoreError::Query(messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| StoreError::Query("response carried no data".to_string()))
    }
}

#[async_trait]
impl SecurityStore for GraphqlStore {
    async fn fetch_batch(&self, request: &BatchRequest) -> Result<BatchResponse, StoreError> {
        let ids: Vec<String> = request.node_ids.iter().map(|id| id.to_string()).collect();

        let batch_document = format!(
            "query Batch($ids: [String!]!, $eids: [Int!]!) {{ \
               OAppSecurityConfig(where: {{oappId: {{_in: $ids}}}}) {{ {} }} \
               OAppPeer(where: {{oappId: {{_in: $ids}}}}) {{ {} }} \
               OAppRouteStats(where: {{oappId: {{_in: $ids}}}}) {{ {} }} \
               DefaultUlnConfig(where: {{eid: {{_in: $eids}}}}) {{ eid {} }} \
             }}",
            EFFECTIVE_FIELDS, PEER_FIELDS, ROUTE_STAT_FIELDS, ULN_FIELDS
        );
        let referencing_document = format!(
            "query Referencing($ids: [String!]!) {{ \
               OAppPeer(where: {{peerOappId: {{_in: $ids}}}}) {{ {} }} \
             }}",
            PEER_FIELDS
        );

        let batch = self.query::<BatchRows>(
            &batch_document,
            json!({ "ids": ids, "eids": request.local_eids }),
        );
        let referencing = self.query::<ReferencingRows>(&referencing_document, json!({ "ids": ids }));
        let (rows, referencing) = futures::future::try_join(batch, referencing).await?;

        let effective_configs: Vec<EffectiveConfig> =
            decode_rows("OAppSecurityConfig", "oappId", rows.security_configs)?;
        let peers: Vec<PeerRecord> = decode_rows("OAppPeer", "oappId", rows.peers)?;
        let route_stats: Vec<RouteStat> = decode_rows("OAppRouteStats", "oappId", rows.route_stats)?;
        let referencing_peers: Vec<PeerRecord> = decode_rows("OAppPeer", "oappId", referencing.peers)?;

        debug!(
            "Indexer batch: {} config(s), {} peer(s), {} referencing peer(s)",
            effective_configs.len(),
            peers.len(),
            referencing_peers.len()
        );

        Ok(BatchResponse {
            effective_configs,
            peers,
            referencing_peers: referencing_peers
                .into_iter()
                .filter(|p| !request.contains(&p.oapp_id))
                .collect(),
            route_stats,
            defaults: rows.defaults,
        })
    }

    async fn fetch_default(&self, scope: &DefaultScope) -> Result<Option<DefaultConfig>, StoreError> {
        let document = format!(
            "query Default($eid: Int!, $srcEid: Int!) {{ \
               DefaultUlnConfig(where: {{eid: {{_eq: $eid}}, srcEid: {{_eq: $srcEid}}}}) {{ eid {} }} \
             }}",
            ULN_FIELDS
        );
        let rows: DefaultRows = self
            .query(&document, json!({ "eid": scope.local_eid, "srcEid": scope.src_eid }))
            .await?;
        Ok(rows.defaults.into_iter().next())
    }

    async fn fetch_overrides_for_chain(&self, local_eid: u32) -> Result<Vec<OverrideConfig>, StoreError> {
        let document = format!(
            "query Overrides($eid: Int!) {{ \
               OAppUlnConfig(where: {{eid: {{_eq: $eid}}}}) {{ oappId {} }} \
             }}",
            ULN_FIELDS
        );
        let rows: OverrideRows = self.query(&document, json!({ "eid": local_eid })).await?;
        decode_rows("OAppUlnConfig", "oappId", rows.overrides)
    }

    async fn fetch_effective_for_chain(&self, local_eid: u32) -> Result<Vec<EffectiveConfig>, StoreError> {
        let document = format!(
            "query Effective($eid: Int!) {{ \
               OAppSecurityConfig(where: {{eid: {{_eq: $eid}}}}) {{ {} }} \
             }}",
            EFFECTIVE_FIELDS
        );
        let rows: EffectiveRows = self.query(&document, json!({ "eid": local_eid })).await?;
        decode_rows("OAppSecurityConfig", "oappId", rows.configs)
    }

    async fn upsert_effective(&self, config: &EffectiveConfig) -> Result<(), StoreError> {
        let document = format!(
            "mutation Upsert($object: OAppSecurityConfig_insert_input!) {{ \
               insert_OAppSecurityConfig_one(object: $object, on_conflict: \
                 {{constraint: OAppSecurityConfig_pkey, update_columns: {}}}) {{ oappId }} \
             }}",
            EFFECTIVE_UPDATE_COLUMNS
        );

        let mut object = serde_json::to_value(config)?;
        if let Some(map) = object.as_object_mut() {
            map.insert(
                "id".to_string(),
                json!(format!("{}_{}", config.oapp_id, config.src_eid)),
            );
            map.insert("eid".to_string(), json!(config.oapp_id.local_eid));
        }

        let result: UpsertResult = self.query(&document, json!({ "object": object })).await?;
        match result.inserted {
            Some(_) => Ok(()),
            None => Err(StoreError::Write(format!(
                "upsert of {}<-{} returned no row",
                config.oapp_id, config.src_eid
            ))),
        }
    }

    async fn fetch_oapp_stats(&self) -> Result<Vec<OAppStats>, StoreError> {
        let document = "query Stats { \
             OAppStats(order_by: {totalPacketsReceived: desc}) { id totalPacketsReceived } \
           }";
        let rows: OAppStatsRows = self.query(document, json!({})).await?;
        decode_rows("OAppStats", "id", rows.stats)
    }

    async fn fetch_default_config_oapps(&self) -> Result<Vec<NodeId>, StoreError> {
        let document = "query DefaultConfigOApps { \
             OAppSecurityConfig(where: {usesDefaultConfig: {_eq: true}}) { oappId } \
           }";
        let rows: DefaultConfigOAppRows = self.query(document, json!({})).await?;
        let rows: Vec<OAppIdRow> = decode_rows("OAppSecurityConfig", "oappId", rows.rows)?;
        Ok(rows.into_iter().map(|r| r.oapp_id).collect())
    }
}
