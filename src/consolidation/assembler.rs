//! Builds the caller-facing view of a consolidated scope target

use crate::assets::{
    AssetAttributes, AssetRelationship, AssetType, AttackSurfaceAsset, DnsRecord,
};
use crate::error::Result;
use crate::resolve::SOURCE_METADATA_KEY;
use crate::storage::{AssetCounts, AssetStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Output of one consolidation run
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationResult {
    pub scope_target_id: String,
    pub asset_counts: AssetCounts,
    pub relationship_count: usize,
    pub assets: Vec<AssetView>,
    pub elapsed_ms: u64,
}

/// Counts of the last consolidated state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidationSummary {
    pub scope_target_id: String,
    pub asset_counts: AssetCounts,
    pub relationship_count: usize,
}

/// An asset with its decoded payload and attached substructures
#[derive(Debug, Clone, Serialize)]
pub struct AssetView {
    #[serde(flatten)]
    pub asset: AttackSurfaceAsset,
    pub asset_type: AssetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_info: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Value>,
    pub dns_records: Vec<DnsRecord>,
    /// Upstream producers that contributed to this asset
    pub sources: Vec<String>,
    /// Edges where this asset is parent or child
    pub relationships: Vec<AssetRelationship>,
}

pub fn summarize(store: &AssetStore<'_>, scope_target_id: &str) -> Result<ConsolidationSummary> {
    Ok(ConsolidationSummary {
        scope_target_id: scope_target_id.to_string(),
        asset_counts: store.count_by_type(scope_target_id)?,
        relationship_count: store.count_relationships(scope_target_id)?,
    })
}

/// Load every asset of the scope target with DNS records, provenance and edges
pub fn assemble(
    store: &AssetStore<'_>,
    scope_target_id: &str,
    started: Instant,
) -> Result<ConsolidationResult> {
    let assets = store.load_assets(scope_target_id)?;
    let mut dns_records = store.dns_records(scope_target_id)?;
    let mut sources = store.metadata_values(scope_target_id, SOURCE_METADATA_KEY)?;

    let mut edges: HashMap<Uuid, Vec<AssetRelationship>> = HashMap::new();
    for edge in store.relationships(scope_target_id)? {
        edges
            .entry(edge.child_asset_id)
            .or_default()
            .push(edge.clone());
        edges.entry(edge.parent_asset_id).or_default().push(edge);
    }

    let views: Vec<AssetView> = assets
        .into_iter()
        .map(|asset| {
            let id = asset.id;
            let mut view = decode_payload(asset);
            view.dns_records = dns_records.remove(&id).unwrap_or_default();
            view.sources = sources.remove(&id).unwrap_or_default();
            view.relationships = edges.remove(&id).unwrap_or_default();
            view
        })
        .collect();

    let summary = summarize(store, scope_target_id)?;

    Ok(ConsolidationResult {
        scope_target_id: scope_target_id.to_string(),
        asset_counts: summary.asset_counts,
        relationship_count: summary.relationship_count,
        assets: views,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

fn decode_payload(asset: AttackSurfaceAsset) -> AssetView {
    let (ssl_info, http_headers, findings) = match &asset.attributes {
        AssetAttributes::LiveWebServer(server) => (
            decode_map(&asset, "ssl_info", server.ssl_info.as_deref()),
            decode_map(&asset, "http_headers", server.http_headers.as_deref()),
            decode_value(&asset, "findings", server.findings.as_deref()),
        ),
        _ => (None, None, None),
    };

    AssetView {
        asset_type: asset.asset_type(),
        asset,
        ssl_info,
        http_headers,
        findings,
        dns_records: Vec::new(),
        sources: Vec::new(),
        relationships: Vec::new(),
    }
}

fn decode_map(
    asset: &AttackSurfaceAsset,
    field: &str,
    raw: Option<&str>,
) -> Option<Map<String, Value>> {
    match decode_value(asset, field, raw)? {
        Value::Object(map) => Some(map),
        other => {
            tracing::warn!(
                "Ignoring {} of {}: expected a JSON object, got {}",
                field,
                asset.asset_identifier,
                other
            );
            None
        }
    }
}

fn decode_value(asset: &AttackSurfaceAsset, field: &str, raw: Option<&str>) -> Option<Value> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                "Failed to decode {} of {}: {}",
                field,
                asset.asset_identifier,
                e
            );
            None
        }
    }
}
