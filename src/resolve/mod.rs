//! Entity resolution
//!
//! A resolver turns one asset type's upstream rows into [`Candidate`]s keyed by
//! natural identifier. Candidates are reduced by identifier with
//! [`FieldMerge`] (last write wins per field, sets union) and written once per
//! identifier, together with their DNS records and source provenance.

mod asn;
mod cloud_asset;
mod ip_address;
mod live_web_server;
mod network_range;

pub use asn::AsnResolver;
pub use cloud_asset::CloudAssetResolver;
pub use ip_address::IpAddressResolver;
pub use live_web_server::LiveWebServerResolver;
pub use network_range::NetworkRangeResolver;

use crate::assets::{AssetAttributes, AssetSubtype, AssetType, DnsRecord, FieldMerge};
use crate::config::ConsolidationConfig;
use crate::error::Result;
use crate::sources::SourceViews;
use crate::storage::{AssetDraft, AssetStore};
use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Metadata key under which contributing producers are recorded
pub const SOURCE_METADATA_KEY: &str = "source";

/// DNS record not yet bound to an asset id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecordDraft {
    pub record_type: String,
    pub record_value: String,
    pub ttl: Option<i64>,
}

/// One source row projected onto an asset type
#[derive(Debug, Clone)]
pub struct Candidate {
    pub identifier: String,
    pub subtype: Option<AssetSubtype>,
    pub attributes: AssetAttributes,
    /// Producer table the row came from
    pub source: &'static str,
    pub dns_records: Vec<DnsRecordDraft>,
}

impl Candidate {
    pub fn new(
        identifier: impl Into<String>,
        attributes: AssetAttributes,
        source: &'static str,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            subtype: None,
            attributes,
            source,
            dns_records: Vec::new(),
        }
    }

    pub fn with_subtype(mut self, subtype: AssetSubtype) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn with_dns_record(mut self, record: DnsRecordDraft) -> Self {
        self.dns_records.push(record);
        self
    }
}

/// Candidates sharing one identifier, reduced to a single asset
#[derive(Debug, Clone)]
pub struct MergedAsset {
    pub draft: AssetDraft,
    pub sources: BTreeSet<&'static str>,
    pub dns_records: Vec<DnsRecordDraft>,
}

/// Projects upstream rows of one asset type into candidates
pub trait Resolver {
    /// Stage name used in logs and errors
    fn name(&self) -> &'static str;

    fn asset_type(&self) -> AssetType;

    fn candidates(&self, sources: &SourceViews<'_>, scope_target_id: &str)
        -> Result<Vec<Candidate>>;
}

/// The resolvers of a consolidation run, one per asset type
pub fn default_resolvers(config: &ConsolidationConfig) -> Vec<Box<dyn Resolver>> {
    vec![
        Box::new(AsnResolver),
        Box::new(NetworkRangeResolver),
        Box::new(IpAddressResolver),
        Box::new(LiveWebServerResolver::new(config.default_roi_score)),
        Box::new(CloudAssetResolver),
    ]
}

/// Reduce candidates by identifier, keeping first-seen order
pub fn merge_candidates(candidates: Vec<Candidate>) -> Vec<MergedAsset> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<MergedAsset> = Vec::new();

    for candidate in candidates {
        match index.get(&candidate.identifier) {
            Some(&position) => {
                let entry = &mut merged[position];
                entry.draft.attributes.merge_from(candidate.attributes);
                if candidate.subtype.is_some() {
                    entry.draft.asset_subtype = candidate.subtype;
                }
                entry.sources.insert(candidate.source);
                for record in candidate.dns_records {
                    if !entry.dns_records.contains(&record) {
                        entry.dns_records.push(record);
                    }
                }
            }
            None => {
                index.insert(candidate.identifier.clone(), merged.len());
                merged.push(MergedAsset {
                    draft: AssetDraft {
                        asset_identifier: candidate.identifier,
                        asset_subtype: candidate.subtype,
                        attributes: candidate.attributes,
                    },
                    sources: BTreeSet::from([candidate.source]),
                    dns_records: candidate.dns_records,
                });
            }
        }
    }

    merged
}

/// Write merged assets with their DNS records and provenance; returns rows written
pub fn write_assets(
    store: &AssetStore<'_>,
    scope_target_id: &str,
    merged: Vec<MergedAsset>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut written = 0;

    for asset in merged {
        let asset_id = store.upsert_asset(scope_target_id, asset.draft, now)?;
        written += 1;

        for source in &asset.sources {
            store.insert_metadata(asset_id, SOURCE_METADATA_KEY, source)?;
        }

        for record in asset.dns_records {
            store.insert_dns_record(
                &DnsRecord {
                    asset_id,
                    record_type: record.record_type,
                    record_value: record.record_value,
                    ttl: record.ttl,
                },
                now,
            )?;
        }
    }

    Ok(written)
}

/// Gather, merge and write one resolver's assets
pub fn run_resolver(
    resolver: &dyn Resolver,
    sources: &SourceViews<'_>,
    store: &AssetStore<'_>,
    scope_target_id: &str,
) -> Result<usize> {
    let candidates = resolver.candidates(sources, scope_target_id)?;
    let candidate_count = candidates.len();
    let merged = merge_candidates(candidates);

    tracing::debug!(
        "{}: {} candidates merged into {} {} assets",
        resolver.name(),
        candidate_count,
        merged.len(),
        resolver.asset_type()
    );

    write_assets(store, scope_target_id, merged, Utc::now())
}

/// Decode a technologies column: a JSON array, or a comma separated list
pub(crate) fn parse_technologies(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let technologies: Vec<String> = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => list,
        Err(_) => raw.split(',').map(str::to_string).collect(),
    };

    let technologies: Vec<String> = technologies
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if technologies.is_empty() {
        None
    } else {
        Some(technologies)
    }
}

/// Drop empty or whitespace-only optional text
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
