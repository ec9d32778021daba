//! Relationship inference
//!
//! Edges are derived structurally from the resolved assets of one scope target:
//!
//! - `contains(network_range -> ip_address)` when the address falls inside the block
//! - `contains(asn -> network_range)` when a range source row records that ASN
//! - `hosted_on(live_web_server -> ip_address)` for `ip_port` servers on that address
//!
//! Every insert is `INSERT OR IGNORE` on (parent, child, type), so re-running a
//! rule never duplicates an edge.

mod cidr_index;

pub use cidr_index::CidrIndex;

use crate::assets::{
    normalize_asn, normalize_cidr, normalize_ip, AssetAttributes, AssetRelationship,
    AssetSubtype, AssetType, RelationshipType,
};
use crate::error::{Result, SurfaceError};
use crate::resolve::non_empty;
use crate::sources::SourceViews;
use crate::storage::AssetStore;
use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How many addresses are probed between deadline checks
const DEADLINE_CHECK_INTERVAL: usize = 256;

pub const NETWORK_CONTAINMENT_STAGE: &str = "infer_network_containment";
pub const ASN_CONTAINMENT_STAGE: &str = "infer_asn_containment";
pub const HOSTING_STAGE: &str = "infer_hosting";

/// Edges inserted per rule
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipStats {
    pub range_contains_ip: usize,
    pub asn_contains_range: usize,
    pub server_hosted_on_ip: usize,
}

impl RelationshipStats {
    pub fn total(&self) -> usize {
        self.range_contains_ip + self.asn_contains_range + self.server_hosted_on_ip
    }
}

pub struct RelationshipEngine {
    containment_timeout: Duration,
}

impl RelationshipEngine {
    pub fn new(containment_timeout: Duration) -> Self {
        Self {
            containment_timeout,
        }
    }

    /// Run every rule for a scope target. Errors carry the failing rule's stage.
    pub fn infer(
        &self,
        sources: &SourceViews<'_>,
        store: &AssetStore<'_>,
        scope_target_id: &str,
    ) -> Result<RelationshipStats> {
        let now = Utc::now();

        let range_contains_ip = self
            .range_contains_ip(store, scope_target_id, now)
            .map_err(|e| e.in_stage(NETWORK_CONTAINMENT_STAGE))?;
        let asn_contains_range = self
            .asn_contains_range(sources, store, scope_target_id, now)
            .map_err(|e| e.in_stage(ASN_CONTAINMENT_STAGE))?;
        let server_hosted_on_ip = self
            .server_hosted_on_ip(store, scope_target_id, now)
            .map_err(|e| e.in_stage(HOSTING_STAGE))?;

        let stats = RelationshipStats {
            range_contains_ip,
            asn_contains_range,
            server_hosted_on_ip,
        };
        tracing::debug!(
            "Inferred {} edges for {} ({} range->ip, {} asn->range, {} hosted_on)",
            stats.total(),
            scope_target_id,
            stats.range_contains_ip,
            stats.asn_contains_range,
            stats.server_hosted_on_ip
        );

        Ok(stats)
    }

    fn range_contains_ip(
        &self,
        store: &AssetStore<'_>,
        scope_target_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let started = Instant::now();

        let mut index = CidrIndex::new();
        for range in store.assets_of_type(scope_target_id, AssetType::NetworkRange)? {
            let net = normalize_cidr(&range.asset_identifier)?;
            index.insert(net, range.id);
        }
        if index.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        let addresses = store.assets_of_type(scope_target_id, AssetType::IpAddress)?;

        for (position, address) in addresses.iter().enumerate() {
            if position % DEADLINE_CHECK_INTERVAL == 0 {
                let elapsed = started.elapsed();
                if elapsed >= self.containment_timeout {
                    return Err(SurfaceError::Timeout {
                        stage: NETWORK_CONTAINMENT_STAGE.to_string(),
                        elapsed,
                    });
                }
            }

            let ip = normalize_ip(&address.asset_identifier)?;
            for range_id in index.containing(ip) {
                let edge = AssetRelationship::new(range_id, address.id, RelationshipType::Contains);
                if store.insert_relationship(&edge, now)? {
                    inserted += 1;
                }
            }
        }

        Ok(inserted)
    }

    fn asn_contains_range(
        &self,
        sources: &SourceViews<'_>,
        store: &AssetStore<'_>,
        scope_target_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut asns: HashMap<u32, Uuid> = HashMap::new();
        for asn in store.assets_of_type(scope_target_id, AssetType::Asn)? {
            asns.insert(normalize_asn(&asn.asset_identifier)?, asn.id);
        }
        if asns.is_empty() {
            return Ok(0);
        }

        let mut ranges: HashMap<String, Uuid> = HashMap::new();
        for range in store.assets_of_type(scope_target_id, AssetType::NetworkRange)? {
            ranges.insert(range.asset_identifier, range.id);
        }

        let mut inserted = 0;
        for record in sources.network_ranges(scope_target_id)? {
            let Some(asn) = non_empty(record.asn) else {
                continue;
            };
            let asn_number = normalize_asn(&asn)?;
            let cidr = normalize_cidr(&record.cidr_block)?.to_string();

            let (Some(&asn_id), Some(&range_id)) = (asns.get(&asn_number), ranges.get(&cidr))
            else {
                continue;
            };

            let edge = AssetRelationship::new(asn_id, range_id, RelationshipType::Contains);
            if store.insert_relationship(&edge, now)? {
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    fn server_hosted_on_ip(
        &self,
        store: &AssetStore<'_>,
        scope_target_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut addresses: HashMap<IpAddr, Uuid> = HashMap::new();
        for address in store.assets_of_type(scope_target_id, AssetType::IpAddress)? {
            addresses.insert(normalize_ip(&address.asset_identifier)?, address.id);
        }
        if addresses.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        for server in store.assets_of_type(scope_target_id, AssetType::LiveWebServer)? {
            if server.asset_subtype != Some(AssetSubtype::IpPort) {
                continue;
            }
            let AssetAttributes::LiveWebServer(attributes) = &server.attributes else {
                continue;
            };
            let Some(ip) = attributes.ip_address.as_deref() else {
                continue;
            };
            let Some(&ip_id) = addresses.get(&normalize_ip(ip)?) else {
                continue;
            };

            let mut edge = AssetRelationship::new(server.id, ip_id, RelationshipType::HostedOn);
            if let Some(port) = attributes.port {
                edge = edge.with_data(serde_json::json!({
                    "port": port,
                    "protocol": attributes.protocol,
                }));
            }
            if store.insert_relationship(&edge, now)? {
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}
