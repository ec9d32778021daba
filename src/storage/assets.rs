//! Repository for the consolidated attack surface tables
//!
//! All statements are scoped by `scope_target_id`. The store borrows a plain
//! connection so callers decide the transaction boundary.

use crate::assets::{
    AssetAttributes, AssetRelationship, AssetSubtype, AssetType, AttackSurfaceAsset, DnsRecord,
    FieldMerge, RelationshipType,
};
use crate::error::{Result, SurfaceError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Asset ready to be written: natural key plus merged payload
#[derive(Debug, Clone)]
pub struct AssetDraft {
    pub asset_identifier: String,
    pub asset_subtype: Option<AssetSubtype>,
    pub attributes: AssetAttributes,
}

/// Rows removed by [`AssetStore::clear_scope`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClearStats {
    pub metadata: usize,
    pub dns_records: usize,
    pub relationships: usize,
    pub assets: usize,
}

/// Per-type asset counts
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCounts(pub BTreeMap<AssetType, usize>);

impl AssetCounts {
    pub fn get(&self, asset_type: AssetType) -> usize {
        self.0.get(&asset_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }
}

/// Consolidated table access for one connection
pub struct AssetStore<'c> {
    conn: &'c Connection,
}

impl<'c> AssetStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Delete all consolidated state of a scope target, children first
    pub fn clear_scope(&self, scope_target_id: &str) -> Result<ClearStats> {
        let metadata = self.conn.execute(
            "DELETE FROM attack_surface_metadata WHERE asset_id IN
                (SELECT id FROM attack_surface_assets WHERE scope_target_id = ?1)",
            params![scope_target_id],
        )?;
        let dns_records = self.conn.execute(
            "DELETE FROM attack_surface_dns_records WHERE asset_id IN
                (SELECT id FROM attack_surface_assets WHERE scope_target_id = ?1)",
            params![scope_target_id],
        )?;
        let relationships = self.conn.execute(
            "DELETE FROM attack_surface_relationships
             WHERE parent_asset_id IN
                    (SELECT id FROM attack_surface_assets WHERE scope_target_id = ?1)
                OR child_asset_id IN
                    (SELECT id FROM attack_surface_assets WHERE scope_target_id = ?1)",
            params![scope_target_id],
        )?;
        let assets = self.conn.execute(
            "DELETE FROM attack_surface_assets WHERE scope_target_id = ?1",
            params![scope_target_id],
        )?;

        Ok(ClearStats {
            metadata,
            dns_records,
            relationships,
            assets,
        })
    }

    /// Insert an asset or merge it into the existing row with the same natural key.
    ///
    /// Existing rows keep their id and `created_at`; the payload is merged field by
    /// field with the new draft winning, and `last_updated` is refreshed.
    pub fn upsert_asset(
        &self,
        scope_target_id: &str,
        draft: AssetDraft,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let asset_type = draft.attributes.asset_type();
        let existing = self
            .conn
            .query_row(
                "SELECT id, attributes FROM attack_surface_assets
                 WHERE scope_target_id = ?1 AND asset_type = ?2 AND asset_identifier = ?3",
                params![scope_target_id, asset_type.as_str(), draft.asset_identifier],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, stored)) => {
                let mut attributes = decode_attributes(&stored)?;
                attributes.merge_from(draft.attributes);
                let encoded = encode_attributes(&attributes)?;

                self.conn.execute(
                    "UPDATE attack_surface_assets
                     SET attributes = ?1,
                         asset_subtype = COALESCE(?2, asset_subtype),
                         last_updated = ?3
                     WHERE id = ?4",
                    params![
                        encoded,
                        draft.asset_subtype.map(|s| s.as_str()),
                        now.to_rfc3339(),
                        id
                    ],
                )?;
                parse_uuid(&id)
            }
            None => {
                let id = Uuid::new_v4();
                let encoded = encode_attributes(&draft.attributes)?;
                self.conn.execute(
                    "INSERT INTO attack_surface_assets
                        (id, scope_target_id, asset_type, asset_subtype, asset_identifier,
                         attributes, created_at, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![
                        id.to_string(),
                        scope_target_id,
                        asset_type.as_str(),
                        draft.asset_subtype.map(|s| s.as_str()),
                        draft.asset_identifier,
                        encoded,
                        now.to_rfc3339()
                    ],
                )?;
                Ok(id)
            }
        }
    }

    /// Attach a DNS record to an asset; duplicates are ignored
    pub fn insert_dns_record(&self, record: &DnsRecord, now: DateTime<Utc>) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO attack_surface_dns_records
                (asset_id, record_type, record_value, ttl, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.asset_id.to_string(),
                record.record_type,
                record.record_value,
                record.ttl,
                now.to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Attach a metadata entry to an asset; duplicates are ignored
    pub fn insert_metadata(&self, asset_id: Uuid, key: &str, value: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO attack_surface_metadata (asset_id, metadata_key, metadata_value)
             VALUES (?1, ?2, ?3)",
            params![asset_id.to_string(), key, value],
        )?;
        Ok(inserted > 0)
    }

    /// Insert an edge unless the same (parent, child, type) already exists
    pub fn insert_relationship(
        &self,
        relationship: &AssetRelationship,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let data = relationship
            .relationship_data
            .as_ref()
            .map(|value| value.to_string());
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO attack_surface_relationships
                (parent_asset_id, child_asset_id, relationship_type, relationship_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                relationship.parent_asset_id.to_string(),
                relationship.child_asset_id.to_string(),
                relationship.relationship_type.as_str(),
                data,
                now.to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// All assets of one type, ordered by identifier
    pub fn assets_of_type(
        &self,
        scope_target_id: &str,
        asset_type: AssetType,
    ) -> Result<Vec<AttackSurfaceAsset>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scope_target_id, asset_subtype, asset_identifier, attributes,
                    created_at, last_updated
             FROM attack_surface_assets
             WHERE scope_target_id = ?1 AND asset_type = ?2
             ORDER BY asset_identifier",
        )?;
        let rows = stmt.query_map(params![scope_target_id, asset_type.as_str()], read_raw_asset)?;

        let mut assets = Vec::new();
        for row in rows {
            assets.push(row?.into_asset()?);
        }
        Ok(assets)
    }

    /// Every asset of a scope target ordered by (asset_type, asset_identifier)
    pub fn load_assets(&self, scope_target_id: &str) -> Result<Vec<AttackSurfaceAsset>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scope_target_id, asset_subtype, asset_identifier, attributes,
                    created_at, last_updated
             FROM attack_surface_assets
             WHERE scope_target_id = ?1
             ORDER BY asset_type, asset_identifier",
        )?;
        let rows = stmt.query_map(params![scope_target_id], read_raw_asset)?;

        let mut assets = Vec::new();
        for row in rows {
            assets.push(row?.into_asset()?);
        }
        Ok(assets)
    }

    /// DNS records of a scope target, grouped by owning asset
    pub fn dns_records(&self, scope_target_id: &str) -> Result<HashMap<Uuid, Vec<DnsRecord>>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.asset_id, d.record_type, d.record_value, d.ttl
             FROM attack_surface_dns_records d
             JOIN attack_surface_assets a ON a.id = d.asset_id
             WHERE a.scope_target_id = ?1
             ORDER BY d.record_type, d.record_value",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut grouped: HashMap<Uuid, Vec<DnsRecord>> = HashMap::new();
        for row in rows {
            let (asset_id, record_type, record_value, ttl) = row?;
            let asset_id = parse_uuid(&asset_id)?;
            grouped.entry(asset_id).or_default().push(DnsRecord {
                asset_id,
                record_type,
                record_value,
                ttl,
            });
        }
        Ok(grouped)
    }

    /// Metadata values of a scope target for one key, grouped by owning asset
    pub fn metadata_values(
        &self,
        scope_target_id: &str,
        key: &str,
    ) -> Result<HashMap<Uuid, Vec<String>>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.asset_id, m.metadata_value
             FROM attack_surface_metadata m
             JOIN attack_surface_assets a ON a.id = m.asset_id
             WHERE a.scope_target_id = ?1 AND m.metadata_key = ?2
             ORDER BY m.metadata_value",
        )?;
        let rows = stmt.query_map(params![scope_target_id, key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut grouped: HashMap<Uuid, Vec<String>> = HashMap::new();
        for row in rows {
            let (asset_id, value) = row?;
            grouped.entry(parse_uuid(&asset_id)?).or_default().push(value);
        }
        Ok(grouped)
    }

    /// Every edge whose parent belongs to the scope target
    pub fn relationships(&self, scope_target_id: &str) -> Result<Vec<AssetRelationship>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.parent_asset_id, r.child_asset_id, r.relationship_type, r.relationship_data
             FROM attack_surface_relationships r
             JOIN attack_surface_assets p ON p.id = r.parent_asset_id
             WHERE p.scope_target_id = ?1
             ORDER BY r.id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (parent, child, relationship_type, data) = row?;
            let relationship_type: RelationshipType = relationship_type
                .parse()
                .map_err(|e: String| SurfaceError::Other(anyhow::anyhow!(e)))?;
            let relationship_data = match data {
                Some(text) => Some(serde_json::from_str(&text).map_err(|e| SurfaceError::Json {
                    source: e,
                    context: "Failed to decode relationship data".to_string(),
                })?),
                None => None,
            };
            edges.push(AssetRelationship {
                parent_asset_id: parse_uuid(&parent)?,
                child_asset_id: parse_uuid(&child)?,
                relationship_type,
                relationship_data,
            });
        }
        Ok(edges)
    }

    /// Per-type asset counts for a scope target
    pub fn count_by_type(&self, scope_target_id: &str) -> Result<AssetCounts> {
        let mut counts: BTreeMap<AssetType, usize> =
            AssetType::ALL.iter().map(|t| (*t, 0)).collect();

        let mut stmt = self.conn.prepare(
            "SELECT asset_type, COUNT(*) FROM attack_surface_assets
             WHERE scope_target_id = ?1
             GROUP BY asset_type",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (asset_type, count) = row?;
            let asset_type: AssetType = asset_type
                .parse()
                .map_err(|e: String| SurfaceError::Other(anyhow::anyhow!(e)))?;
            counts.insert(asset_type, count as usize);
        }

        Ok(AssetCounts(counts))
    }

    /// Number of edges whose parent belongs to the scope target
    pub fn count_relationships(&self, scope_target_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attack_surface_relationships r
             JOIN attack_surface_assets p ON p.id = r.parent_asset_id
             WHERE p.scope_target_id = ?1",
            params![scope_target_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Asset row before JSON and UUID decoding
struct RawAsset {
    id: String,
    scope_target_id: String,
    asset_subtype: Option<String>,
    asset_identifier: String,
    attributes: String,
    created_at: String,
    last_updated: String,
}

fn read_raw_asset(row: &Row<'_>) -> rusqlite::Result<RawAsset> {
    Ok(RawAsset {
        id: row.get(0)?,
        scope_target_id: row.get(1)?,
        asset_subtype: row.get(2)?,
        asset_identifier: row.get(3)?,
        attributes: row.get(4)?,
        created_at: row.get(5)?,
        last_updated: row.get(6)?,
    })
}

impl RawAsset {
    fn into_asset(self) -> Result<AttackSurfaceAsset> {
        let asset_subtype = match self.asset_subtype {
            Some(subtype) => Some(
                subtype
                    .parse::<AssetSubtype>()
                    .map_err(|e| SurfaceError::Other(anyhow::anyhow!(e)))?,
            ),
            None => None,
        };

        Ok(AttackSurfaceAsset {
            id: parse_uuid(&self.id)?,
            scope_target_id: self.scope_target_id,
            asset_subtype,
            asset_identifier: self.asset_identifier,
            attributes: decode_attributes(&self.attributes)?,
            created_at: parse_timestamp(&self.created_at)?,
            last_updated: parse_timestamp(&self.last_updated)?,
        })
    }
}

fn encode_attributes(attributes: &AssetAttributes) -> Result<String> {
    serde_json::to_string(attributes).map_err(|e| SurfaceError::Json {
        source: e,
        context: "Failed to encode asset attributes".to_string(),
    })
}

fn decode_attributes(text: &str) -> Result<AssetAttributes> {
    serde_json::from_str(text).map_err(|e| SurfaceError::Json {
        source: e,
        context: "Failed to decode asset attributes".to_string(),
    })
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| SurfaceError::Other(anyhow::anyhow!("Invalid asset id '{}': {}", text, e)))
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SurfaceError::Other(anyhow::anyhow!("Invalid timestamp '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AsnAttributes, IpAddressAttributes, IpType};
    use crate::storage::Database;
    use tempfile::TempDir;

    fn asn_draft(number: u32, organization: Option<&str>) -> AssetDraft {
        AssetDraft {
            asset_identifier: number.to_string(),
            asset_subtype: None,
            attributes: AssetAttributes::Asn(AsnAttributes {
                organization: organization.map(str::to_string),
                ..AsnAttributes::new(number)
            }),
        }
    }

    fn ip_draft(ip: &str) -> AssetDraft {
        AssetDraft {
            asset_identifier: ip.to_string(),
            asset_subtype: None,
            attributes: AssetAttributes::IpAddress(IpAddressAttributes {
                ip_address: ip.to_string(),
                ip_type: IpType::of(ip),
                hostname: None,
                ping_time_ms: None,
            }),
        }
    }

    #[test]
    fn test_upsert_preserves_id_and_created_at() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();
        let store = AssetStore::new(&conn);

        let first_seen = Utc::now() - chrono::Duration::minutes(5);
        let id = store
            .upsert_asset("scope-1", asn_draft(64500, Some("Example")), first_seen)
            .unwrap();
        let again = store
            .upsert_asset("scope-1", asn_draft(64500, None), Utc::now())
            .unwrap();
        assert_eq!(id, again);

        let assets = store.load_assets("scope-1").unwrap();
        assert_eq!(assets.len(), 1);
        let asset = &assets[0];
        assert_eq!(asset.created_at.timestamp(), first_seen.timestamp());
        assert!(asset.last_updated > asset.created_at);
        match &asset.attributes {
            AssetAttributes::Asn(asn) => assert_eq!(asn.organization.as_deref(), Some("Example")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_clear_scope_only_touches_target() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();
        let store = AssetStore::new(&conn);
        let now = Utc::now();

        let asn = store.upsert_asset("scope-1", asn_draft(64500, None), now).unwrap();
        let ip = store.upsert_asset("scope-1", ip_draft("10.0.0.5"), now).unwrap();
        store
            .insert_relationship(
                &AssetRelationship::new(asn, ip, RelationshipType::Contains),
                now,
            )
            .unwrap();
        store.insert_metadata(ip, "source", "discovered_live_ips").unwrap();
        store.upsert_asset("scope-2", ip_draft("10.0.0.5"), now).unwrap();

        let cleared = store.clear_scope("scope-1").unwrap();
        assert_eq!(
            cleared,
            ClearStats {
                metadata: 1,
                dns_records: 0,
                relationships: 1,
                assets: 2
            }
        );
        assert_eq!(store.count_by_type("scope-1").unwrap().total(), 0);
        assert_eq!(store.count_by_type("scope-2").unwrap().total(), 1);
    }

    #[test]
    fn test_relationship_insert_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();
        let store = AssetStore::new(&conn);
        let now = Utc::now();

        let asn = store.upsert_asset("scope-1", asn_draft(64500, None), now).unwrap();
        let ip = store.upsert_asset("scope-1", ip_draft("10.0.0.5"), now).unwrap();
        let edge = AssetRelationship::new(asn, ip, RelationshipType::Contains);

        assert!(store.insert_relationship(&edge, now).unwrap());
        assert!(!store.insert_relationship(&edge, now).unwrap());
        assert_eq!(store.count_relationships("scope-1").unwrap(), 1);
    }

    #[test]
    fn test_counts_include_every_type() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();
        let store = AssetStore::new(&conn);

        store
            .upsert_asset("scope-1", ip_draft("10.0.0.5"), Utc::now())
            .unwrap();
        let counts = store.count_by_type("scope-1").unwrap();

        assert_eq!(counts.0.len(), AssetType::ALL.len());
        assert_eq!(counts.get(AssetType::IpAddress), 1);
        assert_eq!(counts.get(AssetType::CloudAsset), 0);
    }
}
