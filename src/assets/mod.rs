//! Consolidated attack surface model
//!
//! Every asset shares a common envelope (id, scope target, natural key,
//! timestamps) and carries one type-specific payload from [`AssetAttributes`].
//! Relationships and DNS records hang off assets by id.

mod attributes;
mod identifiers;

pub use attributes::{
    AsnAttributes, AssetAttributes, CloudAssetAttributes, FieldMerge, IpAddressAttributes,
    LiveWebServerAttributes, NetworkRangeAttributes,
};
pub use identifiers::{
    ip_port_identifier, normalize_asn, normalize_cidr, normalize_hostname, normalize_ip,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of consolidated asset
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Asn,
    NetworkRange,
    IpAddress,
    LiveWebServer,
    CloudAsset,
}

impl AssetType {
    /// All asset types, in resolution order
    pub const ALL: [AssetType; 5] = [
        AssetType::Asn,
        AssetType::NetworkRange,
        AssetType::IpAddress,
        AssetType::LiveWebServer,
        AssetType::CloudAsset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Asn => "asn",
            AssetType::NetworkRange => "network_range",
            AssetType::IpAddress => "ip_address",
            AssetType::LiveWebServer => "live_web_server",
            AssetType::CloudAsset => "cloud_asset",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown asset type '{}'", s))
    }
}

/// Finer classification inside an asset type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSubtype {
    /// Web server reached through an IP/port probe
    IpPort,
    /// Web server reached by hostname or URL
    Domain,
}

impl AssetSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetSubtype::IpPort => "ip_port",
            AssetSubtype::Domain => "domain",
        }
    }
}

impl FromStr for AssetSubtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip_port" => Ok(AssetSubtype::IpPort),
            "domain" => Ok(AssetSubtype::Domain),
            other => Err(format!("unknown asset subtype '{}'", other)),
        }
    }
}

/// Address family of an IP asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    Ipv4,
    Ipv6,
    Unknown,
}

impl IpType {
    /// Derive the family from address text
    pub fn of(address: &str) -> Self {
        match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => IpType::Ipv4,
            Ok(IpAddr::V6(_)) => IpType::Ipv6,
            Err(_) => IpType::Unknown,
        }
    }
}

/// Canonical consolidated entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackSurfaceAsset {
    pub id: Uuid,
    pub scope_target_id: String,
    pub asset_subtype: Option<AssetSubtype>,
    /// Natural key, unique per scope target and asset type
    pub asset_identifier: String,
    pub attributes: AssetAttributes,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl AttackSurfaceAsset {
    pub fn asset_type(&self) -> AssetType {
        self.attributes.asset_type()
    }
}

/// DNS record owned by an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub asset_id: Uuid,
    pub record_type: String,
    pub record_value: String,
    pub ttl: Option<i64>,
}

/// Edge kind between two assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Child network or address is a structural member of the parent
    Contains,
    /// Parent web server is served from the child address
    HostedOn,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Contains => "contains",
            RelationshipType::HostedOn => "hosted_on",
        }
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(RelationshipType::Contains),
            "hosted_on" => Ok(RelationshipType::HostedOn),
            other => Err(format!("unknown relationship type '{}'", other)),
        }
    }
}

/// Directed edge between two assets of the same scope target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRelationship {
    pub parent_asset_id: Uuid,
    pub child_asset_id: Uuid,
    pub relationship_type: RelationshipType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_data: Option<serde_json::Value>,
}

impl AssetRelationship {
    pub fn new(parent: Uuid, child: Uuid, relationship_type: RelationshipType) -> Self {
        Self {
            parent_asset_id: parent,
            child_asset_id: child,
            relationship_type,
            relationship_data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.relationship_data = Some(data);
        self
    }
}
