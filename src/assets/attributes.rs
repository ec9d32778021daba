//! Per-type asset payloads and the field-level merge combinator

use crate::assets::{AssetType, IpType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Merge a later partial record into an earlier one.
///
/// Single-valued fields are last-write-wins: a later `Some` replaces the
/// current value, a later `None` leaves it alone. Set-valued fields union.
pub trait FieldMerge {
    fn merge_from(&mut self, later: Self);
}

fn overwrite<T>(slot: &mut Option<T>, later: Option<T>) {
    if later.is_some() {
        *slot = later;
    }
}

/// Type-specific payload of a consolidated asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetAttributes {
    Asn(AsnAttributes),
    NetworkRange(NetworkRangeAttributes),
    IpAddress(IpAddressAttributes),
    LiveWebServer(LiveWebServerAttributes),
    CloudAsset(CloudAssetAttributes),
}

impl AssetAttributes {
    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetAttributes::Asn(_) => AssetType::Asn,
            AssetAttributes::NetworkRange(_) => AssetType::NetworkRange,
            AssetAttributes::IpAddress(_) => AssetType::IpAddress,
            AssetAttributes::LiveWebServer(_) => AssetType::LiveWebServer,
            AssetAttributes::CloudAsset(_) => AssetType::CloudAsset,
        }
    }
}

impl FieldMerge for AssetAttributes {
    fn merge_from(&mut self, later: Self) {
        match (self, later) {
            (AssetAttributes::Asn(a), AssetAttributes::Asn(b)) => a.merge_from(b),
            (AssetAttributes::NetworkRange(a), AssetAttributes::NetworkRange(b)) => {
                a.merge_from(b)
            }
            (AssetAttributes::IpAddress(a), AssetAttributes::IpAddress(b)) => a.merge_from(b),
            (AssetAttributes::LiveWebServer(a), AssetAttributes::LiveWebServer(b)) => {
                a.merge_from(b)
            }
            (AssetAttributes::CloudAsset(a), AssetAttributes::CloudAsset(b)) => a.merge_from(b),
            (current, later) => {
                tracing::warn!(
                    "Replacing {} payload with {} payload during merge",
                    current.asset_type(),
                    later.asset_type()
                );
                *current = later;
            }
        }
    }
}

/// Autonomous system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsnAttributes {
    pub asn_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl AsnAttributes {
    pub fn new(asn_number: u32) -> Self {
        Self {
            asn_number,
            organization: None,
            description: None,
            country: None,
        }
    }
}

impl FieldMerge for AsnAttributes {
    fn merge_from(&mut self, later: Self) {
        self.asn_number = later.asn_number;
        overwrite(&mut self.organization, later.organization);
        overwrite(&mut self.description, later.description);
        overwrite(&mut self.country, later.country);
    }
}

/// CIDR network block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRangeAttributes {
    pub cidr_block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl FieldMerge for NetworkRangeAttributes {
    fn merge_from(&mut self, later: Self) {
        self.cidr_block = later.cidr_block;
        overwrite(&mut self.asn_number, later.asn_number);
        overwrite(&mut self.organization, later.organization);
        overwrite(&mut self.description, later.description);
        overwrite(&mut self.country, later.country);
    }
}

/// Single IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAddressAttributes {
    pub ip_address: String,
    pub ip_type: IpType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_time_ms: Option<f64>,
}

impl FieldMerge for IpAddressAttributes {
    fn merge_from(&mut self, later: Self) {
        self.ip_address = later.ip_address;
        self.ip_type = later.ip_type;
        overwrite(&mut self.hostname, later.hostname);
        overwrite(&mut self.ping_time_ms, later.ping_time_ms);
    }
}

/// HTTP(S) server discovered by probing or crawling.
///
/// `ssl_info`, `http_headers` and `findings` are kept as the raw JSON text the
/// producer stored; they are decoded leniently when results are assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveWebServerAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_score: Option<i64>,
}

impl FieldMerge for LiveWebServerAttributes {
    fn merge_from(&mut self, later: Self) {
        overwrite(&mut self.ip_address, later.ip_address);
        overwrite(&mut self.hostname, later.hostname);
        overwrite(&mut self.port, later.port);
        overwrite(&mut self.protocol, later.protocol);
        overwrite(&mut self.url, later.url);
        overwrite(&mut self.status_code, later.status_code);
        overwrite(&mut self.title, later.title);
        overwrite(&mut self.server_header, later.server_header);
        overwrite(&mut self.technologies, later.technologies);
        overwrite(&mut self.content_length, later.content_length);
        overwrite(&mut self.response_time_ms, later.response_time_ms);
        overwrite(&mut self.screenshot_path, later.screenshot_path);
        overwrite(&mut self.ssl_info, later.ssl_info);
        overwrite(&mut self.http_headers, later.http_headers);
        overwrite(&mut self.findings, later.findings);
        overwrite(&mut self.roi_score, later.roi_score);
    }
}

/// Cloud resource aggregated across enumeration producers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudAssetAttributes {
    #[serde(default)]
    pub cloud_providers: BTreeSet<String>,
    #[serde(default)]
    pub service_types: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub domains: BTreeSet<String>,
    #[serde(default)]
    pub urls: BTreeSet<String>,
}

impl FieldMerge for CloudAssetAttributes {
    fn merge_from(&mut self, later: Self) {
        self.cloud_providers.extend(later.cloud_providers);
        self.service_types.extend(later.service_types);
        self.domains.extend(later.domains);
        self.urls.extend(later.urls);
        overwrite(&mut self.region, later.region);
    }
}
