//! Natural-key normalization.
//!
//! The asset store only accepts identifiers that parse as their type's
//! canonical form; anything else is an [`SurfaceError::InvalidIdentifier`].

use crate::assets::AssetType;
use crate::error::{Result, SurfaceError};
use ipnet::IpNet;
use std::net::IpAddr;

/// Normalize an ASN such as "AS64500", "as 64500" or "64500" to its number
pub fn normalize_asn(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("AS")
        .or_else(|| trimmed.strip_prefix("as"))
        .or_else(|| trimmed.strip_prefix("As"))
        .unwrap_or(trimmed)
        .trim();

    digits.parse::<u32>().map_err(|_| {
        SurfaceError::invalid_identifier(AssetType::Asn.as_str(), raw, "not an AS number")
    })
}

/// Parse a CIDR block. Host bits must be zero, as with a strict `cidr` column.
pub fn normalize_cidr(raw: &str) -> Result<IpNet> {
    let net: IpNet = raw.trim().parse().map_err(|e: ipnet::AddrParseError| {
        SurfaceError::invalid_identifier(AssetType::NetworkRange.as_str(), raw, e.to_string())
    })?;

    if net.trunc() != net {
        return Err(SurfaceError::invalid_identifier(
            AssetType::NetworkRange.as_str(),
            raw,
            "host bits set to the right of the prefix",
        ));
    }

    Ok(net)
}

/// Parse an IP address into its canonical form
pub fn normalize_ip(raw: &str) -> Result<IpAddr> {
    raw.trim().parse().map_err(|e: std::net::AddrParseError| {
        SurfaceError::invalid_identifier(AssetType::IpAddress.as_str(), raw, e.to_string())
    })
}

/// Reduce a hostname, URL or `host:port` to a lowercase bare hostname
pub fn normalize_hostname(asset_type: AssetType, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();

    // Bracketed IPv6 literals keep their colons
    let host = if let Some(rest) = authority.strip_prefix('[') {
        rest.split(']').next().unwrap_or_default()
    } else {
        authority.split(':').next().unwrap_or_default()
    };
    let host = host.trim_end_matches('.').to_lowercase();

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(SurfaceError::invalid_identifier(
            asset_type.as_str(),
            raw,
            "no hostname",
        ));
    }

    Ok(host)
}

/// Identifier of a web server found by IP/port probing: `ip:port/protocol`
pub fn ip_port_identifier(ip: &IpAddr, port: u16, protocol: &str) -> String {
    format!("{}:{}/{}", ip, port, protocol.trim().to_lowercase())
}
