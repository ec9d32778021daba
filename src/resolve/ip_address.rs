use crate::assets::{normalize_ip, AssetAttributes, AssetType, IpAddressAttributes, IpType};
use crate::error::Result;
use crate::resolve::{non_empty, Candidate, DnsRecordDraft, Resolver};
use crate::sources::SourceViews;
use std::net::IpAddr;

/// Addresses seen alive by IP/port scans, either by ping or by a web probe
pub struct IpAddressResolver;

fn ip_attributes(ip: &IpAddr) -> IpAddressAttributes {
    let text = ip.to_string();
    IpAddressAttributes {
        ip_type: IpType::of(&text),
        ip_address: text,
        hostname: None,
        ping_time_ms: None,
    }
}

impl Resolver for IpAddressResolver {
    fn name(&self) -> &'static str {
        "resolve_ip_addresses"
    }

    fn asset_type(&self) -> AssetType {
        AssetType::IpAddress
    }

    fn candidates(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for record in sources.discovered_ips(scope_target_id)? {
            let ip = normalize_ip(&record.ip_address)?;
            let hostname = non_empty(record.hostname).map(|h| h.trim().to_lowercase());

            let mut attributes = ip_attributes(&ip);
            attributes.hostname = hostname.clone();
            attributes.ping_time_ms = record.ping_time_ms;

            let mut candidate = Candidate::new(
                ip.to_string(),
                AssetAttributes::IpAddress(attributes),
                "discovered_live_ips",
            );
            if let Some(hostname) = hostname {
                let record_type = match ip {
                    IpAddr::V4(_) => "A",
                    IpAddr::V6(_) => "AAAA",
                };
                candidate = candidate.with_dns_record(DnsRecordDraft {
                    record_type: record_type.to_string(),
                    record_value: hostname,
                    ttl: None,
                });
            }
            candidates.push(candidate);
        }

        for server in sources.probed_web_servers(scope_target_id)? {
            let ip = normalize_ip(&server.ip_address)?;
            candidates.push(Candidate::new(
                ip.to_string(),
                AssetAttributes::IpAddress(ip_attributes(&ip)),
                "live_web_servers",
            ));
        }

        Ok(candidates)
    }
}
