//! Read-only views over upstream scanner result tables
//!
//! Each method projects one producer's rows for a scope target into a plain
//! record. Nothing here writes; resolvers decide what the rows mean.

mod records;

pub use records::{
    AsnRecord, CloudDomainRecord, CloudEnumScanRecord, CrawlCloudAssetRecord,
    DiscoveredIpRecord, InvestigateRecord, NetworkRangeRecord, NetworkRangeSource,
    ProbedWebServerRecord, TargetUrlRecord,
};

use crate::error::Result;
use rusqlite::{params, Connection};

/// Source projections for one connection
pub struct SourceViews<'c> {
    conn: &'c Connection,
    successful_status: String,
}

impl<'c> SourceViews<'c> {
    pub fn new(conn: &'c Connection, successful_status: impl Into<String>) -> Self {
        Self {
            conn,
            successful_status: successful_status.into(),
        }
    }

    /// ASN records reported by intelligence scans
    pub fn intel_asns(&self, scope_target_id: &str) -> Result<Vec<AsnRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.asn_number, a.organization, a.description, a.country
             FROM intel_asn_data a
             JOIN intel_scans s ON s.id = a.scan_id
             WHERE s.scope_target_id = ?1
             ORDER BY s.created_at, a.id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok(AsnRecord {
                asn_number: row.get(0)?,
                organization: row.get(1)?,
                description: row.get(2)?,
                country: row.get(3)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Network ranges from intelligence scans followed by the consolidated range table
    pub fn network_ranges(&self, scope_target_id: &str) -> Result<Vec<NetworkRangeRecord>> {
        let mut records = Vec::new();

        let mut stmt = self.conn.prepare(
            "SELECT r.cidr_block, r.asn, r.organization, r.description, r.country
             FROM intel_network_ranges r
             JOIN intel_scans s ON s.id = r.scan_id
             WHERE s.scope_target_id = ?1
             ORDER BY s.created_at, r.id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok(NetworkRangeRecord {
                source: NetworkRangeSource::IntelScan,
                cidr_block: row.get(0)?,
                asn: row.get(1)?,
                organization: row.get(2)?,
                description: row.get(3)?,
                country: row.get(4)?,
            })
        })?;
        for row in rows {
            records.push(row?);
        }

        let mut stmt = self.conn.prepare(
            "SELECT cidr_block, asn, organization, description, country
             FROM consolidated_network_ranges
             WHERE scope_target_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok(NetworkRangeRecord {
                source: NetworkRangeSource::Consolidated,
                cidr_block: row.get(0)?,
                asn: row.get(1)?,
                organization: row.get(2)?,
                description: row.get(3)?,
                country: row.get(4)?,
            })
        })?;
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }

    /// Live IPs found by successful IP/port scans
    pub fn discovered_ips(&self, scope_target_id: &str) -> Result<Vec<DiscoveredIpRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.ip_address, d.hostname, d.ping_time_ms
             FROM discovered_live_ips d
             JOIN ip_port_scans s ON s.id = d.scan_id
             WHERE s.scope_target_id = ?1 AND s.status = ?2
             ORDER BY s.created_at, d.id",
        )?;
        let rows = stmt.query_map(params![scope_target_id, self.successful_status], |row| {
            Ok(DiscoveredIpRecord {
                ip_address: row.get(0)?,
                hostname: row.get(1)?,
                ping_time_ms: row.get(2)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Web servers found by successful IP/port scans
    pub fn probed_web_servers(&self, scope_target_id: &str) -> Result<Vec<ProbedWebServerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT w.ip_address, w.hostname, w.port, w.protocol, w.url, w.status_code,
                    w.title, w.server_header, w.content_length, w.technologies,
                    w.response_time_ms, w.screenshot_path, w.ssl_info,
                    w.http_response_headers, w.findings_json
             FROM live_web_servers w
             JOIN ip_port_scans s ON s.id = w.scan_id
             WHERE s.scope_target_id = ?1 AND s.status = ?2
             ORDER BY s.created_at, w.id",
        )?;
        let rows = stmt.query_map(params![scope_target_id, self.successful_status], |row| {
            Ok(ProbedWebServerRecord {
                ip_address: row.get(0)?,
                hostname: row.get(1)?,
                port: row.get(2)?,
                protocol: row.get(3)?,
                url: row.get(4)?,
                status_code: row.get(5)?,
                title: row.get(6)?,
                server_header: row.get(7)?,
                content_length: row.get(8)?,
                technologies: row.get(9)?,
                response_time_ms: row.get(10)?,
                screenshot_path: row.get(11)?,
                ssl_info: row.get(12)?,
                http_headers: row.get(13)?,
                findings: row.get(14)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Hosts reached by the crawler's investigate step
    pub fn investigate_results(&self, scope_target_id: &str) -> Result<Vec<InvestigateRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT hostname, status_code, title
             FROM investigate_results
             WHERE scope_target_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok(InvestigateRecord {
                hostname: row.get(0)?,
                status_code: row.get(1)?,
                title: row.get(2)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Wildcard target URLs still considered live
    pub fn live_target_urls(&self, scope_target_id: &str) -> Result<Vec<TargetUrlRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, status_code, title, web_server, technologies, content_length,
                    response_time_ms, screenshot, ssl_info, http_response_headers,
                    findings_json, roi_score
             FROM target_urls
             WHERE scope_target_id = ?1 AND no_longer_live = 0
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok(TargetUrlRecord {
                url: row.get(0)?,
                status_code: row.get(1)?,
                title: row.get(2)?,
                web_server: row.get(3)?,
                technologies: row.get(4)?,
                content_length: row.get(5)?,
                response_time_ms: row.get(6)?,
                screenshot: row.get(7)?,
                ssl_info: row.get(8)?,
                http_headers: row.get(9)?,
                findings: row.get(10)?,
                roi_score: row.get(11)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Cloud-hosted domains found by domain enumeration
    pub fn cloud_domains(&self, scope_target_id: &str) -> Result<Vec<CloudDomainRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, cloud_provider, service_type, url, region
             FROM cloud_domains
             WHERE scope_target_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok(CloudDomainRecord {
                domain: row.get(0)?,
                cloud_provider: row.get(1)?,
                service_type: row.get(2)?,
                url: row.get(3)?,
                region: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Completed cloud enumeration scans with their raw per-provider arrays
    pub fn cloud_enum_scans(&self, scope_target_id: &str) -> Result<Vec<CloudEnumScanRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, aws_results, gcp_results, azure_results
             FROM cloud_enum_scans
             WHERE scope_target_id = ?1 AND status = ?2
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope_target_id, self.successful_status], |row| {
            Ok(CloudEnumScanRecord {
                scan_id: row.get(0)?,
                aws_results: row.get(1)?,
                gcp_results: row.get(2)?,
                azure_results: row.get(3)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Cloud assets the crawler found referenced from in-scope pages
    pub fn crawl_cloud_assets(&self, scope_target_id: &str) -> Result<Vec<CrawlCloudAssetRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT asset_domain, asset_url, service_provider, service_type, root_domain, region
             FROM crawl_cloud_assets
             WHERE scope_target_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope_target_id], |row| {
            Ok(CrawlCloudAssetRecord {
                asset_domain: row.get(0)?,
                asset_url: row.get(1)?,
                service_provider: row.get(2)?,
                service_type: row.get(3)?,
                root_domain: row.get(4)?,
                region: row.get(5)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
