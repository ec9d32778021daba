//! Live web servers come from three producers with different natural keys:
//! IP/port probes (`ip:port/protocol`), crawl investigation (bare hostname)
//! and wildcard target URL probes (the URL as recorded).

use crate::assets::{
    ip_port_identifier, normalize_hostname, normalize_ip, AssetAttributes, AssetSubtype,
    AssetType, LiveWebServerAttributes,
};
use crate::error::{Result, SurfaceError};
use crate::resolve::{non_empty, parse_technologies, Candidate, Resolver};
use crate::sources::SourceViews;

pub struct LiveWebServerResolver {
    default_roi_score: i64,
}

impl LiveWebServerResolver {
    pub fn new(default_roi_score: i64) -> Self {
        Self { default_roi_score }
    }

    fn probed(&self, sources: &SourceViews<'_>, scope_target_id: &str) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for server in sources.probed_web_servers(scope_target_id)? {
            let ip = normalize_ip(&server.ip_address)?;
            let port = u16::try_from(server.port).map_err(|_| {
                SurfaceError::invalid_identifier(
                    AssetType::LiveWebServer.as_str(),
                    format!("{}:{}", server.ip_address, server.port),
                    "port out of range",
                )
            })?;
            let protocol = server.protocol.trim().to_lowercase();

            let attributes = LiveWebServerAttributes {
                ip_address: Some(ip.to_string()),
                hostname: non_empty(server.hostname),
                port: Some(port),
                protocol: Some(protocol.clone()),
                url: non_empty(server.url),
                status_code: status_code(server.status_code),
                title: non_empty(server.title),
                server_header: non_empty(server.server_header),
                technologies: parse_technologies(server.technologies.as_deref()),
                content_length: server.content_length,
                response_time_ms: server.response_time_ms,
                screenshot_path: non_empty(server.screenshot_path),
                ssl_info: non_empty(server.ssl_info),
                http_headers: non_empty(server.http_headers),
                findings: non_empty(server.findings),
                roi_score: None,
            };

            candidates.push(
                Candidate::new(
                    ip_port_identifier(&ip, port, &protocol),
                    AssetAttributes::LiveWebServer(attributes),
                    "live_web_servers",
                )
                .with_subtype(AssetSubtype::IpPort),
            );
        }

        Ok(candidates)
    }

    fn investigated(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for record in sources.investigate_results(scope_target_id)? {
            let hostname = normalize_hostname(AssetType::LiveWebServer, &record.hostname)?;
            let attributes = LiveWebServerAttributes {
                hostname: Some(hostname.clone()),
                status_code: status_code(record.status_code),
                title: non_empty(record.title),
                roi_score: Some(self.default_roi_score),
                ..Default::default()
            };

            candidates.push(
                Candidate::new(
                    hostname,
                    AssetAttributes::LiveWebServer(attributes),
                    "investigate_results",
                )
                .with_subtype(AssetSubtype::Domain),
            );
        }

        Ok(candidates)
    }

    fn target_urls(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for record in sources.live_target_urls(scope_target_id)? {
            let url = record.url.trim().to_string();
            let hostname = normalize_hostname(AssetType::LiveWebServer, &url)?;
            let attributes = LiveWebServerAttributes {
                hostname: Some(hostname),
                url: Some(url.clone()),
                status_code: status_code(record.status_code),
                title: non_empty(record.title),
                server_header: non_empty(record.web_server),
                technologies: parse_technologies(record.technologies.as_deref()),
                content_length: record.content_length,
                response_time_ms: record.response_time_ms,
                screenshot_path: non_empty(record.screenshot),
                ssl_info: non_empty(record.ssl_info),
                http_headers: non_empty(record.http_headers),
                findings: non_empty(record.findings),
                roi_score: record.roi_score,
                ..Default::default()
            };

            candidates.push(
                Candidate::new(url, AssetAttributes::LiveWebServer(attributes), "target_urls")
                    .with_subtype(AssetSubtype::Domain),
            );
        }

        Ok(candidates)
    }
}

fn status_code(raw: Option<i64>) -> Option<u16> {
    raw.and_then(|code| u16::try_from(code).ok())
}

impl Resolver for LiveWebServerResolver {
    fn name(&self) -> &'static str {
        "resolve_live_web_servers"
    }

    fn asset_type(&self) -> AssetType {
        AssetType::LiveWebServer
    }

    fn candidates(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = self.probed(sources, scope_target_id)?;
        candidates.extend(self.investigated(sources, scope_target_id)?);
        candidates.extend(self.target_urls(sources, scope_target_id)?);
        Ok(candidates)
    }
}
