//! Row shapes of the upstream producer tables

/// ASN row from an intelligence scan
#[derive(Debug, Clone)]
pub struct AsnRecord {
    pub asn_number: String,
    pub organization: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
}

/// Which table a network range row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRangeSource {
    IntelScan,
    Consolidated,
}

impl NetworkRangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkRangeSource::IntelScan => "intel_network_ranges",
            NetworkRangeSource::Consolidated => "consolidated_network_ranges",
        }
    }
}

/// CIDR row with the parent ASN metadata the producer recorded
#[derive(Debug, Clone)]
pub struct NetworkRangeRecord {
    pub source: NetworkRangeSource,
    pub cidr_block: String,
    pub asn: Option<String>,
    pub organization: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveredIpRecord {
    pub ip_address: String,
    pub hostname: Option<String>,
    pub ping_time_ms: Option<f64>,
}

/// Web server row produced by the IP/port probe
#[derive(Debug, Clone)]
pub struct ProbedWebServerRecord {
    pub ip_address: String,
    pub hostname: Option<String>,
    pub port: i64,
    pub protocol: String,
    pub url: Option<String>,
    pub status_code: Option<i64>,
    pub title: Option<String>,
    pub server_header: Option<String>,
    pub content_length: Option<i64>,
    pub technologies: Option<String>,
    pub response_time_ms: Option<f64>,
    pub screenshot_path: Option<String>,
    pub ssl_info: Option<String>,
    pub http_headers: Option<String>,
    pub findings: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvestigateRecord {
    pub hostname: String,
    pub status_code: Option<i64>,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TargetUrlRecord {
    pub url: String,
    pub status_code: Option<i64>,
    pub title: Option<String>,
    pub web_server: Option<String>,
    pub technologies: Option<String>,
    pub content_length: Option<i64>,
    pub response_time_ms: Option<f64>,
    pub screenshot: Option<String>,
    pub ssl_info: Option<String>,
    pub http_headers: Option<String>,
    pub findings: Option<String>,
    pub roi_score: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CloudDomainRecord {
    pub domain: String,
    pub cloud_provider: Option<String>,
    pub service_type: Option<String>,
    pub url: Option<String>,
    pub region: Option<String>,
}

/// Cloud enumeration scan; each provider column holds a JSON array of URLs
#[derive(Debug, Clone)]
pub struct CloudEnumScanRecord {
    pub scan_id: String,
    pub aws_results: Option<String>,
    pub gcp_results: Option<String>,
    pub azure_results: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrawlCloudAssetRecord {
    pub asset_domain: String,
    pub asset_url: Option<String>,
    pub service_provider: Option<String>,
    pub service_type: Option<String>,
    pub root_domain: Option<String>,
    pub region: Option<String>,
}
