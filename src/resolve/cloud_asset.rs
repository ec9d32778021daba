//! Cloud assets are keyed by resource. A virtual-hosted resource is its
//! hostname; a path-style resource on a shared provider endpoint is the
//! endpoint plus its bucket, e.g. `storage.googleapis.com/acme-backups`.
//! Every producer adds to the provider, service type, domain and URL sets of
//! that resource.

use crate::assets::{normalize_hostname, AssetAttributes, AssetType, CloudAssetAttributes};
use crate::error::{Result, SurfaceError};
use crate::resolve::{non_empty, Candidate, Resolver};
use crate::sources::SourceViews;

pub struct CloudAssetResolver;

/// Hostname suffixes that identify well-known cloud services
const SERVICE_SUFFIXES: &[(&str, &str)] = &[
    ("s3.amazonaws.com", "s3"),
    ("amazonaws.com", "aws"),
    ("cloudfront.net", "cloudfront"),
    ("storage.googleapis.com", "gcs"),
    ("appspot.com", "app_engine"),
    ("firebaseio.com", "firebase"),
    ("cloudfunctions.net", "cloud_functions"),
    ("blob.core.windows.net", "blob_storage"),
    ("azurewebsites.net", "app_service"),
    ("cloudapp.net", "cloud_app"),
    ("cloudapp.azure.com", "cloud_app"),
    ("database.windows.net", "sql_database"),
];

fn infer_service_type(hostname: &str) -> Option<String> {
    SERVICE_SUFFIXES
        .iter()
        .find(|(suffix, _)| hostname == *suffix || hostname.ends_with(&format!(".{}", suffix)))
        .map(|(_, service)| service.to_string())
}

/// Endpoints shared by many tenants, where the first path segment names the resource
const SHARED_ENDPOINTS: &[&str] = &[
    "s3.amazonaws.com",
    "storage.googleapis.com",
    "storage.cloud.google.com",
];

fn is_shared_endpoint(hostname: &str) -> bool {
    if SHARED_ENDPOINTS.contains(&hostname) {
        return true;
    }
    // Regional S3 endpoints (s3.<region>.amazonaws.com, s3-<region>.amazonaws.com)
    // carry no bucket label; virtual-hosted ones have s3 further right.
    let Some(rest) = hostname.strip_suffix(".amazonaws.com") else {
        return false;
    };
    let is_s3 = |label: &str| label == "s3" || label.starts_with("s3-");
    let mut labels = rest.split('.');
    labels.next().is_some_and(is_s3) && !labels.any(is_s3)
}

fn first_path_segment(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let (_, path) = without_scheme.split_once('/')?;

    path.split(['/', '?', '#'])
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
}

/// Natural key of a cloud resource seen at `location`, with an optional URL
/// that may carry the bucket when `location` is a bare shared endpoint.
fn resource_identifier(location: &str, url: Option<&str>) -> Result<(String, String)> {
    let hostname = normalize_hostname(AssetType::CloudAsset, location)?;
    if !is_shared_endpoint(&hostname) {
        return Ok((hostname.clone(), hostname));
    }

    let bucket = first_path_segment(location).or_else(|| {
        url.filter(|url| {
            normalize_hostname(AssetType::CloudAsset, url).is_ok_and(|host| host == hostname)
        })
        .and_then(first_path_segment)
    });
    let identifier = match bucket {
        Some(bucket) => format!("{}/{}", hostname, bucket),
        None => hostname.clone(),
    };
    Ok((identifier, hostname))
}

fn normalize_label(value: Option<String>) -> Option<String> {
    non_empty(value).map(|v| v.trim().to_lowercase())
}

impl CloudAssetResolver {
    fn from_cloud_domains(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for record in sources.cloud_domains(scope_target_id)? {
            let (identifier, hostname) =
                resource_identifier(&record.domain, record.url.as_deref())?;
            let mut attributes = CloudAssetAttributes {
                region: non_empty(record.region),
                ..Default::default()
            };
            attributes.domains.insert(hostname);
            attributes.cloud_providers.extend(normalize_label(record.cloud_provider));
            attributes.service_types.extend(normalize_label(record.service_type));
            attributes.urls.extend(non_empty(record.url));

            candidates.push(Candidate::new(
                identifier,
                AssetAttributes::CloudAsset(attributes),
                "cloud_domains",
            ));
        }

        Ok(candidates)
    }

    fn from_cloud_enum(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for scan in sources.cloud_enum_scans(scope_target_id)? {
            let providers = [
                ("aws", scan.aws_results),
                ("gcp", scan.gcp_results),
                ("azure", scan.azure_results),
            ];

            for (provider, raw) in providers {
                let Some(raw) = non_empty(raw) else {
                    continue;
                };
                let entries: Vec<String> =
                    serde_json::from_str(&raw).map_err(|e| SurfaceError::Json {
                        source: e,
                        context: format!(
                            "Failed to decode {} results of cloud enumeration scan {}",
                            provider, scan.scan_id
                        ),
                    })?;

                for entry in entries {
                    let entry = entry.trim().to_string();
                    if entry.is_empty() {
                        continue;
                    }
                    let (identifier, hostname) = resource_identifier(&entry, None)?;
                    let mut attributes = CloudAssetAttributes::default();
                    attributes.cloud_providers.insert(provider.to_string());
                    attributes.service_types.extend(infer_service_type(&hostname));
                    if entry.contains("://") {
                        attributes.urls.insert(entry);
                    }

                    candidates.push(Candidate::new(
                        identifier,
                        AssetAttributes::CloudAsset(attributes),
                        "cloud_enum_scans",
                    ));
                }
            }
        }

        Ok(candidates)
    }

    fn from_crawler(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for record in sources.crawl_cloud_assets(scope_target_id)? {
            let (identifier, _) =
                resource_identifier(&record.asset_domain, record.asset_url.as_deref())?;
            let mut attributes = CloudAssetAttributes {
                region: non_empty(record.region),
                ..Default::default()
            };
            attributes.cloud_providers.extend(normalize_label(record.service_provider));
            attributes.service_types.extend(normalize_label(record.service_type));
            attributes.domains.extend(normalize_label(record.root_domain));
            attributes.urls.extend(non_empty(record.asset_url));

            candidates.push(Candidate::new(
                identifier,
                AssetAttributes::CloudAsset(attributes),
                "crawl_cloud_assets",
            ));
        }

        Ok(candidates)
    }
}

impl Resolver for CloudAssetResolver {
    fn name(&self) -> &'static str {
        "resolve_cloud_assets"
    }

    fn asset_type(&self) -> AssetType {
        AssetType::CloudAsset
    }

    fn candidates(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = self.from_cloud_domains(sources, scope_target_id)?;
        candidates.extend(self.from_cloud_enum(sources, scope_target_id)?);
        candidates.extend(self.from_crawler(sources, scope_target_id)?);
        Ok(candidates)
    }
}
