use crate::assets::{normalize_asn, normalize_cidr, AssetAttributes, AssetType, NetworkRangeAttributes};
use crate::error::Result;
use crate::resolve::{non_empty, Candidate, Resolver};
use crate::sources::SourceViews;

/// CIDR blocks from intelligence scans and the consolidated range table
pub struct NetworkRangeResolver;

impl Resolver for NetworkRangeResolver {
    fn name(&self) -> &'static str {
        "resolve_network_ranges"
    }

    fn asset_type(&self) -> AssetType {
        AssetType::NetworkRange
    }

    fn candidates(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for range in sources.network_ranges(scope_target_id)? {
            let net = normalize_cidr(&range.cidr_block)?;
            let asn_number = match non_empty(range.asn) {
                Some(raw) => Some(normalize_asn(&raw)?),
                None => None,
            };

            candidates.push(Candidate::new(
                net.to_string(),
                AssetAttributes::NetworkRange(NetworkRangeAttributes {
                    cidr_block: net.to_string(),
                    asn_number,
                    organization: non_empty(range.organization),
                    description: non_empty(range.description),
                    country: non_empty(range.country),
                }),
                range.source.as_str(),
            ));
        }

        Ok(candidates)
    }
}
