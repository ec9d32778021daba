use crate::assets::{normalize_asn, AsnAttributes, AssetAttributes, AssetType};
use crate::error::Result;
use crate::resolve::{non_empty, Candidate, Resolver};
use crate::sources::SourceViews;

/// ASNs from intelligence scans plus the parent ASNs embedded in range records
pub struct AsnResolver;

impl Resolver for AsnResolver {
    fn name(&self) -> &'static str {
        "resolve_asns"
    }

    fn asset_type(&self) -> AssetType {
        AssetType::Asn
    }

    fn candidates(
        &self,
        sources: &SourceViews<'_>,
        scope_target_id: &str,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for record in sources.intel_asns(scope_target_id)? {
            let asn_number = normalize_asn(&record.asn_number)?;
            candidates.push(Candidate::new(
                asn_number.to_string(),
                AssetAttributes::Asn(AsnAttributes {
                    asn_number,
                    organization: non_empty(record.organization),
                    description: non_empty(record.description),
                    country: non_empty(record.country),
                }),
                "intel_asn_data",
            ));
        }

        for range in sources.network_ranges(scope_target_id)? {
            let Some(raw_asn) = non_empty(range.asn) else {
                continue;
            };
            let asn_number = normalize_asn(&raw_asn)?;
            candidates.push(Candidate::new(
                asn_number.to_string(),
                AssetAttributes::Asn(AsnAttributes {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::merge_candidates;
    use crate::storage::Database;
    use tempfile::TempDir;

    #[test]
    fn test_asn_from_both_sources_merges() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();

        conn.execute_batch(
            "INSERT INTO intel_scans (id, scope_target_id, status) VALUES ('intel-1', 'scope-1', 'success');
             INSERT INTO intel_asn_data (scan_id, asn_number, organization, description)
                VALUES ('intel-1', 'AS64500', 'Example Org', 'Example backbone');
             INSERT INTO intel_network_ranges (scan_id, cidr_block, asn, organization, country)
                VALUES ('intel-1', '10.0.0.0/24', '64500', NULL, 'US');
             INSERT INTO consolidated_network_ranges (scope_target_id, cidr_block, asn)
                VALUES ('scope-1', '192.0.2.0/24', NULL);",
        )
        .unwrap();

        let views = SourceViews::new(&conn, "success");
        let candidates = AsnResolver.candidates(&views, "scope-1").unwrap();
        assert_eq!(candidates.len(), 2);

        let merged = merge_candidates(candidates);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].draft.asset_identifier, "64500");
        match &merged[0].draft.attributes {
            AssetAttributes::Asn(asn) => {
                assert_eq!(asn.organization.as_deref(), Some("Example Org"));
                assert_eq!(asn.description.as_deref(), Some("Example backbone"));
                assert_eq!(asn.country.as_deref(), Some("US"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_asn_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();

        conn.execute_batch(
            "INSERT INTO intel_scans (id, scope_target_id, status) VALUES ('intel-1', 'scope-1', 'success');
             INSERT INTO intel_asn_data (scan_id, asn_number) VALUES ('intel-1', 'unknown');",
        )
        .unwrap();

        let views = SourceViews::new(&conn, "success");
        assert!(AsnResolver.candidates(&views, "scope-1").is_err());
    }
}
