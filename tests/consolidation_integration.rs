use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::BTreeSet;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use surfacemap::assets::{AssetAttributes, AssetType, RelationshipType};
use surfacemap::config::ConsolidationConfig;
use surfacemap::consolidation::{ConsolidationResult, Consolidator};
use surfacemap::storage::Database;
use surfacemap::SurfaceError;
use tempfile::TempDir;

fn setup() -> (TempDir, Arc<Database>, Consolidator) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Arc::new(
        Database::new(&temp_dir.path().join("surface.sqlite")).expect("Failed to open database"),
    );
    let consolidator = Consolidator::new(db.clone(), ConsolidationConfig::default());
    (temp_dir, db, consolidator)
}

fn seed_intel_range(conn: &Connection, scope: &str, cidr: &str, asn: Option<&str>) {
    let scan_id = format!("intel-{}-{}", scope, cidr);
    conn.execute(
        "INSERT INTO intel_scans (id, scope_target_id, status) VALUES (?1, ?2, 'success')",
        params![scan_id, scope],
    )
    .expect("Failed to insert intel scan");
    conn.execute(
        "INSERT INTO intel_network_ranges (scan_id, cidr_block, asn, organization)
         VALUES (?1, ?2, ?3, 'Example Org')",
        params![scan_id, cidr, asn],
    )
    .expect("Failed to insert network range");
}

fn seed_ip_scan(conn: &Connection, scope: &str, status: &str) -> String {
    let scan_id = format!("ipscan-{}-{}", scope, status);
    conn.execute(
        "INSERT OR IGNORE INTO ip_port_scans (id, scope_target_id, status) VALUES (?1, ?2, ?3)",
        params![scan_id, scope, status],
    )
    .expect("Failed to insert ip/port scan");
    scan_id
}

fn seed_live_ip(conn: &Connection, scan_id: &str, ip: &str, hostname: Option<&str>) {
    conn.execute(
        "INSERT INTO discovered_live_ips (scan_id, ip_address, hostname, ping_time_ms)
         VALUES (?1, ?2, ?3, 2.5)",
        params![scan_id, ip, hostname],
    )
    .expect("Failed to insert live ip");
}

fn seed_web_server(conn: &Connection, scan_id: &str, ip: &str, port: i64, protocol: &str) {
    conn.execute(
        "INSERT INTO live_web_servers
            (scan_id, ip_address, port, protocol, status_code, title, technologies,
             ssl_info, http_response_headers, findings_json)
         VALUES (?1, ?2, ?3, ?4, 200, 'Welcome', '[\"nginx\"]',
                 '{\"issuer\":\"R3\"}', 'not-json', '[]')",
        params![scan_id, ip, port, protocol],
    )
    .expect("Failed to insert web server");
}

/// Scenario A: one range carrying its ASN and one live IP inside it
fn seed_scenario_a(conn: &Connection, scope: &str) {
    seed_intel_range(conn, scope, "10.0.0.0/24", Some("64500"));
    let scan = seed_ip_scan(conn, scope, "success");
    seed_live_ip(conn, &scan, "10.0.0.5", Some("app.example.com"));
}

/// Assets and edges reduced to natural keys
fn natural_keys(
    result: &ConsolidationResult,
) -> (
    BTreeSet<(AssetType, String)>,
    BTreeSet<(String, String, &'static str)>,
) {
    let key_of = |id| {
        result
            .assets
            .iter()
            .find(|a| a.asset.id == id)
            .map(|a| format!("{}:{}", a.asset_type, a.asset.asset_identifier))
            .expect("Edge endpoint missing from result")
    };

    let assets = result
        .assets
        .iter()
        .map(|a| (a.asset_type, a.asset.asset_identifier.clone()))
        .collect();
    let edges = result
        .assets
        .iter()
        .flat_map(|a| a.relationships.iter())
        .map(|e| {
            (
                key_of(e.parent_asset_id),
                key_of(e.child_asset_id),
                e.relationship_type.as_str(),
            )
        })
        .collect();

    (assets, edges)
}

#[test]
fn test_scenario_a_range_ip_and_asn() {
    let (_temp_dir, db, consolidator) = setup();
    seed_scenario_a(&db.get_conn().unwrap(), "scope-1");

    let result = consolidator
        .consolidate("scope-1")
        .expect("Consolidation failed");

    assert_eq!(result.asset_counts.get(AssetType::IpAddress), 1);
    assert_eq!(result.asset_counts.get(AssetType::NetworkRange), 1);
    assert_eq!(result.asset_counts.get(AssetType::Asn), 1);
    assert_eq!(result.asset_counts.total(), 3);
    assert_eq!(result.relationship_count, 2);

    let (_, edges) = natural_keys(&result);
    assert!(edges.contains(&(
        "network_range:10.0.0.0/24".to_string(),
        "ip_address:10.0.0.5".to_string(),
        "contains"
    )));
    assert!(edges.contains(&(
        "asn:64500".to_string(),
        "network_range:10.0.0.0/24".to_string(),
        "contains"
    )));

    let ip = result
        .assets
        .iter()
        .find(|a| a.asset_type == AssetType::IpAddress)
        .unwrap();
    assert_eq!(ip.dns_records.len(), 1);
    assert_eq!(ip.dns_records[0].record_type, "A");
    assert_eq!(ip.dns_records[0].record_value, "app.example.com");
    assert_eq!(ip.sources, vec!["discovered_live_ips".to_string()]);

    println!("✓ Scenario A produced {} assets", result.asset_counts.total());
}

#[test]
fn test_scenario_b_hosted_on() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        let scan = seed_ip_scan(&conn, "scope-1", "success");
        seed_web_server(&conn, &scan, "10.0.0.5", 443, "https");
    }

    let result = consolidator
        .consolidate("scope-1")
        .expect("Consolidation failed");

    assert_eq!(result.asset_counts.get(AssetType::LiveWebServer), 1);
    assert_eq!(result.asset_counts.get(AssetType::IpAddress), 1);
    assert_eq!(result.relationship_count, 1);

    let server = result
        .assets
        .iter()
        .find(|a| a.asset_type == AssetType::LiveWebServer)
        .unwrap();
    assert_eq!(server.asset.asset_identifier, "10.0.0.5:443/https");
    assert_eq!(server.relationships.len(), 1);
    assert_eq!(
        server.relationships[0].relationship_type,
        RelationshipType::HostedOn
    );
    assert_eq!(server.relationships[0].parent_asset_id, server.asset.id);

    let ip = result
        .assets
        .iter()
        .find(|a| a.asset_type == AssetType::IpAddress)
        .unwrap();
    assert_eq!(server.relationships[0].child_asset_id, ip.asset.id);

    // Payload decoding is lenient
    assert!(server.ssl_info.is_some());
    assert!(server.http_headers.is_none());
    assert!(server.findings.is_some());
}

#[test]
fn test_scenario_c_cleared_sources_empty_the_graph() {
    let (_temp_dir, db, consolidator) = setup();
    seed_scenario_a(&db.get_conn().unwrap(), "scope-1");

    let first = consolidator.consolidate("scope-1").unwrap();
    assert_eq!(first.asset_counts.total(), 3);

    {
        let conn = db.get_conn().unwrap();
        conn.execute_batch(
            "DELETE FROM discovered_live_ips;
             DELETE FROM intel_network_ranges;
             DELETE FROM ip_port_scans;
             DELETE FROM intel_scans;",
        )
        .unwrap();
    }

    let second = consolidator.consolidate("scope-1").unwrap();
    assert_eq!(second.asset_counts.total(), 0);
    assert_eq!(second.relationship_count, 0);
    assert!(second.assets.is_empty());

    let stats = db.stats().unwrap();
    assert_eq!(stats.asset_count, 0);
    assert_eq!(stats.relationship_count, 0);
    assert_eq!(stats.dns_record_count, 0);
    assert_eq!(stats.metadata_count, 0);
}

#[test]
fn test_rerun_is_idempotent_by_natural_key() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        seed_scenario_a(&conn, "scope-1");
        seed_intel_range(&conn, "scope-1", "10.0.0.0/16", Some("AS64500"));
        let scan = seed_ip_scan(&conn, "scope-1", "success");
        seed_web_server(&conn, &scan, "10.0.0.5", 80, "HTTP");
        seed_web_server(&conn, &scan, "10.0.0.9", 8443, "https");
        conn.execute(
            "INSERT INTO target_urls (scope_target_id, url, status_code, roi_score)
             VALUES ('scope-1', 'https://app.example.com/', 200, 70)",
            [],
        )
        .unwrap();
    }

    let first = consolidator.consolidate("scope-1").unwrap();
    let second = consolidator.consolidate("scope-1").unwrap();

    assert_eq!(natural_keys(&first), natural_keys(&second));
    assert_eq!(first.asset_counts, second.asset_counts);
    assert_eq!(first.relationship_count, second.relationship_count);

    // Both ranges contain both addresses, one ASN owns both ranges, two servers hosted
    assert_eq!(first.relationship_count, 4 + 2 + 2);
}

#[test]
fn test_identifiers_unique_per_type() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        let scan = seed_ip_scan(&conn, "scope-1", "success");
        seed_live_ip(&conn, &scan, "10.0.0.5", None);
        seed_live_ip(&conn, &scan, "10.0.0.5", Some("dup.example.com"));
        seed_web_server(&conn, &scan, "10.0.0.5", 443, "https");
        seed_web_server(&conn, &scan, "10.0.0.5", 443, "HTTPS");
    }

    let result = consolidator.consolidate("scope-1").unwrap();

    let mut seen = BTreeSet::new();
    for asset in &result.assets {
        assert!(
            seen.insert((asset.asset_type, asset.asset.asset_identifier.clone())),
            "duplicate identifier {}",
            asset.asset.asset_identifier
        );
    }
    assert_eq!(result.asset_counts.get(AssetType::IpAddress), 1);
    assert_eq!(result.asset_counts.get(AssetType::LiveWebServer), 1);

    let ip = result
        .assets
        .iter()
        .find(|a| a.asset_type == AssetType::IpAddress)
        .unwrap();
    assert_eq!(
        ip.sources,
        vec![
            "discovered_live_ips".to_string(),
            "live_web_servers".to_string()
        ]
    );
}

#[test]
fn test_containment_respects_address_family() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        seed_intel_range(&conn, "scope-1", "10.0.0.0/24", None);
        seed_intel_range(&conn, "scope-1", "2001:db8::/64", None);
        let scan = seed_ip_scan(&conn, "scope-1", "success");
        seed_live_ip(&conn, &scan, "::ffff:10.0.0.5", None);
        seed_live_ip(&conn, &scan, "2001:db8::10", None);
        seed_live_ip(&conn, &scan, "10.0.1.1", None);
    }

    let result = consolidator.consolidate("scope-1").unwrap();
    let (_, edges) = natural_keys(&result);

    assert_eq!(
        edges,
        BTreeSet::from([(
            "network_range:2001:db8::/64".to_string(),
            "ip_address:2001:db8::10".to_string(),
            "contains"
        )])
    );
}

#[test]
fn test_failed_scans_are_ignored() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        let failed = seed_ip_scan(&conn, "scope-1", "failed");
        seed_live_ip(&conn, &failed, "10.0.0.5", None);
        seed_web_server(&conn, &failed, "10.0.0.5", 80, "http");
    }

    let result = consolidator.consolidate("scope-1").unwrap();
    assert_eq!(result.asset_counts.total(), 0);
}

#[test]
fn test_cloud_providers_union() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        conn.execute(
            "INSERT INTO cloud_enum_scans (id, scope_target_id, status, aws_results, gcp_results, azure_results)
             VALUES ('enum-1', 'scope-1', 'success',
                     '[\"https://cdn.example.com/a\"]',
                     '[\"cdn.example.com\"]',
                     '[\"https://cdn.example.com/a\", \"https://cdn.example.com/b\"]')",
            [],
        )
        .unwrap();
    }

    let result = consolidator.consolidate("scope-1").unwrap();
    assert_eq!(result.asset_counts.get(AssetType::CloudAsset), 1);

    let cloud = &result.assets[0];
    assert_eq!(cloud.asset.asset_identifier, "cdn.example.com");
    match &cloud.asset.attributes {
        AssetAttributes::CloudAsset(attrs) => {
            let providers: Vec<&str> = attrs.cloud_providers.iter().map(String::as_str).collect();
            assert_eq!(providers, vec!["aws", "azure", "gcp"]);
            assert_eq!(attrs.urls.len(), 2);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn test_buckets_on_shared_endpoint_stay_distinct() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        conn.execute_batch(
            r#"INSERT INTO cloud_enum_scans (id, scope_target_id, status, aws_results, gcp_results)
                VALUES ('enum-1', 'scope-1', 'success',
                        '["https://s3.amazonaws.com/acme-logs/2024/", "https://acme-media.s3.amazonaws.com"]',
                        '["https://storage.googleapis.com/acme-backups", "https://storage.googleapis.com/acme-public/index.html"]');
             INSERT INTO cloud_domains (scope_target_id, domain, cloud_provider, url)
                VALUES ('scope-1', 'storage.googleapis.com', 'gcp', 'https://storage.googleapis.com/acme-backups/db.tar');"#,
        )
        .unwrap();
    }

    let result = consolidator.consolidate("scope-1").unwrap();
    let identifiers: BTreeSet<&str> = result
        .assets
        .iter()
        .map(|view| view.asset.asset_identifier.as_str())
        .collect();
    println!("Cloud resources: {:?}", identifiers);

    assert_eq!(
        identifiers,
        BTreeSet::from([
            "acme-media.s3.amazonaws.com",
            "s3.amazonaws.com/acme-logs",
            "storage.googleapis.com/acme-backups",
            "storage.googleapis.com/acme-public",
        ])
    );

    let backups = result
        .assets
        .iter()
        .find(|view| view.asset.asset_identifier == "storage.googleapis.com/acme-backups")
        .expect("Backups bucket missing");
    match &backups.asset.attributes {
        AssetAttributes::CloudAsset(attrs) => {
            assert_eq!(attrs.urls.len(), 2);
            assert!(attrs.urls.iter().all(|url| url.contains("/acme-backups")));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn test_failed_run_keeps_previous_graph() {
    let (_temp_dir, db, consolidator) = setup();
    seed_scenario_a(&db.get_conn().unwrap(), "scope-1");

    let good = consolidator.consolidate("scope-1").unwrap();
    assert_eq!(good.asset_counts.total(), 3);

    db.get_conn()
        .unwrap()
        .execute(
            "INSERT INTO consolidated_network_ranges (scope_target_id, cidr_block)
             VALUES ('scope-1', '10.0.0.300/24')",
            [],
        )
        .unwrap();

    match consolidator.consolidate("scope-1") {
        Err(SurfaceError::Stage { stage, .. }) => assert_eq!(stage, "resolve_network_ranges"),
        other => panic!("expected a stage failure, got {other:?}"),
    }

    let summary = consolidator.summary("scope-1").unwrap();
    assert_eq!(summary.asset_counts, good.asset_counts);
    assert_eq!(summary.relationship_count, good.relationship_count);
}

#[test]
fn test_scope_targets_do_not_interfere() {
    let (_temp_dir, db, consolidator) = setup();
    {
        let conn = db.get_conn().unwrap();
        seed_scenario_a(&conn, "scope-1");
        let scan = seed_ip_scan(&conn, "scope-2", "success");
        seed_web_server(&conn, &scan, "10.0.0.5", 443, "https");
    }

    let consolidator = Arc::new(consolidator);
    let handles: Vec<_> = ["scope-1", "scope-2"]
        .into_iter()
        .map(|scope| {
            let consolidator = consolidator.clone();
            thread::spawn(move || consolidator.consolidate(scope))
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .expect("Consolidation thread panicked")
            .expect("Consolidation failed");
    }

    let one = consolidator.summary("scope-1").unwrap();
    let two = consolidator.summary("scope-2").unwrap();
    assert_eq!(one.asset_counts.total(), 3);
    assert_eq!(one.relationship_count, 2);
    assert_eq!(two.asset_counts.total(), 2);
    assert_eq!(two.relationship_count, 1);

    // Rebuilding one target leaves the other untouched
    db.get_conn()
        .unwrap()
        .execute("DELETE FROM discovered_live_ips", [])
        .unwrap();
    consolidator.consolidate("scope-1").unwrap();
    assert_eq!(consolidator.summary("scope-2").unwrap(), two);
}

#[test]
fn test_long_write_elsewhere_does_not_fail_run() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Arc::new(
        Database::with_options(
            &temp_dir.path().join("surface.sqlite"),
            4,
            Duration::from_millis(200),
        )
        .expect("Failed to open database"),
    );
    {
        let conn = db.get_conn().unwrap();
        let scan = seed_ip_scan(&conn, "scope-2", "success");
        seed_web_server(&conn, &scan, "10.0.0.5", 443, "https");
    }

    // Another writer holds the database well past the busy timeout
    let (locked_tx, locked_rx) = mpsc::channel();
    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            let mut conn = db.get_conn().unwrap();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .unwrap();
            seed_scenario_a(&tx, "scope-1");
            locked_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(1000));
            tx.commit().unwrap();
        })
    };
    locked_rx.recv().expect("Writer never took the lock");

    let impatient = Consolidator::new(
        db.clone(),
        ConsolidationConfig {
            write_lock_wait: "0s".to_string(),
            ..Default::default()
        },
    );
    let err = impatient.consolidate("scope-2").unwrap_err();
    assert!(err.is_busy(), "expected a busy database, got {err:?}");

    let consolidator = Consolidator::new(db.clone(), ConsolidationConfig::default());
    let result = consolidator
        .consolidate("scope-2")
        .expect("Queued run should succeed once the writer commits");
    assert_eq!(result.asset_counts.total(), 2);
    assert_eq!(result.relationship_count, 1);

    writer.join().expect("Writer thread panicked");
    assert_eq!(
        consolidator.consolidate("scope-1").unwrap().asset_counts.total(),
        3
    );
}
