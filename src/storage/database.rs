//! SQLite database management with migrations
//!
//! Holds both the upstream scanner result tables the engine reads and the
//! consolidated attack surface tables it owns.

use crate::error::{Result, SurfaceError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use std::time::Duration;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection handed out by [`Database::get_conn`]
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) a database with default pool settings
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::with_options(db_path, 8, Duration::from_secs(5))
    }

    /// Open (or create) a database with an explicit pool size and busy timeout
    pub fn with_options(db_path: &Path, pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SurfaceError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        // Per-connection pragmas; journal_mode is persisted in the file
        let busy_ms = busy_timeout.as_millis() as u64;
        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.execute_batch(&format!(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = {};
                ",
                busy_ms
            ))
        });

        let pool = Pool::builder().max_size(pool_size).build(manager)?;

        {
            let conn = pool.get()?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        }

        let db = Self { pool };

        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                let tx = conn.transaction()?;
                tx.execute_batch(migration)?;
                tx.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    /// Get consolidated table statistics across all scope targets
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        let scope_target_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT scope_target_id) FROM attack_surface_assets",
            [],
            |row| row.get(0),
        )?;

        Ok(DbStats {
            scope_target_count: scope_target_count as usize,
            asset_count: count("attack_surface_assets")?,
            relationship_count: count("attack_surface_relationships")?,
            dns_record_count: count("attack_surface_dns_records")?,
            metadata_count: count("attack_surface_metadata")?,
        })
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub scope_target_count: usize,
    pub asset_count: usize,
    pub relationship_count: usize,
    pub dns_record_count: usize,
    pub metadata_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: upstream scanner result tables
    r#"
    -- Amass intel style ASN / network range discovery
    CREATE TABLE intel_scans (
        id TEXT PRIMARY KEY,
        scope_target_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_intel_scans_scope ON intel_scans(scope_target_id);

    CREATE TABLE intel_asn_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id TEXT NOT NULL,
        asn_number TEXT NOT NULL,
        organization TEXT,
        description TEXT,
        country TEXT,
        FOREIGN KEY (scan_id) REFERENCES intel_scans(id) ON DELETE CASCADE
    );

    CREATE TABLE intel_network_ranges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id TEXT NOT NULL,
        cidr_block TEXT NOT NULL,
        asn TEXT,
        organization TEXT,
        description TEXT,
        country TEXT,
        FOREIGN KEY (scan_id) REFERENCES intel_scans(id) ON DELETE CASCADE
    );

    CREATE TABLE consolidated_network_ranges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_target_id TEXT NOT NULL,
        cidr_block TEXT NOT NULL,
        asn TEXT,
        organization TEXT,
        description TEXT,
        country TEXT,
        source TEXT
    );

    CREATE INDEX idx_consolidated_ranges_scope ON consolidated_network_ranges(scope_target_id);

    -- IP/port scanning
    CREATE TABLE ip_port_scans (
        id TEXT PRIMARY KEY,
        scope_target_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_ip_port_scans_scope ON ip_port_scans(scope_target_id);

    CREATE TABLE discovered_live_ips (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id TEXT NOT NULL,
        ip_address TEXT NOT NULL,
        hostname TEXT,
        ping_time_ms REAL,
        FOREIGN KEY (scan_id) REFERENCES ip_port_scans(id) ON DELETE CASCADE
    );

    CREATE TABLE live_web_servers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id TEXT NOT NULL,
        ip_address TEXT NOT NULL,
        hostname TEXT,
        port INTEGER NOT NULL,
        protocol TEXT NOT NULL,
        url TEXT,
        status_code INTEGER,
        title TEXT,
        server_header TEXT,
        content_length INTEGER,
        technologies TEXT,          -- JSON array
        response_time_ms REAL,
        screenshot_path TEXT,
        ssl_info TEXT,              -- JSON object
        http_response_headers TEXT, -- JSON object
        findings_json TEXT,         -- JSON
        FOREIGN KEY (scan_id) REFERENCES ip_port_scans(id) ON DELETE CASCADE
    );

    -- Crawl / investigate results
    CREATE TABLE investigate_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_target_id TEXT NOT NULL,
        hostname TEXT NOT NULL,
        status_code INTEGER,
        title TEXT
    );

    CREATE INDEX idx_investigate_scope ON investigate_results(scope_target_id);

    -- Wildcard target URL probing
    CREATE TABLE target_urls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_target_id TEXT NOT NULL,
        url TEXT NOT NULL,
        status_code INTEGER,
        title TEXT,
        web_server TEXT,
        technologies TEXT,
        content_length INTEGER,
        response_time_ms REAL,
        screenshot TEXT,
        ssl_info TEXT,
        http_response_headers TEXT,
        findings_json TEXT,
        roi_score INTEGER,
        no_longer_live INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX idx_target_urls_scope ON target_urls(scope_target_id);

    -- Cloud asset producers
    CREATE TABLE cloud_domains (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_target_id TEXT NOT NULL,
        domain TEXT NOT NULL,
        cloud_provider TEXT,
        service_type TEXT,
        url TEXT,
        region TEXT
    );

    CREATE TABLE cloud_enum_scans (
        id TEXT PRIMARY KEY,
        scope_target_id TEXT NOT NULL,
        status TEXT NOT NULL,
        aws_results TEXT,   -- JSON array of URLs
        gcp_results TEXT,
        azure_results TEXT
    );

    CREATE TABLE crawl_cloud_assets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_target_id TEXT NOT NULL,
        asset_domain TEXT NOT NULL,
        asset_url TEXT,
        service_provider TEXT,
        service_type TEXT,
        root_domain TEXT,
        region TEXT
    );
    "#,
    // Migration 2: consolidated attack surface
    r#"
    CREATE TABLE attack_surface_assets (
        id TEXT PRIMARY KEY,
        scope_target_id TEXT NOT NULL,
        asset_type TEXT NOT NULL CHECK (asset_type IN
            ('asn', 'network_range', 'ip_address', 'live_web_server', 'cloud_asset')),
        asset_subtype TEXT,
        asset_identifier TEXT NOT NULL,
        attributes TEXT NOT NULL,   -- JSON, tagged by asset type
        created_at TEXT NOT NULL,
        last_updated TEXT NOT NULL,
        UNIQUE (scope_target_id, asset_type, asset_identifier)
    );

    CREATE INDEX idx_assets_scope_type ON attack_surface_assets(scope_target_id, asset_type);

    CREATE TABLE attack_surface_relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        parent_asset_id TEXT NOT NULL,
        child_asset_id TEXT NOT NULL,
        relationship_type TEXT NOT NULL CHECK (relationship_type IN ('contains', 'hosted_on')),
        relationship_data TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (parent_asset_id, child_asset_id, relationship_type),
        FOREIGN KEY (parent_asset_id) REFERENCES attack_surface_assets(id),
        FOREIGN KEY (child_asset_id) REFERENCES attack_surface_assets(id)
    );

    CREATE INDEX idx_relationships_child ON attack_surface_relationships(child_asset_id);

    CREATE TABLE attack_surface_dns_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        asset_id TEXT NOT NULL,
        record_type TEXT NOT NULL,
        record_value TEXT NOT NULL,
        ttl INTEGER,
        created_at TEXT NOT NULL,
        UNIQUE (asset_id, record_type, record_value),
        FOREIGN KEY (asset_id) REFERENCES attack_surface_assets(id)
    );

    CREATE TABLE attack_surface_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        asset_id TEXT NOT NULL,
        metadata_key TEXT NOT NULL,
        metadata_value TEXT NOT NULL,
        UNIQUE (asset_id, metadata_key, metadata_value),
        FOREIGN KEY (asset_id) REFERENCES attack_surface_assets(id)
    );
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let _db = Database::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).unwrap();
        let conn = db.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_reopen_does_not_reapply_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        drop(Database::new(&db_path).unwrap());
        let db = Database::new(&db_path).unwrap();

        let conn = db.get_conn().unwrap();
        let applied: i32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_schema_exists() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();

        let tables = vec![
            "intel_scans",
            "intel_asn_data",
            "intel_network_ranges",
            "consolidated_network_ranges",
            "ip_port_scans",
            "discovered_live_ips",
            "live_web_servers",
            "investigate_results",
            "target_urls",
            "cloud_domains",
            "cloud_enum_scans",
            "crawl_cloud_assets",
            "attack_surface_assets",
            "attack_surface_relationships",
            "attack_surface_dns_records",
            "attack_surface_metadata",
        ];

        for table in tables {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();

            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_foreign_keys_enabled_on_every_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let first = db.get_conn().unwrap();
        let second = db.get_conn().unwrap();
        for conn in [&first, &second] {
            let fk_enabled: i32 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            assert_eq!(fk_enabled, 1);
        }
    }

    #[test]
    fn test_asset_type_check_constraint() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();

        let result = conn.execute(
            "INSERT INTO attack_surface_assets
                (id, scope_target_id, asset_type, asset_identifier, attributes, created_at, last_updated)
             VALUES ('a', 'scope', 'subdomain', 'x', '{}', 'now', 'now')",
            [],
        );
        assert!(result.is_err(), "Unknown asset types must be rejected");
    }
}
