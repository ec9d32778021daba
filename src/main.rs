use std::path::{Path, PathBuf};
use std::sync::Arc;
use surfacemap::assets::{AssetAttributes, AssetType};
use surfacemap::cli::{Cli, Commands, ConfigAction};
use surfacemap::config::{Config, ConfigValidator};
use surfacemap::consolidation::{ConsolidationResult, Consolidator};
use surfacemap::error::{Result, SurfaceError};
use surfacemap::storage::{AssetStore, Database};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Consolidate {
            scope_target_id,
            json,
        } => {
            cmd_consolidate(cli.config, cli.database, &scope_target_id, json)?;
        }
        Commands::Summary {
            scope_target_id,
            json,
        } => {
            cmd_summary(cli.config, cli.database, &scope_target_id, json)?;
        }
        Commands::Assets {
            scope_target_id,
            asset_type,
        } => {
            cmd_assets(cli.config, cli.database, &scope_target_id, asset_type)?;
        }
        Commands::Status => {
            cmd_status(cli.config, cli.database)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose {
        "surfacemap=debug"
    } else {
        "surfacemap=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_consolidate(
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
    scope_target_id: &str,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let db = open_database(&config, database)?;

    let consolidator = Consolidator::new(Arc::new(db), config.consolidation.clone());
    let result = consolidator.consolidate(scope_target_id)?;

    if json {
        println!("{}", to_json(&result)?);
        return Ok(());
    }

    print_result(&result);
    Ok(())
}

fn cmd_summary(
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
    scope_target_id: &str,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let db = open_database(&config, database)?;

    let consolidator = Consolidator::new(Arc::new(db), config.consolidation.clone());
    let summary = consolidator.summary(scope_target_id)?;

    if json {
        println!("{}", to_json(&summary)?);
        return Ok(());
    }

    println!("Attack surface of {}", scope_target_id);
    println!("{}", "=".repeat(18 + scope_target_id.len()));
    for (asset_type, count) in &summary.asset_counts.0 {
        println!("  {:<16} {}", asset_type.as_str(), count);
    }
    println!("  {:<16} {}", "total", summary.asset_counts.total());
    println!("\nRelationships: {}", summary.relationship_count);

    Ok(())
}

fn cmd_assets(
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
    scope_target_id: &str,
    asset_type: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let db = open_database(&config, database)?;
    let conn = db.get_conn()?;
    let store = AssetStore::new(&conn);

    let assets = match asset_type {
        Some(name) => {
            let asset_type: AssetType = name.parse().map_err(SurfaceError::Config)?;
            store.assets_of_type(scope_target_id, asset_type)?
        }
        None => store.load_assets(scope_target_id)?,
    };

    if assets.is_empty() {
        println!("No consolidated assets for {}", scope_target_id);
        println!("Run 'surfacemap consolidate {}' first.", scope_target_id);
        return Ok(());
    }

    for asset in &assets {
        println!(
            "  {:<16} {:<40} {}",
            asset.asset_type().as_str(),
            asset.asset_identifier,
            describe(&asset.attributes)
        );
    }
    println!("\n{} assets", assets.len());

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>, database: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let db_path = database_path(&config, database)?;
    let db = open_database(&config, Some(db_path.clone()))?;
    let stats = db.stats()?;

    println!("Surfacemap Status");
    println!("=================");
    println!("\nDatabase: {}", db_path.display());
    println!("  Scope targets:  {}", stats.scope_target_count);
    println!("  Assets:         {}", stats.asset_count);
    println!("  Relationships:  {}", stats.relationship_count);
    println!("  DNS records:    {}", stats.dns_record_count);
    println!("  Metadata:       {}", stats.metadata_count);

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = to_json(&config)?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SurfaceError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn print_result(result: &ConsolidationResult) {
    println!("✓ Consolidated attack surface of {}", result.scope_target_id);
    for (asset_type, count) in &result.asset_counts.0 {
        println!("  {:<16} {}", asset_type.as_str(), count);
    }
    println!("  {:<16} {}", "relationships", result.relationship_count);
    println!("  Completed in {}ms", result.elapsed_ms);
}

fn describe(attributes: &AssetAttributes) -> String {
    match attributes {
        AssetAttributes::Asn(asn) => asn.organization.clone().unwrap_or_default(),
        AssetAttributes::NetworkRange(range) => range
            .asn_number
            .map(|asn| format!("AS{}", asn))
            .unwrap_or_default(),
        AssetAttributes::IpAddress(ip) => ip.hostname.clone().unwrap_or_default(),
        AssetAttributes::LiveWebServer(server) => match (server.status_code, &server.title) {
            (Some(code), Some(title)) => format!("[{}] {}", code, title),
            (Some(code), None) => format!("[{}]", code),
            (None, Some(title)) => title.clone(),
            (None, None) => String::new(),
        },
        AssetAttributes::CloudAsset(cloud) => cloud
            .cloud_providers
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(","),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| SurfaceError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'surfacemap config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    Config::load(&path)
}

fn database_path(config: &Config, database: Option<PathBuf>) -> Result<PathBuf> {
    match database {
        Some(path) => Ok(path),
        None => expand_path(&config.storage.database_path),
    }
}

fn open_database(config: &Config, database: Option<PathBuf>) -> Result<Database> {
    let path = database_path(config, database)?;
    tracing::debug!("Opening database at {}", path.display());

    Database::with_options(
        &path,
        config.storage.pool_size,
        config.storage.busy_timeout()?,
    )
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| SurfaceError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SurfaceError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
