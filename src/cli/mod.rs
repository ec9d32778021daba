//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "surfacemap",
    version,
    author = "neur0map",
    about = "Consolidate reconnaissance output into a per-target attack surface graph",
    long_about = "Surfacemap reads the result tables of ASN intelligence, network range discovery, \
                  IP/port probing, HTTP probing, crawling and cloud enumeration tools, and rebuilds \
                  one deduplicated, relationship-aware attack surface graph per scope target."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/surfacemap/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the SQLite database path from the configuration
    #[arg(short, long, global = true, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the attack surface graph of a scope target
    Consolidate {
        /// Scope target identifier
        scope_target_id: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show asset and relationship counts of the last consolidation
    Summary {
        /// Scope target identifier
        scope_target_id: String,

        /// Show counts in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List consolidated assets of a scope target
    Assets {
        /// Scope target identifier
        scope_target_id: String,

        /// Show only one asset type
        #[arg(short = 't', long = "type", value_parser = [
            "asn", "network_range", "ip_address", "live_web_server", "cloud_asset"
        ])]
        asset_type: Option<String>,
    },

    /// Show database statistics
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
