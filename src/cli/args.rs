//! CLI argument definitions using clap derive

use crate::flavor::FlavorKind;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Layer - fetch and publish ML artifacts through a local cache
///
/// Artifacts are downloaded once per key and reused from the cache on
/// every later fetch, across processes.
#[derive(Parser, Debug)]
#[command(name = "layer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LAYER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch an artifact into the cache and load it
    Fetch(FetchArgs),

    /// Fetch a dataset build into the cache and list its files
    Dataset(DatasetArgs),

    /// Upload a directory to object storage
    Push(PushArgs),

    /// Inspect or clean the local cache
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Remote location (e.g. s3://models/churn/a7c0...)
    pub location: String,

    /// Cache key, usually the train ID
    #[arg(short, long)]
    pub key: String,

    /// Serialization flavor of the artifact
    #[arg(short, long, default_value = "json")]
    pub flavor: FlavorKind,

    /// Download into a throwaway directory instead of the cache
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the dataset command
#[derive(Parser, Debug)]
pub struct DatasetArgs {
    /// Remote location of the build (e.g. s3://datasets/titanic/3f1d...)
    pub location: String,

    /// Build ID, used as the cache key
    #[arg(short, long)]
    pub build: String,

    /// Download into a throwaway directory instead of the cache
    #[arg(long)]
    pub no_cache: bool,

    /// Output format for the file listing
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the push command
#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Local directory to upload
    pub dir: PathBuf,

    /// Destination location (e.g. s3://models/churn/a7c0...)
    pub location: String,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Print the cache root directory
    Path,

    /// List cached artifacts
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove one cached artifact
    Remove {
        /// Cache key to remove
        key: String,
    },

    /// Delete the whole cache
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
