//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// precache - offline asset cache for a single web application
///
/// Installs a deployment's build assets into a versioned cache partition,
/// evicts partitions from older deployments, and serves requests cache-first
/// for assets and network-first with cache fallback for everything else.
#[derive(Parser, Debug)]
#[command(name = "precache")]
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
    #[arg(short, long, global = true, env = "PRECACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .precache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cache every asset of the current deployment
    Install(InstallArgs),

    /// Activate the installed deployment and evict stale partitions
    Activate(ActivateArgs),

    /// Request a URL through the agent
    Fetch(FetchArgs),

    /// Show worker and partition status
    Status(DeploymentArgs),

    /// Inspect or clear cache partitions
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Where the deployment comes from
#[derive(Args, Debug, Clone, Default)]
pub struct DeploymentArgs {
    /// Build manifest path (overrides agent.manifest)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Application origin (overrides agent.origin)
    #[arg(long)]
    pub origin: Option<String>,
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    #[command(flatten)]
    pub deployment: DeploymentArgs,

    /// Activate immediately instead of waiting
    #[arg(long)]
    pub skip_waiting: bool,

    /// Claim open clients when activating
    #[arg(long)]
    pub claim_clients: bool,
}

/// Arguments for the activate command
#[derive(Parser, Debug)]
pub struct ActivateArgs {
    #[command(flatten)]
    pub deployment: DeploymentArgs,

    /// Claim open clients instead of waiting for their next navigation
    #[arg(long)]
    pub claim_clients: bool,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Absolute URL, or a path resolved against the origin
    pub target: String,

    #[command(flatten)]
    pub deployment: DeploymentArgs,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request header, as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Treat the request as a page navigation
    #[arg(long)]
    pub navigate: bool,

    /// Print response headers to stderr
    #[arg(short, long)]
    pub include: bool,

    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
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

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., agent.origin)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for listings
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
    /// List all cache partitions
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        #[command(flatten)]
        deployment: DeploymentArgs,
    },

    /// List the entries of a partition (defaults to the current one)
    Show {
        /// Partition name
        name: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        #[command(flatten)]
        deployment: DeploymentArgs,
    },

    /// Delete every cache partition
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
