//! Configuration schema for precache
//!
//! Configuration is stored at `~/.config/precache/config.toml`, optionally
//! overlaid by a project-local `.precache.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Agent behavior
    pub agent: AgentConfig,

    /// Cache partition storage
    pub storage: StorageConfig,

    /// Network client settings
    pub network: NetworkConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record lifecycle events in the journal
    pub journal: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            journal: true,
        }
    }
}

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Application origin that relative asset paths resolve against
    pub origin: String,

    /// Build manifest path
    pub manifest: PathBuf,

    /// Activate immediately after install instead of waiting
    pub skip_waiting: bool,

    /// Take control of already-open clients on activation
    pub claim_clients: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:4173".to_string(),
            manifest: PathBuf::from("precache-manifest.json"),
            skip_waiting: false,
            claim_clients: false,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Partitions persisted as directories on disk
    #[default]
    Disk,
    /// Process-lifetime partitions held in memory
    Memory,
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to use
    pub backend: StorageBackend,

    /// Root directory for partitions, worker state and journal
    /// (default: platform state directory)
    pub dir: Option<PathBuf>,
}

/// Network client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Overall timeout per request in seconds
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Maximum response body size in MB
    pub max_body_mb: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("precache/{}", env!("CARGO_PKG_VERSION")),
            max_body_mb: 64,
        }
    }
}
