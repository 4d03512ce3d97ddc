//! Error types for precache
//!
//! All modules use `PrecacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for precache operations
pub type PrecacheResult<T> = Result<T, PrecacheError>;

/// All errors that can occur in precache
#[derive(Error, Debug)]
pub enum PrecacheError {
    // Manifest errors
    #[error("Build manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid build manifest at {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    // Lifecycle errors
    #[error("Install failed while caching {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    #[error("No worker installed")]
    NoWorker,

    #[error("Expected {expected} outcome, handler produced {actual}")]
    OutcomeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    // Network errors
    #[error("Network request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Unsupported request method for network: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid header {0:?}, expected \"Name: value\"")]
    InvalidHeader(String),

    #[error("{} {url} is not cached and the network is unavailable", offline_subject(.navigation))]
    OfflineMiss {
        url: String,
        navigation: bool,
        #[source]
        source: Box<PrecacheError>,
    },

    // Storage errors
    #[error("Cache partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptEntry { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Unknown configuration key: {0}")]
    ConfigUnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    ConfigValue { key: String, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

fn offline_subject(navigation: &bool) -> &'static str {
    if *navigation {
        "Navigation to"
    } else {
        "Request for"
    }
}

impl PrecacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error for a URL
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Install failures are retried by the host on its next opportunity.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InstallFailed { .. } | Self::Network { .. } | Self::OfflineMiss { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ManifestNotFound(_) => {
                Some("Pass --manifest or set agent.manifest to the build manifest path")
            }
            Self::InstallFailed { .. } => Some("Check the origin is reachable, then run: precache install"),
            Self::NoWorker => Some("Run: precache install"),
            Self::OfflineMiss { .. } => Some("Reconnect, or install the asset before going offline"),
            Self::ConfigUnknownKey(_) => Some("Run: precache config show"),
            _ => None,
        }
    }
}
