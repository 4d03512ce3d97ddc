//! Build manifest and deployment identity
//!
//! The build tool emits a JSON manifest listing everything it produced:
//! compiled bundle outputs, static files, prerendered pages, and a version
//! string that changes once per build. It is read once at startup and turned
//! into a [`Deployment`], which every handler receives explicitly.

use crate::error::{PrecacheError, PrecacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Prefix of every cache partition name owned by the agent
pub const CACHE_PREFIX: &str = "cache-";

/// Manifest as emitted by the build tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildManifest {
    /// Deployment version, unique per build
    pub version: String,

    /// Compiled bundle outputs
    pub build: Vec<String>,

    /// Files copied from the static directory
    pub files: Vec<String>,

    /// Prerendered page paths
    pub prerendered: Vec<String>,
}

impl BuildManifest {
    /// Load a manifest from a JSON file
    pub async fn load(path: &Path) -> PrecacheResult<Self> {
        if !path.exists() {
            return Err(PrecacheError::ManifestNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PrecacheError::io(format!("reading manifest {}", path.display()), e))?;

        let manifest: BuildManifest =
            serde_json::from_str(&content).map_err(|e| PrecacheError::ManifestInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if manifest.version.trim().is_empty() {
            return Err(PrecacheError::ManifestInvalid {
                path: path.to_path_buf(),
                reason: "version must not be empty".to_string(),
            });
        }

        debug!(
            "Loaded manifest {} (version {}, {} build, {} files, {} prerendered)",
            path.display(),
            manifest.version,
            manifest.build.len(),
            manifest.files.len(),
            manifest.prerendered.len()
        );
        Ok(manifest)
    }
}

/// Ordered, deduplicated set of asset paths eligible for cache-first serving
#[derive(Debug, Clone, Default)]
pub struct AssetList {
    entries: Vec<String>,
    index: HashSet<String>,
}

impl AssetList {
    /// Build from groups, concatenated in the order given
    pub fn from_groups<'a, I, G>(groups: G) -> Self
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = &'a String>,
    {
        let mut list = Self::default();
        for group in groups {
            for path in group {
                list.push(path);
            }
        }
        list
    }

    fn push(&mut self, path: &str) {
        let path = normalize_path(path);
        if self.index.insert(path.clone()) {
            self.entries.push(path);
        }
    }

    /// Whether a URL path is one of the assets
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains(&normalize_path(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AssetList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut list = Self::default();
        for path in iter {
            list.push(path.as_ref());
        }
        list
    }
}

/// Ensure a path starts with exactly one leading slash
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Derive the cache partition name for a deployment version
pub fn cache_name_for(version: &str) -> String {
    format!("{}{}", CACHE_PREFIX, version)
}

/// Everything fixed for the lifetime of one deployment
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Deployment version
    pub version: String,

    /// Name of the current cache partition (`cache-<version>`)
    pub cache_name: String,

    /// Assets served cache-first
    pub assets: AssetList,
}

impl Deployment {
    /// Create a deployment from a version and asset list
    pub fn new(version: impl Into<String>, assets: AssetList) -> Self {
        let version = version.into();
        Self {
            cache_name: cache_name_for(&version),
            version,
            assets,
        }
    }

    /// Create from a build manifest (bundle outputs, then static files, then pages)
    pub fn from_manifest(manifest: &BuildManifest) -> Self {
        let assets = AssetList::from_groups([
            &manifest.build,
            &manifest.files,
            &manifest.prerendered,
        ]);
        Self::new(manifest.version.clone(), assets)
    }
}
