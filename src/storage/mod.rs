//! Cache partition storage
//!
//! A cache partition is a named store mapping a request identity (method +
//! URL) to a response. Backends implement [`CacheStorage`]; handlers use the
//! [`Caches`] / [`CachePartition`] facade, which mirrors the operations the
//! agent needs: open, keys, delete, add_all, match and put.
//!
//! # Atomicity
//!
//! Backends guarantee that a single entry read or write is atomic. A batch
//! written by [`CacheStorage::put_all`] removes the entries it added when it
//! fails; an entry it replaced may keep the new value, since the old body is
//! not retained. [`CachePartition::add_all`] fetches every response before
//! calling `put_all`, so a failed fetch writes nothing. Concurrent writers to
//! the same key are last-write-wins.

pub mod disk;
pub mod factory;
pub mod memory;

pub use disk::DiskStorage;
pub use factory::{create_storage, open_caches};
pub use memory::MemoryStorage;

use crate::error::{PrecacheError, PrecacheResult};
use crate::http::{Request, RequestKey, Response, StoredResponse};
use crate::network::Network;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Summary of one stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: RequestKey,
    pub status: u16,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

/// Abstract partition storage backend
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the partition if absent. Returns true when it was created.
    async fn open(&self, name: &str) -> PrecacheResult<bool>;

    /// Names of all partitions, oldest first
    async fn keys(&self) -> PrecacheResult<Vec<String>>;

    /// Delete a partition and everything in it. Returns true when it existed.
    async fn delete(&self, name: &str) -> PrecacheResult<bool>;

    /// Look up an entry
    async fn get(&self, name: &str, key: &RequestKey) -> PrecacheResult<Option<StoredResponse>>;

    /// Store a single entry, replacing any previous one
    async fn put(&self, name: &str, key: RequestKey, response: StoredResponse)
        -> PrecacheResult<()>;

    /// Store a batch of entries as a unit
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> PrecacheResult<()>;

    /// List the entries of a partition
    async fn entries(&self, name: &str) -> PrecacheResult<Vec<EntryInfo>>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Entry point to all partitions of a storage backend
#[derive(Clone)]
pub struct Caches {
    storage: Arc<dyn CacheStorage>,
}

impl Caches {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Open a partition, creating it if absent
    pub async fn open(&self, name: &str) -> PrecacheResult<CachePartition> {
        if self.storage.open(name).await? {
            info!("Created cache partition {}", name);
        }
        Ok(CachePartition {
            storage: Arc::clone(&self.storage),
            name: name.to_string(),
        })
    }

    /// Names of all existing partitions
    pub async fn keys(&self) -> PrecacheResult<Vec<String>> {
        self.storage.keys().await
    }

    /// Delete a partition by name
    pub async fn delete(&self, name: &str) -> PrecacheResult<bool> {
        let existed = self.storage.delete(name).await?;
        if existed {
            info!("Deleted cache partition {}", name);
        }
        Ok(existed)
    }

    /// Whether a partition exists
    pub async fn has(&self, name: &str) -> PrecacheResult<bool> {
        Ok(self.keys().await?.iter().any(|k| k == name))
    }

    /// Entries of a partition, erroring if it does not exist
    pub async fn entries(&self, name: &str) -> PrecacheResult<Vec<EntryInfo>> {
        if !self.has(name).await? {
            return Err(PrecacheError::PartitionNotFound(name.to_string()));
        }
        self.storage.entries(name).await
    }

    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }
}

/// Handle to one open partition
#[derive(Clone)]
pub struct CachePartition {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl CachePartition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find the stored response for a request
    pub async fn match_request(&self, request: &Request) -> PrecacheResult<Option<Response>> {
        let stored = self.storage.get(&self.name, &request.cache_key()).await?;
        Ok(stored.map(|s| s.to_response()))
    }

    /// Store a response under a request
    pub async fn put(&self, request: &Request, response: Response) -> PrecacheResult<()> {
        let key = request.cache_key();
        debug!("Caching {} in {}", key, self.name);
        self.storage
            .put(&self.name, key, response.into_stored())
            .await
    }

    /// Fetch every request and store all responses, or nothing
    ///
    /// Fails on the first transport error or non-ok status; in that case no
    /// entry is written. Returns the number of entries stored.
    pub async fn add_all(
        &self,
        network: &dyn Network,
        requests: Vec<Request>,
    ) -> PrecacheResult<usize> {
        let fetches = requests.into_iter().map(|request| async move {
            let asset = request.url.to_string();
            let response = network
                .fetch(&request)
                .await
                .map_err(|e| PrecacheError::InstallFailed {
                    asset: asset.clone(),
                    reason: e.to_string(),
                })?;

            if !response.is_ok() {
                return Err(PrecacheError::InstallFailed {
                    asset,
                    reason: format!("HTTP {}", response.status),
                });
            }
            Ok((request.cache_key(), response.into_stored()))
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        self.storage.put_all(&self.name, entries).await?;
        Ok(count)
    }

    /// List stored entries
    pub async fn entries(&self) -> PrecacheResult<Vec<EntryInfo>> {
        self.storage.entries(&self.name).await
    }
}

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
