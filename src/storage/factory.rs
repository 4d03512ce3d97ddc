//! Storage factory for the configured backend

use super::{CacheStorage, Caches, DiskStorage, MemoryStorage};
use crate::config::schema::StorageBackend;
use crate::config::{Config, ConfigManager};
use crate::error::PrecacheResult;
use std::sync::Arc;
use tracing::debug;

/// Create the storage backend selected by `storage.backend`
///
/// Disk partitions live under `<state dir>/partitions`. Memory partitions
/// last as long as the process.
pub async fn create_storage(config: &Config) -> PrecacheResult<Arc<dyn CacheStorage>> {
    match config.storage.backend {
        StorageBackend::Disk => {
            let storage = DiskStorage::new(ConfigManager::partitions_dir(config)).await?;
            debug!("Using disk storage at {}", storage.root().display());
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => {
            debug!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

/// Open the partition set for a config
pub async fn open_caches(config: &Config) -> PrecacheResult<Caches> {
    Ok(Caches::new(create_storage(config).await?))
}
