//! In-memory partition storage
//!
//! Lives as long as the process. Used for tests and for one-shot runs where
//! persistence is not wanted.

use super::{CacheStorage, EntryInfo};
use crate::error::{PrecacheError, PrecacheResult};
use crate::http::{RequestKey, StoredResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Partition {
    name: String,
    entries: HashMap<RequestKey, (StoredResponse, DateTime<Utc>)>,
}

/// Partition storage held in memory
#[derive(Default)]
pub struct MemoryStorage {
    // Creation order is the enumeration order
    partitions: RwLock<Vec<Partition>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find<'a>(partitions: &'a mut [Partition], name: &str) -> PrecacheResult<&'a mut Partition> {
    partitions
        .iter_mut()
        .find(|p| p.name == name)
        .ok_or_else(|| PrecacheError::PartitionNotFound(name.to_string()))
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> PrecacheResult<bool> {
        let mut partitions = self.partitions.write().await;
        if partitions.iter().any(|p| p.name == name) {
            return Ok(false);
        }
        partitions.push(Partition {
            name: name.to_string(),
            entries: HashMap::new(),
        });
        Ok(true)
    }

    async fn keys(&self) -> PrecacheResult<Vec<String>> {
        let partitions = self.partitions.read().await;
        Ok(partitions.iter().map(|p| p.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> PrecacheResult<bool> {
        let mut partitions = self.partitions.write().await;
        let before = partitions.len();
        partitions.retain(|p| p.name != name);
        Ok(partitions.len() != before)
    }

    async fn get(&self, name: &str, key: &RequestKey) -> PrecacheResult<Option<StoredResponse>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.entries.get(key))
            .map(|(response, _)| response.clone()))
    }

    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> PrecacheResult<()> {
        let mut partitions = self.partitions.write().await;
        let partition = find(&mut partitions, name)?;
        partition.entries.insert(key, (response, Utc::now()));
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> PrecacheResult<()> {
        let mut partitions = self.partitions.write().await;
        let partition = find(&mut partitions, name)?;
        let now = Utc::now();
        for (key, response) in entries {
            partition.entries.insert(key, (response, now));
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> PrecacheResult<Vec<EntryInfo>> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.iter().find(|p| p.name == name) else {
            return Err(PrecacheError::PartitionNotFound(name.to_string()));
        };

        let mut entries: Vec<EntryInfo> = partition
            .entries
            .iter()
            .map(|(key, (response, stored_at))| EntryInfo {
                key: key.clone(),
                status: response.status,
                size_bytes: response.body.len() as u64,
                stored_at: *stored_at,
            })
            .collect();
        entries.sort_by(|a, b| a.key.url.cmp(&b.key.url));
        Ok(entries)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, Response};
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::new(
            Method::Get,
            &Url::parse("http://localhost").unwrap().join(path).unwrap(),
        )
    }

    #[tokio::test]
    async fn keys_in_creation_order() {
        let storage = MemoryStorage::new();
        assert!(storage.open("cache-b").await.unwrap());
        assert!(storage.open("cache-a").await.unwrap());
        assert!(!storage.open("cache-b").await.unwrap());

        assert_eq!(storage.keys().await.unwrap(), vec!["cache-b", "cache-a"]);
    }

    #[tokio::test]
    async fn put_replaces_previous_entry() {
        let storage = MemoryStorage::new();
        storage.open("cache-x").await.unwrap();

        storage
            .put("cache-x", key("/d"), Response::new(200, "old").into_stored())
            .await
            .unwrap();
        storage
            .put("cache-x", key("/d"), Response::new(200, "new").into_stored())
            .await
            .unwrap();

        let stored = storage.get("cache-x", &key("/d")).await.unwrap().unwrap();
        assert_eq!(stored.body, b"new");
        assert_eq!(storage.entries("cache-x").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_into_missing_partition_fails() {
        let storage = MemoryStorage::new();
        let err = storage
            .put("cache-x", key("/d"), Response::new(200, "").into_stored())
            .await
            .unwrap_err();
        assert!(matches!(err, PrecacheError::PartitionNotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_entries() {
        let storage = MemoryStorage::new();
        storage.open("cache-x").await.unwrap();
        assert!(storage.delete("cache-x").await.unwrap());
        assert!(!storage.delete("cache-x").await.unwrap());
        assert!(storage.get("cache-x", &key("/d")).await.unwrap().is_none());
    }
}
