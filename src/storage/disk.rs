//! On-disk partition storage
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<sha256(name)>/partition.json        name + creation time
//! <root>/<sha256(name)>/entries/<k>.json      entry metadata (k = sha256 of request key)
//! <root>/<sha256(name)>/entries/<k>-<b>.body  body bytes (b = sha256 of body)
//! ```
//!
//! Every file is written to a temporary name and renamed into place. The
//! metadata file is the commit point: it names the body file it belongs to,
//! so a reader never pairs metadata with another write's body.
//!
//! A batch is staged in full before anything is renamed. If a rename fails
//! partway, entries the batch added are removed again; entries it replaced
//! keep their new content.
//!
//! A partition directory without `partition.json` (a crash during `open`) is
//! listed under its hash so it can still be deleted.

use super::{CacheStorage, EntryInfo};
use crate::error::{PrecacheError, PrecacheResult};
use crate::http::{RequestKey, StoredResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const PARTITION_FILE: &str = "partition.json";
const ENTRIES_DIR: &str = "entries";

#[derive(Debug, Serialize, Deserialize)]
struct PartitionMeta {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    #[serde(flatten)]
    response: StoredResponse,
    body_file: String,
    body_len: u64,
    stored_at: DateTime<Utc>,
}

/// Files of one entry staged under temporary names
struct StagedEntry {
    meta_tmp: PathBuf,
    meta_path: PathBuf,
    body_tmp: PathBuf,
    body_path: PathBuf,
    previous_body: Option<PathBuf>,
    /// An entry already existed under this key
    replaced: bool,
}

/// Partition storage persisted as directories
pub struct DiskStorage {
    root: PathBuf,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn tmp_path(dir: &Path) -> PathBuf {
    dir.join(format!(".tmp-{}", Uuid::new_v4()))
}

fn is_hash_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl DiskStorage {
    /// Create storage rooted at `root` (created if missing)
    pub async fn new(root: impl Into<PathBuf>) -> PrecacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| PrecacheError::io(format!("creating {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, name: &str) -> PathBuf {
        self.root.join(sha256_hex(name.as_bytes()))
    }

    fn entries_dir(&self, name: &str) -> PathBuf {
        self.partition_dir(name).join(ENTRIES_DIR)
    }

    fn meta_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.entries_dir(name)
            .join(format!("{}.json", sha256_hex(key.to_string().as_bytes())))
    }

    fn exists(&self, name: &str) -> bool {
        self.partition_dir(name).join(PARTITION_FILE).is_file()
    }

    /// Directory listed by hash because its partition file is missing
    fn orphan_dir(&self, name: &str) -> Option<PathBuf> {
        if !is_hash_name(name) {
            return None;
        }
        let dir = self.root.join(name);
        (dir.is_dir() && !dir.join(PARTITION_FILE).exists()).then_some(dir)
    }

    async fn read_meta(path: &Path) -> PrecacheResult<EntryMeta> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PrecacheError::io(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| PrecacheError::CorruptEntry {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write an entry's files under temporary names
    async fn stage(
        &self,
        name: &str,
        key: RequestKey,
        mut response: StoredResponse,
    ) -> PrecacheResult<StagedEntry> {
        let dir = self.entries_dir(name);
        let meta_path = self.meta_path(name, &key);
        let key_hash = sha256_hex(key.to_string().as_bytes());
        let body_file = format!("{}-{}.body", key_hash, &sha256_hex(&response.body)[..16]);
        let body_path = dir.join(&body_file);

        let replaced = meta_path.is_file();
        let previous_body = if replaced {
            Self::read_meta(&meta_path)
                .await
                .ok()
                .map(|m| dir.join(m.body_file))
                .filter(|p| *p != body_path)
        } else {
            None
        };

        let body = std::mem::take(&mut response.body);
        let body_tmp = tmp_path(&dir);
        fs::write(&body_tmp, &body)
            .await
            .map_err(|e| PrecacheError::io(format!("writing {}", body_tmp.display()), e))?;

        let meta = EntryMeta {
            key,
            response,
            body_file,
            body_len: body.len() as u64,
            stored_at: Utc::now(),
        };
        let meta_tmp = tmp_path(&dir);
        let written = match serde_json::to_string_pretty(&meta) {
            Ok(content) => fs::write(&meta_tmp, content)
                .await
                .map_err(|e| PrecacheError::io(format!("writing {}", meta_tmp.display()), e)),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&body_tmp).await;
            return Err(e);
        }

        Ok(StagedEntry {
            meta_tmp,
            meta_path,
            body_tmp,
            body_path,
            previous_body,
            replaced,
        })
    }

    async fn commit(staged: &StagedEntry) -> PrecacheResult<()> {
        fs::rename(&staged.body_tmp, &staged.body_path)
            .await
            .map_err(|e| PrecacheError::io(format!("committing {}", staged.body_path.display()), e))?;
        fs::rename(&staged.meta_tmp, &staged.meta_path)
            .await
            .map_err(|e| PrecacheError::io(format!("committing {}", staged.meta_path.display()), e))?;

        if let Some(previous) = &staged.previous_body {
            if let Err(e) = fs::remove_file(previous).await {
                debug!("Leaving stale body {}: {}", previous.display(), e);
            }
        }
        Ok(())
    }

    async fn discard(staged: &[StagedEntry]) {
        for entry in staged {
            let _ = fs::remove_file(&entry.body_tmp).await;
            let _ = fs::remove_file(&entry.meta_tmp).await;
        }
    }

    /// Clean up an entry whose commit failed
    async fn abandon(entry: &StagedEntry) {
        let _ = fs::remove_file(&entry.body_tmp).await;
        let _ = fs::remove_file(&entry.meta_tmp).await;
        // The body may be in place with no metadata naming it
        if !entry.replaced || entry.previous_body.is_some() {
            let _ = fs::remove_file(&entry.body_path).await;
        }
    }

    /// Remove entries a failed batch added
    async fn roll_back(committed: &[StagedEntry]) {
        for entry in committed.iter().filter(|e| !e.replaced) {
            let _ = fs::remove_file(&entry.meta_path).await;
            let _ = fs::remove_file(&entry.body_path).await;
        }
    }

    fn require(&self, name: &str) -> PrecacheResult<()> {
        if self.exists(name) {
            Ok(())
        } else {
            Err(PrecacheError::PartitionNotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> PrecacheResult<bool> {
        if self.exists(name) {
            return Ok(false);
        }

        let dir = self.partition_dir(name);
        fs::create_dir_all(dir.join(ENTRIES_DIR))
            .await
            .map_err(|e| PrecacheError::io(format!("creating partition {}", name), e))?;

        let meta = PartitionMeta {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let tmp = tmp_path(&dir);
        fs::write(&tmp, serde_json::to_string_pretty(&meta)?)
            .await
            .map_err(|e| PrecacheError::io(format!("writing partition {}", name), e))?;
        fs::rename(&tmp, dir.join(PARTITION_FILE))
            .await
            .map_err(|e| PrecacheError::io(format!("committing partition {}", name), e))?;

        debug!("Opened new partition {} at {}", name, dir.display());
        Ok(true)
    }

    async fn keys(&self) -> PrecacheResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut found: Vec<PartitionMeta> = vec![];
        let mut orphans: Vec<String> = vec![];
        let mut dirs = fs::read_dir(&self.root)
            .await
            .map_err(|e| PrecacheError::io("reading partitions directory", e))?;

        while let Some(entry) = dirs
            .next_entry()
            .await
            .map_err(|e| PrecacheError::io("reading partition entry", e))?
        {
            let meta_path = entry.path().join(PARTITION_FILE);
            let Ok(content) = fs::read_to_string(&meta_path).await else {
                let dir_name = entry.file_name().to_string_lossy().into_owned();
                if self.orphan_dir(&dir_name).is_some() {
                    debug!("Partition directory {} has no {}", dir_name, PARTITION_FILE);
                    orphans.push(dir_name);
                }
                continue;
            };
            match serde_json::from_str::<PartitionMeta>(&content) {
                Ok(meta) => found.push(meta),
                Err(e) => warn!("Skipping unreadable partition {}: {}", meta_path.display(), e),
            }
        }

        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        orphans.sort();
        orphans.extend(found.into_iter().map(|m| m.name));
        Ok(orphans)
    }

    async fn delete(&self, name: &str) -> PrecacheResult<bool> {
        let mut dir = self.partition_dir(name);
        if !dir.exists() {
            match self.orphan_dir(name) {
                Some(orphan) => dir = orphan,
                None => return Ok(false),
            }
        }

        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| PrecacheError::io(format!("deleting partition {}", name), e))?;
        Ok(true)
    }

    async fn get(&self, name: &str, key: &RequestKey) -> PrecacheResult<Option<StoredResponse>> {
        let meta_path = self.meta_path(name, key);
        if !meta_path.is_file() {
            return Ok(None);
        }

        let meta = Self::read_meta(&meta_path).await?;
        let body_path = self.entries_dir(name).join(&meta.body_file);
        let body = fs::read(&body_path)
            .await
            .map_err(|e| PrecacheError::CorruptEntry {
                path: body_path.clone(),
                reason: e.to_string(),
            })?;

        let mut response = meta.response;
        response.body = body;
        Ok(Some(response))
    }

    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> PrecacheResult<()> {
        self.require(name)?;
        let staged = self.stage(name, key, response).await?;
        let committed = Self::commit(&staged).await;
        if committed.is_err() {
            Self::abandon(&staged).await;
        }
        committed
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> PrecacheResult<()> {
        self.require(name)?;

        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            match self.stage(name, key, response).await {
                Ok(entry) => staged.push(entry),
                Err(e) => {
                    Self::discard(&staged).await;
                    return Err(e);
                }
            }
        }

        for (done, entry) in staged.iter().enumerate() {
            if let Err(e) = Self::commit(entry).await {
                warn!("Rolling back batch in {} after failed write: {}", name, e);
                Self::roll_back(&staged[..done]).await;
                Self::abandon(entry).await;
                Self::discard(&staged[done + 1..]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> PrecacheResult<Vec<EntryInfo>> {
        if self.orphan_dir(name).is_some() {
            return Ok(vec![]);
        }
        self.require(name)?;

        let mut entries = vec![];
        let mut files = fs::read_dir(self.entries_dir(name))
            .await
            .map_err(|e| PrecacheError::io(format!("reading partition {}", name), e))?;

        while let Some(file) = files
            .next_entry()
            .await
            .map_err(|e| PrecacheError::io("reading cache entry", e))?
        {
            let path = file.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let meta = Self::read_meta(&path).await?;
                entries.push(EntryInfo {
                    key: meta.key,
                    status: meta.response.status,
                    size_bytes: meta.body_len,
                    stored_at: meta.stored_at,
                });
            }
        }

        entries.sort_by(|a, b| a.key.url.cmp(&b.key.url));
        Ok(entries)
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, Response};
    use tempfile::TempDir;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::new(
            Method::Get,
            &Url::parse("http://localhost:4173").unwrap().join(path).unwrap(),
        )
    }

    async fn storage() -> (DiskStorage, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp.path().join("partitions")).await.unwrap();
        (storage, temp)
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let (storage, temp) = storage().await;
        storage.open("cache-x").await.unwrap();
        let response = Response::new(200, b"console.log(1)".to_vec())
            .with_header("content-type", "text/javascript")
            .into_stored();
        storage.put("cache-x", key("/a.js"), response).await.unwrap();

        let reopened = DiskStorage::new(temp.path().join("partitions")).await.unwrap();
        assert_eq!(reopened.keys().await.unwrap(), vec!["cache-x"]);

        let stored = reopened.get("cache-x", &key("/a.js")).await.unwrap().unwrap();
        assert_eq!(stored.status, 200);
        assert_eq!(stored.body, b"console.log(1)");
        assert_eq!(
            stored.headers,
            vec![("content-type".to_string(), "text/javascript".to_string())]
        );
    }

    #[tokio::test]
    async fn overwrite_removes_previous_body() {
        let (storage, _temp) = storage().await;
        storage.open("cache-x").await.unwrap();
        storage
            .put("cache-x", key("/d.json"), Response::new(200, "1").into_stored())
            .await
            .unwrap();
        storage
            .put("cache-x", key("/d.json"), Response::new(200, "2").into_stored())
            .await
            .unwrap();

        let stored = storage.get("cache-x", &key("/d.json")).await.unwrap().unwrap();
        assert_eq!(stored.body, b"2");

        let mut bodies = 0;
        let mut files = fs::read_dir(storage.entries_dir("cache-x")).await.unwrap();
        while let Some(file) = files.next_entry().await.unwrap() {
            if file.path().extension().is_some_and(|ext| ext == "body") {
                bodies += 1;
            }
        }
        assert_eq!(bodies, 1);
    }

    #[tokio::test]
    async fn keys_skip_foreign_directories() {
        let (storage, _temp) = storage().await;
        fs::create_dir_all(storage.root().join("not-a-partition"))
            .await
            .unwrap();
        storage.open("cache-old").await.unwrap();
        storage.open("cache-new").await.unwrap();

        let keys = storage.keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"cache-old".to_string()));
    }

    #[tokio::test]
    async fn delete_partition() {
        let (storage, _temp) = storage().await;
        storage.open("cache-old").await.unwrap();
        storage
            .put_all(
                "cache-old",
                vec![(key("/a.js"), Response::new(200, "a").into_stored())],
            )
            .await
            .unwrap();

        assert!(storage.delete("cache-old").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(!storage.delete("cache-old").await.unwrap());
    }

    #[tokio::test]
    async fn entries_report_sizes() {
        let (storage, _temp) = storage().await;
        storage.open("cache-x").await.unwrap();
        storage
            .put_all(
                "cache-x",
                vec![
                    (key("/b.css"), Response::new(200, "bb").into_stored()),
                    (key("/a.js"), Response::new(200, "a").into_stored()),
                ],
            )
            .await
            .unwrap();

        let entries = storage.entries("cache-x").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key.url, "http://localhost:4173/a.js");
        assert_eq!(entries[1].size_bytes, 2);
    }

    #[tokio::test]
    async fn failed_batch_removes_the_entries_it_added() {
        let (storage, _temp) = storage().await;
        storage.open("cache-x").await.unwrap();

        // A directory where the second entry's metadata belongs makes its rename fail
        let blocker = storage.meta_path("cache-x", &key("/b.css"));
        fs::create_dir_all(&blocker).await.unwrap();

        let result = storage
            .put_all(
                "cache-x",
                vec![
                    (key("/a.js"), Response::new(200, "a").into_stored()),
                    (key("/b.css"), Response::new(200, "b").into_stored()),
                ],
            )
            .await;
        assert!(result.is_err());
        assert!(storage.get("cache-x", &key("/a.js")).await.unwrap().is_none());

        let mut files = fs::read_dir(storage.entries_dir("cache-x")).await.unwrap();
        while let Some(file) = files.next_entry().await.unwrap() {
            assert_eq!(file.path(), blocker, "left behind: {}", file.path().display());
        }
    }

    #[tokio::test]
    async fn failed_batch_keeps_replaced_entries() {
        let (storage, _temp) = storage().await;
        storage.open("cache-x").await.unwrap();
        storage
            .put("cache-x", key("/a.js"), Response::new(200, "old").into_stored())
            .await
            .unwrap();
        fs::create_dir_all(storage.meta_path("cache-x", &key("/b.css")))
            .await
            .unwrap();

        let result = storage
            .put_all(
                "cache-x",
                vec![
                    (key("/a.js"), Response::new(200, "new").into_stored()),
                    (key("/b.css"), Response::new(200, "b").into_stored()),
                ],
            )
            .await;
        assert!(result.is_err());
        let stored = storage.get("cache-x", &key("/a.js")).await.unwrap().unwrap();
        assert_eq!(stored.body, b"new");
    }

    #[tokio::test]
    async fn directory_without_partition_file_is_listed_and_deletable() {
        let (storage, _temp) = storage().await;
        storage.open("cache-live").await.unwrap();
        let orphan = storage.partition_dir("cache-crashed");
        fs::create_dir_all(orphan.join(ENTRIES_DIR)).await.unwrap();
        fs::create_dir_all(storage.root().join("not-a-partition"))
            .await
            .unwrap();

        let hash = sha256_hex(b"cache-crashed");
        assert_eq!(storage.keys().await.unwrap(), vec![hash.clone(), "cache-live".to_string()]);
        assert!(storage.entries(&hash).await.unwrap().is_empty());

        assert!(storage.delete(&hash).await.unwrap());
        assert!(!orphan.exists());
        assert_eq!(storage.keys().await.unwrap(), vec!["cache-live"]);
        assert!(storage.root().join("not-a-partition").exists());
    }
}
