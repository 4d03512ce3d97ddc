//! Lifecycle journal
//!
//! Appends one JSON line per lifecycle transition to `<state dir>/journal.log`.
//! A failed write is logged and dropped; it never fails the lifecycle step.

use crate::config::{Config, ConfigManager};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based journal that appends JSON lines
#[derive(Debug, Clone)]
pub struct Journal {
    enabled: bool,
    path: PathBuf,
}

impl Journal {
    /// Create a journal from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.journal,
            path: ConfigManager::journal_path(config),
        }
    }

    /// Journal at an explicit path
    pub fn at(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            enabled,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an event as a JSON line
    pub async fn record(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize journal event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read back the most recent `limit` entries (0 = all)
    pub async fn tail(&self, limit: usize) -> std::io::Result<Vec<serde_json::Value>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let entries: Vec<serde_json::Value> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        let skip = if limit == 0 {
            0
        } else {
            entries.len().saturating_sub(limit)
        };
        Ok(entries.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_json_line() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::at(dir.path().join("journal.log"), true);

        journal
            .record("install.completed", &serde_json::json!({"cache": "cache-x"}))
            .await;

        let content = tokio::fs::read_to_string(journal.path()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(parsed["event"], "install.completed");
        assert_eq!(parsed["data"]["cache"], "cache-x");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn tail_returns_latest_entries() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::at(dir.path().join("nested").join("journal.log"), true);

        for event in ["one", "two", "three"] {
            journal.record(event, &serde_json::json!({})).await;
        }

        let tail = journal.tail(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0]["event"], "two");
        assert_eq!(journal.tail(0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn skips_when_disabled() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::at(dir.path().join("journal.log"), false);

        journal.record("should.not.appear", &serde_json::json!({})).await;

        assert!(!journal.path().exists());
    }
}
