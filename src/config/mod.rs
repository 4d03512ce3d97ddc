//! Configuration management for precache

pub mod schema;

pub use schema::Config;

use crate::error::{PrecacheError, PrecacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the project-local config file
pub const LOCAL_CONFIG_FILE: &str = ".precache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
            .join("config.toml")
    }

    /// Get the default state directory path
    pub fn default_state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
    }

    /// State directory for a config (partitions, worker record, journal)
    pub fn state_dir(config: &Config) -> PathBuf {
        config
            .storage
            .dir
            .clone()
            .unwrap_or_else(Self::default_state_dir)
    }

    /// Directory holding cache partitions
    pub fn partitions_dir(config: &Config) -> PathBuf {
        Self::state_dir(config).join("partitions")
    }

    /// Persisted worker record
    pub fn worker_record_path(config: &Config) -> PathBuf {
        Self::state_dir(config).join("worker.json")
    }

    /// Lifecycle journal
    pub fn journal_path(config: &Config) -> PathBuf {
        Self::state_dir(config).join("journal.log")
    }

    /// Walk up from `start` looking for a project-local config file
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> PrecacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PrecacheResult<Config> {
        let value = read_toml(path).await?;
        value.try_into::<Config>().map_err(|e| PrecacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the global config with a project-local file layered on top
    ///
    /// Tables merge recursively; any value present in the local file wins.
    pub async fn load_merged(&self, local: Option<&Path>) -> PrecacheResult<Config> {
        let Some(local) = local else {
            return self.load().await;
        };

        let mut base = if self.config_path.exists() {
            read_toml(&self.config_path).await?
        } else {
            toml::Value::Table(Default::default())
        };
        let overlay = read_toml(local).await?;
        merge_toml(&mut base, overlay);

        base.try_into::<Config>().map_err(|e| PrecacheError::ConfigInvalid {
            path: local.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PrecacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PrecacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> PrecacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PrecacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure the state directories for a config exist
    pub async fn ensure_state_dirs(config: &Config) -> PrecacheResult<()> {
        let dirs = [Self::state_dir(config), Self::partitions_dir(config)];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                PrecacheError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_toml(path: &Path) -> PrecacheResult<toml::Value> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| PrecacheError::io(format!("reading config from {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| PrecacheError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.agent.origin, "http://localhost:4173");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.agent.origin = "https://app.example.com".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.agent.origin, "https://app.example.com");
    }

    #[tokio::test]
    async fn local_config_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        fs::write(
            &global,
            "[agent]\norigin = \"https://global.example\"\nskip_waiting = true\n",
        )
        .await
        .unwrap();

        let project = temp.path().join("project");
        let nested = project.join("src").join("routes");
        fs::create_dir_all(&nested).await.unwrap();
        fs::write(
            project.join(LOCAL_CONFIG_FILE),
            "[agent]\norigin = \"http://localhost:5173\"\n",
        )
        .await
        .unwrap();

        let local = ConfigManager::find_local_config(&nested).unwrap();
        let config = ConfigManager::with_path(global)
            .load_merged(Some(&local))
            .await
            .unwrap();

        assert_eq!(config.agent.origin, "http://localhost:5173");
        assert!(config.agent.skip_waiting); // kept from global
    }

    #[tokio::test]
    async fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[agent]\nskip_waiting = \"maybe\"\n")
            .await
            .unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        assert!(matches!(err, PrecacheError::ConfigInvalid { path: p, .. } if p == path));
    }

    #[test]
    fn state_paths_follow_storage_dir() {
        let mut config = Config::default();
        config.storage.dir = Some(PathBuf::from("/tmp/precache-state"));

        assert_eq!(
            ConfigManager::partitions_dir(&config),
            PathBuf::from("/tmp/precache-state/partitions")
        );
        assert_eq!(
            ConfigManager::worker_record_path(&config),
            PathBuf::from("/tmp/precache-state/worker.json")
        );
    }
}
