//! Worker host
//!
//! Stands in for the runtime that owns the agent: it delivers lifecycle
//! events, awaits each handler to completion, and keeps the registration
//! (which worker is installing, waiting, or active). The registration lives
//! in `worker.json` next to disk partitions, and in memory when the
//! partitions themselves only last as long as the process.
//!
//! # Lifecycle
//!
//! | Step | Registration change |
//! |------|---------------------|
//! | install ok | new worker becomes `waiting` (replacing any older waiting one) |
//! | install failed | no worker promoted; failure and attempt count recorded |
//! | activate | `waiting` becomes `active`, previous active is dropped |
//!
//! With `skip_waiting` the host activates straight after a successful
//! install. Fetches are served by whichever worker is active, even when the
//! manifest already names a newer deployment that is still waiting. With no
//! active worker they pass through untouched.

use crate::agent::{
    ActivateOutcome, CacheAgent, EventOutcome, FetchOutcome, InstallOutcome, LifecycleEvent,
};
use crate::config::schema::StorageBackend;
use crate::config::{Config, ConfigManager};
use crate::error::{PrecacheError, PrecacheResult};
use crate::http::Request;
use crate::journal::Journal;
use crate::manifest::Deployment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Install handler running
    Installing,
    /// Installed, waiting to activate
    Installed,
    /// Active and intercepting fetches
    Activated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activated => write!(f, "activated"),
        }
    }
}

/// One worker instance, bound to a deployment version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: Uuid,
    pub version: String,
    pub cache_name: String,
    pub state: WorkerState,
    /// Asset paths this worker serves cache-first
    pub assets: Vec<String>,
    pub skip_waiting: bool,
    pub clients_claimed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(deployment: &Deployment, state: WorkerState) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: deployment.version.clone(),
            cache_name: deployment.cache_name.clone(),
            state,
            assets: deployment.assets.iter().map(str::to_string).collect(),
            skip_waiting: false,
            clients_claimed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The deployment this worker was installed for
    pub fn deployment(&self) -> Deployment {
        Deployment::new(self.version.clone(), self.assets.iter().collect())
    }

    fn set_state(&mut self, state: WorkerState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Most recent failed install
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallFailure {
    pub version: String,
    /// Consecutive failed attempts for this version
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Persisted registration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub installing: Option<WorkerRecord>,
    pub waiting: Option<WorkerRecord>,
    pub active: Option<WorkerRecord>,
    pub last_failure: Option<InstallFailure>,
}

impl Registration {
    /// Load from file, empty if missing
    pub async fn load(path: &Path) -> PrecacheResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PrecacheError::io(format!("reading {}", path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save to file via a temporary file
    pub async fn save(&self, path: &Path) -> PrecacheResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PrecacheError::io("creating state directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| PrecacheError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| PrecacheError::io(format!("writing {}", path.display()), e))?;
        Ok(())
    }

    /// Whether a worker for `version` is active
    pub fn is_active(&self, version: &str) -> bool {
        self.active.as_ref().is_some_and(|w| w.version == version)
    }
}

/// Where the registration is kept
pub enum RegistrationStore {
    /// JSON file, for partitions that persist on disk
    File(PathBuf),
    /// Process memory, for partitions that vanish on exit
    Memory(Mutex<Registration>),
}

impl RegistrationStore {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn memory() -> Self {
        Self::Memory(Mutex::new(Registration::default()))
    }

    /// Store matching the lifetime of the configured storage backend
    pub fn for_config(config: &Config) -> Self {
        match config.storage.backend {
            StorageBackend::Disk => Self::file(ConfigManager::worker_record_path(config)),
            StorageBackend::Memory => Self::memory(),
        }
    }

    pub async fn load(&self) -> PrecacheResult<Registration> {
        match self {
            Self::File(path) => Registration::load(path).await,
            Self::Memory(reg) => Ok(reg.lock().await.clone()),
        }
    }

    pub async fn save(&self, registration: &Registration) -> PrecacheResult<()> {
        match self {
            Self::File(path) => registration.save(path).await,
            Self::Memory(reg) => {
                *reg.lock().await = registration.clone();
                Ok(())
            }
        }
    }
}

/// Outcome of [`WorkerHost::install`]
#[derive(Debug)]
pub struct InstallReport {
    /// `None` when this version was already active
    pub install: Option<InstallOutcome>,
    /// Present when the worker was activated straight away
    pub activation: Option<ActivateOutcome>,
    pub state: WorkerState,
}

/// Drives a [`CacheAgent`] through its lifecycle
pub struct WorkerHost {
    agent: CacheAgent,
    store: RegistrationStore,
    journal: Journal,
    // Serializes lifecycle transitions within this process
    transitions: Mutex<()>,
}

impl WorkerHost {
    pub fn new(agent: CacheAgent, store: RegistrationStore, journal: Journal) -> Self {
        Self {
            agent,
            store,
            journal,
            transitions: Mutex::new(()),
        }
    }

    pub fn agent(&self) -> &CacheAgent {
        &self.agent
    }

    pub async fn registration(&self) -> PrecacheResult<Registration> {
        self.store.load().await
    }

    /// Deliver the install event and wait for it to finish
    pub async fn install(&self) -> PrecacheResult<InstallReport> {
        let _guard = self.transitions.lock().await;
        let deployment = self.agent.deployment();
        let mut reg = self.registration().await?;

        if reg.is_active(&deployment.version) {
            info!("Version {} is already active", deployment.version);
            return Ok(InstallReport {
                install: None,
                activation: None,
                state: WorkerState::Activated,
            });
        }

        let mut worker = WorkerRecord::new(deployment, WorkerState::Installing);
        reg.installing = Some(worker.clone());
        self.store.save(&reg).await?;
        self.journal
            .record(
                "install.started",
                &json!({
                    "worker": worker.id,
                    "version": worker.version,
                    "cache": worker.cache_name,
                    "assets": worker.assets.len(),
                }),
            )
            .await;

        let outcome = match deliver(&self.agent, LifecycleEvent::Install)
            .await
            .and_then(EventOutcome::into_installed)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                reg.installing = None;
                let attempts = match &reg.last_failure {
                    Some(f) if f.version == deployment.version => f.attempts + 1,
                    _ => 1,
                };
                reg.last_failure = Some(InstallFailure {
                    version: deployment.version.clone(),
                    attempts,
                    error: e.to_string(),
                    failed_at: Utc::now(),
                });
                self.store.save(&reg).await?;

                warn!("Install attempt {} for {} failed: {}", attempts, deployment.version, e);
                self.journal
                    .record(
                        "install.failed",
                        &json!({
                            "worker": worker.id,
                            "version": deployment.version,
                            "attempts": attempts,
                            "retryable": e.is_retryable(),
                            "error": e.to_string(),
                        }),
                    )
                    .await;
                return Err(e);
            }
        };

        reg.installing = None;
        worker.skip_waiting = outcome.skip_waiting;
        worker.set_state(WorkerState::Installed);
        if let Some(previous) = reg.waiting.replace(worker.clone()) {
            self.journal
                .record(
                    "worker.superseded",
                    &json!({"worker": previous.id, "version": previous.version}),
                )
                .await;
        }
        if reg
            .last_failure
            .as_ref()
            .is_some_and(|f| f.version == deployment.version)
        {
            reg.last_failure = None;
        }
        self.store.save(&reg).await?;
        self.journal
            .record(
                "install.completed",
                &json!({"worker": worker.id, "assets": outcome.assets_cached}),
            )
            .await;

        let activation = if outcome.skip_waiting {
            debug!("Skipping the waiting phase");
            Some(self.activate_locked(&mut reg).await?)
        } else {
            None
        };

        Ok(InstallReport {
            state: if activation.is_some() {
                WorkerState::Activated
            } else {
                WorkerState::Installed
            },
            install: Some(outcome),
            activation,
        })
    }

    /// Deliver the activate event to the waiting worker
    pub async fn activate(&self) -> PrecacheResult<ActivateOutcome> {
        let _guard = self.transitions.lock().await;
        let mut reg = self.registration().await?;
        self.activate_locked(&mut reg).await
    }

    async fn activate_locked(&self, reg: &mut Registration) -> PrecacheResult<ActivateOutcome> {
        let version = self.agent.deployment().version.clone();

        let Some(mut worker) = reg.waiting.take_if(|w| w.version == version) else {
            if reg.is_active(&version) {
                // Already active; eviction is idempotent
                return deliver(&self.agent, LifecycleEvent::Activate)
                    .await
                    .and_then(EventOutcome::into_activated);
            }
            return Err(PrecacheError::NoWorker);
        };

        let outcome = match deliver(&self.agent, LifecycleEvent::Activate)
            .await
            .and_then(EventOutcome::into_activated)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                reg.waiting = Some(worker);
                self.journal
                    .record(
                        "activate.failed",
                        &json!({"version": version, "error": e.to_string()}),
                    )
                    .await;
                return Err(e);
            }
        };

        worker.clients_claimed = outcome.clients_claimed;
        worker.set_state(WorkerState::Activated);
        let worker_id = worker.id;
        if let Some(previous) = reg.active.replace(worker) {
            debug!("Worker {} ({}) is now redundant", previous.id, previous.version);
        }
        self.store.save(reg).await?;

        info!("Activated {} as {}", version, outcome.cache_name);
        self.journal
            .record(
                "activate.completed",
                &json!({
                    "worker": worker_id,
                    "cache": outcome.cache_name,
                    "evicted": outcome.evicted,
                    "clients_claimed": outcome.clients_claimed,
                }),
            )
            .await;
        Ok(outcome)
    }

    /// Deliver a fetch event to the active worker, if any
    ///
    /// While a newer deployment is installed but waiting, the previously
    /// activated worker keeps serving from its own partition.
    pub async fn fetch(&self, request: Request) -> PrecacheResult<FetchOutcome> {
        let reg = self.registration().await?;
        let Some(active) = reg.active else {
            debug!("No active worker, not intercepting {}", request.url);
            return Ok(FetchOutcome::Passthrough);
        };

        let event = LifecycleEvent::Fetch(request);
        if active.version == self.agent.deployment().version {
            return deliver(&self.agent, event)
                .await
                .and_then(EventOutcome::into_fetched);
        }

        debug!(
            "Version {} controls requests until {} is activated",
            active.version,
            self.agent.deployment().version
        );
        let controller = self.agent.for_deployment(active.deployment());
        deliver(&controller, event)
            .await
            .and_then(EventOutcome::into_fetched)
    }
}

async fn deliver(agent: &CacheAgent, event: LifecycleEvent) -> PrecacheResult<EventOutcome> {
    debug!(
        "Delivering {} to worker {}",
        event.kind(),
        agent.deployment().version
    );
    agent.handle(event).await
}
