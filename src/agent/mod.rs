//! The caching agent
//!
//! Reacts to three lifecycle events:
//!
//! | Event | Effect |
//! |-------|--------|
//! | install | populate the current partition with every asset |
//! | activate | delete every partition except the current one |
//! | fetch | route a request between the current partition and the network |
//!
//! Each handler is an async function from the event and the agent's fixed
//! configuration to an outcome. The returned future is the deferred
//! completion: whoever delivers the event must await it before treating the
//! phase as finished.

mod activate;
mod fetch;
mod install;

use crate::error::{PrecacheError, PrecacheResult};
use crate::http::{Request, Response};
use crate::manifest::Deployment;
use crate::network::Network;
use crate::storage::Caches;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// How aggressively a new deployment takes over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Activate right after install without waiting for existing clients
    pub skip_waiting: bool,
    /// Take control of already-open clients on activation
    pub claim_clients: bool,
}

/// Events delivered by the host
#[derive(Debug)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
        }
    }
}

/// Result of a completed install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub cache_name: String,
    pub assets_cached: usize,
    /// Activation was requested without waiting
    pub skip_waiting: bool,
}

/// Result of a completed activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    pub cache_name: String,
    /// Stale partitions that were deleted
    pub evicted: Vec<String>,
    pub clients_claimed: bool,
}

/// Where a substituted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Asset served cache-first
    Cache,
    /// Fresh network response
    Network,
    /// Cached copy served because the network failed
    CacheFallback,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
            Self::CacheFallback => write!(f, "cache (offline fallback)"),
        }
    }
}

/// Result of a fetch event
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; default networking applies
    Passthrough,
    /// Substitute this response
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

/// Result of any event
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallOutcome),
    Activated(ActivateOutcome),
    Fetched(FetchOutcome),
}

impl EventOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Installed(_) => "install",
            Self::Activated(_) => "activate",
            Self::Fetched(_) => "fetch",
        }
    }

    pub fn into_installed(self) -> PrecacheResult<InstallOutcome> {
        match self {
            Self::Installed(outcome) => Ok(outcome),
            other => Err(other.mismatch("install")),
        }
    }

    pub fn into_activated(self) -> PrecacheResult<ActivateOutcome> {
        match self {
            Self::Activated(outcome) => Ok(outcome),
            other => Err(other.mismatch("activate")),
        }
    }

    pub fn into_fetched(self) -> PrecacheResult<FetchOutcome> {
        match self {
            Self::Fetched(outcome) => Ok(outcome),
            other => Err(other.mismatch("fetch")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> PrecacheError {
        PrecacheError::OutcomeMismatch {
            expected,
            actual: self.kind(),
        }
    }
}

/// Asset-caching agent for one deployment
pub struct CacheAgent {
    deployment: Arc<Deployment>,
    origin: Url,
    caches: Caches,
    network: Arc<dyn Network>,
    policy: LifecyclePolicy,
}

impl CacheAgent {
    /// Create an agent; `origin` is what asset paths resolve against
    pub fn new(
        deployment: Arc<Deployment>,
        origin: Url,
        caches: Caches,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            deployment,
            origin,
            caches,
            network,
            policy: LifecyclePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Agent for another deployment over the same storage and network
    pub fn for_deployment(&self, deployment: Deployment) -> Self {
        Self {
            deployment: Arc::new(deployment),
            origin: self.origin.clone(),
            caches: self.caches.clone(),
            network: self.network.clone(),
            policy: self.policy,
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    /// Dispatch an event to its handler
    pub async fn handle(&self, event: LifecycleEvent) -> PrecacheResult<EventOutcome> {
        match event {
            LifecycleEvent::Install => self.install().await.map(EventOutcome::Installed),
            LifecycleEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            LifecycleEvent::Fetch(request) => self.fetch(request).await.map(EventOutcome::Fetched),
        }
    }

    /// Populate the current partition with every asset
    pub async fn install(&self) -> PrecacheResult<InstallOutcome> {
        install::handle(self).await
    }

    /// Delete every partition other than the current one
    pub async fn activate(&self) -> PrecacheResult<ActivateOutcome> {
        activate::handle(self).await
    }

    /// Route a request between cache and network
    pub async fn fetch(&self, request: Request) -> PrecacheResult<FetchOutcome> {
        fetch::handle(self, request).await
    }
}
