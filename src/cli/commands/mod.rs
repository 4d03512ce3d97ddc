//! CLI command implementations

pub mod activate;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod install;
pub mod status;

pub use activate::execute as activate;
pub use cache::execute as cache;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use install::execute as install;
pub use status::execute as status;

use crate::agent::{CacheAgent, LifecyclePolicy};
use crate::cli::args::DeploymentArgs;
use crate::config::Config;
use crate::error::{PrecacheError, PrecacheResult};
use crate::journal::Journal;
use crate::manifest::{BuildManifest, Deployment};
use crate::network::HttpNetwork;
use crate::storage::open_caches;
use crate::worker::{RegistrationStore, WorkerHost};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Manifest path from the command line, falling back to `agent.manifest`
pub(crate) fn manifest_path(config: &Config, args: &DeploymentArgs) -> PathBuf {
    args.manifest
        .clone()
        .unwrap_or_else(|| config.agent.manifest.clone())
}

/// Load the deployment described by the build manifest
pub(crate) async fn load_deployment(
    config: &Config,
    args: &DeploymentArgs,
) -> PrecacheResult<Deployment> {
    let path = manifest_path(config, args);
    let manifest = BuildManifest::load(&path).await?;
    let deployment = Deployment::from_manifest(&manifest);
    debug!(
        "Deployment {} with {} assets from {}",
        deployment.version,
        deployment.assets.len(),
        path.display()
    );
    Ok(deployment)
}

/// Origin from the command line, falling back to `agent.origin`
pub(crate) fn resolve_origin(config: &Config, args: &DeploymentArgs) -> PrecacheResult<Url> {
    let origin = args.origin.as_deref().unwrap_or(&config.agent.origin);
    Url::parse(origin).map_err(|e| PrecacheError::InvalidUrl {
        url: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Wire up a worker host for the current deployment
pub(crate) async fn build_host(
    config: &Config,
    args: &DeploymentArgs,
    policy: LifecyclePolicy,
) -> PrecacheResult<WorkerHost> {
    let deployment = load_deployment(config, args).await?;
    let origin = resolve_origin(config, args)?;
    let caches = open_caches(config).await?;
    let network = Arc::new(HttpNetwork::new(&config.network));

    let agent =
        CacheAgent::new(Arc::new(deployment), origin, caches, network).with_policy(policy);

    Ok(WorkerHost::new(
        agent,
        RegistrationStore::for_config(config),
        Journal::new(config),
    ))
}

/// Policy from config with command-line switches layered on top
pub(crate) fn policy_from(config: &Config, skip_waiting: bool, claim_clients: bool) -> LifecyclePolicy {
    LifecyclePolicy {
        skip_waiting: skip_waiting || config.agent.skip_waiting,
        claim_clients: claim_clients || config.agent.claim_clients,
    }
}
