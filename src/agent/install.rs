//! Install: populate a fresh partition with the asset list

use super::{CacheAgent, InstallOutcome};
use crate::error::PrecacheResult;
use crate::http::{Method, Request};
use tracing::info;

pub(super) async fn handle(agent: &CacheAgent) -> PrecacheResult<InstallOutcome> {
    let deployment = agent.deployment();
    let cache = agent.caches().open(&deployment.cache_name).await?;

    let requests = deployment
        .assets
        .iter()
        .map(|path| Request::resolve(Method::Get, path, agent.origin()))
        .collect::<PrecacheResult<Vec<_>>>()?;

    let assets_cached = cache.add_all(agent.network(), requests).await?;
    info!(
        "Installed {} assets into {}",
        assets_cached, deployment.cache_name
    );

    Ok(InstallOutcome {
        cache_name: deployment.cache_name.clone(),
        assets_cached,
        skip_waiting: agent.policy().skip_waiting,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::{agent_with, get, memory_caches};
    use super::super::LifecyclePolicy;
    use crate::error::PrecacheError;

    #[tokio::test]
    async fn install_caches_every_asset() {
        let (agent, network) = agent_with("x", &["/a.js", "/b.css"], memory_caches());
        network.reply("/a.js", 200, "alert(1)");
        network.reply("/b.css", 200, "body{}");

        let outcome = agent.install().await.unwrap();
        assert_eq!(outcome.cache_name, "cache-x");
        assert_eq!(outcome.assets_cached, 2);
        assert!(!outcome.skip_waiting);

        let cache = agent.caches().open("cache-x").await.unwrap();
        for path in ["/a.js", "/b.css"] {
            assert!(cache.match_request(&get(path)).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn install_fails_as_a_whole() {
        let (agent, network) = agent_with("x", &["/a.js", "/gone.css"], memory_caches());
        network.reply("/a.js", 200, "alert(1)");
        network.reply("/gone.css", 500, "oops");

        let err = agent.install().await.unwrap_err();
        assert!(matches!(err, PrecacheError::InstallFailed { ref asset, .. } if asset.ends_with("/gone.css")));

        let cache = agent.caches().open("cache-x").await.unwrap();
        assert!(cache.match_request(&get("/a.js")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn install_reports_skip_waiting() {
        let (agent, network) = agent_with("x", &["/a.js"], memory_caches());
        network.reply("/a.js", 200, "a");
        let agent = agent.with_policy(LifecyclePolicy {
            skip_waiting: true,
            claim_clients: false,
        });

        assert!(agent.install().await.unwrap().skip_waiting);
    }

    #[tokio::test]
    async fn install_with_no_assets_creates_empty_partition() {
        let (agent, _network) = agent_with("x", &[], memory_caches());
        let outcome = agent.install().await.unwrap();
        assert_eq!(outcome.assets_cached, 0);
        assert_eq!(agent.caches().keys().await.unwrap(), vec!["cache-x"]);
    }
}
