//! Activate: evict partitions left behind by previous deployments

use super::{ActivateOutcome, CacheAgent};
use crate::error::PrecacheResult;
use tracing::{debug, info};

pub(super) async fn handle(agent: &CacheAgent) -> PrecacheResult<ActivateOutcome> {
    let current = &agent.deployment().cache_name;
    let caches = agent.caches();

    // Deletion errors surface as-is; nothing is retried
    let mut evicted = vec![];
    for name in caches.keys().await? {
        if &name != current {
            caches.delete(&name).await?;
            evicted.push(name);
        }
    }

    if evicted.is_empty() {
        debug!("No stale partitions to evict");
    } else {
        info!("Evicted {} stale partition(s)", evicted.len());
    }

    Ok(ActivateOutcome {
        cache_name: current.clone(),
        evicted,
        clients_claimed: agent.policy().claim_clients,
    })
}
