//! Fetch: route intercepted requests between the cache and the network
//!
//! - Non-GET requests are not intercepted.
//! - Assets are served cache-first.
//! - Everything else goes network-first; ok responses are stored for later
//!   offline use, and the stored copy is served when the network fails.
//!
//! There is no offline page: a request that is neither reachable nor cached
//! fails with [`PrecacheError::OfflineMiss`].

use super::{CacheAgent, FetchOutcome, ResponseSource};
use crate::error::{PrecacheError, PrecacheResult};
use crate::http::{Method, Request};
use tracing::{debug, warn};

pub(super) async fn handle(agent: &CacheAgent, request: Request) -> PrecacheResult<FetchOutcome> {
    if request.method != Method::Get {
        debug!("Not intercepting {} {}", request.method, request.url);
        return Ok(FetchOutcome::Passthrough);
    }

    let deployment = agent.deployment();
    let cache = agent.caches().open(&deployment.cache_name).await?;

    if deployment.assets.contains(request.path()) {
        if let Some(response) = cache.match_request(&request).await? {
            debug!("Asset hit: {}", request.url);
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }
        debug!("Asset missing from {}: {}", deployment.cache_name, request.url);
    }

    let network_error = match agent.network().fetch(&request).await {
        Ok(response) if response.is_ok() => {
            let (response, copy) = response.tee();
            if let Err(e) = cache.put(&request, copy).await {
                warn!("Failed to cache {}: {}", request.url, e);
            }
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Network,
            });
        }
        Ok(response) => {
            debug!("Not caching {} (HTTP {})", request.url, response.status);
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Network,
            });
        }
        Err(e) => e,
    };

    debug!("Network failed for {}: {}", request.url, network_error);
    match cache.match_request(&request).await? {
        Some(response) => Ok(FetchOutcome::Respond {
            response,
            source: ResponseSource::CacheFallback,
        }),
        None => Err(PrecacheError::OfflineMiss {
            url: request.url.to_string(),
            navigation: request.is_navigation(),
            source: Box::new(network_error),
        }),
    }
}
