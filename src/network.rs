//! Network access
//!
//! The agent only ever talks to the network through the [`Network`] trait so
//! the routing policy can be exercised without sockets. [`HttpNetwork`] is the
//! real implementation, built on a blocking `ureq` agent driven from the
//! tokio blocking pool.

use crate::config::schema::NetworkConfig;
use crate::error::{PrecacheError, PrecacheResult};
use crate::http::{Method, Request, Response};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Abstract request/response primitive
///
/// Transport failures (connection refused, DNS, timeout) are errors. Any HTTP
/// status, including 4xx and 5xx, is a successful fetch.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request
    async fn fetch(&self, request: &Request) -> PrecacheResult<Response>;
}

/// HTTP network backed by `ureq`
#[derive(Clone)]
pub struct HttpNetwork {
    agent: ureq::Agent,
    max_body_bytes: u64,
}

impl HttpNetwork {
    /// Create a network client from config
    pub fn new(config: &NetworkConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .user_agent(config.user_agent.as_str())
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            max_body_bytes: u64::from(config.max_body_mb) * 1024 * 1024,
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> PrecacheResult<Response> {
        let agent = self.agent.clone();
        let request = request.clone();
        let limit = self.max_body_bytes;

        debug!("Network fetch: {} {}", request.method, request.url);
        tokio::task::spawn_blocking(move || execute(&agent, &request, limit)).await?
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn execute(agent: &ureq::Agent, request: &Request, limit: u64) -> PrecacheResult<Response> {
    let url = request.url.as_str();
    let headers = &request.headers;

    let result = match &request.method {
        Method::Get => with_headers(agent.get(url), headers).call(),
        Method::Head => with_headers(agent.head(url), headers).call(),
        Method::Delete => with_headers(agent.delete(url), headers).call(),
        Method::Options => with_headers(agent.options(url), headers).call(),
        Method::Post => with_headers(agent.post(url), headers).send_empty(),
        Method::Put => with_headers(agent.put(url), headers).send_empty(),
        Method::Patch => with_headers(agent.patch(url), headers).send_empty(),
        Method::Other(m) => return Err(PrecacheError::UnsupportedMethod(m.clone())),
    };

    let mut response = result.map_err(|e| PrecacheError::network(url, e.to_string()))?;
    let status = response.status();

    let header_pairs: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = response
        .body_mut()
        .with_config()
        .limit(limit)
        .read_to_vec()
        .map_err(|e| PrecacheError::network(url, format!("reading body: {}", e)))?;

    let out = Response::new(status.as_u16(), body)
        .with_status_text(status.canonical_reason().unwrap_or_default());
    Ok(header_pairs
        .into_iter()
        .fold(out, |out, (name, value)| out.with_header(name, value)))
}
