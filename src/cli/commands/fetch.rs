//! Fetch command - request a URL the way a controlled page would

use super::{build_host, policy_from, resolve_origin};
use crate::agent::FetchOutcome;
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::error::{PrecacheError, PrecacheResult};
use crate::http::{Method, Request, RequestMode, Response};
use crate::storage::format_bytes;
use console::style;
use std::io::Write;
use tokio::fs;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> PrecacheResult<()> {
    let policy = policy_from(config, false, false);
    let host = build_host(config, &args.deployment, policy).await?;
    let origin = resolve_origin(config, &args.deployment)?;

    let Ok(method) = args.method.parse::<Method>();
    let mode = if args.navigate {
        RequestMode::Navigate
    } else {
        RequestMode::Subresource
    };
    let request = args.headers.iter().try_fold(
        Request::resolve(method, &args.target, &origin)?.with_mode(mode),
        |request, raw| {
            let (name, value) = parse_header(raw)?;
            Ok::<_, PrecacheError>(request.with_header(name, value))
        },
    )?;

    let (response, source) = match host.fetch(request.clone()).await? {
        FetchOutcome::Respond { response, source } => (response, source.to_string()),
        FetchOutcome::Passthrough => {
            debug!("Request not intercepted, using the network directly");
            let response = host.agent().network().fetch(&request).await?;
            (response, "network (not intercepted)".to_string())
        }
    };

    print_status(&request, &response, &source, args.include);

    let body = response.into_body();
    match args.output {
        Some(path) => {
            fs::write(&path, &body)
                .await
                .map_err(|e| PrecacheError::io(format!("writing {}", path.display()), e))?;
            eprintln!(
                "{} {} bytes to {}",
                style("Wrote").dim(),
                body.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&body)
                .and_then(|()| stdout.flush())
                .map_err(|e| PrecacheError::io("writing response body", e))?;
        }
    }

    Ok(())
}

/// Split a `Name: value` header argument
fn parse_header(raw: &str) -> PrecacheResult<(&str, &str)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(PrecacheError::InvalidHeader(raw.to_string())),
    }
}

/// Response line (and optionally headers) go to stderr so stdout stays the body
fn print_status(request: &Request, response: &Response, source: &str, include_headers: bool) {
    let status = if response.is_ok() {
        style(response.status.to_string()).green()
    } else {
        style(response.status.to_string()).red()
    };

    let size = format_bytes(response.body_len() as u64);
    let details = match response.header("content-type") {
        Some(content_type) => format!("{}, {}", size, content_type),
        None => size,
    };

    eprintln!(
        "{} {} {} {} ({}) {}",
        request.method,
        request.url,
        status,
        response.status_text,
        details,
        style(format!("[{}]", source)).dim()
    );

    if include_headers {
        for (name, value) in &response.headers {
            eprintln!("{}: {}", style(name).cyan(), value);
        }
    }
}
