//! Cache command - inspect and clear cache partitions

use super::load_deployment;
use crate::cli::args::{CacheAction, CacheArgs, DeploymentArgs, OutputFormat};
use crate::config::Config;
use crate::error::PrecacheResult;
use crate::journal::Journal;
use crate::storage::{format_bytes, open_caches, Caches, EntryInfo};
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> PrecacheResult<()> {
    let caches = open_caches(config).await?;

    match args.action {
        CacheAction::List { format, deployment } => {
            let current = current_cache_name(config, &deployment).await;
            list_partitions(&caches, current.as_deref(), format).await
        }
        CacheAction::Show {
            name,
            format,
            deployment,
        } => {
            let name = match name {
                Some(name) => name,
                None => load_deployment(config, &deployment).await?.cache_name,
            };
            show_partition(&caches, &name, format).await
        }
        CacheAction::Clear { yes } => clear_partitions(&caches, config, yes).await,
    }
}

/// Name of the partition the manifest points at, if it can be read
async fn current_cache_name(config: &Config, args: &DeploymentArgs) -> Option<String> {
    match load_deployment(config, args).await {
        Ok(deployment) => Some(deployment.cache_name),
        Err(e) => {
            debug!("No current deployment: {}", e);
            None
        }
    }
}

#[derive(Serialize)]
struct PartitionSummary {
    name: String,
    entries: usize,
    size_bytes: u64,
    current: bool,
}

async fn list_partitions(
    caches: &Caches,
    current: Option<&str>,
    format: OutputFormat,
) -> PrecacheResult<()> {
    let mut partitions = vec![];
    for name in caches.keys().await? {
        let entries = caches.entries(&name).await?;
        partitions.push(PartitionSummary {
            current: current == Some(name.as_str()),
            entries: entries.len(),
            size_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            name,
        });
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&partitions)?),
        OutputFormat::Plain => {
            for partition in &partitions {
                println!("{}", partition.name);
            }
        }
        OutputFormat::Table => {
            if partitions.is_empty() {
                println!("No cache partitions found.");
                return Ok(());
            }

            println!("{:<40} {:<10} {:<12} {}", "PARTITION", "ENTRIES", "SIZE", "");
            println!("{}", "-".repeat(72));
            for partition in &partitions {
                println!(
                    "{:<40} {:<10} {:<12} {}",
                    partition.name,
                    partition.entries,
                    format_bytes(partition.size_bytes),
                    if partition.current {
                        style("current").green().to_string()
                    } else {
                        style("stale").dim().to_string()
                    }
                );
            }
            println!();
            println!(
                "Total: {} partition(s) ({} backend)",
                partitions.len(),
                caches.backend_name()
            );
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct EntryJson {
    method: String,
    url: String,
    status: u16,
    size_bytes: u64,
    stored_at: String,
}

impl From<&EntryInfo> for EntryJson {
    fn from(entry: &EntryInfo) -> Self {
        Self {
            method: entry.key.method.to_string(),
            url: entry.key.url.clone(),
            status: entry.status,
            size_bytes: entry.size_bytes,
            stored_at: entry.stored_at.to_rfc3339(),
        }
    }
}

async fn show_partition(caches: &Caches, name: &str, format: OutputFormat) -> PrecacheResult<()> {
    let entries = caches.entries(name).await?;

    match format {
        OutputFormat::Json => {
            let json: Vec<EntryJson> = entries.iter().map(EntryJson::from).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key.url);
            }
        }
        OutputFormat::Table => {
            println!("{}", style(name).bold());
            if entries.is_empty() {
                println!("  (empty)");
                return Ok(());
            }

            println!(
                "{:<7} {:<50} {:<7} {:<10} {}",
                "METHOD", "URL", "STATUS", "SIZE", "STORED"
            );
            println!("{}", "-".repeat(96));
            for entry in &entries {
                println!(
                    "{:<7} {:<50} {:<7} {:<10} {}",
                    entry.key.method,
                    entry.key.url,
                    entry.status,
                    format_bytes(entry.size_bytes),
                    entry.stored_at.format("%Y-%m-%d %H:%M")
                );
            }
            let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
            println!();
            println!("Total: {} entries, {}", entries.len(), format_bytes(total));
        }
    }

    Ok(())
}

async fn clear_partitions(caches: &Caches, config: &Config, yes: bool) -> PrecacheResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let names = caches.keys().await?;

    if names.is_empty() {
        ui::step_info(&ctx, "No cache partitions to clear");
        return Ok(());
    }

    let prompt = format!("Delete {} cache partition(s)?", names.len());
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::remark(&ctx, "Aborted");
        return Ok(());
    }

    for name in &names {
        caches.delete(name).await?;
        ui::step_ok_detail(&ctx, "Deleted", name);
    }

    Journal::new(config)
        .record("cache.cleared", &serde_json::json!({ "partitions": names }))
        .await;
    ui::step_ok(&ctx, &format!("Cleared {} partition(s)", names.len()));

    Ok(())
}
