//! Status command - show deployment, worker and partition state

use super::load_deployment;
use crate::cli::args::DeploymentArgs;
use crate::config::Config;
use crate::error::PrecacheResult;
use crate::journal::Journal;
use crate::manifest::Deployment;
use crate::storage::{format_bytes, open_caches};
use crate::worker::{Registration, RegistrationStore, WorkerRecord};
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");
static DOT: Emoji<'_, '_> = Emoji("• ", "- ");

const RECENT_EVENTS: usize = 5;

/// Execute the status command
pub async fn execute(args: DeploymentArgs, config: &Config) -> PrecacheResult<()> {
    println!("{}", style("precache status").bold().cyan());
    println!();

    let deployment = print_deployment(config, &args).await;
    let registration = RegistrationStore::for_config(config).load().await?;
    print_workers(&registration, deployment.as_ref());
    print_partitions(config, deployment.as_ref()).await?;
    print_journal(config).await;

    Ok(())
}

async fn print_deployment(config: &Config, args: &DeploymentArgs) -> Option<Deployment> {
    println!("{}", style("Deployment:").bold());
    match load_deployment(config, args).await {
        Ok(deployment) => {
            println!("  {} Version: {}", CHECK, deployment.version);
            println!("  {} Cache: {}", CHECK, deployment.cache_name);
            println!("  {} Assets: {}", CHECK, deployment.assets.len());
            Some(deployment)
        }
        Err(e) => {
            println!("  {} {}", WARN, style(e).yellow());
            None
        }
    }
}

fn print_workers(registration: &Registration, deployment: Option<&Deployment>) {
    println!();
    println!("{}", style("Worker:").bold());

    let slots = [
        ("installing", &registration.installing),
        ("waiting", &registration.waiting),
        ("active", &registration.active),
    ];
    let mut any = false;
    for (slot, record) in slots {
        if let Some(record) = record {
            any = true;
            print_worker(slot, record);
        }
    }
    if !any {
        println!("  {} {}", CROSS, style("No worker installed").dim());
    }

    if let (Some(deployment), Some(active)) = (deployment, &registration.active) {
        if active.version != deployment.version {
            println!(
                "  {} Active version {} differs from the manifest ({}) - run: precache install",
                WARN, active.version, deployment.version
            );
        }
    }

    if let Some(failure) = &registration.last_failure {
        println!(
            "  {} Last install of {} failed ({} attempt(s), {}): {}",
            CROSS,
            failure.version,
            failure.attempts,
            failure.failed_at.format("%Y-%m-%d %H:%M"),
            style(&failure.error).red()
        );
    }
}

fn print_worker(slot: &str, record: &WorkerRecord) {
    let mut flags = vec![];
    if record.skip_waiting {
        flags.push("skip-waiting");
    }
    if record.clients_claimed {
        flags.push("clients-claimed");
    }

    println!(
        "  {} {:<10} {} [{}] {} assets, updated {}{}",
        CHECK,
        slot,
        record.version,
        record.state,
        record.assets.len(),
        record.updated_at.format("%Y-%m-%d %H:%M"),
        if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        }
    );
}

async fn print_partitions(config: &Config, deployment: Option<&Deployment>) -> PrecacheResult<()> {
    println!();
    let caches = open_caches(config).await?;
    println!(
        "{} {}",
        style("Partitions:").bold(),
        style(format!("({})", caches.backend_name())).dim()
    );

    let names = caches.keys().await?;
    if names.is_empty() {
        println!("  {} {}", DOT, style("none").dim());
        return Ok(());
    }

    for name in names {
        let entries = caches.entries(&name).await?;
        let size: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let current = deployment.is_some_and(|d| d.cache_name == name);
        println!(
            "  {} {} - {} entries, {}{}",
            if current { CHECK } else { DOT },
            name,
            entries.len(),
            format_bytes(size),
            if current {
                style(" (current)").green().to_string()
            } else {
                String::new()
            }
        );
    }

    Ok(())
}

async fn print_journal(config: &Config) {
    let journal = Journal::new(config);
    let events = match journal.tail(RECENT_EVENTS).await {
        Ok(events) if !events.is_empty() => events,
        _ => return,
    };

    println!();
    println!("{}", style("Recent events:").bold());
    for event in events {
        println!(
            "  {} {} {}",
            DOT,
            style(event["timestamp"].as_str().unwrap_or("-")).dim(),
            event["event"].as_str().unwrap_or("?")
        );
    }
}
