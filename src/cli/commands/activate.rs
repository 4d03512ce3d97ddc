//! Activate command - promote the waiting deployment

use super::{build_host, policy_from};
use crate::cli::args::ActivateArgs;
use crate::config::Config;
use crate::error::PrecacheResult;
use crate::ui::{self, UiContext};

/// Execute the activate command
pub async fn execute(args: ActivateArgs, config: &Config) -> PrecacheResult<()> {
    let ctx = UiContext::detect();
    let policy = policy_from(config, false, args.claim_clients);
    let host = build_host(config, &args.deployment, policy).await?;

    let outcome = host.activate().await?;

    if outcome.evicted.is_empty() {
        ui::step_info(&ctx, "No stale partitions");
    }
    for name in &outcome.evicted {
        ui::step_ok_detail(&ctx, "Evicted", name);
    }
    if outcome.clients_claimed {
        ui::step_info(&ctx, "Open clients claimed");
    }
    ui::step_ok(&ctx, &format!("{} is active", outcome.cache_name));

    Ok(())
}
