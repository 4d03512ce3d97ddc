//! Install command - cache every asset of the current deployment

use super::{build_host, policy_from};
use crate::cli::args::InstallArgs;
use crate::config::Config;
use crate::error::PrecacheResult;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> PrecacheResult<()> {
    let ctx = UiContext::detect();
    let policy = policy_from(config, args.skip_waiting, args.claim_clients);
    let host = build_host(config, &args.deployment, policy).await?;
    let deployment = host.agent().deployment();

    ui::intro(&ctx, &format!("Installing {}", deployment.version));

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!(
        "Caching {} assets into {}...",
        deployment.assets.len(),
        deployment.cache_name
    ));

    let report = match host.install().await {
        Ok(report) => report,
        Err(e) => {
            spinner.stop_error("Install failed");
            return Err(e);
        }
    };

    let Some(outcome) = report.install else {
        spinner.stop(&format!("{} is already active", deployment.version));
        ui::outro_success(&ctx, "Nothing to do");
        return Ok(());
    };

    spinner.stop(&format!(
        "Cached {} assets into {}",
        outcome.assets_cached, outcome.cache_name
    ));

    match report.activation {
        Some(activation) => {
            for name in &activation.evicted {
                ui::step_ok_detail(&ctx, "Evicted", name);
            }
            if activation.clients_claimed {
                ui::step_info(&ctx, "Open clients claimed");
            }
            ui::outro_success(&ctx, &format!("{} is active", activation.cache_name));
        }
        None => {
            ui::step_warn_hint(
                &ctx,
                "Installed and waiting",
                "Run: precache activate",
            );
            ui::outro_success(&ctx, "Install complete");
        }
    }

    Ok(())
}
