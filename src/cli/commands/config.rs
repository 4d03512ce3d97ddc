//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::schema::StorageBackend;
use crate::config::{Config, ConfigManager};
use crate::error::{PrecacheError, PrecacheResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;
use url::Url;

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "general.journal",
    "agent.origin",
    "agent.manifest",
    "agent.skip_waiting",
    "agent.claim_clients",
    "storage.backend",
    "storage.dir",
    "network.timeout_secs",
    "network.user_agent",
    "network.max_body_mb",
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> PrecacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> PrecacheResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> PrecacheResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

/// Update one key in the global config file
///
/// Only the file at `manager.path()` is rewritten; values coming from a
/// local `.precache.toml` are not copied into it.
async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> PrecacheResult<()> {
    let ctx = UiContext::detect();
    let mut config = manager.load().await?;

    if let Err(e) = apply(&mut config, key, value) {
        if matches!(e, PrecacheError::ConfigUnknownKey(_)) {
            ui::remark(&ctx, "Valid keys:");
            for key in valid_keys() {
                eprintln!("  {}", key);
            }
        }
        return Err(e);
    }

    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
    Ok(())
}

/// Set a dot-separated key on a config, validating the value
pub(crate) fn apply(config: &mut Config, key: &str, value: &str) -> PrecacheResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => {
            config.general.log_format = match value {
                "text" | "json" => value.to_string(),
                _ => return Err(invalid(key, "expected text or json")),
            }
        }
        ["general", "journal"] => config.general.journal = parse_bool(key, value)?,

        ["agent", "origin"] => {
            Url::parse(value).map_err(|e| invalid(key, &e.to_string()))?;
            config.agent.origin = value.to_string();
        }
        ["agent", "manifest"] => config.agent.manifest = PathBuf::from(value),
        ["agent", "skip_waiting"] => config.agent.skip_waiting = parse_bool(key, value)?,
        ["agent", "claim_clients"] => config.agent.claim_clients = parse_bool(key, value)?,

        ["storage", "backend"] => {
            config.storage.backend = match value {
                "disk" => StorageBackend::Disk,
                "memory" => StorageBackend::Memory,
                _ => return Err(invalid(key, "expected disk or memory")),
            }
        }
        ["storage", "dir"] => config.storage.dir = Some(PathBuf::from(value)),

        ["network", "timeout_secs"] => {
            config.network.timeout_secs = match value.parse() {
                Ok(0) | Err(_) => return Err(invalid(key, "expected a positive number")),
                Ok(n) => n,
            }
        }
        ["network", "user_agent"] => config.network.user_agent = value.to_string(),
        ["network", "max_body_mb"] => {
            config.network.max_body_mb = match value.parse() {
                Ok(0) | Err(_) => return Err(invalid(key, "expected a positive number")),
                Ok(n) => n,
            }
        }

        _ => return Err(PrecacheError::ConfigUnknownKey(key.to_string())),
    }

    Ok(())
}

fn parse_bool(key: &str, value: &str) -> PrecacheResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, "expected true or false")),
    }
}

fn invalid(key: &str, reason: &str) -> PrecacheError {
    PrecacheError::ConfigValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Keys accepted by `config set`, for help output
pub fn valid_keys() -> &'static [&'static str] {
    VALID_KEYS
}
