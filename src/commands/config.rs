use anyhow::{Context as _, Result};

use crate::Context;
use crate::cli::ConfigCommand;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
    }
}

fn show(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;

    if ctx.json {
        let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("{json}");
        return Ok(());
    }

    let file = paths::config_file()?;
    ui::header("Configuration");
    ui::kv("Config file", &file.display().to_string());
    if !file.exists() {
        ui::dim("  (not found, using defaults)");
    }
    ui::kv("State directory", &paths::state_dir()?.display().to_string());

    ui::section("Effective values");
    let xe = config
        .xe_path()
        .map_or_else(|| "(discovered)".to_string(), |p| p.display().to_string());
    ui::kv("xe_path", &xe);
    ui::kv("timeout_seconds", &config.timeout_seconds.to_string());
    ui::kv("max_retries", &config.max_retries.to_string());
    ui::kv("cache_lookups", &config.cache_lookups.to_string());
    ui::kv(
        "backoff",
        &format!(
            "{}s x{} (max {}s)",
            config.backoff.base_seconds, config.backoff.factor, config.backoff.max_seconds
        ),
    );

    println!();
    ui::dim(&format!(
        "Override directories with {} and {}.",
        paths::ENV_CONFIG_DIR,
        paths::ENV_STATE_DIR
    ));
    Ok(())
}
