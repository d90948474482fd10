use std::path::Path;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use playvault_core::Platform;
use playvault_lib::{Settings, save_settings};

use super::Context;
use crate::CliError;

fn mask_value(s: &str) -> String {
    if s.chars().count() <= 2 {
        "****".to_string()
    } else {
        format!("{}****", s.chars().take(2).collect::<String>())
    }
}

/// Where a platform's token comes from.
fn token_source(settings: &Settings, platform: Platform) -> &'static str {
    let var = format!("{}_TOKEN", platform.env_prefix());
    if std::env::var(&var).is_ok_and(|v| !v.is_empty()) {
        "environment"
    } else if settings.platform(platform).token.is_some() {
        "settings file"
    } else {
        "not set"
    }
}

/// Show effective settings and credential sources.
pub(crate) fn run_config_show(ctx: &Context) -> Result<(), CliError> {
    log::info!(
        "{}",
        "playvault Configuration".if_supports_color(Stdout, |t| t.bold()),
    );
    crate::log_blank();

    let path = &ctx.settings_path;
    if path.exists() {
        log::info!(
            "  Settings file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(exists)".if_supports_color(Stdout, |t| t.green()),
        );
    } else {
        log::info!(
            "  Settings file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(not found, using defaults)".if_supports_color(Stdout, |t| t.dimmed()),
        );
    }
    log::info!("  Database:      {}", ctx.db_path.display());
    log::info!("  Aliases:       {}", ctx.settings.aliases_dir().display());
    crate::log_blank();

    log::info!("{}", "Platforms".if_supports_color(Stdout, |t| t.bold()));
    for &platform in Platform::all() {
        let creds = ctx.settings.credentials(platform);
        let enabled = if ctx.settings.is_enabled(platform) {
            "enabled".if_supports_color(Stdout, |t| t.green()).to_string()
        } else {
            "disabled".if_supports_color(Stdout, |t| t.dimmed()).to_string()
        };
        log::info!(
            "  {:<18} {:<10} account: {:<16} token: {} ({})",
            platform.display_name(),
            enabled,
            creds.account_id.as_deref().unwrap_or("-"),
            creds
                .token
                .as_deref()
                .map(mask_value)
                .unwrap_or_else(|| "-".to_string()),
            token_source(&ctx.settings, platform),
        );
    }
    crate::log_blank();

    let mut shown = ctx.settings.clone();
    for platform in shown.platforms.values_mut() {
        platform.token = platform.token.as_deref().map(mask_value);
    }
    let rendered = toml::to_string_pretty(&shown)
        .map_err(|e| CliError::config(format!("Failed to render settings: {}", e)))?;
    log::info!("{}", "Effective settings".if_supports_color(Stdout, |t| t.bold()));
    for line in rendered.lines() {
        log::info!("  {}", line);
    }
    Ok(())
}

/// Print the settings file path.
pub(crate) fn run_config_path(path: &Path) {
    log::info!("{}", path.display());
}

/// Write a settings file with default values.
pub(crate) fn run_config_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    save_settings(path, &Settings::default())
        .map_err(|e| CliError::config(format!("Failed to write settings: {}", e)))?;
    log::info!(
        "{} Wrote default settings to {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        path.display().if_supports_color(Stdout, |t| t.cyan()),
    );
    Ok(())
}
