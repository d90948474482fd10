use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use playvault_catalog::{CanonicalGameId, UnifiedGameEntry};
use playvault_core::Platform;
use playvault_core::util::{format_bytes, format_playtime};
use playvault_reconcile::duplicate_report;

use super::{Context, platform_list};
use crate::CliError;

pub(crate) fn run_list(
    ctx: &Context,
    platform: Option<Platform>,
    orphaned: bool,
    stale: bool,
) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let snapshot = store
        .snapshot()
        .map_err(|e| CliError::database(format!("Failed to read library: {}", e)))?;

    let entries: Vec<&UnifiedGameEntry> = snapshot
        .entries
        .values()
        .filter(|e| e.is_orphaned == orphaned)
        .filter(|e| platform.is_none_or(|p| e.owned_on(p)))
        .filter(|e| !stale || e.is_stale())
        .collect();

    if entries.is_empty() {
        if snapshot.entries.is_empty() {
            log::info!("Library is empty. Run 'playvault sync' to populate it.");
        } else {
            log::info!("No matching games.");
        }
        return Ok(());
    }

    for entry in &entries {
        let mut flags = String::new();
        if entry.is_pinned {
            flags.push_str(" [pinned]");
        }
        if entry.missing_cycles > 0 && !entry.is_orphaned {
            flags.push_str(&format!(" [missing {}x]", entry.missing_cycles));
        }
        log::info!(
            "  {:<32} {:<40} {:<24} {:>9} {:>9}{}",
            entry.canonical_id.if_supports_color(Stdout, |t| t.bold()),
            entry.display_title,
            platform_list(entry).if_supports_color(Stdout, |t| t.cyan()),
            format_playtime(entry.aggregate_playtime_minutes),
            if entry.total_installed_bytes > 0 {
                format_bytes(entry.total_installed_bytes)
            } else {
                "-".to_string()
            },
            flags.if_supports_color(Stdout, |t| t.yellow()),
        );
    }
    crate::log_blank();
    log::info!(
        "{} games (library version {})",
        entries.len(),
        snapshot.version
    );
    if entries.iter().any(|e| e.is_stale()) {
        log::info!(
            "{}",
            "* platform data carried over from a failed fetch".if_supports_color(Stdout, |t| t.dimmed())
        );
    }
    Ok(())
}

pub(crate) fn run_show(ctx: &Context, id: &str) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let snapshot = store
        .snapshot()
        .map_err(|e| CliError::database(format!("Failed to read library: {}", e)))?;
    let entry = snapshot
        .get(&CanonicalGameId::new(id))
        .ok_or_else(|| CliError::unknown_game(id))?;

    log::info!(
        "{} ({})",
        entry.display_title.if_supports_color(Stdout, |t| t.bold()),
        entry.canonical_id,
    );
    log::info!("  Playtime:       {}", format_playtime(entry.aggregate_playtime_minutes));
    log::info!(
        "  Last played:    {}",
        entry
            .most_recent_played_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    log::info!("  Installed:      {}", format_bytes(entry.total_installed_bytes));
    log::info!("  Pinned:         {}", if entry.is_pinned { "yes" } else { "no" });
    log::info!(
        "  Preferred:      {}",
        entry
            .preferred_platform
            .map(|p| p.display_name().to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    log::info!("  First seen:     {}", entry.first_seen_at.format("%Y-%m-%d"));
    if entry.is_orphaned {
        log::info!(
            "  {}",
            "Orphaned: no platform reports this game anymore".if_supports_color(Stdout, |t| t.red())
        );
    } else if entry.missing_cycles > 0 {
        log::info!(
            "  {}",
            format!("Missing from the last {} syncs", entry.missing_cycles)
                .if_supports_color(Stdout, |t| t.yellow())
        );
    }
    crate::log_blank();

    for record in entry.source_records.values() {
        let stale = if entry.stale_platforms.contains(&record.platform) {
            " (stale)"
        } else {
            ""
        };
        log::info!(
            "  {}{}",
            record.platform.display_name().if_supports_color(Stdout, |t| t.cyan()),
            stale.if_supports_color(Stdout, |t| t.yellow()),
        );
        log::info!("    Id:       {}", record.platform_game_id);
        log::info!("    Title:    {}", record.title);
        log::info!("    State:    {:?}", record.install_state);
        if record.installed_size() > 0 {
            log::info!("    Size:     {}", format_bytes(record.installed_size()));
        }
        log::info!("    Playtime: {}", format_playtime(record.total_playtime_minutes));
        if !record.owned_content.is_empty() {
            log::info!("    Add-ons:  {}", record.owned_content.len());
        }
        log::info!("    Fetched:  {}", record.fetched_at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

pub(crate) fn run_duplicates(ctx: &Context, similarity: f64) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let snapshot = store
        .snapshot()
        .map_err(|e| CliError::database(format!("Failed to read library: {}", e)))?;
    let report = duplicate_report(snapshot.entries.values(), similarity);

    log::info!(
        "{}",
        "Owned on several platforms".if_supports_color(Stdout, |t| t.bold())
    );
    if report.multi_platform.is_empty() {
        log::info!("  none");
    }
    for entry in &report.multi_platform {
        log::info!(
            "  {:<32} {:<40} {}",
            entry.canonical_id,
            entry.display_title,
            platform_list(entry).if_supports_color(Stdout, |t| t.cyan()),
        );
    }
    crate::log_blank();

    log::info!(
        "{}",
        "Similar titles kept apart".if_supports_color(Stdout, |t| t.bold())
    );
    if report.near_misses.is_empty() {
        log::info!("  none");
    }
    for miss in &report.near_misses {
        log::info!(
            "  {:.2}  {} [{}]  <->  {} [{}]",
            miss.score,
            miss.first.display_title,
            platform_list(miss.first),
            miss.second.display_title,
            platform_list(miss.second),
        );
    }
    if !report.near_misses.is_empty() {
        log::info!(
            "{}",
            "Add an alias file entry to merge any of these.".if_supports_color(Stdout, |t| t.dimmed())
        );
    }
    Ok(())
}
