pub(crate) mod config;
pub(crate) mod library;
pub(crate) mod plan;
pub(crate) mod prefs;
pub(crate) mod sync;

use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use playvault_catalog::{StoragePlanItem, UnifiedGameEntry};
use playvault_core::util::format_bytes;
use playvault_db::SqliteStore;
use playvault_lib::{Settings, load_settings, settings_path};
use playvault_reconcile::{LibraryStore, StoragePlan};

use crate::CliError;
use crate::cli_types::Cli;

const IN_MEMORY_DB: &str = ":memory:";

/// Settings and paths every command starts from.
pub(crate) struct Context {
    pub settings_path: PathBuf,
    pub settings: Settings,
    pub db_path: PathBuf,
    pub quiet: bool,
    pub verbose: bool,
}

impl Context {
    pub fn load(cli: &Cli) -> Result<Self, CliError> {
        let settings_path = cli.settings.clone().unwrap_or_else(settings_path);
        let settings = load_settings(&settings_path).map_err(|e| CliError::config(e.to_string()))?;
        let db_path = cli.db.clone().unwrap_or_else(|| settings.db_path());
        Ok(Self {
            settings_path,
            settings,
            db_path,
            quiet: cli.quiet,
            verbose: cli.verbose,
        })
    }

    /// Open the library. `--db :memory:` gives a throwaway in-memory database.
    pub fn open_store(&self) -> Result<LibraryStore<SqliteStore>, CliError> {
        let kv = if self.db_path == Path::new(IN_MEMORY_DB) {
            SqliteStore::open_memory()
        } else {
            SqliteStore::open(&self.db_path)
        }
        .map_err(|e| {
            CliError::database(format!(
                "Failed to open library database {}: {}",
                self.db_path.display(),
                e
            ))
        })?;
        Ok(LibraryStore::new(kv, &self.settings.library.id)
            .with_orphan_after(self.settings.library.orphan_after_cycles))
    }
}

/// Comma-separated short names of the platforms an entry is owned on, with
/// stale ones marked.
pub(crate) fn platform_list(entry: &UnifiedGameEntry) -> String {
    entry
        .platforms()
        .map(|p| {
            if entry.stale_platforms.contains(&p) {
                format!("{}*", p.short_name())
            } else {
                p.short_name().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn print_plan(plan: &StoragePlan) {
    log::info!(
        "{}",
        "Storage Plan".if_supports_color(Stdout, |t| t.bold())
    );
    log::info!(
        "  Budget: {}  Used: {}  Projected: {}",
        format_bytes(plan.limit_bytes),
        format_bytes(plan.used_bytes),
        format_bytes(plan.projected_bytes),
    );
    crate::log_blank();

    let mut any = false;
    for item in plan.evictions() {
        any = true;
        print_item(item, "EVICT  ".if_supports_color(Stdout, |t| t.red()).to_string());
    }
    for item in plan.installs() {
        any = true;
        print_item(item, "INSTALL".if_supports_color(Stdout, |t| t.green()).to_string());
    }
    if !any {
        log::info!("  Nothing to do; usage is within budget.");
    }
    for item in plan.keeps() {
        log::debug!(
            "  KEEP    {} on {} ({}): {}",
            item.canonical_id,
            item.platform.short_name(),
            format_bytes(item.bytes),
            item.reason
        );
    }
    for warning in &plan.warnings {
        log::warn!("{}", warning);
    }
}

fn print_item(item: &StoragePlanItem, label: String) {
    log::info!(
        "  {} {} on {} ({}): {}",
        label,
        item.canonical_id.if_supports_color(Stdout, |t| t.bold()),
        item.platform.short_name(),
        format_bytes(item.bytes),
        item.reason.if_supports_color(Stdout, |t| t.dimmed()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(db_path: PathBuf) -> Context {
        Context {
            settings_path: PathBuf::from("settings.toml"),
            settings: Settings::default(),
            db_path,
            quiet: true,
            verbose: false,
        }
    }

    #[test]
    fn memory_db_needs_no_file() {
        let ctx = context(PathBuf::from(":memory:"));
        let store = ctx.open_store().unwrap();
        assert_eq!(store.snapshot().unwrap().version, 0);
        assert!(!Path::new(":memory:").exists());
    }
}
