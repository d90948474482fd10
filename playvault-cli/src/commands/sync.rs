use std::path::PathBuf;
use std::sync::Arc;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use playvault_catalog::{ExecutionOutcome, load_aliases};
use playvault_core::Platform;
use playvault_lib::{
    CancelToken, CycleReport, DryRunExecutor, LogProgress, Orchestrator, OrchestratorConfig,
    SnapshotFileAdapter, SyncError, SyncProgress, discover_snapshots,
};
use playvault_reconcile::InstallRequest;

use super::{Context, print_plan};
use crate::CliError;
use crate::spinner::SpinnerProgress;

pub(crate) fn run_sync(
    ctx: &Context,
    snapshots: Option<PathBuf>,
    requests: &[InstallRequest],
    execute: bool,
) -> Result<(), CliError> {
    let dir = snapshots
        .or_else(|| ctx.settings.sync.snapshot_dir.clone())
        .ok_or_else(|| {
            CliError::config("No snapshot directory. Pass --snapshots or set [sync].snapshot_dir.")
        })?;
    if !dir.is_dir() {
        return Err(CliError::config(format!(
            "Snapshot directory {} does not exist",
            dir.display()
        )));
    }

    let aliases_dir = ctx.settings.aliases_dir();
    let aliases = load_aliases(&aliases_dir).map_err(|e| {
        CliError::config(format!(
            "Failed to load aliases from {}: {}",
            aliases_dir.display(),
            e
        ))
    })?;
    log::debug!("Loaded {} title aliases", aliases.len());

    let store = Arc::new(ctx.open_store()?);
    let committed = store
        .snapshot()
        .map_err(|e| CliError::database(format!("Failed to read library: {}", e)))?;

    // Spinners would interleave with timestamped debug lines.
    let spinners = (!ctx.verbose).then(|| Arc::new(SpinnerProgress::new(ctx.quiet)));
    let progress: Arc<dyn SyncProgress> = match &spinners {
        Some(spinners) => Arc::clone(spinners) as Arc<dyn SyncProgress>,
        None => Arc::new(LogProgress),
    };
    let mut orchestrator = Orchestrator::new(
        Arc::clone(&store),
        OrchestratorConfig::from_settings(&ctx.settings),
    )
    .with_aliases(aliases)
    .with_progress(progress);

    // A platform with a file is fetched. One without a file that still has
    // games in the library is fetched too, so the missing file counts as a
    // failure and its games are kept as stale rather than dropped.
    let present = discover_snapshots(&dir);
    for &platform in Platform::all() {
        if !ctx.settings.is_enabled(platform) {
            log::debug!("{} is disabled in settings", platform.display_name());
            continue;
        }
        let known = !committed.last_known_records(platform).is_empty();
        if !present.contains(&platform) && !known {
            continue;
        }
        orchestrator = orchestrator.with_source(
            Arc::new(SnapshotFileAdapter::new(platform, &dir)),
            ctx.settings.credentials(platform),
        );
    }
    if orchestrator.platforms().next().is_none() {
        log::warn!("No platform snapshots found in {}", dir.display());
        return Ok(());
    }
    if !requests.is_empty() && orchestrator.config().budget_bytes.is_none() {
        log::warn!("Install requests ignored: no [storage].budget_bytes configured");
    }

    log::info!(
        "Syncing from {}",
        dir.display().if_supports_color(Stdout, |t| t.cyan())
    );

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime(format!("Failed to create async runtime: {}", e)))?;

    rt.block_on(async {
        let cancel = CancelToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted; stopping before the next step");
                    cancel.cancel();
                }
            })
        };

        let result = sync_once(&orchestrator, requests, execute, &cancel).await;
        if let Some(spinners) = &spinners {
            spinners.clear_all();
        }
        watcher.abort();
        result
    })
}

async fn sync_once(
    orchestrator: &Orchestrator<playvault_db::SqliteStore>,
    requests: &[InstallRequest],
    execute: bool,
    cancel: &CancelToken,
) -> Result<(), CliError> {
    let report = match orchestrator.run_cycle(requests, cancel).await {
        Ok(report) => report,
        Err(SyncError::Cancelled) => {
            log::warn!("Sync cancelled; the library was not changed");
            return Ok(());
        }
        Err(e) => return Err(CliError::sync(e.to_string())),
    };

    print_changes(&report, orchestrator.store().orphan_after_cycles());

    let plan = match report.plan {
        None => {
            if execute {
                log::warn!("Nothing to execute: no [storage].budget_bytes configured");
            }
            return Ok(());
        }
        Some(Err(e)) => {
            return Err(CliError::plan(format!(
                "library committed, but planning failed: {}",
                e
            )));
        }
        Some(Ok(plan)) => plan,
    };

    crate::log_blank();
    print_plan(&plan);

    if execute {
        crate::log_blank();
        let reports = orchestrator
            .execute(&plan, &DryRunExecutor, cancel)
            .await
            .map_err(|e| CliError::database(format!("Failed to save execution reports: {}", e)))?;
        let failed = reports
            .iter()
            .filter(|r| r.outcome == ExecutionOutcome::Failure)
            .count();
        log::info!(
            "Executed {} of {} actions{}",
            reports.len() - failed,
            plan.evictions().count() + plan.installs().count(),
            if failed > 0 {
                format!(", {} failed", failed)
            } else {
                String::new()
            }
        );
        if cancel.is_cancelled() {
            log::warn!("Execution stopped early");
        }
    }
    Ok(())
}

fn print_changes(report: &CycleReport, orphan_after: u32) {
    let changes = &report.changes;
    for id in &changes.added {
        log::info!("  {} {}", "+".if_supports_color(Stdout, |t| t.green()), id);
    }
    for id in &changes.revived {
        log::info!("  {} {} (back)", "+".if_supports_color(Stdout, |t| t.green()), id);
    }
    for id in &changes.updated {
        log::debug!("  ~ {}", id);
    }
    for (id, misses) in &changes.pending {
        log::info!(
            "  {} {} missing ({} of {} syncs)",
            "?".if_supports_color(Stdout, |t| t.yellow()),
            id,
            misses,
            orphan_after,
        );
    }
    for id in &changes.orphaned {
        log::warn!("  {} {} orphaned", "-".if_supports_color(Stdout, |t| t.red()), id);
    }
    if report.attempts > 1 {
        log::info!("Committed after {} attempts", report.attempts);
    }
    if report.is_partial() {
        let stale: Vec<&str> = report
            .stale_platforms()
            .into_iter()
            .map(|p| p.short_name())
            .collect();
        log::warn!(
            "Partial sync: cached data used for {}",
            stale.join(", ")
        );
    }
}
