//! One reconciliation cycle, end to end.
//!
//! ```text
//! fetch (one task per platform, each with its own timeout)
//!   └─ join barrier ── cancellation point
//! resolve + merge (pure) ── apply diff (CAS; retried on StaleWrite)
//!   └─ storage plan (only when a budget is configured)
//! ```
//!
//! A failed, timed-out, panicked, or backing-off platform never aborts the
//! cycle. Its last committed records stand in, and the affected entries are
//! marked stale.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use playvault_catalog::{ChangeSet, ExecutionReport, TitleAlias, UnifiedGameEntry};
use playvault_core::{FetchError, Platform, PlatformGameRecord};
use playvault_db::KvStore;
use playvault_reconcile::{
    InstallLedger, InstallRequest, LibrarySnapshot, LibraryStore, MatchConfig, PlanError,
    ReconcileError, ResolveWarning, StoragePlan, StoragePolicy, StoreError, build_diff,
    dedupe_records, plan,
};
use thiserror::Error;

use crate::adapter::{PlatformAdapter, PlatformCredentials};
use crate::backoff::{Backoff, BackoffPolicy};
use crate::cancel::CancelToken;
use crate::executor::{InstallExecutor, execute_plan};
use crate::progress::{SilentProgress, SyncProgress};
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Library changed during every attempt; gave up after {attempts} tries")]
    Contended { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub fetch_timeout: Duration,
    /// Extra attempts after a `StaleWrite` before giving up.
    pub stale_write_retries: u32,
    pub matching: MatchConfig,
    pub backoff: BackoffPolicy,
    /// Planning runs after each commit only when this is set.
    pub budget_bytes: Option<u64>,
    pub policy: StoragePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            stale_write_retries: 3,
            matching: MatchConfig::default(),
            backoff: BackoffPolicy::default(),
            budget_bytes: None,
            policy: StoragePolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            fetch_timeout: settings.sync.fetch_timeout(),
            stale_write_retries: settings.sync.stale_write_retries,
            matching: settings.matching.clone(),
            backoff: settings.sync.backoff_policy(),
            budget_bytes: settings.storage.budget_bytes,
            policy: settings.storage.policy.clone(),
        }
    }
}

/// How one platform contributed to a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformOutcome {
    Fresh { records: usize },
    /// Fetch failed; `stale_records` last-known-good records stood in.
    Failed {
        error: FetchError,
        stale_records: usize,
    },
    /// Skipped while cooling down from earlier failures.
    BackingOff {
        retry_in: Duration,
        stale_records: usize,
    },
}

impl PlatformOutcome {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Self::Fresh { .. })
    }
}

impl fmt::Display for PlatformOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh { records } => write!(f, "{records} games"),
            Self::Failed {
                error,
                stale_records,
            } => write!(f, "{error} (using {stale_records} cached games)"),
            Self::BackingOff {
                retry_in,
                stale_records,
            } => write!(
                f,
                "backing off for {}s (using {stale_records} cached games)",
                retry_in.as_secs()
            ),
        }
    }
}

/// Everything one cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub outcomes: BTreeMap<Platform, PlatformOutcome>,
    pub changes: ChangeSet,
    pub warnings: Vec<ResolveWarning>,
    /// Commit attempts, 1 unless a concurrent write forced a retry.
    pub attempts: u32,
    /// `None` when no budget is configured. A planning error leaves the
    /// committed library untouched.
    pub plan: Option<Result<StoragePlan, SyncError>>,
}

impl CycleReport {
    pub fn stale_platforms(&self) -> BTreeSet<Platform> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_stale())
            .map(|(p, _)| *p)
            .collect()
    }

    pub fn is_partial(&self) -> bool {
        self.outcomes.values().any(PlatformOutcome::is_stale)
    }
}

struct PlatformSource {
    adapter: Arc<dyn PlatformAdapter>,
    credentials: PlatformCredentials,
}

enum Fetched {
    Records(Vec<PlatformGameRecord>),
    Failed(FetchError),
    BackingOff(Duration),
}

/// Drives sync cycles for one library.
pub struct Orchestrator<S: KvStore> {
    store: Arc<LibraryStore<S>>,
    sources: BTreeMap<Platform, PlatformSource>,
    aliases: Vec<TitleAlias>,
    config: OrchestratorConfig,
    backoff: Mutex<Backoff>,
    progress: Arc<dyn SyncProgress>,
}

impl<S: KvStore> Orchestrator<S> {
    pub fn new(store: Arc<LibraryStore<S>>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            sources: BTreeMap::new(),
            aliases: Vec::new(),
            backoff: Mutex::new(Backoff::new(config.backoff)),
            config,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Register an adapter. A later adapter for the same platform replaces
    /// the earlier one.
    pub fn with_source(
        mut self,
        adapter: Arc<dyn PlatformAdapter>,
        credentials: PlatformCredentials,
    ) -> Self {
        self.sources.insert(
            adapter.platform(),
            PlatformSource {
                adapter,
                credentials,
            },
        );
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<TitleAlias>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &LibraryStore<S> {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.sources.keys().copied()
    }

    /// Run one full cycle. `requests` feed the storage planner.
    pub async fn run_cycle(
        &self,
        requests: &[InstallRequest],
        cancel: &CancelToken,
    ) -> Result<CycleReport, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.progress.on_phase("Fetching platform libraries");
        let fetched = self.fetch_all().await;

        if cancel.is_cancelled() {
            log::info!("Sync cancelled after fetch; nothing committed");
            return Err(SyncError::Cancelled);
        }

        self.progress.on_phase("Reconciling");
        let max_attempts = self.config.stale_write_retries.saturating_add(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let snapshot = self.store.snapshot()?;
            let (records, stale, outcomes) = assemble(&snapshot, &fetched);
            let planned = build_diff(
                &snapshot,
                &records,
                &stale,
                &self.aliases,
                &self.config.matching,
                Utc::now(),
            )?;
            for warning in &planned.resolution.warnings {
                log::warn!("{}", warning);
            }

            match self.store.commit_diff(planned.diff) {
                Ok((changes, committed)) => {
                    if attempts == 1 {
                        for (platform, outcome) in &outcomes {
                            self.progress.on_fetch_finished(*platform, outcome);
                        }
                    }
                    let plan = self.config.budget_bytes.map(|budget| {
                        self.plan_entries(&active_entries(&committed), budget, requests)
                    });
                    let report = CycleReport {
                        outcomes,
                        changes,
                        warnings: planned.resolution.warnings,
                        attempts,
                        plan,
                    };
                    self.progress.on_complete(&summary(&report));
                    return Ok(report);
                }
                Err(StoreError::StaleWrite { base, current }) if attempts < max_attempts => {
                    log::warn!(
                        "Library moved from version {} to {} during sync; retrying",
                        base,
                        current
                    );
                }
                Err(StoreError::StaleWrite { .. }) => {
                    return Err(SyncError::Contended { attempts });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run cycles every `interval` until cancelled. Cancelling during the
    /// wait ends it immediately.
    pub async fn run_periodic(
        &self,
        interval: Duration,
        cancel: &CancelToken,
        mut on_cycle: impl FnMut(Result<CycleReport, SyncError>),
    ) {
        while !cancel.is_cancelled() {
            match self.run_cycle(&[], cancel).await {
                Err(SyncError::Cancelled) => break,
                other => on_cycle(other),
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }

    /// Plan storage against the committed library.
    pub fn plan_storage(
        &self,
        budget_bytes: u64,
        requests: &[InstallRequest],
    ) -> Result<StoragePlan, SyncError> {
        let snapshot = self.store.snapshot()?;
        self.plan_entries(&active_entries(&snapshot), budget_bytes, requests)
    }

    /// Execute a plan and persist the reports for later cycles' ledgers.
    ///
    /// Reports are saved even when some items failed; a store error is
    /// returned only after every item has run.
    pub async fn execute(
        &self,
        storage_plan: &StoragePlan,
        executor: &dyn InstallExecutor,
        cancel: &CancelToken,
    ) -> Result<Vec<ExecutionReport>, SyncError> {
        let reports = execute_plan(executor, storage_plan, cancel).await;
        self.store.append_reports(&reports)?;
        Ok(reports)
    }

    fn plan_entries(
        &self,
        entries: &[UnifiedGameEntry],
        budget_bytes: u64,
        requests: &[InstallRequest],
    ) -> Result<StoragePlan, SyncError> {
        let reports = self.store.pending_reports()?;
        let ledger = InstallLedger::from_entries_with_reports(entries, &reports);

        // Drop reports the platforms have caught up with.
        let fetched: BTreeMap<_, _> = entries
            .iter()
            .flat_map(|e| {
                e.source_records
                    .values()
                    .map(move |r| ((e.canonical_id.clone(), r.platform), r.fetched_at))
            })
            .collect();
        self.store.prune_reports(|r| {
            fetched
                .get(&(r.canonical_id.clone(), r.platform))
                .is_none_or(|at| r.reported_at > *at)
        })?;

        Ok(plan(
            entries,
            &ledger,
            budget_bytes,
            &self.config.policy,
            requests,
        )?)
    }

    async fn fetch_all(&self) -> BTreeMap<Platform, Fetched> {
        let mut results = BTreeMap::new();
        let mut platforms = Vec::new();
        let mut tasks = Vec::new();

        let now = Instant::now();
        for (platform, source) in &self.sources {
            let platform = *platform;
            if let Some(left) = lock(&self.backoff).remaining(platform, now) {
                log::info!(
                    "{}: backing off for another {}s",
                    platform.short_name(),
                    left.as_secs()
                );
                results.insert(platform, Fetched::BackingOff(left));
                continue;
            }

            self.progress.on_fetch_started(platform);
            let adapter = Arc::clone(&source.adapter);
            let credentials = source.credentials.clone();
            let timeout = self.config.fetch_timeout;
            platforms.push(platform);
            tasks.push(tokio::spawn(async move {
                match tokio::time::timeout(timeout, adapter.fetch_library(&credentials)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::network(
                        platform,
                        format!("timed out after {}s", timeout.as_secs()),
                    )),
                }
            }));
        }

        // Barrier: nothing merges until every fetch has settled.
        let joined = join_all(tasks).await;

        let mut backoff = lock(&self.backoff);
        for (platform, joined) in platforms.into_iter().zip(joined) {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => {
                    log::debug!("{} fetch task panicked: {}", platform, join_err);
                    Err(FetchError::network(platform, "fetch task panicked"))
                }
            };
            let fetched = match result {
                Ok(records) => {
                    backoff.record_success(platform);
                    let (own, foreign): (Vec<_>, Vec<_>) =
                        records.into_iter().partition(|r| r.platform == platform);
                    if !foreign.is_empty() {
                        log::warn!(
                            "{} adapter returned {} records for other platforms; ignored",
                            platform.short_name(),
                            foreign.len()
                        );
                    }
                    Fetched::Records(own)
                }
                Err(err) => {
                    log::warn!("{}: {}", platform.short_name(), err);
                    backoff.record_failure(&err, Instant::now());
                    Fetched::Failed(err)
                }
            };
            results.insert(platform, fetched);
        }
        results
    }
}

/// Combine fresh records with last-known-good stand-ins for failed platforms.
fn assemble(
    snapshot: &LibrarySnapshot,
    fetched: &BTreeMap<Platform, Fetched>,
) -> (
    Vec<PlatformGameRecord>,
    BTreeSet<Platform>,
    BTreeMap<Platform, PlatformOutcome>,
) {
    let mut records = Vec::new();
    let mut stale = BTreeSet::new();
    let mut outcomes = BTreeMap::new();

    for (platform, result) in fetched {
        let platform = *platform;
        let outcome = match result {
            Fetched::Records(fresh) => {
                records.extend(fresh.iter().cloned());
                PlatformOutcome::Fresh {
                    records: fresh.len(),
                }
            }
            Fetched::Failed(error) => {
                let lkg = snapshot.last_known_records(platform);
                let stale_records = lkg.len();
                records.extend(lkg);
                stale.insert(platform);
                PlatformOutcome::Failed {
                    error: error.clone(),
                    stale_records,
                }
            }
            Fetched::BackingOff(retry_in) => {
                let lkg = snapshot.last_known_records(platform);
                let stale_records = lkg.len();
                records.extend(lkg);
                stale.insert(platform);
                PlatformOutcome::BackingOff {
                    retry_in: *retry_in,
                    stale_records,
                }
            }
        };
        outcomes.insert(platform, outcome);
    }

    (dedupe_records(records), stale, outcomes)
}

/// Everything not orphaned, including entries missing for fewer cycles than
/// the debounce. Their copies are still on disk.
fn active_entries(snapshot: &LibrarySnapshot) -> Vec<UnifiedGameEntry> {
    snapshot.active().cloned().collect()
}

fn summary(report: &CycleReport) -> String {
    let c = &report.changes;
    format!(
        "Sync complete: {} added, {} updated, {} orphaned, {} unchanged (version {})",
        c.added.len(),
        c.updated.len(),
        c.orphaned.len(),
        c.unchanged,
        c.version
    )
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
