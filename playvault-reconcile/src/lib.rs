//! Reconciliation logic for the unified game library.
//!
//! This crate owns the pure decision-making: resolving platform records to
//! canonical ids, merging them into unified entries, persisting the library
//! with optimistic concurrency, and planning storage under a disk budget.
//! Fetching from platforms and executing plans live in `playvault-lib`.

pub mod cycle;
pub mod identity;
pub mod ledger;
pub mod merge;
pub mod planner;
pub mod report;
pub mod store;

pub use cycle::{PlannedDiff, ReconcileError, build_diff, dedupe_records};
pub use identity::{
    Assignment, MatchConfig, MatchMethod, Resolution, ResolveError, ResolveWarning,
    ScoredCandidate, resolve,
};
pub use ledger::InstallLedger;
pub use merge::{GroupedRecords, MergeError, group_records, merge, merge_at};
pub use planner::{
    EvictionOrder, InstallRequest, PlanError, PlanWarning, StoragePlan, StoragePolicy,
    choose_install_platform, plan,
};
pub use report::{DuplicateReport, NearMiss, duplicate_report};
pub use store::{
    DEFAULT_ORPHAN_AFTER_CYCLES, LibraryDiff, LibrarySnapshot, LibraryStore, StoreError,
};
