//! Runtime side of playvault: platform adapters, settings, the install
//! executor interface, and the orchestrator that runs sync cycles.
//!
//! Shared by the CLI and any other frontend so a sync behaves the same
//! everywhere.

pub mod adapter;
pub mod backoff;
pub mod cancel;
pub mod executor;
pub mod orchestrator;
pub mod progress;
pub mod settings;

pub use adapter::{
    PlatformAdapter, PlatformCredentials, SnapshotFileAdapter, discover_snapshots, snapshot_path,
};
pub use backoff::{Backoff, BackoffPolicy};
pub use cancel::CancelToken;
pub use executor::{DryRunExecutor, InstallExecutor, execute_plan, success_report};
pub use orchestrator::{CycleReport, Orchestrator, OrchestratorConfig, PlatformOutcome, SyncError};
pub use progress::{LogProgress, SilentProgress, SyncProgress};
pub use settings::{
    LibrarySettings, PlatformSettings, Settings, SettingsError, StorageSettings, SyncSettings,
    default_db_path, load_settings, save_settings, settings_path,
};
