//! Sync progress reporting.

use playvault_core::Platform;

use crate::orchestrator::PlatformOutcome;

/// Trait for receiving sync progress updates.
///
/// `on_fetch_finished` is reported once the fetch barrier has settled and
/// the cycle committed, in platform order.
pub trait SyncProgress: Send + Sync {
    /// Called when a platform fetch is spawned.
    fn on_fetch_started(&self, platform: Platform);

    /// Called when a platform fetch finishes, fails, times out, or is skipped.
    fn on_fetch_finished(&self, platform: Platform, outcome: &PlatformOutcome);

    /// Called when a phase starts (e.g., "Merging").
    fn on_phase(&self, message: &str);

    /// Called when the cycle is complete.
    fn on_complete(&self, message: &str);
}

/// A no-op progress reporter that discards all updates.
pub struct SilentProgress;

impl SyncProgress for SilentProgress {
    fn on_fetch_started(&self, _platform: Platform) {}
    fn on_fetch_finished(&self, _platform: Platform, _outcome: &PlatformOutcome) {}
    fn on_phase(&self, _message: &str) {}
    fn on_complete(&self, _message: &str) {}
}

/// A progress reporter that logs to the `log` crate.
pub struct LogProgress;

impl SyncProgress for LogProgress {
    fn on_fetch_started(&self, platform: Platform) {
        log::debug!("Fetching {}", platform.display_name());
    }

    fn on_fetch_finished(&self, platform: Platform, outcome: &PlatformOutcome) {
        match outcome {
            PlatformOutcome::Fresh { records } => {
                log::info!("  {}: {} games", platform.display_name(), records)
            }
            other => log::warn!("  {}: {}", platform.display_name(), other),
        }
    }

    fn on_phase(&self, message: &str) {
        log::info!("{}", message);
    }

    fn on_complete(&self, message: &str) {
        log::info!("{}", message);
    }
}
