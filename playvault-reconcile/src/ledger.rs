//! Which copies are on disk right now.

use std::collections::BTreeMap;

use playvault_catalog::{CanonicalGameId, ExecutionOutcome, ExecutionReport, UnifiedGameEntry};
use playvault_core::Platform;

pub type CopyKey = (CanonicalGameId, Platform);

/// Installed and in-flight copies, keyed by `(canonical_id, platform)`.
///
/// Built from platform-reported install state, then corrected with executor
/// reports that are newer than the platform's own data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallLedger {
    installed: BTreeMap<CopyKey, u64>,
    installing: BTreeMap<CopyKey, u64>,
}

impl InstallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a UnifiedGameEntry>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            for (platform, bytes) in entry.installed_copies() {
                ledger
                    .installed
                    .insert((entry.canonical_id.clone(), platform), bytes);
            }
            for (platform, bytes) in entry.installing_copies() {
                ledger
                    .installing
                    .insert((entry.canonical_id.clone(), platform), bytes);
            }
        }
        ledger
    }

    /// Like [`from_entries`](Self::from_entries), then overlay each report
    /// that postdates the matching record's `fetched_at`.
    pub fn from_entries_with_reports<'a>(
        entries: impl IntoIterator<Item = &'a UnifiedGameEntry> + Clone,
        reports: &[ExecutionReport],
    ) -> Self {
        let mut ledger = Self::from_entries(entries.clone());
        let by_id: BTreeMap<&CanonicalGameId, &UnifiedGameEntry> =
            entries.into_iter().map(|e| (&e.canonical_id, e)).collect();

        for report in reports {
            let fetched_at = by_id
                .get(&report.canonical_id)
                .and_then(|e| e.source_records.get(&report.platform))
                .map(|r| r.fetched_at);
            if fetched_at.is_some_and(|f| report.reported_at <= f) {
                continue;
            }
            ledger.apply_report(report);
        }
        ledger
    }

    /// Apply one executor report. Failed reports change nothing.
    pub fn apply_report(&mut self, report: &ExecutionReport) {
        if report.outcome == ExecutionOutcome::Failure {
            return;
        }
        let key = (report.canonical_id.clone(), report.platform);
        self.installing.remove(&key);
        let current = self.installed.get(&key).copied().unwrap_or(0) as i64;
        let next = current.saturating_add(report.bytes_delta);
        if next <= 0 {
            self.installed.remove(&key);
        } else {
            self.installed.insert(key, next as u64);
        }
    }

    pub fn set_installed(&mut self, id: CanonicalGameId, platform: Platform, bytes: u64) {
        self.installing.remove(&(id.clone(), platform));
        self.installed.insert((id, platform), bytes);
    }

    pub fn set_installing(&mut self, id: CanonicalGameId, platform: Platform, bytes: u64) {
        self.installing.insert((id, platform), bytes);
    }

    pub fn is_installed(&self, id: &CanonicalGameId, platform: Platform) -> bool {
        self.installed.contains_key(&(id.clone(), platform))
    }

    pub fn is_installing(&self, id: &CanonicalGameId, platform: Platform) -> bool {
        self.installing.contains_key(&(id.clone(), platform))
    }

    pub fn installed(&self) -> impl Iterator<Item = (&CopyKey, u64)> {
        self.installed.iter().map(|(k, v)| (k, *v))
    }

    pub fn installing(&self) -> impl Iterator<Item = (&CopyKey, u64)> {
        self.installing.iter().map(|(k, v)| (k, *v))
    }

    pub fn installed_bytes(&self) -> u64 {
        self.installed.values().fold(0u64, |a, b| a.saturating_add(*b))
    }

    pub fn installing_bytes(&self) -> u64 {
        self.installing.values().fold(0u64, |a, b| a.saturating_add(*b))
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.installing.is_empty()
    }
}
