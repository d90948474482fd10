//! The persisted unified library.
//!
//! The whole library (entries plus identity index) is one JSON document
//! under a single versioned key. Readers take a snapshot; writers hand back
//! a diff tagged with the snapshot's version and lose with `StaleWrite` if
//! anyone committed in between.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use playvault_catalog::{
    CanonicalGameId, ChangeSet, ExecutionReport, IdentityIndex, UnifiedGameEntry,
};
use playvault_core::{Platform, PlatformGameRecord};
use playvault_db::{KvError, KvStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cycles an entry may be absent from every platform before it is orphaned.
pub const DEFAULT_ORPHAN_AFTER_CYCLES: u32 = 3;

const KEY_PREFIX: &str = "library/";
const REPORTS_PREFIX: &str = "reports/";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stale write: diff based on version {base} but library is at version {current}")]
    StaleWrite { base: u64, current: u64 },
    #[error("no game with id '{0}'")]
    NotFound(CanonicalGameId),
    #[error("{id} is not owned on {platform}")]
    PlatformNotOwned {
        id: CanonicalGameId,
        platform: Platform,
    },
    #[error("Storage error: {0}")]
    Kv(#[from] KvError),
    #[error("Library document is corrupt: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Library lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryDocument {
    #[serde(default)]
    entries: BTreeMap<CanonicalGameId, UnifiedGameEntry>,
    #[serde(default)]
    index: IdentityIndex,
}

/// A consistent read of the library at one version.
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    /// 0 means the library has never been written.
    pub version: u64,
    pub entries: BTreeMap<CanonicalGameId, UnifiedGameEntry>,
    pub index: IdentityIndex,
}

impl LibrarySnapshot {
    pub fn get(&self, id: &CanonicalGameId) -> Option<&UnifiedGameEntry> {
        self.entries.get(id)
    }

    /// Entries still reported by some platform.
    pub fn active(&self) -> impl Iterator<Item = &UnifiedGameEntry> {
        self.entries.values().filter(|e| !e.is_orphaned)
    }

    /// The last committed records for `platform`, used as a stand-in when
    /// that platform's fetch fails.
    pub fn last_known_records(&self, platform: Platform) -> Vec<PlatformGameRecord> {
        self.active()
            .filter_map(|e| e.source_records.get(&platform).cloned())
            .collect()
    }

    /// Entries owned on `platform`.
    pub fn by_platform(&self, platform: Platform) -> impl Iterator<Item = &UnifiedGameEntry> {
        self.active().filter(move |e| e.owned_on(platform))
    }
}

/// The complete desired set of live entries, computed from one snapshot.
///
/// Entries absent from `entries` count as missing this cycle.
#[derive(Debug, Clone)]
pub struct LibraryDiff {
    pub base_version: u64,
    pub entries: Vec<UnifiedGameEntry>,
    pub index: IdentityIndex,
}

/// Versioned library persistence over any [`KvStore`].
pub struct LibraryStore<S: KvStore> {
    kv: S,
    key: String,
    /// One key per `(platform, canonical_id)` holding its outstanding reports.
    reports_prefix: String,
    orphan_after_cycles: u32,
    /// Serializes read-modify-write sequences within this process.
    write_lock: Mutex<()>,
}

impl<S: KvStore> LibraryStore<S> {
    pub fn new(kv: S, library_id: &str) -> Self {
        Self {
            kv,
            key: format!("{KEY_PREFIX}{library_id}"),
            reports_prefix: format!("{REPORTS_PREFIX}{library_id}/"),
            orphan_after_cycles: DEFAULT_ORPHAN_AFTER_CYCLES,
            write_lock: Mutex::new(()),
        }
    }

    /// Override the orphan debounce. Values below 1 are treated as 1.
    pub fn with_orphan_after(mut self, cycles: u32) -> Self {
        self.orphan_after_cycles = cycles.max(1);
        self
    }

    pub fn orphan_after_cycles(&self) -> u32 {
        self.orphan_after_cycles
    }

    pub fn snapshot(&self) -> Result<LibrarySnapshot, StoreError> {
        let (version, doc) = self.load()?;
        Ok(LibrarySnapshot {
            version,
            entries: doc.entries,
            index: doc.index,
        })
    }

    /// Commit a diff atomically.
    ///
    /// Entries in the diff are upserted. Committed entries missing from it
    /// have their miss counter bumped and become orphaned once it reaches the
    /// debounce threshold. An orphaned entry that reappears is revived.
    pub fn apply_diff(&self, diff: LibraryDiff) -> Result<ChangeSet, StoreError> {
        self.commit_diff(diff).map(|(changes, _)| changes)
    }

    /// [`apply_diff`](Self::apply_diff), also returning the library exactly
    /// as committed.
    pub fn commit_diff(
        &self,
        diff: LibraryDiff,
    ) -> Result<(ChangeSet, LibrarySnapshot), StoreError> {
        let _guard = self.lock()?;
        let (current, doc) = self.load()?;
        if diff.base_version != current {
            return Err(StoreError::StaleWrite {
                base: diff.base_version,
                current,
            });
        }

        let mut changes = ChangeSet::default();
        let mut next: BTreeMap<CanonicalGameId, UnifiedGameEntry> = BTreeMap::new();
        let mut seen: BTreeSet<CanonicalGameId> = BTreeSet::new();

        for mut entry in diff.entries {
            let id = entry.canonical_id.clone();
            if !seen.insert(id.clone()) {
                log::warn!("diff contains {} twice; keeping the later entry", id);
                changes.added.retain(|x| *x != id);
                changes.updated.retain(|x| *x != id);
                changes.revived.retain(|x| *x != id);
            }
            entry.is_orphaned = false;
            entry.missing_cycles = 0;

            match doc.entries.get(&id) {
                None => changes.added.push(id.clone()),
                Some(old) if old.is_orphaned => {
                    log::info!("{} reappeared; reviving", id);
                    changes.revived.push(id.clone());
                }
                Some(old) if !old.content_eq(&entry) => changes.updated.push(id.clone()),
                Some(old) => {
                    // Unchanged content keeps its original update stamp.
                    entry.updated_at = old.updated_at;
                }
            }
            next.insert(id, entry);
        }
        changes.unchanged =
            next.len() - changes.added.len() - changes.updated.len() - changes.revived.len();

        for (id, old) in doc.entries {
            if seen.contains(&id) {
                continue;
            }
            let mut entry = old;
            if !entry.is_orphaned {
                entry.missing_cycles = entry.missing_cycles.saturating_add(1);
                if entry.missing_cycles >= self.orphan_after_cycles {
                    log::info!(
                        "{} missing for {} cycles; marking orphaned",
                        id,
                        entry.missing_cycles
                    );
                    entry.is_orphaned = true;
                    changes.orphaned.push(id.clone());
                } else {
                    changes.pending.push((id.clone(), entry.missing_cycles));
                }
            }
            next.insert(id, entry);
        }

        let doc = LibraryDocument {
            entries: next,
            index: diff.index,
        };
        changes.version = self.commit(current, &doc)?;
        log::debug!(
            "library {} committed at version {} ({} added, {} updated, {} orphaned)",
            self.key,
            changes.version,
            changes.added.len(),
            changes.updated.len(),
            changes.orphaned.len()
        );
        let committed = LibrarySnapshot {
            version: changes.version,
            entries: doc.entries,
            index: doc.index,
        };
        Ok((changes, committed))
    }

    /// Set or clear the pin flag. Returns the new version.
    pub fn set_pinned(&self, id: &CanonicalGameId, pinned: bool) -> Result<u64, StoreError> {
        self.update_entry(id, |entry| {
            entry.is_pinned = pinned;
            Ok(())
        })
    }

    /// Set or clear the preferred platform. The platform must be owned.
    pub fn set_preferred_platform(
        &self,
        id: &CanonicalGameId,
        platform: Option<Platform>,
    ) -> Result<u64, StoreError> {
        self.update_entry(id, |entry| {
            if let Some(p) = platform.filter(|p| !entry.owned_on(*p)) {
                return Err(StoreError::PlatformNotOwned {
                    id: entry.canonical_id.clone(),
                    platform: p,
                });
            }
            entry.preferred_platform = platform;
            Ok(())
        })
    }

    /// Persist executor reports until the platforms catch up with them.
    pub fn append_reports(&self, reports: &[ExecutionReport]) -> Result<(), StoreError> {
        let mut by_copy: BTreeMap<String, Vec<ExecutionReport>> = BTreeMap::new();
        for report in reports {
            by_copy
                .entry(self.report_key(report))
                .or_default()
                .push(report.clone());
        }

        let _guard = self.lock()?;
        for (key, fresh) in by_copy {
            let mut stored: Vec<ExecutionReport> = match self.kv.get(&key)? {
                Some(v) => serde_json::from_slice(&v.value)?,
                None => Vec::new(),
            };
            stored.extend(fresh);
            self.kv.put(&key, &serde_json::to_vec(&stored)?)?;
        }
        Ok(())
    }

    /// Every outstanding executor report, oldest first.
    pub fn pending_reports(&self) -> Result<Vec<ExecutionReport>, StoreError> {
        let mut reports = Vec::new();
        for (_, v) in self.kv.scan_prefix(&self.reports_prefix)? {
            let stored: Vec<ExecutionReport> = serde_json::from_slice(&v.value)?;
            reports.extend(stored);
        }
        reports.sort_by(|a, b| a.reported_at.cmp(&b.reported_at));
        Ok(reports)
    }

    /// Drop reports for which `keep` returns false. Returns how many went.
    pub fn prune_reports(
        &self,
        keep: impl Fn(&ExecutionReport) -> bool,
    ) -> Result<usize, StoreError> {
        let _guard = self.lock()?;
        let mut dropped = 0;
        for (key, v) in self.kv.scan_prefix(&self.reports_prefix)? {
            let stored: Vec<ExecutionReport> = serde_json::from_slice(&v.value)?;
            let before = stored.len();
            let kept: Vec<ExecutionReport> = stored.into_iter().filter(|r| keep(r)).collect();
            if kept.len() != before {
                dropped += before - kept.len();
                self.kv.put(&key, &serde_json::to_vec(&kept)?)?;
            }
        }
        if dropped > 0 {
            log::debug!("dropped {} executor reports the platforms caught up with", dropped);
        }
        Ok(dropped)
    }

    fn report_key(&self, report: &ExecutionReport) -> String {
        format!(
            "{}{}/{}",
            self.reports_prefix,
            report.platform.short_name(),
            report.canonical_id
        )
    }

    fn update_entry(
        &self,
        id: &CanonicalGameId,
        f: impl FnOnce(&mut UnifiedGameEntry) -> Result<(), StoreError>,
    ) -> Result<u64, StoreError> {
        let _guard = self.lock()?;
        let (current, mut doc) = self.load()?;
        let entry = doc
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        f(entry)?;
        entry.updated_at = Utc::now();
        self.commit(current, &doc)
    }

    fn load(&self) -> Result<(u64, LibraryDocument), StoreError> {
        match self.kv.get(&self.key)? {
            None => Ok((0, LibraryDocument::default())),
            Some(v) => Ok((v.version, serde_json::from_slice(&v.value)?)),
        }
    }

    fn commit(&self, expected: u64, doc: &LibraryDocument) -> Result<u64, StoreError> {
        let bytes = serde_json::to_vec(doc)?;
        self.kv
            .compare_and_swap(&self.key, expected, &bytes)
            .map_err(|e| match e {
                KvError::VersionConflict {
                    expected, actual, ..
                } => StoreError::StaleWrite {
                    base: expected,
                    current: actual,
                },
                other => StoreError::Kv(other),
            })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock.lock().map_err(|_| StoreError::Poisoned)
    }
}
