//! Data model types for the unified library.
//!
//! These types represent the persistent library schema: canonical ids, the
//! merged per-game entry, the identity index, storage plan items, and the
//! change set produced by each reconciliation cycle.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use playvault_core::{InstallState, Platform, PlatformGameRecord, RecordKey};
use serde::{Deserialize, Serialize};

// ── Canonical Id ────────────────────────────────────────────────────────────

/// Stable identifier for one real-world game across all platforms.
///
/// Once assigned to a game it is never reassigned to a different one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalGameId(String);

impl CanonicalGameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalGameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CanonicalGameId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Identity Index ──────────────────────────────────────────────────────────

/// Everything the identity resolver has ever decided, persisted with the library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityIndex {
    /// Normalized title → canonical id. Titles are never removed.
    #[serde(default)]
    pub by_title: BTreeMap<String, CanonicalGameId>,
    /// Platform → platform game id → canonical id.
    #[serde(default)]
    pub by_record: BTreeMap<Platform, BTreeMap<String, CanonicalGameId>>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_for_title(&self, normalized_title: &str) -> Option<&CanonicalGameId> {
        self.by_title.get(normalized_title)
    }

    pub fn id_for_record(&self, key: &RecordKey) -> Option<&CanonicalGameId> {
        self.by_record
            .get(&key.platform)
            .and_then(|m| m.get(&key.platform_game_id))
    }

    pub fn insert_title(&mut self, normalized_title: impl Into<String>, id: CanonicalGameId) {
        self.by_title.entry(normalized_title.into()).or_insert(id);
    }

    pub fn insert_record(&mut self, key: &RecordKey, id: CanonicalGameId) {
        self.by_record
            .entry(key.platform)
            .or_default()
            .insert(key.platform_game_id.clone(), id);
    }
}

// ── Unified Entry ───────────────────────────────────────────────────────────

/// The merged view of one canonical game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedGameEntry {
    pub canonical_id: CanonicalGameId,
    pub display_title: String,
    /// Latest record per platform; never empty.
    pub source_records: BTreeMap<Platform, PlatformGameRecord>,
    pub aggregate_playtime_minutes: u64,
    pub most_recent_played_at: Option<DateTime<Utc>>,
    pub total_installed_bytes: u64,
    /// User flag: never auto-evict. Survives re-merge.
    #[serde(default)]
    pub is_pinned: bool,
    /// User-selected launch/install platform. Survives re-merge.
    #[serde(default)]
    pub preferred_platform: Option<Platform>,
    /// Platforms whose record came from the last-known-good snapshot.
    #[serde(default)]
    pub stale_platforms: BTreeSet<Platform>,
    /// Terminal marker for a game no platform reports anymore.
    #[serde(default)]
    pub is_orphaned: bool,
    /// Consecutive cycles this entry has been absent.
    #[serde(default)]
    pub missing_cycles: u32,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UnifiedGameEntry {
    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.source_records.keys().copied()
    }

    pub fn owned_on(&self, platform: Platform) -> bool {
        self.source_records.contains_key(&platform)
    }

    pub fn is_stale(&self) -> bool {
        !self.stale_platforms.is_empty()
    }

    /// Installed copies as `(platform, bytes)`.
    pub fn installed_copies(&self) -> impl Iterator<Item = (Platform, u64)> + '_ {
        self.source_records
            .iter()
            .filter(|(_, r)| r.install_state == InstallState::Installed)
            .map(|(p, r)| (*p, r.installed_bytes.unwrap_or(0)))
    }

    /// Copies currently being installed as `(platform, bytes)`.
    pub fn installing_copies(&self) -> impl Iterator<Item = (Platform, u64)> + '_ {
        self.source_records
            .iter()
            .filter(|(_, r)| r.install_state == InstallState::Installing)
            .map(|(p, r)| (*p, r.installed_bytes.unwrap_or(0)))
    }

    /// Compare merged content, ignoring `updated_at` and store bookkeeping
    /// (`missing_cycles`, `is_orphaned`).
    pub fn content_eq(&self, other: &Self) -> bool {
        self.canonical_id == other.canonical_id
            && self.display_title == other.display_title
            && self.source_records == other.source_records
            && self.aggregate_playtime_minutes == other.aggregate_playtime_minutes
            && self.most_recent_played_at == other.most_recent_played_at
            && self.total_installed_bytes == other.total_installed_bytes
            && self.is_pinned == other.is_pinned
            && self.preferred_platform == other.preferred_platform
            && self.stale_platforms == other.stale_platforms
            && self.first_seen_at == other.first_seen_at
    }
}

// ── Storage Plan ────────────────────────────────────────────────────────────

/// What the storage planner wants done with one installed or requested copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Keep,
    Install,
    Evict,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Install => "install",
            Self::Evict => "evict",
        }
    }
}

/// One action for one `(canonical_id, platform)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePlanItem {
    pub canonical_id: CanonicalGameId,
    pub platform: Platform,
    pub action: PlanAction,
    pub reason: String,
    /// Bytes freed (EVICT), consumed (INSTALL) or held (KEEP).
    pub bytes: u64,
}

// ── Execution Reports ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Success,
    Failure,
}

/// What an install executor reports back after acting on a plan item.
///
/// `bytes_delta` is positive for installs and negative for evictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub canonical_id: CanonicalGameId,
    pub platform: Platform,
    pub outcome: ExecutionOutcome,
    pub bytes_delta: i64,
    pub reported_at: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Change Set ──────────────────────────────────────────────────────────────

/// What one applied diff changed in the library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<CanonicalGameId>,
    pub updated: Vec<CanonicalGameId>,
    pub orphaned: Vec<CanonicalGameId>,
    /// Orphaned entries that were reported again.
    pub revived: Vec<CanonicalGameId>,
    /// Entries missing this cycle but not yet orphaned, with miss counts.
    pub pending: Vec<(CanonicalGameId, u32)>,
    pub unchanged: usize,
    /// Store version after the apply.
    pub version: u64,
}

impl ChangeSet {
    /// True if nothing was added, updated, orphaned, or revived.
    pub fn is_quiet(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.orphaned.is_empty()
            && self.revived.is_empty()
    }
}

// ── Aliases ─────────────────────────────────────────────────────────────────

/// A human-curated identity hint, loaded from YAML.
///
/// Records whose normalized title equals `alias` resolve to whatever id the
/// `canonical` title resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleAlias {
    pub alias: String,
    pub canonical: String,
    #[serde(default)]
    pub reason: Option<String>,
}
