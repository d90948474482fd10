//! Merging per-platform records into one unified entry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use playvault_catalog::{CanonicalGameId, UnifiedGameEntry};
use playvault_core::{InstallState, Platform, PlatformGameRecord};
use thiserror::Error;

use crate::identity::Resolution;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no source records for {0}")]
    NoSourceRecords(CanonicalGameId),
}

/// Records grouped by canonical id, one per platform.
pub type GroupedRecords = BTreeMap<CanonicalGameId, BTreeMap<Platform, PlatformGameRecord>>;

/// Group records by their resolved canonical id.
///
/// Records without an assignment are skipped. If two records end up on the
/// same `(id, platform)` the most recently fetched one wins.
pub fn group_records(records: &[PlatformGameRecord], resolution: &Resolution) -> GroupedRecords {
    let mut grouped: GroupedRecords = BTreeMap::new();
    for record in records {
        let key = record.key();
        let Some(id) = resolution.id_for(&key) else {
            log::warn!("{} has no canonical id; skipping", key);
            continue;
        };
        let slot = grouped.entry(id.clone()).or_default();
        match slot.get(&record.platform) {
            Some(existing)
                if (existing.fetched_at, &record.platform_game_id)
                    >= (record.fetched_at, &existing.platform_game_id) =>
            {
                if existing.platform_game_id != record.platform_game_id {
                    log::warn!(
                        "{} has two {} records ({} and {}); keeping {}",
                        id,
                        record.platform.short_name(),
                        existing.platform_game_id,
                        record.platform_game_id,
                        existing.platform_game_id
                    );
                }
            }
            _ => {
                slot.insert(record.platform, record.clone());
            }
        }
    }
    grouped
}

/// Merge with `now` as the update timestamp.
pub fn merge(
    canonical_id: &CanonicalGameId,
    records: &BTreeMap<Platform, PlatformGameRecord>,
    previous: Option<&UnifiedGameEntry>,
) -> Result<UnifiedGameEntry, MergeError> {
    merge_at(canonical_id, records, previous, Utc::now())
}

/// Build the unified entry for one canonical game.
///
/// Pure and deterministic given its inputs; `now` only lands in
/// `updated_at`. User flags (`is_pinned`, `preferred_platform`) and
/// `first_seen_at` carry over from `previous`. A new entry is first seen at
/// its earliest record fetch.
/// `stale_platforms` starts empty; the caller marks last-known-good records.
pub fn merge_at(
    canonical_id: &CanonicalGameId,
    records: &BTreeMap<Platform, PlatformGameRecord>,
    previous: Option<&UnifiedGameEntry>,
    now: DateTime<Utc>,
) -> Result<UnifiedGameEntry, MergeError> {
    let title_source = records
        .values()
        .max_by(|a, b| {
            a.fetched_at
                .cmp(&b.fetched_at)
                // Lower priority number wins a timestamp tie.
                .then_with(|| b.platform.title_priority().cmp(&a.platform.title_priority()))
        })
        .ok_or_else(|| MergeError::NoSourceRecords(canonical_id.clone()))?;

    let aggregate_playtime_minutes = records
        .values()
        .map(|r| r.total_playtime_minutes)
        .fold(0u64, u64::saturating_add);

    let most_recent_played_at = records.values().filter_map(|r| r.last_played_at).max();

    let total_installed_bytes = records
        .values()
        .filter(|r| r.install_state == InstallState::Installed)
        .map(|r| r.installed_bytes.unwrap_or(0))
        .fold(0u64, u64::saturating_add);

    let (is_pinned, preferred_platform, first_seen_at) = match previous {
        Some(prev) => (
            prev.is_pinned,
            prev.preferred_platform.filter(|p| records.contains_key(p)),
            prev.first_seen_at,
        ),
        None => (
            false,
            None,
            records
                .values()
                .map(|r| r.fetched_at)
                .min()
                .unwrap_or(title_source.fetched_at),
        ),
    };

    Ok(UnifiedGameEntry {
        canonical_id: canonical_id.clone(),
        display_title: title_source.title.clone(),
        source_records: records.clone(),
        aggregate_playtime_minutes,
        most_recent_played_at,
        total_installed_bytes,
        is_pinned,
        preferred_platform,
        stale_platforms: Default::default(),
        is_orphaned: false,
        missing_cycles: 0,
        first_seen_at,
        updated_at: now,
    })
}
