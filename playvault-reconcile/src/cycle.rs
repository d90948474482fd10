//! The pure half of a reconciliation cycle: records in, diff out.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use playvault_catalog::TitleAlias;
use playvault_core::{Platform, PlatformGameRecord, RecordKey};
use thiserror::Error;

use crate::identity::{MatchConfig, Resolution, ResolveError, resolve};
use crate::merge::{MergeError, group_records, merge_at};
use crate::store::{LibraryDiff, LibrarySnapshot};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// A diff ready to apply, plus how identities were decided.
#[derive(Debug, Clone)]
pub struct PlannedDiff {
    pub diff: LibraryDiff,
    pub resolution: Resolution,
}

/// Keep only the latest-fetched record per [`RecordKey`], normalizing any
/// record whose adapter left `normalized_title` blank.
pub fn dedupe_records(records: Vec<PlatformGameRecord>) -> Vec<PlatformGameRecord> {
    let mut latest: BTreeMap<RecordKey, PlatformGameRecord> = BTreeMap::new();
    for mut record in records {
        record.ensure_normalized();
        let key = record.key();
        match latest.get(&key) {
            Some(existing) if existing.fetched_at >= record.fetched_at => {}
            _ => {
                latest.insert(key, record);
            }
        }
    }
    latest.into_values().collect()
}

/// Resolve and merge `records` against `snapshot`.
///
/// `stale` names platforms whose records are last-known-good stand-ins;
/// every merged entry owning one of them gets it in `stale_platforms`.
pub fn build_diff(
    snapshot: &LibrarySnapshot,
    records: &[PlatformGameRecord],
    stale: &BTreeSet<Platform>,
    aliases: &[TitleAlias],
    config: &MatchConfig,
    now: DateTime<Utc>,
) -> Result<PlannedDiff, ReconcileError> {
    let resolution = resolve(records, &snapshot.index, aliases, config)?;
    let grouped = group_records(records, &resolution);

    let mut entries = Vec::with_capacity(grouped.len());
    for (id, by_platform) in &grouped {
        let mut entry = merge_at(id, by_platform, snapshot.get(id), now)?;
        entry.stale_platforms = entry
            .platforms()
            .filter(|p| stale.contains(p))
            .collect();
        entries.push(entry);
    }

    Ok(PlannedDiff {
        diff: LibraryDiff {
            base_version: snapshot.version,
            entries,
            index: resolution.index.clone(),
        },
        resolution,
    })
}
