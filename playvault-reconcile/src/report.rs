//! Library reports that read entries without changing them.

use playvault_catalog::UnifiedGameEntry;
use playvault_core::{normalize_title, title_similarity};

/// Two entries with similar titles that were kept apart.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss<'a> {
    pub first: &'a UnifiedGameEntry,
    pub second: &'a UnifiedGameEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateReport<'a> {
    /// Games owned on more than one platform, by descending platform count.
    pub multi_platform: Vec<&'a UnifiedGameEntry>,
    /// Distinct entries whose titles score at or above the floor.
    pub near_misses: Vec<NearMiss<'a>>,
}

/// Find multi-platform games and likely missed merges among active entries.
pub fn duplicate_report<'a>(
    entries: impl IntoIterator<Item = &'a UnifiedGameEntry>,
    similarity_floor: f64,
) -> DuplicateReport<'a> {
    let active: Vec<&UnifiedGameEntry> = entries.into_iter().filter(|e| !e.is_orphaned).collect();

    let mut multi_platform: Vec<&UnifiedGameEntry> = active
        .iter()
        .copied()
        .filter(|e| e.source_records.len() > 1)
        .collect();
    multi_platform.sort_by(|a, b| {
        b.source_records
            .len()
            .cmp(&a.source_records.len())
            .then_with(|| a.canonical_id.cmp(&b.canonical_id))
    });

    let titles: Vec<String> = active.iter().map(|e| normalize_title(&e.display_title)).collect();
    let mut near_misses = Vec::new();
    for i in 0..active.len() {
        for j in (i + 1)..active.len() {
            let score = title_similarity(&titles[i], &titles[j]);
            if score >= similarity_floor {
                near_misses.push(NearMiss {
                    first: active[i],
                    second: active[j],
                    score,
                });
            }
        }
    }
    near_misses.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.first.canonical_id.cmp(&b.first.canonical_id))
    });

    DuplicateReport {
        multi_platform,
        near_misses,
    }
}
