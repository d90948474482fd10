//! Identity resolution: which platform records are the same game.
//!
//! Records are matched in a fixed order so the outcome never depends on the
//! order adapters returned them in:
//!
//! 1. a record key seen before keeps its canonical id,
//! 2. an exact normalized-title hit reuses that title's id,
//! 3. a curated alias routes the title to its canonical title's id,
//! 4. fuzzy token-set matching against every known title, accepted only
//!    above the threshold and only when no other game scores within the
//!    ambiguity gap of the winner,
//! 5. otherwise a new id is minted.
//!
//! A missed merge only produces a duplicate entry; a wrong merge corrupts
//! playtime aggregation for good. Every tie therefore resolves to "no match".

use std::collections::{BTreeMap, BTreeSet, HashSet};

use playvault_catalog::{CanonicalGameId, IdentityIndex, TitleAlias};
use playvault_core::{Platform, PlatformGameRecord, RecordKey, slugify, title_similarity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floating-point slack when comparing scores against the threshold and gap.
const SCORE_EPSILON: f64 = 1e-9;

/// Tunable fuzzy-matching thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// A fuzzy match must score strictly above this.
    pub threshold: f64,
    /// A runner-up within this distance of the best score makes the match ambiguous.
    pub ambiguity_gap: f64,
    /// Fail with [`ResolveError::AmbiguousMatch`] instead of warning.
    pub strict: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            ambiguity_gap: 0.05,
            strict: false,
        }
    }
}

/// One canonical game considered during fuzzy matching.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub canonical_id: CanonicalGameId,
    /// Best-scoring known title for this id.
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "ambiguous match for '{title}' ({record}): {} candidates scored within the ambiguity gap",
        candidates.len()
    )]
    AmbiguousMatch {
        record: RecordKey,
        title: String,
        candidates: Vec<ScoredCandidate>,
    },
}

/// Non-fatal findings surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveWarning {
    /// Fuzzy match refused because two games scored too close together.
    AmbiguousMatch {
        record: RecordKey,
        title: String,
        candidates: Vec<ScoredCandidate>,
    },
    /// The matching game already has a different record from the same
    /// platform, so this record was treated as a different game.
    SamePlatformCollision {
        record: RecordKey,
        title: String,
        existing: CanonicalGameId,
    },
}

impl std::fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmbiguousMatch {
                record,
                title,
                candidates,
            } => {
                let names: Vec<String> = candidates
                    .iter()
                    .map(|c| format!("{} ({:.2})", c.canonical_id, c.score))
                    .collect();
                write!(
                    f,
                    "'{}' ({}) is ambiguous between {}; kept as a separate game",
                    title,
                    record,
                    names.join(", ")
                )
            }
            Self::SamePlatformCollision {
                record,
                title,
                existing,
            } => write!(
                f,
                "'{}' ({}) matches {} which already has a different {} record; kept as a separate game",
                title,
                record,
                existing,
                record.platform.short_name()
            ),
        }
    }
}

/// How a record got its canonical id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchMethod {
    KnownRecord,
    ExactTitle,
    Alias,
    Fuzzy { score: f64 },
    Minted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub canonical_id: CanonicalGameId,
    pub method: MatchMethod,
}

/// Result of one resolve pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub assignments: BTreeMap<RecordKey, Assignment>,
    /// The input index plus everything decided in this pass.
    pub index: IdentityIndex,
    /// Ids created in this pass, in creation order.
    pub minted: Vec<CanonicalGameId>,
    pub warnings: Vec<ResolveWarning>,
}

impl Resolution {
    pub fn id_for(&self, key: &RecordKey) -> Option<&CanonicalGameId> {
        self.assignments.get(key).map(|a| &a.canonical_id)
    }
}

/// Assign a canonical id to every record.
///
/// Pure: the caller persists `Resolution::index`. Records sharing a
/// [`RecordKey`] receive a single assignment.
pub fn resolve(
    records: &[PlatformGameRecord],
    existing: &IdentityIndex,
    aliases: &[TitleAlias],
    config: &MatchConfig,
) -> Result<Resolution, ResolveError> {
    let mut resolver = Resolver::new(records, existing, aliases, config);

    let mut ordered: Vec<&PlatformGameRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.normalized_title
            .cmp(&b.normalized_title)
            .then_with(|| a.platform.cmp(&b.platform))
            .then_with(|| a.platform_game_id.cmp(&b.platform_game_id))
    });

    for record in ordered {
        resolver.assign(record)?;
    }

    Ok(Resolution {
        assignments: resolver.assignments,
        index: resolver.index,
        minted: resolver.minted,
        warnings: resolver.warnings,
    })
}

struct Resolver<'a> {
    config: &'a MatchConfig,
    aliases: BTreeMap<&'a str, &'a str>,
    index: IdentityIndex,
    /// id → platform → platform game ids attached to it.
    claims: BTreeMap<CanonicalGameId, BTreeMap<Platform, BTreeSet<String>>>,
    used_ids: HashSet<CanonicalGameId>,
    assignments: BTreeMap<RecordKey, Assignment>,
    minted: Vec<CanonicalGameId>,
    warnings: Vec<ResolveWarning>,
}

impl<'a> Resolver<'a> {
    /// Only records in this pass claim a slot on their canonical id. A key
    /// the platform stopped reporting (a re-keyed store listing) no longer
    /// blocks its successor from joining the same game.
    fn new(
        records: &[PlatformGameRecord],
        existing: &IdentityIndex,
        aliases: &'a [TitleAlias],
        config: &'a MatchConfig,
    ) -> Self {
        let mut used_ids: HashSet<CanonicalGameId> = existing.by_title.values().cloned().collect();
        used_ids.extend(existing.by_record.values().flat_map(|m| m.values().cloned()));

        let mut claims: BTreeMap<CanonicalGameId, BTreeMap<Platform, BTreeSet<String>>> =
            BTreeMap::new();
        for record in records {
            if let Some(id) = existing.id_for_record(&record.key()) {
                claims
                    .entry(id.clone())
                    .or_default()
                    .entry(record.platform)
                    .or_default()
                    .insert(record.platform_game_id.clone());
            }
        }

        Self {
            config,
            aliases: aliases
                .iter()
                .map(|a| (a.alias.as_str(), a.canonical.as_str()))
                .collect(),
            index: existing.clone(),
            claims,
            used_ids,
            assignments: BTreeMap::new(),
            minted: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn assign(&mut self, record: &PlatformGameRecord) -> Result<(), ResolveError> {
        let key = record.key();
        if self.assignments.contains_key(&key) {
            return Ok(());
        }
        let title = record.normalized_title.as_str();

        if let Some(id) = self.index.id_for_record(&key).cloned() {
            self.commit(&key, title, id, MatchMethod::KnownRecord);
            return Ok(());
        }

        if let Some(id) = self.index.id_for_title(title).cloned() {
            if self.can_claim(&id, &key) {
                self.commit(&key, title, id, MatchMethod::ExactTitle);
            } else {
                log::warn!(
                    "{} '{}' shares a title with {} but that game already has a {} record",
                    key,
                    record.title,
                    id,
                    key.platform.short_name()
                );
                self.warnings.push(ResolveWarning::SamePlatformCollision {
                    record: key.clone(),
                    title: title.to_string(),
                    existing: id,
                });
                let minted = self.mint(title);
                self.commit(&key, title, minted, MatchMethod::Minted);
            }
            return Ok(());
        }

        if let Some(canonical) = self.aliases.get(title).copied() {
            match self.index.id_for_title(canonical).cloned() {
                Some(id) if self.can_claim(&id, &key) => {
                    self.commit(&key, title, id, MatchMethod::Alias);
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    // First sighting of the aliased game: mint under the
                    // canonical title so later canonical records join it.
                    let id = self.mint(canonical);
                    self.index.insert_title(canonical, id.clone());
                    self.commit(&key, title, id, MatchMethod::Alias);
                    return Ok(());
                }
            }
        }

        if let Some((id, score)) = self.fuzzy_match(record, &key)? {
            log::debug!("{} '{}' fuzzy-matched {} ({:.3})", key, record.title, id, score);
            self.commit(&key, title, id, MatchMethod::Fuzzy { score });
            return Ok(());
        }

        let id = self.mint(title);
        self.commit(&key, title, id, MatchMethod::Minted);
        Ok(())
    }

    /// Best fuzzy candidate, or `None` when nothing clears the threshold or
    /// the winner is ambiguous.
    fn fuzzy_match(
        &mut self,
        record: &PlatformGameRecord,
        key: &RecordKey,
    ) -> Result<Option<(CanonicalGameId, f64)>, ResolveError> {
        let title = record.normalized_title.as_str();

        // Best score per canonical id; ids that cannot take this record are
        // already known to be different games.
        let mut best: BTreeMap<&CanonicalGameId, (&str, f64)> = BTreeMap::new();
        for (known_title, id) in &self.index.by_title {
            if !self.can_claim(id, key) {
                continue;
            }
            let score = title_similarity(title, known_title);
            let slot = best.entry(id).or_insert((known_title.as_str(), score));
            if score > slot.1 {
                *slot = (known_title.as_str(), score);
            }
        }

        let mut ranked: Vec<ScoredCandidate> = best
            .into_iter()
            .map(|(id, (t, score))| ScoredCandidate {
                canonical_id: id.clone(),
                title: t.to_string(),
                score,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.canonical_id.cmp(&b.canonical_id))
        });

        let Some(top) = ranked.first() else {
            return Ok(None);
        };
        if top.score <= self.config.threshold + SCORE_EPSILON {
            return Ok(None);
        }

        let floor = top.score - self.config.ambiguity_gap - SCORE_EPSILON;
        let contenders: Vec<ScoredCandidate> =
            ranked.iter().take_while(|c| c.score >= floor).cloned().collect();
        if contenders.len() > 1 {
            if self.config.strict {
                return Err(ResolveError::AmbiguousMatch {
                    record: key.clone(),
                    title: title.to_string(),
                    candidates: contenders,
                });
            }
            log::warn!(
                "{} '{}' is ambiguous between {} candidates; not merging",
                key,
                record.title,
                contenders.len()
            );
            self.warnings.push(ResolveWarning::AmbiguousMatch {
                record: key.clone(),
                title: title.to_string(),
                candidates: contenders,
            });
            return Ok(None);
        }

        Ok(Some((top.canonical_id.clone(), top.score)))
    }

    /// True if `key` may join `id` without giving it two records from one platform.
    fn can_claim(&self, id: &CanonicalGameId, key: &RecordKey) -> bool {
        match self.claims.get(id).and_then(|p| p.get(&key.platform)) {
            None => true,
            Some(ids) => ids.iter().all(|g| *g == key.platform_game_id),
        }
    }

    fn mint(&mut self, normalized_title: &str) -> CanonicalGameId {
        let base = slugify(normalized_title);
        let mut candidate = CanonicalGameId::new(base.clone());
        let mut n = 2;
        while self.used_ids.contains(&candidate) {
            candidate = CanonicalGameId::new(format!("{base}-{n}"));
            n += 1;
        }
        self.used_ids.insert(candidate.clone());
        self.minted.push(candidate.clone());
        candidate
    }

    fn commit(&mut self, key: &RecordKey, title: &str, id: CanonicalGameId, method: MatchMethod) {
        self.index.insert_record(key, id.clone());
        self.index.insert_title(title, id.clone());
        self.claims
            .entry(id.clone())
            .or_default()
            .entry(key.platform)
            .or_default()
            .insert(key.platform_game_id.clone());
        self.assignments.insert(
            key.clone(),
            Assignment {
                canonical_id: id,
                method,
            },
        );
    }
}
