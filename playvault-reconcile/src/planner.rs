//! Storage planning: which copies to keep, evict, and install under a disk budget.
//!
//! The planner only produces a plan. Acting on it is the executor's job, and
//! the planner never assumes an earlier plan was carried out; it always works
//! from the [`InstallLedger`] it is given.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use playvault_catalog::{CanonicalGameId, PlanAction, StoragePlanItem, UnifiedGameEntry};
use playvault_core::Platform;
use playvault_core::util::{format_bytes, format_playtime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::InstallLedger;

/// Which unpinned copies go first when space is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionOrder {
    /// Oldest `most_recent_played_at` first; never-played games before any played one.
    #[default]
    Lru,
    /// Lowest aggregate playtime first.
    LeastPlaytime,
}

impl EvictionOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::LeastPlaytime => "least_playtime",
        }
    }
}

impl fmt::Display for EvictionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "lru" => Ok(Self::Lru),
            "least_playtime" | "playtime" => Ok(Self::LeastPlaytime),
            other => Err(format!(
                "unknown eviction order '{other}' (expected lru or least_playtime)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePolicy {
    /// Headroom kept free below the budget.
    pub min_free_bytes: u64,
    /// Treat a budget that pinned copies alone exceed as an error.
    pub pinned_never_evict: bool,
    pub eviction_order: EvictionOrder,
    /// Upper bound on INSTALL items per plan.
    pub max_concurrent_installs: usize,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            min_free_bytes: 0,
            pinned_never_evict: true,
            eviction_order: EvictionOrder::Lru,
            max_concurrent_installs: 2,
        }
    }
}

/// A user request to install a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub canonical_id: CanonicalGameId,
    /// `None` lets the planner pick the platform.
    pub platform: Option<Platform>,
    pub estimated_bytes: u64,
}

impl InstallRequest {
    pub fn new(canonical_id: CanonicalGameId, estimated_bytes: u64) -> Self {
        Self {
            canonical_id,
            platform: None,
            estimated_bytes,
        }
    }

    pub fn on(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanWarning {
    /// Pinned and in-flight copies alone exceed the usable budget.
    BudgetExceededByPins { overflow_bytes: u64 },
    InstallDeferred {
        canonical_id: CanonicalGameId,
        platform: Option<Platform>,
        reason: String,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExceededByPins { overflow_bytes } => write!(
                f,
                "pinned games exceed the budget by {}",
                format_bytes(*overflow_bytes)
            ),
            Self::InstallDeferred {
                canonical_id,
                platform: Some(p),
                reason,
            } => write!(f, "install of {canonical_id} on {p} deferred: {reason}"),
            Self::InstallDeferred {
                canonical_id,
                platform: None,
                reason,
            } => write!(f, "install of {canonical_id} deferred: {reason}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "infeasible budget: {} of pinned or in-progress installs exceed the usable {}",
        format_bytes(*protected_bytes),
        format_bytes(*limit_bytes)
    )]
    InfeasibleBudget {
        limit_bytes: u64,
        protected_bytes: u64,
    },
}

/// Ordered plan items plus the numbers they were derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoragePlan {
    pub items: Vec<StoragePlanItem>,
    pub warnings: Vec<PlanWarning>,
    /// `budget - min_free`, floored at 0.
    pub limit_bytes: u64,
    /// Installed plus in-flight bytes before the plan.
    pub used_bytes: u64,
    /// Usage once every item has been executed.
    pub projected_bytes: u64,
}

impl StoragePlan {
    pub fn evictions(&self) -> impl Iterator<Item = &StoragePlanItem> {
        self.by_action(PlanAction::Evict)
    }

    pub fn installs(&self) -> impl Iterator<Item = &StoragePlanItem> {
        self.by_action(PlanAction::Install)
    }

    pub fn keeps(&self) -> impl Iterator<Item = &StoragePlanItem> {
        self.by_action(PlanAction::Keep)
    }

    fn by_action(&self, action: PlanAction) -> impl Iterator<Item = &StoragePlanItem> {
        self.items.iter().filter(move |i| i.action == action)
    }
}

/// The platform an install should go to when the request does not name one:
/// the preferred platform if still owned, otherwise the platform with the
/// most owned add-on content, then the most playtime, then title priority.
pub fn choose_install_platform(entry: &UnifiedGameEntry) -> Option<Platform> {
    if let Some(p) = entry.preferred_platform.filter(|p| entry.owned_on(*p)) {
        return Some(p);
    }
    entry
        .source_records
        .values()
        .min_by(|a, b| {
            b.owned_content
                .len()
                .cmp(&a.owned_content.len())
                .then_with(|| b.total_playtime_minutes.cmp(&a.total_playtime_minutes))
                .then_with(|| a.platform.title_priority().cmp(&b.platform.title_priority()))
        })
        .map(|r| r.platform)
}

struct Candidate<'a> {
    entry: &'a UnifiedGameEntry,
    platform: Platform,
    bytes: u64,
}

/// Build a storage plan.
///
/// Pinned copies are never evicted. Copies still installing are neither
/// evicted nor counted as free. Installs are accepted in request order up to
/// `max_concurrent_installs`, and only when the budget can hold them after
/// every evictable copy is gone. Evictions then run in eviction order until
/// projected usage fits.
pub fn plan(
    library: &[UnifiedGameEntry],
    ledger: &InstallLedger,
    budget_bytes: u64,
    policy: &StoragePolicy,
    requests: &[InstallRequest],
) -> Result<StoragePlan, PlanError> {
    let entries: BTreeMap<&CanonicalGameId, &UnifiedGameEntry> =
        library.iter().map(|e| (&e.canonical_id, e)).collect();

    let limit = budget_bytes.saturating_sub(policy.min_free_bytes);
    let installing = ledger.installing_bytes();
    let used = ledger.installed_bytes().saturating_add(installing);

    let mut protected = installing;
    let mut kept: Vec<(CanonicalGameId, Platform, u64, &'static str)> = Vec::new();
    let mut candidates: Vec<Candidate<'_>> = Vec::new();

    for ((id, platform), bytes) in ledger.installed() {
        match entries.get(id) {
            Some(entry) if !entry.is_pinned => candidates.push(Candidate {
                entry,
                platform: *platform,
                bytes,
            }),
            Some(_) => {
                protected = protected.saturating_add(bytes);
                kept.push((id.clone(), *platform, bytes, "pinned"));
            }
            None => {
                // Not in the library; leave it alone.
                protected = protected.saturating_add(bytes);
                kept.push((id.clone(), *platform, bytes, "not tracked in library"));
            }
        }
    }
    for ((id, platform), bytes) in ledger.installing() {
        kept.push((id.clone(), *platform, bytes, "install in progress"));
    }

    let mut warnings = Vec::new();
    if protected > limit {
        if policy.pinned_never_evict {
            log::warn!(
                "budget {} cannot hold {} of pinned or in-progress installs",
                format_bytes(limit),
                format_bytes(protected)
            );
            return Err(PlanError::InfeasibleBudget {
                limit_bytes: limit,
                protected_bytes: protected,
            });
        }
        warnings.push(PlanWarning::BudgetExceededByPins {
            overflow_bytes: protected - limit,
        });
    }

    sort_candidates(&mut candidates, policy.eviction_order);
    let evictable: u64 = candidates.iter().map(|c| c.bytes).sum();

    // Installs.
    let mut projected = used;
    let mut installs: Vec<StoragePlanItem> = Vec::new();
    let mut requested: BTreeSet<(CanonicalGameId, Platform)> = BTreeSet::new();
    for req in requests {
        let defer = |reason: String| PlanWarning::InstallDeferred {
            canonical_id: req.canonical_id.clone(),
            platform: req.platform,
            reason,
        };

        let Some(entry) = entries.get(&req.canonical_id) else {
            warnings.push(defer("not in library".into()));
            continue;
        };
        let platform = match req.platform {
            Some(p) if entry.owned_on(p) => p,
            Some(p) => {
                warnings.push(defer(format!("not owned on {p}")));
                continue;
            }
            None => match choose_install_platform(entry) {
                Some(p) => p,
                None => {
                    warnings.push(defer("not owned on any platform".into()));
                    continue;
                }
            },
        };
        if ledger.is_installed(&req.canonical_id, platform)
            || ledger.is_installing(&req.canonical_id, platform)
            || !requested.insert((req.canonical_id.clone(), platform))
        {
            log::debug!("{} on {} already present or requested", req.canonical_id, platform);
            continue;
        }
        if installs.len() >= policy.max_concurrent_installs {
            warnings.push(defer(format!(
                "{} installs already planned",
                policy.max_concurrent_installs
            )));
            continue;
        }
        let after = projected.saturating_add(req.estimated_bytes);
        if after.saturating_sub(evictable) > limit {
            warnings.push(defer(format!(
                "needs {} but only {} can be freed",
                format_bytes(req.estimated_bytes),
                format_bytes(limit.saturating_sub(projected.saturating_sub(evictable)))
            )));
            continue;
        }
        projected = after;
        installs.push(StoragePlanItem {
            canonical_id: req.canonical_id.clone(),
            platform,
            action: PlanAction::Install,
            reason: "requested".into(),
            bytes: req.estimated_bytes,
        });
    }

    // Evictions.
    let mut evictions: Vec<StoragePlanItem> = Vec::new();
    for c in &candidates {
        if projected <= limit {
            kept.push((c.entry.canonical_id.clone(), c.platform, c.bytes, "within budget"));
            continue;
        }
        if c.bytes == 0 {
            kept.push((c.entry.canonical_id.clone(), c.platform, c.bytes, "frees nothing"));
            continue;
        }
        projected -= c.bytes;
        evictions.push(StoragePlanItem {
            canonical_id: c.entry.canonical_id.clone(),
            platform: c.platform,
            action: PlanAction::Evict,
            reason: eviction_reason(c.entry, policy.eviction_order),
            bytes: c.bytes,
        });
    }

    kept.sort();
    let mut items = evictions;
    items.extend(installs);
    items.extend(
        kept.into_iter()
            .map(|(canonical_id, platform, bytes, reason)| StoragePlanItem {
                canonical_id,
                platform,
                action: PlanAction::Keep,
                reason: reason.into(),
                bytes,
            }),
    );

    Ok(StoragePlan {
        items,
        warnings,
        limit_bytes: limit,
        used_bytes: used,
        projected_bytes: projected,
    })
}

fn sort_candidates(candidates: &mut [Candidate<'_>], order: EvictionOrder) {
    candidates.sort_by(|a, b| {
        let primary = match order {
            EvictionOrder::Lru => a
                .entry
                .most_recent_played_at
                .cmp(&b.entry.most_recent_played_at),
            EvictionOrder::LeastPlaytime => a
                .entry
                .aggregate_playtime_minutes
                .cmp(&b.entry.aggregate_playtime_minutes),
        };
        primary
            .then_with(|| a.entry.canonical_id.cmp(&b.entry.canonical_id))
            .then_with(|| a.platform.cmp(&b.platform))
    });
}

fn eviction_reason(entry: &UnifiedGameEntry, order: EvictionOrder) -> String {
    match order {
        EvictionOrder::Lru => match entry.most_recent_played_at {
            Some(at) => format!("least recently played (last {})", date(at)),
            None => "never played".into(),
        },
        EvictionOrder::LeastPlaytime => format!(
            "least played ({})",
            format_playtime(entry.aggregate_playtime_minutes)
        ),
    }
}

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
