use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use playvault_catalog::{
    CanonicalGameId, ExecutionOutcome, ExecutionReport, PlanAction, UnifiedGameEntry,
};
use playvault_core::{Platform, PlatformGameRecord};
use playvault_reconcile::*;

const GB: u64 = 1_000_000_000;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

fn entry(id: &str, records: Vec<PlatformGameRecord>) -> UnifiedGameEntry {
    let by_platform: BTreeMap<Platform, PlatformGameRecord> =
        records.into_iter().map(|r| (r.platform, r)).collect();
    merge_at(&CanonicalGameId::new(id), &by_platform, None, day(28)).unwrap()
}

fn installed(id: &str, platform: Platform, bytes: u64, played: Option<u32>) -> UnifiedGameEntry {
    let mut rec = PlatformGameRecord::new(platform, id, id, day(28)).installed(bytes);
    if let Some(d) = played {
        rec = rec.with_last_played(day(d));
    }
    entry(id, vec![rec])
}

fn pinned(mut e: UnifiedGameEntry) -> UnifiedGameEntry {
    e.is_pinned = true;
    e
}

fn run(
    library: &[UnifiedGameEntry],
    budget: u64,
    policy: &StoragePolicy,
    requests: &[InstallRequest],
) -> Result<StoragePlan, PlanError> {
    let ledger = InstallLedger::from_entries(library);
    plan(library, &ledger, budget, policy, requests)
}

#[test]
fn budget_above_usage_keeps_everything() {
    let library = vec![
        installed("a", Platform::Steam, 3 * GB, Some(1)),
        installed("b", Platform::Epic, 4 * GB, Some(2)),
    ];
    let plan = run(&library, 20 * GB, &StoragePolicy::default(), &[]).unwrap();

    assert_eq!(plan.evictions().count(), 0);
    assert_eq!(plan.keeps().count(), 2);
    assert_eq!(plan.used_bytes, 7 * GB);
    assert_eq!(plan.projected_bytes, 7 * GB);
}

#[test]
fn evicts_least_recently_played_first() {
    // 11GB used, 10GB budget, 1GB reserve: one 3GB eviction lands at 8GB.
    let library = vec![
        installed("old", Platform::Steam, 3 * GB, Some(1)),
        installed("recent", Platform::Steam, 8 * GB, Some(20)),
    ];
    let policy = StoragePolicy {
        min_free_bytes: GB,
        ..StoragePolicy::default()
    };
    let plan = run(&library, 10 * GB, &policy, &[]).unwrap();

    let evictions: Vec<_> = plan.evictions().collect();
    assert_eq!(evictions.len(), 1);
    assert_eq!(evictions[0].canonical_id.as_str(), "old");
    assert_eq!(evictions[0].bytes, 3 * GB);
    assert_eq!(plan.projected_bytes, 8 * GB);
    assert!(plan.projected_bytes <= plan.limit_bytes);
}

#[test]
fn never_played_goes_before_played() {
    let library = vec![
        installed("played", Platform::Steam, 5 * GB, Some(1)),
        installed("never", Platform::Steam, 5 * GB, None),
    ];
    let plan = run(&library, 6 * GB, &StoragePolicy::default(), &[]).unwrap();

    let evicted: Vec<_> = plan.evictions().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(evicted, vec!["never"]);
    assert_eq!(plan.evictions().next().unwrap().reason, "never played");
}

#[test]
fn least_playtime_order() {
    let mut heavy = installed("heavy", Platform::Steam, 5 * GB, Some(1));
    heavy.aggregate_playtime_minutes = 6000;
    let mut light = installed("light", Platform::Steam, 5 * GB, Some(27));
    light.aggregate_playtime_minutes = 10;

    let policy = StoragePolicy {
        eviction_order: EvictionOrder::LeastPlaytime,
        ..StoragePolicy::default()
    };
    let plan = run(&[heavy, light], 6 * GB, &policy, &[]).unwrap();
    let evicted: Vec<_> = plan.evictions().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(evicted, vec!["light"]);
}

#[test]
fn pinned_entries_are_never_evicted() {
    let library = vec![
        pinned(installed("pinned-old", Platform::Steam, 5 * GB, Some(1))),
        installed("free", Platform::Gog, 5 * GB, Some(20)),
    ];
    let plan = run(&library, 6 * GB, &StoragePolicy::default(), &[]).unwrap();

    assert!(plan.evictions().all(|i| i.canonical_id.as_str() != "pinned-old"));
    assert_eq!(plan.evictions().count(), 1);
    let keep = plan
        .keeps()
        .find(|i| i.canonical_id.as_str() == "pinned-old")
        .unwrap();
    assert_eq!(keep.reason, "pinned");
}

#[test]
fn pinned_over_budget_is_infeasible() {
    let library = vec![pinned(installed("huge", Platform::Steam, 11 * GB, Some(1)))];
    let policy = StoragePolicy {
        min_free_bytes: GB,
        ..StoragePolicy::default()
    };
    let err = run(&library, 10 * GB, &policy, &[]).unwrap_err();
    match err {
        PlanError::InfeasibleBudget {
            limit_bytes,
            protected_bytes,
        } => {
            assert_eq!(limit_bytes, 9 * GB);
            assert_eq!(protected_bytes, 11 * GB);
        }
    }
}

#[test]
fn pinned_over_budget_best_effort_warns() {
    let library = vec![
        pinned(installed("huge", Platform::Steam, 11 * GB, Some(1))),
        installed("small", Platform::Epic, GB, Some(2)),
    ];
    let policy = StoragePolicy {
        pinned_never_evict: false,
        ..StoragePolicy::default()
    };
    let plan = run(&library, 10 * GB, &policy, &[]).unwrap();

    assert_eq!(
        plan.warnings,
        vec![PlanWarning::BudgetExceededByPins {
            overflow_bytes: GB
        }]
    );
    let evicted: Vec<_> = plan.evictions().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(evicted, vec!["small"]);
}

#[test]
fn min_free_above_budget_means_zero_limit() {
    let library = vec![installed("a", Platform::Steam, GB, Some(1))];
    let policy = StoragePolicy {
        min_free_bytes: 50 * GB,
        ..StoragePolicy::default()
    };
    let plan = run(&library, 10 * GB, &policy, &[]).unwrap();
    assert_eq!(plan.limit_bytes, 0);
    assert_eq!(plan.evictions().count(), 1);
    assert_eq!(plan.projected_bytes, 0);
}

#[test]
fn install_triggers_eviction() {
    let library = vec![
        installed("old", Platform::Steam, 4 * GB, Some(1)),
        entry(
            "new-game",
            vec![PlatformGameRecord::new(Platform::Epic, "ng", "New Game", day(28))],
        ),
    ];
    let requests = vec![InstallRequest::new(CanonicalGameId::new("new-game"), 3 * GB)];
    let plan = run(&library, 5 * GB, &StoragePolicy::default(), &requests).unwrap();

    let install = plan.installs().next().unwrap();
    assert_eq!(install.platform, Platform::Epic);
    assert_eq!(install.bytes, 3 * GB);
    let evicted: Vec<_> = plan.evictions().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(evicted, vec!["old"]);
    assert_eq!(plan.projected_bytes, 3 * GB);
    assert!(plan.warnings.is_empty());
}

#[test]
fn install_that_cannot_fit_is_deferred() {
    let library = vec![
        pinned(installed("keep", Platform::Steam, 4 * GB, Some(1))),
        entry(
            "big",
            vec![PlatformGameRecord::new(Platform::Gog, "big", "Big", day(28))],
        ),
    ];
    let requests = vec![InstallRequest::new(CanonicalGameId::new("big"), 5 * GB)];
    let plan = run(&library, 6 * GB, &StoragePolicy::default(), &requests).unwrap();

    assert_eq!(plan.installs().count(), 0);
    assert_eq!(plan.evictions().count(), 0);
    assert!(matches!(
        plan.warnings.as_slice(),
        [PlanWarning::InstallDeferred { .. }]
    ));
}

#[test]
fn installs_are_capped() {
    let library: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| {
            entry(
                id,
                vec![PlatformGameRecord::new(Platform::Steam, *id, *id, day(28))],
            )
        })
        .collect();
    let requests: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| InstallRequest::new(CanonicalGameId::new(*id), GB))
        .collect();
    let policy = StoragePolicy {
        max_concurrent_installs: 2,
        ..StoragePolicy::default()
    };
    let plan = run(&library, 100 * GB, &policy, &requests).unwrap();

    assert_eq!(plan.installs().count(), 2);
    assert_eq!(plan.warnings.len(), 1);
}

#[test]
fn install_on_unowned_platform_is_deferred() {
    let library = vec![entry(
        "a",
        vec![PlatformGameRecord::new(Platform::Steam, "a", "A", day(28))],
    )];
    let requests = vec![InstallRequest::new(CanonicalGameId::new("a"), GB).on(Platform::Psn)];
    let plan = run(&library, 100 * GB, &StoragePolicy::default(), &requests).unwrap();
    assert_eq!(plan.installs().count(), 0);
    assert_eq!(plan.warnings.len(), 1);
}

#[test]
fn installing_copies_are_not_evicted() {
    let library = vec![
        entry(
            "downloading",
            vec![PlatformGameRecord::new(Platform::Xbox, "d", "D", day(28)).installing(4 * GB)],
        ),
        installed("done", Platform::Steam, 4 * GB, Some(1)),
    ];
    let plan = run(&library, 5 * GB, &StoragePolicy::default(), &[]).unwrap();

    let evicted: Vec<_> = plan.evictions().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(evicted, vec!["done"]);
    let keep = plan
        .keeps()
        .find(|i| i.canonical_id.as_str() == "downloading")
        .unwrap();
    assert_eq!(keep.action, PlanAction::Keep);
}

#[test]
fn preferred_platform_chooses_install_target() {
    let mut e = entry(
        "multi",
        vec![
            PlatformGameRecord::new(Platform::Steam, "m", "Multi", day(28)).with_playtime(500),
            PlatformGameRecord::new(Platform::Gog, "m", "Multi", day(28)),
        ],
    );
    assert_eq!(choose_install_platform(&e), Some(Platform::Steam));
    e.preferred_platform = Some(Platform::Gog);
    assert_eq!(choose_install_platform(&e), Some(Platform::Gog));
}

#[test]
fn owned_add_ons_outweigh_playtime() {
    let mut e = entry(
        "witcher-3",
        vec![
            PlatformGameRecord::new(Platform::Steam, "292030", "The Witcher 3", day(28))
                .with_playtime(900),
            PlatformGameRecord::new(Platform::Gog, "1207664643", "The Witcher 3", day(28))
                .with_owned_content(["hearts-of-stone", "blood-and-wine"]),
            PlatformGameRecord::new(Platform::Epic, "w3", "The Witcher 3", day(28))
                .with_owned_content(["hearts-of-stone"]),
        ],
    );
    assert_eq!(choose_install_platform(&e), Some(Platform::Gog));

    let plan = run(
        std::slice::from_ref(&e),
        100 * GB,
        &StoragePolicy::default(),
        &[InstallRequest::new(CanonicalGameId::new("witcher-3"), 50 * GB)],
    )
    .unwrap();
    assert_eq!(plan.installs().next().unwrap().platform, Platform::Gog);

    e.preferred_platform = Some(Platform::Steam);
    assert_eq!(choose_install_platform(&e), Some(Platform::Steam));
}

#[test]
fn newer_executor_reports_override_platform_state() {
    let library = vec![installed("a", Platform::Steam, 4 * GB, Some(1))];
    let evicted = ExecutionReport {
        canonical_id: CanonicalGameId::new("a"),
        platform: Platform::Steam,
        outcome: ExecutionOutcome::Success,
        bytes_delta: -(4 * GB as i64),
        reported_at: day(29),
        message: None,
    };
    let ledger = InstallLedger::from_entries_with_reports(&library, &[evicted.clone()]);
    assert_eq!(ledger.installed_bytes(), 0);

    // A report older than the platform data is ignored.
    let old = ExecutionReport {
        reported_at: day(2),
        ..evicted
    };
    let ledger = InstallLedger::from_entries_with_reports(&library, &[old]);
    assert_eq!(ledger.installed_bytes(), 4 * GB);
}

#[test]
fn planning_twice_gives_the_same_plan() {
    let library = vec![
        installed("a", Platform::Steam, 3 * GB, Some(3)),
        installed("b", Platform::Epic, 3 * GB, Some(3)),
        installed("c", Platform::Gog, 3 * GB, Some(3)),
    ];
    let a = run(&library, 5 * GB, &StoragePolicy::default(), &[]).unwrap();
    let b = run(&library, 5 * GB, &StoragePolicy::default(), &[]).unwrap();
    assert_eq!(a, b);
    // Equal recency falls back to id order.
    let evicted: Vec<_> = a.evictions().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(evicted, vec!["a", "b"]);
}

#[test]
fn ledger_only_copies_are_protected() {
    let library = vec![installed("a", Platform::Steam, 3 * GB, Some(1))];
    let mut ledger = InstallLedger::from_entries(&library);
    ledger.set_installed(CanonicalGameId::new("ghost"), Platform::Gog, 2 * GB);
    ledger.set_installing(CanonicalGameId::new("b"), Platform::Psn, GB);

    let plan = plan(&library, &ledger, 5 * GB, &StoragePolicy::default(), &[]).unwrap();

    assert_eq!(plan.used_bytes, 6 * GB);
    let evicted: Vec<&str> = plan.evictions().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(evicted, vec!["a"]);
    assert_eq!(plan.projected_bytes, 3 * GB);

    let reasons: Vec<(&str, &str)> = plan
        .keeps()
        .map(|i| (i.canonical_id.as_str(), i.reason.as_str()))
        .collect();
    assert_eq!(
        reasons,
        vec![("b", "install in progress"), ("ghost", "not tracked in library")]
    );

    ledger.set_installed(CanonicalGameId::new("b"), Platform::Psn, GB);
    assert!(ledger.is_installed(&CanonicalGameId::new("b"), Platform::Psn));
    assert!(!ledger.is_installing(&CanonicalGameId::new("b"), Platform::Psn));
}
