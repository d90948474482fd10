use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use playvault_catalog::{CanonicalGameId, ExecutionOutcome, ExecutionReport};
use playvault_core::{Platform, PlatformGameRecord};
use playvault_db::{MemoryStore, SqliteStore};
use playvault_reconcile::*;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn library() -> Vec<PlatformGameRecord> {
    vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()).with_playtime(120),
        PlatformGameRecord::new(Platform::Epic, "abc", "Portal 2", t0()).with_playtime(30),
        PlatformGameRecord::new(Platform::Gog, "hades", "Hades", t0()).installed(15_000),
    ]
}

fn run_cycle<S: playvault_db::KvStore>(
    store: &LibraryStore<S>,
    records: &[PlatformGameRecord],
    now: DateTime<Utc>,
) -> playvault_catalog::ChangeSet {
    let snapshot = store.snapshot().unwrap();
    let planned = build_diff(
        &snapshot,
        records,
        &BTreeSet::new(),
        &[],
        &MatchConfig::default(),
        now,
    )
    .unwrap();
    store.apply_diff(planned.diff).unwrap()
}

fn id(s: &str) -> CanonicalGameId {
    CanonicalGameId::new(s)
}

#[test]
fn first_cycle_adds_everything() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    let changes = run_cycle(&store, &library(), t0());

    assert_eq!(changes.added, vec![id("hades"), id("portal-2")]);
    assert_eq!(changes.version, 1);

    let snap = store.snapshot().unwrap();
    assert_eq!(snap.version, 1);
    assert_eq!(snap.get(&id("portal-2")).unwrap().aggregate_playtime_minutes, 150);
}

#[test]
fn rerun_with_same_records_is_quiet() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    run_cycle(&store, &library(), t0());
    let before = store.snapshot().unwrap();

    let changes = run_cycle(&store, &library(), t0() + Duration::hours(1));
    assert!(changes.is_quiet());
    assert_eq!(changes.unchanged, 2);

    let after = store.snapshot().unwrap();
    assert_eq!(before.entries, after.entries);
    assert_eq!(before.index, after.index);
    assert_eq!(after.version, before.version + 1);
}

#[test]
fn playtime_change_is_an_update() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    run_cycle(&store, &library(), t0());

    let mut records = library();
    records[0].total_playtime_minutes = 180;
    let changes = run_cycle(&store, &records, t0() + Duration::hours(1));
    assert_eq!(changes.updated, vec![id("portal-2")]);
    assert_eq!(changes.unchanged, 1);
}

#[test]
fn missing_entry_orphans_after_debounce() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    run_cycle(&store, &library(), t0());

    let without_hades: Vec<_> = library()
        .into_iter()
        .filter(|r| r.platform != Platform::Gog)
        .collect();

    let c1 = run_cycle(&store, &without_hades, t0());
    assert_eq!(c1.pending, vec![(id("hades"), 1)]);
    assert!(c1.orphaned.is_empty());

    let c2 = run_cycle(&store, &without_hades, t0());
    assert_eq!(c2.pending, vec![(id("hades"), 2)]);
    assert!(!store.snapshot().unwrap().get(&id("hades")).unwrap().is_orphaned);

    let c3 = run_cycle(&store, &without_hades, t0());
    assert_eq!(c3.orphaned, vec![id("hades")]);
    let snap = store.snapshot().unwrap();
    let hades = snap.get(&id("hades")).unwrap();
    assert!(hades.is_orphaned);
    assert_eq!(snap.active().count(), 1);

    // Orphaning is terminal; further misses report nothing new.
    let c4 = run_cycle(&store, &without_hades, t0());
    assert!(c4.orphaned.is_empty());
    assert!(c4.pending.is_empty());
}

#[test]
fn reappearance_resets_miss_counter() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    run_cycle(&store, &library(), t0());

    let without_hades: Vec<_> = library()
        .into_iter()
        .filter(|r| r.platform != Platform::Gog)
        .collect();
    run_cycle(&store, &without_hades, t0());
    run_cycle(&store, &without_hades, t0());
    run_cycle(&store, &library(), t0());
    let c = run_cycle(&store, &without_hades, t0());
    assert_eq!(c.pending, vec![(id("hades"), 1)]);
}

#[test]
fn orphaned_entry_is_revived_when_seen_again() {
    let store = LibraryStore::new(MemoryStore::new(), "main").with_orphan_after(1);
    run_cycle(&store, &library(), t0());

    let without_hades: Vec<_> = library()
        .into_iter()
        .filter(|r| r.platform != Platform::Gog)
        .collect();
    let c1 = run_cycle(&store, &without_hades, t0());
    assert_eq!(c1.orphaned, vec![id("hades")]);

    let c2 = run_cycle(&store, &library(), t0());
    assert_eq!(c2.revived, vec![id("hades")]);
    assert!(!store.snapshot().unwrap().get(&id("hades")).unwrap().is_orphaned);
}

#[test]
fn stale_diff_is_rejected() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    run_cycle(&store, &library(), t0());

    let snapshot = store.snapshot().unwrap();
    let planned = build_diff(
        &snapshot,
        &library(),
        &BTreeSet::new(),
        &[],
        &MatchConfig::default(),
        t0(),
    )
    .unwrap();

    // A user edit lands between snapshot and apply.
    store.set_pinned(&id("hades"), true).unwrap();

    let err = store.apply_diff(planned.diff).unwrap_err();
    assert!(matches!(err, StoreError::StaleWrite { base: 1, current: 2 }));
    assert!(store.snapshot().unwrap().get(&id("hades")).unwrap().is_pinned);
}

#[test]
fn pin_survives_later_cycles() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    run_cycle(&store, &library(), t0());
    store.set_pinned(&id("hades"), true).unwrap();

    run_cycle(&store, &library(), t0() + Duration::hours(1));
    assert!(store.snapshot().unwrap().get(&id("hades")).unwrap().is_pinned);
}

#[test]
fn preferred_platform_must_be_owned() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    run_cycle(&store, &library(), t0());

    let v = store
        .set_preferred_platform(&id("portal-2"), Some(Platform::Epic))
        .unwrap();
    assert_eq!(v, 2);

    let err = store
        .set_preferred_platform(&id("portal-2"), Some(Platform::Psn))
        .unwrap_err();
    assert!(matches!(err, StoreError::PlatformNotOwned { .. }));

    let err = store.set_pinned(&id("nope"), true).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn stale_platforms_are_marked() {
    let store = LibraryStore::new(MemoryStore::new(), "main");
    let snapshot = store.snapshot().unwrap();
    let stale: BTreeSet<Platform> = [Platform::Epic].into_iter().collect();
    let planned = build_diff(
        &snapshot,
        &library(),
        &stale,
        &[],
        &MatchConfig::default(),
        t0(),
    )
    .unwrap();
    store.apply_diff(planned.diff).unwrap();

    let snap = store.snapshot().unwrap();
    assert!(snap.get(&id("portal-2")).unwrap().is_stale());
    assert!(!snap.get(&id("hades")).unwrap().is_stale());
    assert_eq!(snap.last_known_records(Platform::Epic).len(), 1);
}

#[test]
fn sqlite_backed_store_persists() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("library.db");
    {
        let store = LibraryStore::new(SqliteStore::open(&path).unwrap(), "main");
        run_cycle(&store, &library(), t0());
        store.set_pinned(&id("portal-2"), true).unwrap();
    }
    let store = LibraryStore::new(SqliteStore::open(&path).unwrap(), "main");
    let snap = store.snapshot().unwrap();
    assert_eq!(snap.version, 2);
    assert!(snap.get(&id("portal-2")).unwrap().is_pinned);
    assert!(snap.index.id_for_title("hades").is_some());
}

#[test]
fn concurrent_writers_one_wins() {
    let store = Arc::new(LibraryStore::new(MemoryStore::new(), "main"));
    run_cycle(store.as_ref(), &library(), t0());
    let snapshot = store.snapshot().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let snapshot = snapshot.clone();
            std::thread::spawn(move || {
                let planned = build_diff(
                    &snapshot,
                    &library(),
                    &BTreeSet::new(),
                    &[],
                    &MatchConfig::default(),
                    t0(),
                )
                .unwrap();
                store.apply_diff(planned.diff).is_ok()
            })
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(wins, 1);
    assert_eq!(store.snapshot().unwrap().version, 2);
}

fn report(id: &str, platform: Platform, delta: i64, at: DateTime<Utc>) -> ExecutionReport {
    ExecutionReport {
        canonical_id: CanonicalGameId::new(id),
        platform,
        outcome: ExecutionOutcome::Success,
        bytes_delta: delta,
        reported_at: at,
        message: None,
    }
}

#[test]
fn executor_reports_persist_until_pruned() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("library.db");
    {
        let store = LibraryStore::new(SqliteStore::open(&path).unwrap(), "main");
        store
            .append_reports(&[
                report("hades", Platform::Gog, -15_000, t0() + Duration::minutes(2)),
                report("portal-2", Platform::Steam, 9_000, t0() + Duration::minutes(1)),
            ])
            .unwrap();
        store
            .append_reports(&[report("hades", Platform::Gog, 15_000, t0() + Duration::minutes(3))])
            .unwrap();
    }

    let store = LibraryStore::new(SqliteStore::open(&path).unwrap(), "main");
    let pending = store.pending_reports().unwrap();
    let deltas: Vec<i64> = pending.iter().map(|r| r.bytes_delta).collect();
    assert_eq!(deltas, vec![9_000, -15_000, 15_000]);

    let dropped = store
        .prune_reports(|r| r.canonical_id.as_str() != "hades")
        .unwrap();
    assert_eq!(dropped, 2);
    assert_eq!(store.pending_reports().unwrap().len(), 1);

    // Another library in the same database sees none of them.
    let other = LibraryStore::new(SqliteStore::open(&path).unwrap(), "mainline");
    assert!(other.pending_reports().unwrap().is_empty());
}
