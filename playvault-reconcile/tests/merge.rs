use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use playvault_catalog::{CanonicalGameId, IdentityIndex};
use playvault_core::{Platform, PlatformGameRecord};
use playvault_reconcile::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn by_platform(records: Vec<PlatformGameRecord>) -> BTreeMap<Platform, PlatformGameRecord> {
    records.into_iter().map(|r| (r.platform, r)).collect()
}

fn portal() -> CanonicalGameId {
    CanonicalGameId::new("portal-2")
}

#[test]
fn playtime_is_summed_across_platforms() {
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()).with_playtime(120),
        PlatformGameRecord::new(Platform::Epic, "abc", "Portal 2", t0()).with_playtime(30),
    ]);
    let entry = merge_at(&portal(), &records, None, t0()).unwrap();

    assert_eq!(entry.aggregate_playtime_minutes, 150);
    assert_eq!(entry.source_records.len(), 2);
    assert_eq!(entry.first_seen_at, t0());
    assert!(!entry.is_pinned);
}

#[test]
fn most_recent_play_is_the_latest_across_platforms() {
    let early = t0() - Duration::days(30);
    let late = t0() - Duration::days(1);
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()).with_last_played(early),
        PlatformGameRecord::new(Platform::Xbox, "x", "Portal 2", t0()).with_last_played(late),
        PlatformGameRecord::new(Platform::Gog, "g", "Portal 2", t0()),
    ]);
    let entry = merge_at(&portal(), &records, None, t0()).unwrap();
    assert_eq!(entry.most_recent_played_at, Some(late));
}

#[test]
fn installed_bytes_only_count_finished_installs() {
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()).installed(12_000),
        PlatformGameRecord::new(Platform::Epic, "abc", "Portal 2", t0()).installing(5_000),
        PlatformGameRecord::new(Platform::Gog, "g", "Portal 2", t0()),
    ]);
    let entry = merge_at(&portal(), &records, None, t0()).unwrap();
    assert_eq!(entry.total_installed_bytes, 12_000);
}

#[test]
fn display_title_comes_from_freshest_record() {
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()),
        PlatformGameRecord::new(
            Platform::Psn,
            "p",
            "Portal 2 (PS3)",
            t0() + Duration::minutes(5),
        ),
    ]);
    let entry = merge_at(&portal(), &records, None, t0()).unwrap();
    assert_eq!(entry.display_title, "Portal 2 (PS3)");
}

#[test]
fn display_title_tie_prefers_platform_priority() {
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Epic, "abc", "PORTAL 2", t0()),
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()),
    ]);
    let entry = merge_at(&portal(), &records, None, t0()).unwrap();
    assert_eq!(entry.display_title, "Portal 2");
}

#[test]
fn user_flags_survive_remerge() {
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()),
        PlatformGameRecord::new(Platform::Epic, "abc", "Portal 2", t0()),
    ]);
    let mut previous = merge_at(&portal(), &records, None, t0()).unwrap();
    previous.is_pinned = true;
    previous.preferred_platform = Some(Platform::Epic);

    let later = t0() + Duration::hours(1);
    let entry = merge_at(&portal(), &records, Some(&previous), later).unwrap();
    assert!(entry.is_pinned);
    assert_eq!(entry.preferred_platform, Some(Platform::Epic));
    assert_eq!(entry.first_seen_at, t0());
    assert_eq!(entry.updated_at, later);
}

#[test]
fn preferred_platform_dropped_when_no_longer_owned() {
    let both = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()),
        PlatformGameRecord::new(Platform::Epic, "abc", "Portal 2", t0()),
    ]);
    let mut previous = merge_at(&portal(), &both, None, t0()).unwrap();
    previous.preferred_platform = Some(Platform::Epic);

    let steam_only = by_platform(vec![PlatformGameRecord::new(
        Platform::Steam,
        "620",
        "Portal 2",
        t0(),
    )]);
    let entry = merge_at(&portal(), &steam_only, Some(&previous), t0()).unwrap();
    assert_eq!(entry.preferred_platform, None);
}

#[test]
fn empty_records_is_an_error() {
    let err = merge_at(&portal(), &BTreeMap::new(), None, t0()).unwrap_err();
    assert!(matches!(err, MergeError::NoSourceRecords(id) if id == portal()));
}

#[test]
fn merge_is_deterministic() {
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()).with_playtime(10),
        PlatformGameRecord::new(Platform::Gog, "g", "Portal 2", t0()).installed(99),
    ]);
    let a = merge_at(&portal(), &records, None, t0()).unwrap();
    let b = merge_at(&portal(), &records, None, t0()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn new_entry_content_does_not_depend_on_merge_time() {
    let records = by_platform(vec![
        PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()),
        PlatformGameRecord::new(Platform::Epic, "abc", "Portal 2", t0() - Duration::minutes(3)),
    ]);
    let a = merge_at(&portal(), &records, None, t0() + Duration::seconds(1)).unwrap();
    let b = merge_at(&portal(), &records, None, t0() + Duration::hours(2)).unwrap();

    assert!(a.content_eq(&b));
    assert_ne!(a.updated_at, b.updated_at);
    assert_eq!(a.first_seen_at, t0() - Duration::minutes(3));
}

#[test]
fn group_records_keeps_latest_duplicate() {
    let older = PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()).with_playtime(1);
    let newer = PlatformGameRecord::new(
        Platform::Steam,
        "620",
        "Portal 2",
        t0() + Duration::minutes(1),
    )
    .with_playtime(2);
    let records = vec![newer.clone(), older];
    let res = resolve(&records, &IdentityIndex::new(), &[], &MatchConfig::default()).unwrap();

    let grouped = group_records(&records, &res);
    assert_eq!(grouped[&portal()][&Platform::Steam], newer);
}

#[test]
fn dedupe_records_keeps_latest_fetch() {
    let older = PlatformGameRecord::new(Platform::Steam, "620", "Portal 2", t0()).with_playtime(1);
    let newer = PlatformGameRecord::new(
        Platform::Steam,
        "620",
        "Portal 2",
        t0() + Duration::minutes(1),
    )
    .with_playtime(2);
    let deduped = dedupe_records(vec![newer.clone(), older]);
    assert_eq!(deduped, vec![newer]);
}
