use super::*;
use playvault_reconcile::EvictionOrder;
use tempfile::TempDir;

#[test]
fn missing_file_gives_defaults() {
    let tmp = TempDir::new().unwrap();
    let settings = load_settings(&tmp.path().join("nope.toml")).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.library.id, "main");
    assert_eq!(settings.library.orphan_after_cycles, 3);
    assert!((settings.matching.threshold - 0.85).abs() < 1e-9);
    assert!(settings.storage.policy.pinned_never_evict);
}

#[test]
fn partial_file_fills_in_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("settings.toml");
    std::fs::write(
        &path,
        r#"
[storage]
budget_bytes = 500000000000
eviction_order = "least_playtime"
max_concurrent_installs = 1

[matching]
strict = true

[platforms.psn]
enabled = false
"#,
    )
    .unwrap();

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.storage.budget_bytes, Some(500_000_000_000));
    assert_eq!(
        settings.storage.policy.eviction_order,
        EvictionOrder::LeastPlaytime
    );
    assert_eq!(settings.storage.policy.max_concurrent_installs, 1);
    assert_eq!(settings.storage.policy.min_free_bytes, 0);
    assert!(settings.matching.strict);
    assert!((settings.matching.ambiguity_gap - 0.05).abs() < 1e-9);
    assert!(!settings.is_enabled(Platform::Psn));
    assert!(settings.is_enabled(Platform::Steam));
    assert_eq!(settings.sync.fetch_timeout_secs, 30);
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("settings.toml");
    std::fs::write(&path, "[library\nid = ").unwrap();
    assert!(matches!(
        load_settings(&path),
        Err(SettingsError::Parse { .. })
    ));
}

#[test]
fn save_then_load() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("settings.toml");

    let mut settings = Settings::default();
    settings.storage.budget_bytes = Some(42);
    settings.platforms.insert(
        "steam".into(),
        PlatformSettings {
            enabled: true,
            account_id: Some("7656".into()),
            token: None,
        },
    );
    save_settings(&path, &settings).unwrap();

    assert!(!path.with_extension("toml.tmp").exists());
    assert_eq!(load_settings(&path).unwrap(), settings);
}

#[test]
fn env_overrides_file_credentials() {
    let mut settings = Settings::default();
    settings.platforms.insert(
        "epic".into(),
        PlatformSettings {
            enabled: true,
            account_id: Some("file-account".into()),
            token: Some("file-token".into()),
        },
    );

    let creds = settings.credentials_with(Platform::Epic, |var| {
        (var == "PLAYVAULT_EPIC_TOKEN").then(|| "env-token".to_string())
    });
    assert_eq!(creds.token.as_deref(), Some("env-token"));
    assert_eq!(creds.account_id.as_deref(), Some("file-account"));

    let none = settings.credentials_with(Platform::Gog, |_| None);
    assert!(none.is_empty());
}

#[test]
fn backoff_max_never_below_base() {
    let sync = SyncSettings {
        backoff_base_secs: 120,
        backoff_max_secs: 10,
        ..SyncSettings::default()
    };
    let policy = sync.backoff_policy();
    assert_eq!(policy.max, policy.base);
}
