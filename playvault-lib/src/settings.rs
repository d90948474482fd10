//! Application settings (`~/.config/playvault/settings.toml`).
//!
//! Every section is optional; a missing file yields defaults. Credentials
//! may live in the file but environment variables take precedence, so
//! tokens never have to be written to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use playvault_core::Platform;
use playvault_reconcile::{DEFAULT_ORPHAN_AFTER_CYCLES, MatchConfig, StoragePolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::PlatformCredentials;
use crate::backoff::BackoffPolicy;

const APP_DIR: &str = "playvault";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Cannot serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Key the library document is stored under.
    pub id: String,
    pub db_path: Option<PathBuf>,
    pub aliases_dir: Option<PathBuf>,
    pub orphan_after_cycles: u32,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            id: "main".into(),
            db_path: None,
            aliases_dir: None,
            orphan_after_cycles: DEFAULT_ORPHAN_AFTER_CYCLES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Disk budget for installed games. Planning is skipped when unset.
    pub budget_bytes: Option<u64>,
    #[serde(flatten)]
    pub policy: StoragePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub snapshot_dir: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub stale_write_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            fetch_timeout_secs: 30,
            backoff_base_secs: 30,
            backoff_max_secs: 3600,
            stale_write_retries: 3,
        }
    }
}

impl SyncSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(self.backoff_base_secs),
            max: Duration::from_secs(self.backoff_max_secs.max(self.backoff_base_secs)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub enabled: bool,
    pub account_id: Option<String>,
    pub token: Option<String>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            account_id: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library: LibrarySettings,
    pub storage: StorageSettings,
    pub matching: MatchConfig,
    pub sync: SyncSettings,
    /// Keyed by platform short name (`steam`, `epic`, ...).
    pub platforms: BTreeMap<String, PlatformSettings>,
}

impl Settings {
    pub fn platform(&self, platform: Platform) -> PlatformSettings {
        self.platforms
            .get(platform.short_name())
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, platform: Platform) -> bool {
        self.platform(platform).enabled
    }

    /// Credentials for `platform`: `PLAYVAULT_<PLATFORM>_ACCOUNT` and
    /// `PLAYVAULT_<PLATFORM>_TOKEN` override the file.
    pub fn credentials(&self, platform: Platform) -> PlatformCredentials {
        self.credentials_with(platform, |var| std::env::var(var).ok())
    }

    /// Like [`credentials`](Self::credentials) with a custom variable lookup.
    pub fn credentials_with(
        &self,
        platform: Platform,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> PlatformCredentials {
        let file = self.platform(platform);
        let prefix = platform.env_prefix();
        PlatformCredentials {
            account_id: lookup(&format!("{prefix}_ACCOUNT"))
                .filter(|v| !v.is_empty())
                .or(file.account_id),
            token: lookup(&format!("{prefix}_TOKEN"))
                .filter(|v| !v.is_empty())
                .or(file.token),
        }
    }

    /// Database path: the configured one or the platform data dir.
    pub fn db_path(&self) -> PathBuf {
        self.library.db_path.clone().unwrap_or_else(default_db_path)
    }

    pub fn aliases_dir(&self) -> PathBuf {
        self.library
            .aliases_dir
            .clone()
            .unwrap_or_else(|| config_dir().join("aliases"))
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Canonical path to the settings file: `~/.config/playvault/settings.toml`.
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

/// `~/.local/share/playvault/library.db` (or the platform equivalent).
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("library.db")
}

/// Load settings from `path`. A missing file yields defaults.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No settings at {}; using defaults", path.display());
            return Ok(Settings::default());
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write settings atomically (temp file, then rename).
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let io_err = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let serialized = toml::to_string_pretty(settings)?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, serialized).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
