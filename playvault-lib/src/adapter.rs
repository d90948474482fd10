//! Platform snapshot adapters.
//!
//! An adapter fetches one platform's owned-game list and normalizes it into
//! [`PlatformGameRecord`]s. The orchestrator runs every adapter as its own
//! task, so adapters must be `Send + Sync` and return boxed futures.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use playvault_core::{FetchError, InstallState, Platform, PlatformGameRecord};
use serde::Deserialize;

/// Per-platform account credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformCredentials {
    pub account_id: Option<String>,
    pub token: Option<String>,
}

impl PlatformCredentials {
    pub fn is_empty(&self) -> bool {
        self.account_id.is_none() && self.token.is_none()
    }
}

/// Source of one platform's library.
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn fetch_library<'a>(
        &'a self,
        credentials: &'a PlatformCredentials,
    ) -> BoxFuture<'a, Result<Vec<PlatformGameRecord>, FetchError>>;
}

// ── File snapshots ──────────────────────────────────────────────────────────

/// One game as written in a snapshot file. `fetched_at` defaults to the
/// time the file was read.
#[derive(Debug, Deserialize)]
struct FileRecord {
    platform_game_id: String,
    title: String,
    #[serde(default)]
    install_state: InstallState,
    #[serde(default)]
    installed_bytes: Option<u64>,
    #[serde(default)]
    last_played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    total_playtime_minutes: u64,
    #[serde(default)]
    owned_content: Vec<String>,
    #[serde(default)]
    fetched_at: Option<DateTime<Utc>>,
}

/// A failure recorded in a snapshot file instead of records.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FileFailure {
    AuthExpired,
    RateLimited {
        #[serde(default)]
        retry_after_secs: Option<u64>,
    },
    NetworkUnavailable {
        #[serde(default)]
        message: String,
    },
    MalformedResponse {
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    records: Vec<FileRecord>,
    #[serde(default)]
    error: Option<FileFailure>,
}

/// Reads `<dir>/<platform>.json`, an exported library snapshot.
///
/// The file holds either `{"records": [...]}` or `{"error": {"kind": ...}}`.
/// A missing file is reported as the platform being unreachable.
pub struct SnapshotFileAdapter {
    platform: Platform,
    path: PathBuf,
}

impl SnapshotFileAdapter {
    pub fn new(platform: Platform, dir: &Path) -> Self {
        Self {
            platform,
            path: snapshot_path(dir, platform),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<PlatformGameRecord>, FetchError> {
        let platform = self.platform;
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            FetchError::network(platform, format!("{}: {}", self.path.display(), e))
        })?;
        let file: SnapshotFile = serde_json::from_str(&contents)
            .map_err(|e| FetchError::malformed(platform, e.to_string()))?;

        if let Some(failure) = file.error {
            return Err(match failure {
                FileFailure::AuthExpired => FetchError::AuthExpired { platform },
                FileFailure::RateLimited { retry_after_secs } => FetchError::RateLimited {
                    platform,
                    retry_after: retry_after_secs.map(std::time::Duration::from_secs),
                },
                FileFailure::NetworkUnavailable { message } => FetchError::network(platform, message),
                FileFailure::MalformedResponse { message } => FetchError::malformed(platform, message),
            });
        }

        let now = Utc::now();
        file.records
            .into_iter()
            .map(|r| {
                if r.platform_game_id.trim().is_empty() {
                    return Err(FetchError::malformed(
                        platform,
                        format!("record '{}' has an empty platform_game_id", r.title),
                    ));
                }
                let mut record = PlatformGameRecord::new(
                    platform,
                    r.platform_game_id,
                    r.title,
                    r.fetched_at.unwrap_or(now),
                );
                record.install_state = r.install_state;
                record.installed_bytes = r.installed_bytes;
                record.last_played_at = r.last_played_at;
                record.total_playtime_minutes = r.total_playtime_minutes;
                Ok(record.with_owned_content(r.owned_content))
            })
            .collect()
    }
}

impl PlatformAdapter for SnapshotFileAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn fetch_library<'a>(
        &'a self,
        _credentials: &'a PlatformCredentials,
    ) -> BoxFuture<'a, Result<Vec<PlatformGameRecord>, FetchError>> {
        Box::pin(async move {
            let records = self.read()?;
            log::debug!(
                "{}: read {} records from {}",
                self.platform.short_name(),
                records.len(),
                self.path.display()
            );
            Ok(records)
        })
    }
}

/// `<dir>/<platform short name>.json`
pub fn snapshot_path(dir: &Path, platform: Platform) -> PathBuf {
    dir.join(format!("{}.json", platform.short_name()))
}

/// Platforms that have a snapshot file in `dir`.
pub fn discover_snapshots(dir: &Path) -> Vec<Platform> {
    Platform::all()
        .iter()
        .copied()
        .filter(|p| snapshot_path(dir, *p).is_file())
        .collect()
}
