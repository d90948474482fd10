//! Platform records: one game as reported by one storefront.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::title::normalize_title;

/// Install status of a game on one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    #[default]
    NotInstalled,
    Installed,
    Installing,
}

impl InstallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not installed",
            Self::Installed => "installed",
            Self::Installing => "installing",
        }
    }
}

/// Identifies a platform record independently of its contents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub platform: Platform,
    pub platform_game_id: String,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform.short_name(), self.platform_game_id)
    }
}

/// One game as reported by one platform in one fetch.
///
/// Records are never mutated after a fetch; a later fetch produces a new
/// record that replaces this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformGameRecord {
    pub platform: Platform,
    /// Unique within `platform` (Steam app id, Epic app name, PSN title id...).
    pub platform_game_id: String,
    pub title: String,
    /// Lowercased, punctuation-stripped title used for matching.
    pub normalized_title: String,
    #[serde(default)]
    pub install_state: InstallState,
    #[serde(default)]
    pub installed_bytes: Option<u64>,
    #[serde(default)]
    pub last_played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_playtime_minutes: u64,
    /// DLC and add-on ids owned for this game on this platform.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub owned_content: BTreeSet<String>,
    pub fetched_at: DateTime<Utc>,
}

impl PlatformGameRecord {
    /// Create a not-installed, never-played record; `normalized_title` is
    /// derived from `title`.
    pub fn new(
        platform: Platform,
        platform_game_id: impl Into<String>,
        title: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        Self {
            platform,
            platform_game_id: platform_game_id.into(),
            normalized_title: normalize_title(&title),
            title,
            install_state: InstallState::NotInstalled,
            installed_bytes: None,
            last_played_at: None,
            total_playtime_minutes: 0,
            owned_content: BTreeSet::new(),
            fetched_at,
        }
    }

    pub fn with_playtime(mut self, minutes: u64) -> Self {
        self.total_playtime_minutes = minutes;
        self
    }

    pub fn with_last_played(mut self, at: DateTime<Utc>) -> Self {
        self.last_played_at = Some(at);
        self
    }

    pub fn with_owned_content<I, S>(mut self, content_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owned_content.extend(content_ids.into_iter().map(Into::into));
        self
    }

    pub fn installed(mut self, bytes: u64) -> Self {
        self.install_state = InstallState::Installed;
        self.installed_bytes = Some(bytes);
        self
    }

    pub fn installing(mut self, bytes: u64) -> Self {
        self.install_state = InstallState::Installing;
        self.installed_bytes = Some(bytes);
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            platform: self.platform,
            platform_game_id: self.platform_game_id.clone(),
        }
    }

    /// Bytes occupied on disk, counting only fully installed copies.
    pub fn installed_size(&self) -> u64 {
        match self.install_state {
            InstallState::Installed => self.installed_bytes.unwrap_or(0),
            _ => 0,
        }
    }

    /// Re-derive `normalized_title` when an adapter left it blank.
    pub fn ensure_normalized(&mut self) {
        if self.normalized_title.trim().is_empty() {
            self.normalized_title = normalize_title(&self.title);
        }
    }
}
