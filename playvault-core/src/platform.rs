use serde::{Deserialize, Serialize};

/// Storefront identifiers for every platform the library aggregates.
///
/// This enum centralizes platform identity (short names, display names,
/// aliases, and title priority) in one place so that adapters, settings,
/// and the reconciliation core never match on ad-hoc strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Steam,
    Epic,
    Xbox,
    Psn,
    Gog,
}

/// All platform variants in registration order.
const ALL_PLATFORMS: &[Platform] = &[
    Platform::Steam,
    Platform::Epic,
    Platform::Xbox,
    Platform::Psn,
    Platform::Gog,
];

impl Platform {
    /// Canonical short name used for CLI, settings sections, and snapshot files.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Steam => "steam",
            Self::Epic => "epic",
            Self::Xbox => "xbox",
            Self::Psn => "psn",
            Self::Gog => "gog",
        }
    }

    /// Full display name for the platform.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Steam => "Steam",
            Self::Epic => "Epic Games Store",
            Self::Xbox => "Xbox",
            Self::Psn => "PlayStation Network",
            Self::Gog => "GOG",
        }
    }

    /// All accepted names for this platform (case-insensitive matching).
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Steam => &["steam", "valve"],
            Self::Epic => &["epic", "egs", "epic games", "epicgames"],
            Self::Xbox => &["xbox", "microsoft", "msstore", "xbox live"],
            Self::Psn => &["psn", "playstation", "ps", "sony"],
            Self::Gog => &["gog", "gog galaxy", "galaxy"],
        }
    }

    /// Rank used to break display-title ties: lower wins.
    ///
    /// The order is STEAM > GOG > EPIC > XBOX > PSN and must never change,
    /// otherwise re-merging an unchanged library would flip titles.
    pub fn title_priority(&self) -> u8 {
        match self {
            Self::Steam => 0,
            Self::Gog => 1,
            Self::Epic => 2,
            Self::Xbox => 3,
            Self::Psn => 4,
        }
    }

    /// Environment variable prefix for this platform's credentials.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Steam => "PLAYVAULT_STEAM",
            Self::Epic => "PLAYVAULT_EPIC",
            Self::Xbox => "PLAYVAULT_XBOX",
            Self::Psn => "PLAYVAULT_PSN",
            Self::Gog => "PLAYVAULT_GOG",
        }
    }

    /// All 5 platform variants.
    pub fn all() -> &'static [Platform] {
        ALL_PLATFORMS
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Error returned when a string cannot be parsed into a `Platform`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown platform: '{0}'")]
pub struct PlatformParseError(pub String);

impl std::str::FromStr for Platform {
    type Err = PlatformParseError;

    /// Parse a platform from any recognized name (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ALL_PLATFORMS
            .iter()
            .copied()
            .find(|p| p.aliases().contains(&lower.as_str()))
            .ok_or_else(|| PlatformParseError(s.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/platform_tests.rs"]
mod tests;
