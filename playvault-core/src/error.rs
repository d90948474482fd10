use std::time::Duration;

use thiserror::Error;

use crate::platform::Platform;

/// Errors a platform snapshot adapter can report for one fetch.
///
/// All variants are transient from the reconciliation core's point of view:
/// the failed platform contributes its last-known-good records for the
/// current cycle and is retried on a later cycle with backoff.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Credentials were rejected or have expired
    #[error("{platform}: authentication expired")]
    AuthExpired { platform: Platform },

    /// The platform asked us to slow down
    #[error("{platform}: rate limited")]
    RateLimited {
        platform: Platform,
        /// Minimum wait the platform asked for, if it said
        retry_after: Option<Duration>,
    },

    /// The platform could not be reached
    #[error("{platform}: network unavailable: {message}")]
    NetworkUnavailable { platform: Platform, message: String },

    /// The platform answered with something we could not parse
    #[error("{platform}: malformed response: {message}")]
    MalformedResponse { platform: Platform, message: String },
}

impl FetchError {
    pub fn network(platform: Platform, msg: impl Into<String>) -> Self {
        Self::NetworkUnavailable {
            platform,
            message: msg.into(),
        }
    }

    pub fn malformed(platform: Platform, msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            platform,
            message: msg.into(),
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Self::AuthExpired { platform }
            | Self::RateLimited { platform, .. }
            | Self::NetworkUnavailable { platform, .. }
            | Self::MalformedResponse { platform, .. } => *platform,
        }
    }

    /// Wait requested by the platform, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
