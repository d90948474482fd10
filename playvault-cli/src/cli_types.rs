//! CLI type definitions: command enums and argument structs.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};

use playvault_core::Platform;
use playvault_core::util::parse_bytes;
use playvault_reconcile::InstallRequest;

#[derive(Parser)]
#[command(name = "playvault")]
#[command(about = "Reconcile game libraries across Steam, Epic, Xbox, PSN and GOG", long_about = None)]
pub(crate) struct Cli {
    /// Library database path (defaults to the settings value or the data dir;
    /// `:memory:` for a throwaway database)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Settings file path (defaults to ~/.config/playvault/settings.toml)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Only show warnings and errors (suppress normal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose/debug logging (timestamps + debug-level messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Install requests shared by `sync` and `plan`.
#[derive(Args, Clone, Default)]
pub(crate) struct InstallArgs {
    /// Request an install: ID[:PLATFORM][=BYTES] (e.g., portal-2:steam=12GB)
    #[arg(long = "install", value_name = "SPEC")]
    pub installs: Vec<InstallSpec>,
}

impl InstallArgs {
    pub fn requests(&self) -> Vec<InstallRequest> {
        self.installs.iter().map(InstallSpec::to_request).collect()
    }
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Fetch every platform, reconcile, and commit the unified library
    Sync {
        /// Directory holding <platform>.json library exports
        #[arg(long)]
        snapshots: Option<PathBuf>,

        #[command(flatten)]
        installs: InstallArgs,

        /// Carry out the storage plan with the dry-run executor
        #[arg(long)]
        execute: bool,
    },

    /// List unified library entries
    List {
        /// Only games owned on this platform
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Show orphaned entries instead of active ones
        #[arg(long)]
        orphaned: bool,

        /// Only entries carried over from a failed platform fetch
        #[arg(long)]
        stale: bool,
    },

    /// Show one entry and its per-platform records
    Show {
        /// Canonical game id (e.g., portal-2)
        id: String,
    },

    /// Report games owned on several platforms and likely missed merges
    Duplicates {
        /// Title similarity at or above which two entries are reported
        #[arg(long, default_value_t = 0.6)]
        similarity: f64,
    },

    /// Protect a game's installed copies from eviction
    Pin { id: String },

    /// Allow a game's installed copies to be evicted again
    Unpin { id: String },

    /// Set the platform a game should be installed from
    Prefer {
        id: String,
        /// Platform name or alias (e.g., steam, gog, ps)
        platform: Platform,
    },

    /// Plan installs and evictions under a disk budget
    Plan {
        /// Disk budget (e.g., 500GB). Defaults to [storage].budget_bytes
        #[arg(long, value_parser = parse_budget)]
        budget: Option<u64>,

        #[command(flatten)]
        installs: InstallArgs,
    },

    /// Manage the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show effective settings and where credentials come from
    Show,

    /// Print the settings file path
    Path,

    /// Write a settings file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_budget(s: &str) -> Result<u64, String> {
    parse_bytes(s).ok_or_else(|| format!("invalid byte size '{s}'"))
}

/// A parsed `--install ID[:PLATFORM][=BYTES]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InstallSpec {
    pub id: String,
    pub platform: Option<Platform>,
    pub bytes: u64,
}

impl InstallSpec {
    pub fn to_request(&self) -> InstallRequest {
        let request = InstallRequest::new(self.id.as_str().into(), self.bytes);
        match self.platform {
            Some(p) => request.on(p),
            None => request,
        }
    }
}

impl FromStr for InstallSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, bytes) = match s.split_once('=') {
            Some((target, size)) => {
                let bytes = parse_bytes(size).ok_or_else(|| format!("invalid byte size '{size}'"))?;
                (target, bytes)
            }
            None => (s, 0),
        };
        let (id, platform) = match target.split_once(':') {
            Some((id, platform)) => {
                let platform = platform.parse::<Platform>().map_err(|e| e.to_string())?;
                (id, Some(platform))
            }
            None => (target, None),
        };
        let id = id.trim();
        if id.is_empty() {
            return Err(format!("missing game id in '{s}'"));
        }
        Ok(Self {
            id: id.to_string(),
            platform,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_spec_full_form() {
        let spec: InstallSpec = "portal-2:steam=12GB".parse().unwrap();
        assert_eq!(spec.id, "portal-2");
        assert_eq!(spec.platform, Some(Platform::Steam));
        assert_eq!(spec.bytes, 12 * 1024 * 1024 * 1024);
    }

    #[test]
    fn install_spec_optional_parts() {
        let spec: InstallSpec = "hades".parse().unwrap();
        assert_eq!(spec.platform, None);
        assert_eq!(spec.bytes, 0);

        let spec: InstallSpec = "hades=1500".parse().unwrap();
        assert_eq!(spec.bytes, 1500);
        assert_eq!(spec.to_request().platform, None);
    }

    #[test]
    fn install_spec_rejects_bad_input() {
        assert!("".parse::<InstallSpec>().is_err());
        assert!(":steam".parse::<InstallSpec>().is_err());
        assert!("hades:dreamcast".parse::<InstallSpec>().is_err());
        assert!("hades=lots".parse::<InstallSpec>().is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "playvault",
            "plan",
            "--budget",
            "10GB",
            "--install",
            "celeste:gog=2GB",
            "-q",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Plan { budget, installs } => {
                assert_eq!(budget, Some(10 * 1024 * 1024 * 1024));
                assert_eq!(installs.installs.len(), 1);
                assert_eq!(installs.requests()[0].platform, Some(Platform::Gog));
            }
            _ => panic!("expected plan"),
        }
    }
}
