//! playvault CLI
//!
//! Command-line interface for reconciling game libraries across platforms.

mod cli_types;
mod commands;
mod error;
mod spinner;

use std::io::Write;

use clap::Parser;
use env_logger::Env;
use log::Level;
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use cli_types::{Cli, Commands, ConfigAction};
use commands::Context;
pub(crate) use error::CliError;

/// Log an empty line (keeps spacing consistent whether or not output is quiet).
pub(crate) fn log_blank() {
    log::info!("");
}

/// Initialise env_logger. `RUST_LOG` wins over `-v`/`-q`.
fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default))
        .target(env_logger::Target::Stdout)
        .format(move |buf, record| {
            if verbose {
                return writeln!(
                    buf,
                    "{} {:<5} {}",
                    buf.timestamp_millis(),
                    record.level(),
                    record.args()
                );
            }
            match record.level() {
                Level::Error => writeln!(
                    buf,
                    "{} {}",
                    "error:".if_supports_color(Stdout, |t| t.red()),
                    record.args()
                ),
                Level::Warn => writeln!(
                    buf,
                    "{} {}",
                    "warning:".if_supports_color(Stdout, |t| t.yellow()),
                    record.args()
                ),
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    // These work even when the existing settings file does not parse.
    if let Commands::Config { action } = &cli.command {
        let path = cli
            .settings
            .clone()
            .unwrap_or_else(playvault_lib::settings_path);
        match action {
            ConfigAction::Path => {
                commands::config::run_config_path(&path);
                return Ok(());
            }
            ConfigAction::Init { force } => {
                return commands::config::run_config_init(&path, *force);
            }
            ConfigAction::Show => {}
        }
    }

    let ctx = Context::load(&cli)?;

    match cli.command {
        Commands::Sync {
            snapshots,
            installs,
            execute,
        } => commands::sync::run_sync(&ctx, snapshots, &installs.requests(), execute),
        Commands::List {
            platform,
            orphaned,
            stale,
        } => commands::library::run_list(&ctx, platform, orphaned, stale),
        Commands::Show { id } => commands::library::run_show(&ctx, &id),
        Commands::Duplicates { similarity } => commands::library::run_duplicates(&ctx, similarity),
        Commands::Pin { id } => commands::prefs::run_pin(&ctx, &id, true),
        Commands::Unpin { id } => commands::prefs::run_pin(&ctx, &id, false),
        Commands::Prefer { id, platform } => commands::prefs::run_prefer(&ctx, &id, platform),
        Commands::Plan { budget, installs } => {
            commands::plan::run_plan(&ctx, budget, &installs.requests())
        }
        Commands::Config { .. } => commands::config::run_config_show(&ctx),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
