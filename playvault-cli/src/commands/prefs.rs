use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use playvault_catalog::CanonicalGameId;
use playvault_core::Platform;
use playvault_reconcile::StoreError;

use super::Context;
use crate::CliError;

fn store_error(id: &str, e: StoreError) -> CliError {
    match e {
        StoreError::NotFound(_) => CliError::unknown_game(id),
        StoreError::PlatformNotOwned { platform, .. } => CliError::NotOwned {
            id: id.to_string(),
            platform,
        },
        other => CliError::database(other.to_string()),
    }
}

pub(crate) fn run_pin(ctx: &Context, id: &str, pinned: bool) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let version = store
        .set_pinned(&CanonicalGameId::new(id), pinned)
        .map_err(|e| store_error(id, e))?;
    log::info!(
        "{} {} (library version {})",
        if pinned { "Pinned" } else { "Unpinned" },
        id.if_supports_color(Stdout, |t| t.bold()),
        version
    );
    Ok(())
}

pub(crate) fn run_prefer(ctx: &Context, id: &str, platform: Platform) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let version = store
        .set_preferred_platform(&CanonicalGameId::new(id), Some(platform))
        .map_err(|e| store_error(id, e))?;
    log::info!(
        "{} will install from {} (library version {})",
        id.if_supports_color(Stdout, |t| t.bold()),
        platform.display_name().if_supports_color(Stdout, |t| t.cyan()),
        version
    );
    Ok(())
}
