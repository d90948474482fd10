use std::sync::Arc;

use playvault_lib::{Orchestrator, OrchestratorConfig, SyncError};
use playvault_reconcile::InstallRequest;

use super::{Context, print_plan};
use crate::CliError;

pub(crate) fn run_plan(
    ctx: &Context,
    budget: Option<u64>,
    requests: &[InstallRequest],
) -> Result<(), CliError> {
    let budget = budget.or(ctx.settings.storage.budget_bytes).ok_or_else(|| {
        CliError::config("No disk budget. Pass --budget or set [storage].budget_bytes.")
    })?;

    let store = Arc::new(ctx.open_store()?);
    let orchestrator = Orchestrator::new(store, OrchestratorConfig::from_settings(&ctx.settings));
    let plan = orchestrator
        .plan_storage(budget, requests)
        .map_err(|e| match e {
            SyncError::Plan(e) => CliError::plan(e.to_string()),
            other => CliError::database(other.to_string()),
        })?;

    print_plan(&plan);
    Ok(())
}
