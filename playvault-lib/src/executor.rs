//! Install executors: the side that acts on a storage plan.

use chrono::Utc;
use futures::future::BoxFuture;
use playvault_catalog::{ExecutionOutcome, ExecutionReport, PlanAction, StoragePlanItem};
use playvault_reconcile::StoragePlan;

use crate::cancel::CancelToken;

/// Carries out INSTALL and EVICT items. KEEP items are never passed in.
pub trait InstallExecutor: Send + Sync {
    fn execute<'a>(&'a self, item: &'a StoragePlanItem) -> BoxFuture<'a, ExecutionReport>;
}

/// Reports every action as done without touching the disk.
///
/// Useful for previewing what the ledger will look like after a plan.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

impl InstallExecutor for DryRunExecutor {
    fn execute<'a>(&'a self, item: &'a StoragePlanItem) -> BoxFuture<'a, ExecutionReport> {
        Box::pin(async move {
            log::info!(
                "[dry run] {} {} on {} ({})",
                item.action.as_str(),
                item.canonical_id,
                item.platform,
                item.reason
            );
            success_report(item)
        })
    }
}

/// The report a successful execution of `item` produces.
pub fn success_report(item: &StoragePlanItem) -> ExecutionReport {
    let bytes = item.bytes.min(i64::MAX as u64) as i64;
    ExecutionReport {
        canonical_id: item.canonical_id.clone(),
        platform: item.platform,
        outcome: ExecutionOutcome::Success,
        bytes_delta: match item.action {
            PlanAction::Install => bytes,
            PlanAction::Evict => -bytes,
            PlanAction::Keep => 0,
        },
        reported_at: Utc::now(),
        message: None,
    }
}

/// Run a plan's actionable items in order: evictions first, then installs.
///
/// Stops before the next item once `cancel` fires; items already started run
/// to completion.
pub async fn execute_plan(
    executor: &dyn InstallExecutor,
    plan: &StoragePlan,
    cancel: &CancelToken,
) -> Vec<ExecutionReport> {
    let mut reports = Vec::new();
    for item in plan.evictions().chain(plan.installs()) {
        if cancel.is_cancelled() {
            log::info!("execution cancelled; {} items done", reports.len());
            break;
        }
        let report = executor.execute(item).await;
        if report.outcome == ExecutionOutcome::Failure {
            log::warn!(
                "{} {} on {} failed: {}",
                item.action.as_str(),
                item.canonical_id,
                item.platform,
                report.message.as_deref().unwrap_or("no details")
            );
        }
        reports.push(report);
    }
    reports
}
