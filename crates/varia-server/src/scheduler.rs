//! Periodic weight rebalancing.

use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};
use varia_api::ApiState;
use varia_core::{rebalance::RebalanceOutcome, store::ExperimentStore};

/// Totals from one pass over every live experiment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
  pub examined: usize,
  pub applied:  usize,
  pub skipped:  usize,
  pub failed:   usize,
}

/// Rebalance every experiment that is live right now.
///
/// A failure on one experiment is logged and counted; the pass continues
/// with the next one. Only failing to list experiments aborts the pass.
pub async fn rebalance_all<S>(api: &ApiState<S>) -> varia_core::Result<PassSummary>
where
  S: ExperimentStore + 'static,
{
  let mut summary = PassSummary::default();
  for experiment in api.registry.live().await? {
    summary.examined += 1;
    match api.rebalancer.rebalance(&experiment).await {
      Ok(RebalanceOutcome::Applied { .. }) => summary.applied += 1,
      Ok(_) => summary.skipped += 1,
      Err(e) => {
        summary.failed += 1;
        warn!(experiment = %experiment.name, error = %e, "rebalance failed");
      }
    }
  }
  Ok(summary)
}

/// Spawn a task that calls [`rebalance_all`] every `period`.
///
/// The first pass runs one full period after startup. Ticks missed while a
/// pass is still running are skipped.
pub fn spawn_rebalancer<S>(api: ApiState<S>, period: Duration) -> JoinHandle<()>
where
  S: ExperimentStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
      ticker.tick().await;
      match rebalance_all(&api).await {
        Ok(s) => info!(
          examined = s.examined,
          applied = s.applied,
          skipped = s.skipped,
          failed = s.failed,
          "scheduled rebalance finished"
        ),
        Err(e) => warn!(error = %e, "scheduled rebalance could not list experiments"),
      }
    }
  })
}
