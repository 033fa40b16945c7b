//! [`ExperimentRegistry`]: resolves experiments that are live right now.

use std::sync::Arc;

use tracing::debug;

use crate::{
  Error, Result,
  clock::{Clock, SystemClock},
  experiment::Experiment,
  store::ExperimentStore,
};

/// Looks experiments up by name and filters them by activity window.
pub struct ExperimentRegistry<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S> Clone for ExperimentRegistry<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), clock: self.clock.clone() }
  }
}

impl<S: ExperimentStore> ExperimentRegistry<S> {
  pub fn new(store: Arc<S>) -> Self { Self::with_clock(store, Arc::new(SystemClock)) }

  pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  /// Return the named experiment if it is active and the current time lies
  /// within its window. `Ok(None)` means "no active experiment": callers
  /// render their default behaviour and skip assignment.
  pub async fn resolve(&self, name: &str) -> Result<Option<Experiment>> {
    let experiment = self
      .store
      .get_experiment_by_name(name)
      .await
      .map_err(Error::store)?;

    let now = self.clock.now();
    Ok(experiment.filter(|e| {
      let live = e.is_live_at(now);
      if !live {
        debug!(experiment = %e.name, "experiment exists but is not live");
      }
      live
    }))
  }

  /// Every experiment that is live at the current instant.
  pub async fn live(&self) -> Result<Vec<Experiment>> {
    let now = self.clock.now();
    let experiments = self.store.list_experiments().await.map_err(Error::store)?;
    Ok(experiments.into_iter().filter(|e| e.is_live_at(now)).collect())
  }
}
