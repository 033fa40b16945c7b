//! [`ResultRecorder`]: appends views and conversions to assignments.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  assignment::{AssignmentRecord, ConversionEvent, NewConversion, ViewEvent},
  clock::{Clock, SystemClock},
  store::ExperimentStore,
};

pub struct ResultRecorder<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S> Clone for ResultRecorder<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), clock: self.clock.clone() }
  }
}

impl<S: ExperimentStore> ResultRecorder<S> {
  pub fn new(store: Arc<S>) -> Self { Self::with_clock(store, Arc::new(SystemClock)) }

  pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  /// Log one exposure. Repeated views of the same assignment are all kept.
  pub async fn record_view(&self, assignment: &AssignmentRecord) -> Result<ViewEvent> {
    self.ensure_exists(assignment.assignment_id).await?;
    self
      .store
      .append_view(assignment.assignment_id, self.clock.now())
      .await
      .map_err(Error::store)
  }

  /// Attach a conversion to an existing assignment.
  ///
  /// `value` defaults to [`ConversionEvent::DEFAULT_VALUE`]. Fails with
  /// [`Error::InvalidReference`] if the assignment is unknown; an assignment
  /// is never created as a side effect.
  pub async fn record_conversion(
    &self,
    assignment: &AssignmentRecord,
    conversion_type: &str,
    value: Option<f64>,
  ) -> Result<ConversionEvent> {
    let value = value.unwrap_or(ConversionEvent::DEFAULT_VALUE);
    if !value.is_finite() {
      return Err(Error::InvalidValue(value));
    }
    self.ensure_exists(assignment.assignment_id).await?;

    let event = self
      .store
      .append_conversion(NewConversion {
        assignment_id:    assignment.assignment_id,
        conversion_type:  conversion_type.to_owned(),
        conversion_value: value,
        recorded_at:      self.clock.now(),
      })
      .await
      .map_err(Error::store)?;

    debug!(
      assignment = %assignment.assignment_id,
      conversion_type,
      value,
      "recorded conversion"
    );
    Ok(event)
  }

  async fn ensure_exists(&self, assignment_id: Uuid) -> Result<()> {
    self
      .store
      .get_assignment(assignment_id)
      .await
      .map_err(Error::store)?
      .map(|_| ())
      .ok_or(Error::InvalidReference(assignment_id))
  }
}
