//! The `ExperimentStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `varia-store-sqlite`).
//! The services in this crate and the HTTP layer depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  assignment::{
    AssignmentRecord, ConversionEvent, NewAssignment, NewConversion,
    SubjectKey, ViewEvent,
  },
  experiment::{Experiment, NewExperiment},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Restricts statistics to assignments made within a time range. Both bounds
/// are inclusive; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsWindow {
  pub since: Option<DateTime<Utc>>,
  pub until: Option<DateTime<Utc>>,
}

impl StatsWindow {
  pub fn all_time() -> Self { Self::default() }
}

/// Raw per-variant counts returned by [`ExperimentStore::variant_tallies`].
/// Variants without any assignment in the window may be omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantTally {
  pub variant_id:        Uuid,
  /// Distinct assignment records.
  pub assignments:       u64,
  /// Raw view events across those assignments.
  pub impressions:       u64,
  /// Assignments with at least one conversion whose value is `> 0`.
  pub converted:         u64,
  /// Sum of all conversion values, positive or not.
  pub conversion_value:  f64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a durable, transactional experiment store.
///
/// Assignments, views, and conversions are append-only. The only mutable
/// state is experiment activity and variant weights.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ExperimentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Experiments (admin surface) ───────────────────────────────────────

  /// Persist a new experiment with its variants. The input must already
  /// have passed [`NewExperiment::validate`].
  fn create_experiment(
    &self,
    input: NewExperiment,
  ) -> impl Future<Output = Result<Experiment, Self::Error>> + Send + '_;

  /// Retrieve an experiment and its variants. Returns `None` if not found.
  fn get_experiment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Experiment>, Self::Error>> + Send + '_;

  /// Retrieve an experiment by its unique name, regardless of activity.
  fn get_experiment_by_name<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Experiment>, Self::Error>> + Send + 'a;

  /// List all experiments, ordered by name.
  fn list_experiments(
    &self,
  ) -> impl Future<Output = Result<Vec<Experiment>, Self::Error>> + Send + '_;

  /// Switch an experiment on or off. Returns `false` if it does not exist.
  fn set_experiment_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Overwrite a variant's weight. Returns `false` if it does not exist.
  fn set_variant_weight(
    &self,
    variant_id: Uuid,
    weight: f64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Assignments ───────────────────────────────────────────────────────

  /// Atomically insert the assignment unless one already exists for
  /// `(experiment_id, subject_key)`; in either case return the stored record.
  ///
  /// The boolean is `true` when this call inserted the record. Concurrent
  /// callers for the same subject all observe the same winning record.
  fn get_or_create_assignment(
    &self,
    input: NewAssignment,
  ) -> impl Future<Output = Result<(AssignmentRecord, bool), Self::Error>>
  + Send
  + '_;

  /// Look up the existing assignment for a subject, if any.
  fn find_assignment<'a>(
    &'a self,
    experiment_id: Uuid,
    subject_key: &'a SubjectKey,
  ) -> impl Future<Output = Result<Option<AssignmentRecord>, Self::Error>>
  + Send
  + 'a;

  fn get_assignment(
    &self,
    assignment_id: Uuid,
  ) -> impl Future<Output = Result<Option<AssignmentRecord>, Self::Error>>
  + Send
  + '_;

  // ── Events (append-only) ───────────────────────────────────────────

  fn append_view(
    &self,
    assignment_id: Uuid,
    recorded_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<ViewEvent, Self::Error>> + Send + '_;

  fn append_conversion(
    &self,
    input: NewConversion,
  ) -> impl Future<Output = Result<ConversionEvent, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Per-variant counts for an experiment, restricted to assignments whose
  /// `assigned_at` falls inside `window`.
  fn variant_tallies(
    &self,
    experiment_id: Uuid,
    window: StatsWindow,
  ) -> impl Future<Output = Result<Vec<VariantTally>, Self::Error>> + Send + '_;
}
