//! Experiments and their variants.
//!
//! Both are owned by the admin surface. The core only reads them, except for
//! variant weights, which the rebalancer rewrites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Variant ─────────────────────────────────────────────────────────────────

/// One treatment arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
  pub variant_id:    Uuid,
  pub experiment_id: Uuid,
  /// Unique within the owning experiment.
  pub name:          String,
  pub description:   Option<String>,
  /// Relative selection strength. Finite and `>= 0`; weights across an
  /// experiment are not required to sum to any fixed total.
  pub weight:        f64,
  /// Stable selection order within the experiment.
  pub position:      u32,
}

// ─── Experiment ──────────────────────────────────────────────────────────────

/// A named, time-bounded A/B test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
  pub experiment_id: Uuid,
  pub name:          String,
  pub description:   Option<String>,
  pub is_active:     bool,
  pub start_time:    DateTime<Utc>,
  pub end_time:      DateTime<Utc>,
  pub created_at:    DateTime<Utc>,
  /// Sorted by [`Variant::position`].
  pub variants:      Vec<Variant>,
}

impl Experiment {
  /// Whether the experiment is switched on and `now` falls inside
  /// `[start_time, end_time]` (both bounds inclusive).
  pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
    self.is_active && self.start_time <= now && now <= self.end_time
  }

  /// Sum of all non-negative, finite variant weights.
  pub fn total_weight(&self) -> f64 {
    self.variants.iter().map(|v| effective_weight(v.weight)).sum()
  }

  pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
    self.variants.iter().find(|v| v.variant_id == variant_id)
  }

  pub fn variant_named(&self, name: &str) -> Option<&Variant> {
    self.variants.iter().find(|v| v.name == name)
  }
}

/// The weight a variant actually contributes to selection. Negative and
/// non-finite weights never reach the store, but a hand-edited row could.
pub(crate) fn effective_weight(weight: f64) -> f64 {
  if weight.is_finite() && weight > 0.0 { weight } else { 0.0 }
}

/// Reject weights that are negative, NaN or infinite.
pub fn validate_weight(weight: f64) -> Result<f64> {
  if weight.is_finite() && weight >= 0.0 {
    Ok(weight)
  } else {
    Err(Error::InvalidWeight(weight))
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// A variant as supplied by the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
  pub weight:      f64,
}

/// Input to [`crate::store::ExperimentStore::create_experiment`]. Identity
/// and `created_at` are assigned by the store; variant positions follow the
/// order of `variants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExperiment {
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default = "default_active")]
  pub is_active:   bool,
  pub start_time:  DateTime<Utc>,
  pub end_time:    DateTime<Utc>,
  #[serde(default)]
  pub variants:    Vec<NewVariant>,
}

fn default_active() -> bool { true }

impl NewExperiment {
  /// Check the invariants the store relies on: a well-ordered window, valid
  /// weights, and variant names unique within the experiment.
  pub fn validate(&self) -> Result<()> {
    if self.end_time < self.start_time {
      return Err(Error::InvalidWindow);
    }
    for (i, v) in self.variants.iter().enumerate() {
      validate_weight(v.weight)?;
      if self.variants[..i].iter().any(|other| other.name == v.name) {
        return Err(Error::DuplicateVariant(v.name.clone()));
      }
    }
    Ok(())
  }
}
