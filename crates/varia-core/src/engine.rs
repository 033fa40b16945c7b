//! [`AssignmentEngine`]: sticky, weight-proportional variant assignment.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
  Error, Result,
  assignment::{Assignment, AssignmentRecord, NewAssignment, Subject},
  clock::{Clock, SystemClock},
  experiment::{Experiment, Variant, effective_weight},
  random::{RandomSource, StdRandom},
  store::ExperimentStore,
};

// ─── Selection ───────────────────────────────────────────────────────────────

/// Roulette-wheel selection over `variants` in their given order.
///
/// `unit` is a uniform sample from `[0, 1)`; it is scaled to
/// `r in [0, total_weight)` and the first variant whose cumulative weight
/// exceeds `r` wins, so variant `v` is chosen with probability
/// `weight(v) / total_weight`. Zero-weight variants are never chosen.
///
/// Returns `None` when there are no variants or the weights sum to zero.
pub fn pick_variant(variants: &[Variant], unit: f64) -> Option<&Variant> {
  let total: f64 = variants.iter().map(|v| effective_weight(v.weight)).sum();
  if total <= 0.0 {
    return None;
  }

  let r = unit.clamp(0.0, 1.0) * total;
  let mut cumulative = 0.0;
  for variant in variants {
    let weight = effective_weight(variant.weight);
    if weight == 0.0 {
      continue;
    }
    cumulative += weight;
    // Strict on purpose: intervals are half-open `[start, cumulative)`, so a
    // boundary `r` belongs to the next variant.
    if r < cumulative {
      return Some(variant);
    }
  }

  // Accumulated rounding left `r` past the last boundary.
  variants.iter().find(|v| effective_weight(v.weight) > 0.0)
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Hands out sticky assignments. The store's atomic get-or-create is the
/// only coordination point; the engine itself holds no per-subject state.
pub struct AssignmentEngine<S> {
  store:  Arc<S>,
  clock:  Arc<dyn Clock>,
  random: Arc<dyn RandomSource>,
}

impl<S> Clone for AssignmentEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store:  self.store.clone(),
      clock:  self.clock.clone(),
      random: self.random.clone(),
    }
  }
}

impl<S: ExperimentStore> AssignmentEngine<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self::with_sources(store, Arc::new(SystemClock), Arc::new(StdRandom::from_entropy()))
  }

  pub fn with_sources(
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
  ) -> Self {
    Self { store, clock, random }
  }

  /// Return the subject's variant for `experiment`, assigning one on first
  /// exposure.
  ///
  /// An existing assignment is always honoured, even if weights have since
  /// changed. `Ok(None)` means no assignment was made because the
  /// experiment has no selectable variant.
  pub async fn assign(
    &self,
    experiment: &Experiment,
    subject: &Subject,
  ) -> Result<Option<Assignment>> {
    let subject_key = subject.key()?;

    let existing = self
      .store
      .find_assignment(experiment.experiment_id, &subject_key)
      .await
      .map_err(Error::store)?;
    if let Some(record) = existing {
      let variant = self.variant_of(experiment, &record).await?;
      return Ok(Some(Assignment { record, variant, created: false }));
    }

    let Some(chosen) = pick_variant(&experiment.variants, self.random.next_unit())
    else {
      debug!(
        experiment = %experiment.name,
        "no selectable variant; skipping assignment"
      );
      return Ok(None);
    };

    let input = NewAssignment {
      experiment_id: experiment.experiment_id,
      variant_id:    chosen.variant_id,
      subject_key:   subject_key.clone(),
      subject:       subject.clone(),
      assigned_at:   self.clock.now(),
    };
    let (record, created) = self
      .store
      .get_or_create_assignment(input)
      .await
      .map_err(Error::store)?;

    // A concurrent request may have won the insert with another variant.
    let variant = if record.variant_id == chosen.variant_id {
      chosen.clone()
    } else {
      self.variant_of(experiment, &record).await?
    };

    if created {
      info!(
        experiment = %experiment.name,
        variant = %variant.name,
        subject = %subject_key,
        "assigned subject"
      );
    }

    Ok(Some(Assignment { record, variant, created }))
  }

  /// Resolve the variant an assignment points at, refreshing the experiment
  /// from the store if the caller's snapshot predates the variant.
  async fn variant_of(
    &self,
    experiment: &Experiment,
    record: &AssignmentRecord,
  ) -> Result<Variant> {
    if let Some(v) = experiment.variant(record.variant_id) {
      return Ok(v.clone());
    }
    self
      .store
      .get_experiment(experiment.experiment_id)
      .await
      .map_err(Error::store)?
      .and_then(|fresh| fresh.variant(record.variant_id).cloned())
      .ok_or(Error::UnknownVariant(record.variant_id))
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  fn variants(weights: &[f64]) -> Vec<Variant> {
    let experiment_id = Uuid::new_v4();
    weights
      .iter()
      .enumerate()
      .map(|(i, w)| Variant {
        variant_id: Uuid::new_v4(),
        experiment_id,
        name: format!("v{i}"),
        description: None,
        weight: *w,
        position: i as u32,
      })
      .collect()
  }

  #[test]
  fn empty_or_zero_weight_selects_nothing() {
    assert!(pick_variant(&[], 0.5).is_none());
    let zero = variants(&[0.0, 0.0, 0.0]);
    for unit in [0.0, 0.3, 0.999] {
      assert!(pick_variant(&zero, unit).is_none());
    }
  }

  #[test]
  fn boundaries_follow_cumulative_weights() {
    let vs = variants(&[50.0, 50.0]);
    assert_eq!(pick_variant(&vs, 0.0).unwrap().name, "v0");
    assert_eq!(pick_variant(&vs, 0.49).unwrap().name, "v0");
    assert_eq!(pick_variant(&vs, 0.5).unwrap().name, "v1");
    assert_eq!(pick_variant(&vs, 0.999).unwrap().name, "v1");
  }

  #[test]
  fn zero_weight_variant_is_skipped_even_at_zero() {
    let vs = variants(&[0.0, 3.0]);
    assert_eq!(pick_variant(&vs, 0.0).unwrap().name, "v1");
  }

  #[test]
  fn out_of_range_sample_falls_back_to_first_weighted() {
    let vs = variants(&[0.0, 1.0, 1.0]);
    assert_eq!(pick_variant(&vs, 1.0).unwrap().name, "v1");
  }

  #[test]
  fn negative_and_nan_weights_are_ignored() {
    let vs = variants(&[-5.0, f64::NAN, 2.0]);
    for unit in [0.0, 0.5, 0.99] {
      assert_eq!(pick_variant(&vs, unit).unwrap().name, "v2");
    }
  }

  #[test]
  fn selection_is_proportional_to_weight() {
    let vs = variants(&[40.0, 30.0, 30.0]);
    let random = StdRandom::with_seed(20_240_917);
    let draws = 20_000;
    let mut counts = [0usize; 3];
    for _ in 0..draws {
      let v = pick_variant(&vs, random.next_unit()).unwrap();
      counts[v.position as usize] += 1;
    }
    for (i, expected) in [0.40, 0.30, 0.30].into_iter().enumerate() {
      let observed = counts[i] as f64 / draws as f64;
      assert!(
        (observed - expected).abs() <= 0.03,
        "variant {i}: observed {observed}, expected {expected}"
      );
    }
  }
}
