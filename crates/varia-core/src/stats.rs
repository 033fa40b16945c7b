//! [`StatsAggregator`]: per-variant and per-experiment conversion figures.
//!
//! A "view" here is a distinct assignment: one per sticky subject, no matter
//! how many times the subject was shown the page. Raw view events are
//! reported separately as `impressions`.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  experiment::Experiment,
  store::{ExperimentStore, StatsWindow, VariantTally},
};

// ─── Snapshot types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
  pub variant_id:       Uuid,
  pub name:             String,
  pub views:            u64,
  pub conversions:      u64,
  /// Percentage in `[0, 100]`; `0` when there are no views.
  pub conversion_rate:  f64,
  /// The variant's current weight, echoed for observability.
  pub weight:           f64,
  pub impressions:      u64,
  pub conversion_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStats {
  pub experiment_id:     Uuid,
  pub name:              String,
  pub total_views:       u64,
  pub total_conversions: u64,
  pub conversion_rate:   f64,
  pub total_impressions: u64,
  pub total_value:       f64,
  pub window:            StatsWindow,
  /// In the experiment's variant order.
  pub variants:          Vec<VariantStats>,
}

/// `conversions / views * 100`, defined as `0` when there are no views.
pub fn conversion_rate(conversions: u64, views: u64) -> f64 {
  if views == 0 {
    0.0
  } else {
    conversions as f64 / views as f64 * 100.0
  }
}

/// Fold raw store tallies into a snapshot. Variants with no tally report
/// zeros; tallies for variants the experiment does not carry are ignored.
pub fn summarize(
  experiment: &Experiment,
  tallies: &[VariantTally],
  window: StatsWindow,
) -> ExperimentStats {
  let by_variant: HashMap<Uuid, &VariantTally> =
    tallies.iter().map(|t| (t.variant_id, t)).collect();

  let variants: Vec<VariantStats> = experiment
    .variants
    .iter()
    .map(|v| {
      let tally = by_variant.get(&v.variant_id).copied().cloned().unwrap_or_default();
      VariantStats {
        variant_id:       v.variant_id,
        name:             v.name.clone(),
        views:            tally.assignments,
        conversions:      tally.converted,
        conversion_rate:  conversion_rate(tally.converted, tally.assignments),
        weight:           v.weight,
        impressions:      tally.impressions,
        conversion_value: tally.conversion_value,
      }
    })
    .collect();

  let total_views = variants.iter().map(|v| v.views).sum();
  let total_conversions = variants.iter().map(|v| v.conversions).sum();

  ExperimentStats {
    experiment_id: experiment.experiment_id,
    name: experiment.name.clone(),
    total_views,
    total_conversions,
    conversion_rate: conversion_rate(total_conversions, total_views),
    total_impressions: variants.iter().map(|v| v.impressions).sum(),
    total_value: variants.iter().map(|v| v.conversion_value).sum(),
    window,
    variants,
  }
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

pub struct StatsAggregator<S> {
  store: Arc<S>,
}

impl<S> Clone for StatsAggregator<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: ExperimentStore> StatsAggregator<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Compute a read-only statistics snapshot for `experiment`.
  pub async fn compute(
    &self,
    experiment: &Experiment,
    window: StatsWindow,
  ) -> Result<ExperimentStats> {
    if let (Some(since), Some(until)) = (window.since, window.until)
      && until < since
    {
      return Err(Error::InvalidWindow);
    }

    let tallies = self
      .store
      .variant_tallies(experiment.experiment_id, window)
      .await
      .map_err(Error::store)?;
    Ok(summarize(experiment, &tallies, window))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::experiment::Variant;

  fn experiment_with(names: &[&str]) -> Experiment {
    let experiment_id = Uuid::new_v4();
    let now = Utc::now();
    Experiment {
      experiment_id,
      name: "checkout_button".into(),
      description: None,
      is_active: true,
      start_time: now,
      end_time: now,
      created_at: now,
      variants: names
        .iter()
        .enumerate()
        .map(|(i, n)| Variant {
          variant_id: Uuid::new_v4(),
          experiment_id,
          name: (*n).into(),
          description: None,
          weight: 50.0,
          position: i as u32,
        })
        .collect(),
    }
  }

  #[test]
  fn rate_is_zero_without_views() {
    assert_eq!(conversion_rate(0, 0), 0.0);
    assert_eq!(conversion_rate(5, 0), 0.0);
    assert_eq!(conversion_rate(1, 4), 25.0);
  }

  #[test]
  fn empty_experiment_reports_zeros() {
    let e = experiment_with(&["A", "B"]);
    let stats = summarize(&e, &[], StatsWindow::all_time());
    assert_eq!(stats.total_views, 0);
    assert_eq!(stats.conversion_rate, 0.0);
    assert_eq!(stats.variants.len(), 2);
    assert!(stats.variants.iter().all(|v| v.conversion_rate == 0.0));
  }

  #[test]
  fn totals_sum_variant_tallies() {
    let e = experiment_with(&["A", "B"]);
    let tallies = vec![
      VariantTally {
        variant_id:       e.variants[0].variant_id,
        assignments:      100,
        impressions:      340,
        converted:        80,
        conversion_value: 80.0,
      },
      VariantTally {
        variant_id:       e.variants[1].variant_id,
        assignments:      100,
        impressions:      310,
        converted:        40,
        conversion_value: 42.5,
      },
      VariantTally {
        variant_id:  Uuid::new_v4(),
        assignments: 7,
        ..Default::default()
      },
    ];

    let stats = summarize(&e, &tallies, StatsWindow::all_time());
    assert_eq!(stats.total_views, 200);
    assert_eq!(stats.total_conversions, 120);
    assert!((stats.conversion_rate - 60.0).abs() < 1e-9);
    assert_eq!(stats.total_impressions, 650);
    assert!((stats.variants[0].conversion_rate - 80.0).abs() < 1e-9);
    assert!((stats.variants[1].conversion_rate - 40.0).abs() < 1e-9);
    assert_eq!(stats.variants[1].weight, 50.0);
  }
}
