//! [`WeightRebalancer`]: shifts variant weights toward observed performance.
//!
//! Each touched variant's new weight is its share of total conversions,
//! scaled to 100 and clamped to `[min_weight, max_weight]`. Shares are
//! clamped independently, so the weights of an experiment need not sum to
//! 100 afterwards. Selection treats weights as relative strengths, so no
//! renormalisation is applied.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  experiment::{Experiment, validate_weight},
  stats::{ExperimentStats, StatsAggregator},
  store::{ExperimentStore, StatsWindow},
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tuning knobs, passed explicitly rather than read from global settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
  /// Below this many views the rebalancer leaves weights alone.
  pub min_sample: u64,
  pub min_weight: f64,
  pub max_weight: f64,
}

impl Default for RebalanceConfig {
  fn default() -> Self {
    Self { min_sample: 100, min_weight: 1.0, max_weight: 99.0 }
  }
}

impl RebalanceConfig {
  pub fn validate(&self) -> Result<()> {
    validate_weight(self.min_weight)?;
    validate_weight(self.max_weight)?;
    if self.max_weight < self.min_weight {
      return Err(Error::InvalidWeight(self.max_weight));
    }
    Ok(())
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightChange {
  pub variant_id: Uuid,
  pub name:       String,
  pub old_weight: f64,
  pub new_weight: f64,
}

/// What a rebalancing pass did. The two skip variants are policy, not
/// failures: the next scheduled pass simply tries again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RebalanceOutcome {
  InsufficientSample { views: u64, required: u64 },
  NoConversions { views: u64 },
  Applied { changes: Vec<WeightChange> },
}

/// Decide new weights from a statistics snapshot without touching the store.
pub fn plan(stats: &ExperimentStats, config: &RebalanceConfig) -> RebalanceOutcome {
  if stats.total_views < config.min_sample {
    return RebalanceOutcome::InsufficientSample {
      views:    stats.total_views,
      required: config.min_sample,
    };
  }

  let total_conversions: u64 = stats.variants.iter().map(|v| v.conversions).sum();
  if total_conversions == 0 {
    return RebalanceOutcome::NoConversions { views: stats.total_views };
  }

  let changes = stats
    .variants
    .iter()
    .filter(|v| v.views > 0)
    .map(|v| {
      let share = v.conversions as f64 / total_conversions as f64 * 100.0;
      WeightChange {
        variant_id: v.variant_id,
        name:       v.name.clone(),
        old_weight: v.weight,
        // Never panics, even on an unvalidated config.
        new_weight: share.max(config.min_weight).min(config.max_weight),
      }
    })
    .collect();

  RebalanceOutcome::Applied { changes }
}

// ─── Rebalancer ──────────────────────────────────────────────────────────────

pub struct WeightRebalancer<S> {
  store:  Arc<S>,
  stats:  StatsAggregator<S>,
  config: RebalanceConfig,
}

impl<S> Clone for WeightRebalancer<S> {
  fn clone(&self) -> Self {
    Self {
      store:  self.store.clone(),
      stats:  self.stats.clone(),
      config: self.config,
    }
  }
}

impl<S: ExperimentStore> WeightRebalancer<S> {
  /// Fails with [`Error::InvalidWeight`] if `config` does not validate.
  pub fn new(store: Arc<S>, config: RebalanceConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { stats: StatsAggregator::new(store.clone()), store, config })
  }

  pub fn config(&self) -> &RebalanceConfig { &self.config }

  /// Run one rebalancing pass over all-time statistics.
  ///
  /// Safe to repeat: with no new traffic in between, a second pass writes
  /// the same weights as the first.
  pub async fn rebalance(&self, experiment: &Experiment) -> Result<RebalanceOutcome> {
    let stats = self.stats.compute(experiment, StatsWindow::all_time()).await?;
    let outcome = plan(&stats, &self.config);

    match &outcome {
      RebalanceOutcome::InsufficientSample { views, required } => {
        debug!(
          experiment = %experiment.name,
          views,
          required,
          "not enough views to rebalance"
        );
      }
      RebalanceOutcome::NoConversions { views } => {
        debug!(experiment = %experiment.name, views, "no conversions to rebalance on");
      }
      RebalanceOutcome::Applied { changes } => {
        for change in changes {
          let found = self
            .store
            .set_variant_weight(change.variant_id, change.new_weight)
            .await
            .map_err(Error::store)?;
          if !found {
            return Err(Error::UnknownVariant(change.variant_id));
          }
          info!(
            experiment = %experiment.name,
            variant = %change.name,
            old = change.old_weight,
            new = change.new_weight,
            "rebalanced variant weight"
          );
        }
      }
    }

    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stats::VariantStats;

  fn stats(rows: &[(&str, u64, u64, f64)]) -> ExperimentStats {
    let variants: Vec<VariantStats> = rows
      .iter()
      .map(|(name, views, conversions, weight)| VariantStats {
        variant_id:       Uuid::new_v4(),
        name:             (*name).into(),
        views:            *views,
        conversions:      *conversions,
        conversion_rate:  0.0,
        weight:           *weight,
        impressions:      *views,
        conversion_value: *conversions as f64,
      })
      .collect();
    ExperimentStats {
      experiment_id:     Uuid::new_v4(),
      name:              "e".into(),
      total_views:       variants.iter().map(|v| v.views).sum(),
      total_conversions: variants.iter().map(|v| v.conversions).sum(),
      conversion_rate:   0.0,
      total_impressions: 0,
      total_value:       0.0,
      window:            StatsWindow::all_time(),
      variants,
    }
  }

  fn applied(outcome: RebalanceOutcome) -> Vec<WeightChange> {
    match outcome {
      RebalanceOutcome::Applied { changes } => changes,
      other => panic!("expected Applied, got {other:?}"),
    }
  }

  #[test]
  fn skips_below_minimum_sample() {
    let s = stats(&[("A", 60, 30, 50.0), ("B", 39, 10, 50.0)]);
    assert_eq!(
      plan(&s, &RebalanceConfig::default()),
      RebalanceOutcome::InsufficientSample { views: 99, required: 100 }
    );
  }

  #[test]
  fn skips_without_conversions() {
    let s = stats(&[("A", 100, 0, 50.0), ("B", 100, 0, 50.0)]);
    assert_eq!(
      plan(&s, &RebalanceConfig::default()),
      RebalanceOutcome::NoConversions { views: 200 }
    );
  }

  #[test]
  fn weights_follow_conversion_share() {
    let s = stats(&[("A", 100, 80, 50.0), ("B", 100, 40, 50.0)]);
    let changes = applied(plan(&s, &RebalanceConfig::default()));
    assert_eq!(changes.len(), 2);
    assert!((changes[0].new_weight - 200.0 / 3.0).abs() < 1e-9);
    assert!((changes[1].new_weight - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(changes[0].old_weight, 50.0);
  }

  #[test]
  fn weights_are_clamped_and_not_renormalised() {
    let s = stats(&[("A", 150, 50, 10.0), ("B", 150, 0, 10.0), ("C", 0, 0, 10.0)]);
    let changes = applied(plan(&s, &RebalanceConfig::default()));
    // C has no views and is left alone.
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].new_weight, 99.0);
    assert_eq!(changes[1].new_weight, 1.0);
    assert!(changes.iter().all(|c| (1.0..=99.0).contains(&c.new_weight)));
  }

  #[test]
  fn plan_is_deterministic() {
    let s = stats(&[("A", 120, 7, 33.0), ("B", 90, 3, 33.0), ("C", 10, 1, 34.0)]);
    let config = RebalanceConfig::default();
    assert_eq!(plan(&s, &config), plan(&s, &config));
  }

  #[test]
  fn inverted_config_does_not_panic() {
    let s = stats(&[("A", 100, 80, 50.0), ("B", 100, 40, 50.0)]);
    let inverted = RebalanceConfig { min_weight: 50.0, max_weight: 10.0, ..Default::default() };
    let changes = applied(plan(&s, &inverted));
    assert!(changes.iter().all(|c| c.new_weight.is_finite()));

    let nan = RebalanceConfig { min_weight: f64::NAN, ..Default::default() };
    let changes = applied(plan(&s, &nan));
    assert!(changes.iter().all(|c| c.new_weight.is_finite()));
  }

  #[test]
  fn config_validation() {
    assert!(RebalanceConfig::default().validate().is_ok());
    let inverted = RebalanceConfig { min_weight: 50.0, max_weight: 10.0, ..Default::default() };
    assert!(inverted.validate().is_err());
    let negative = RebalanceConfig { min_weight: -1.0, ..Default::default() };
    assert!(negative.validate().is_err());
  }
}
