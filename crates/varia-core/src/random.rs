//! Uniform random numbers for variant selection.

use std::sync::Mutex;

use rand::{Rng as _, SeedableRng as _, rngs::StdRng};

/// Yields independent samples uniformly distributed in `[0, 1)`.
pub trait RandomSource: Send + Sync {
  fn next_unit(&self) -> f64;
}

/// [`StdRng`] behind a mutex so one engine can serve concurrent requests.
pub struct StdRandom {
  rng: Mutex<StdRng>,
}

impl StdRandom {
  pub fn from_entropy() -> Self {
    Self { rng: Mutex::new(StdRng::from_entropy()) }
  }

  /// Deterministic sequence, for tests and replays.
  pub fn with_seed(seed: u64) -> Self {
    Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
  }
}

impl Default for StdRandom {
  fn default() -> Self { Self::from_entropy() }
}

impl RandomSource for StdRandom {
  fn next_unit(&self) -> f64 {
    self
      .rng
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .r#gen::<f64>()
  }
}
