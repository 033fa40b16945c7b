//! JSON REST API for Varia.
//!
//! Exposes axum [`Router`]s backed by any
//! [`varia_core::store::ExperimentStore`]. The public router serves request
//! handlers (assign, record, stats); the admin router manages experiments.
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", varia_api::public_router(state.clone()))
//! .nest("/api/admin", varia_api::admin_router(state))
//! ```

pub mod assignments;
pub mod error;
pub mod experiments;
pub mod stats;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use varia_core::{
  clock::Clock,
  engine::AssignmentEngine,
  random::RandomSource,
  rebalance::{RebalanceConfig, WeightRebalancer},
  recorder::ResultRecorder,
  registry::ExperimentRegistry,
  stats::StatsAggregator,
  store::ExperimentStore,
};

pub use error::ApiError;

// ─── State ────────────────────────────────────────────────────────────────────

/// The core services, sharing one store, threaded through all handlers.
pub struct ApiState<S> {
  pub store:      Arc<S>,
  pub registry:   ExperimentRegistry<S>,
  pub engine:     AssignmentEngine<S>,
  pub recorder:   ResultRecorder<S>,
  pub stats:      StatsAggregator<S>,
  pub rebalancer: WeightRebalancer<S>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      registry:   self.registry.clone(),
      engine:     self.engine.clone(),
      recorder:   self.recorder.clone(),
      stats:      self.stats.clone(),
      rebalancer: self.rebalancer.clone(),
    }
  }
}

impl<S: ExperimentStore> ApiState<S> {
  pub fn new(
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    rebalance: RebalanceConfig,
  ) -> varia_core::Result<Self> {
    Ok(Self {
      registry:   ExperimentRegistry::with_clock(store.clone(), clock.clone()),
      engine:     AssignmentEngine::with_sources(store.clone(), clock.clone(), random),
      recorder:   ResultRecorder::with_clock(store.clone(), clock),
      stats:      StatsAggregator::new(store.clone()),
      rebalancer: WeightRebalancer::new(store.clone(), rebalance)?,
      store,
    })
  }
}

// ─── Routers ──────────────────────────────────────────────────────────────────

/// Routes called from request handling: resolve, assign, record, stats.
pub fn public_router<S>(state: ApiState<S>) -> Router<()>
where
  S: ExperimentStore + 'static,
{
  Router::new()
    .route("/experiments/{name}/active", get(assignments::active::<S>))
    .route("/experiments/{name}/assign", post(assignments::assign::<S>))
    .route("/experiments/{name}/stats", get(stats::handler::<S>))
    .route("/assignments/{id}/views", post(assignments::record_view::<S>))
    .route("/assignments/{id}/conversions", post(assignments::record_conversion::<S>))
    .with_state(state)
}

/// Routes for the admin surface: experiment management and manual rebalance.
pub fn admin_router<S>(state: ApiState<S>) -> Router<()>
where
  S: ExperimentStore + 'static,
{
  Router::new()
    .route("/experiments", get(experiments::list::<S>).post(experiments::create::<S>))
    .route("/experiments/{name}", get(experiments::get_one::<S>))
    .route("/experiments/{name}/active", put(experiments::set_active::<S>))
    .route(
      "/experiments/{name}/variants/{variant}/weight",
      put(experiments::set_weight::<S>),
    )
    .route("/experiments/{name}/rebalance", post(stats::rebalance::<S>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
