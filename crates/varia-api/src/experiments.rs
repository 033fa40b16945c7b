//! Admin handlers for `/experiments`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/experiments` | All experiments, live or not |
//! | `POST` | `/experiments` | Body: [`NewExperiment`]; 201, 409 on duplicate name |
//! | `GET`  | `/experiments/:name` | 404 if not found |
//! | `PUT`  | `/experiments/:name/active` | Body: `{"is_active": bool}` |
//! | `PUT`  | `/experiments/:name/variants/:variant/weight` | Body: `{"weight": f64}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use varia_core::{
  experiment::{Experiment, NewExperiment, Variant, validate_weight},
  store::ExperimentStore,
};

use crate::{ApiState, error::ApiError};

/// Fetch an experiment by name regardless of activity, or 404.
pub(crate) async fn by_name<S>(state: &ApiState<S>, name: &str) -> Result<Experiment, ApiError>
where
  S: ExperimentStore + 'static,
{
  state
    .store
    .get_experiment_by_name(name)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("experiment {name:?} not found")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /experiments`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<Experiment>>, ApiError>
where
  S: ExperimentStore + 'static,
{
  let experiments = state.store.list_experiments().await.map_err(ApiError::store)?;
  Ok(Json(experiments))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /experiments`: 201 with the stored [`Experiment`].
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewExperiment>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExperimentStore + 'static,
{
  body.validate()?;
  if state
    .store
    .get_experiment_by_name(&body.name)
    .await
    .map_err(ApiError::store)?
    .is_some()
  {
    return Err(ApiError::Conflict(format!("experiment {:?} already exists", body.name)));
  }

  let experiment = state
    .store
    .create_experiment(body)
    .await
    .map_err(ApiError::store)?;
  info!(experiment = %experiment.name, variants = experiment.variants.len(), "created experiment");
  Ok((StatusCode::CREATED, Json(experiment)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /experiments/:name`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(name): Path<String>,
) -> Result<Json<Experiment>, ApiError>
where
  S: ExperimentStore + 'static,
{
  Ok(Json(by_name(&state, &name).await?))
}

// ─── Activity ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub is_active: bool,
}

/// `PUT /experiments/:name/active`
pub async fn set_active<S>(
  State(state): State<ApiState<S>>,
  Path(name): Path<String>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<Experiment>, ApiError>
where
  S: ExperimentStore + 'static,
{
  let mut experiment = by_name(&state, &name).await?;
  let found = state
    .store
    .set_experiment_active(experiment.experiment_id, body.is_active)
    .await
    .map_err(ApiError::store)?;
  if !found {
    return Err(ApiError::NotFound(format!("experiment {name:?} not found")));
  }
  experiment.is_active = body.is_active;
  info!(experiment = %name, is_active = body.is_active, "changed experiment activity");
  Ok(Json(experiment))
}

// ─── Weight ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WeightBody {
  pub weight: f64,
}

/// `PUT /experiments/:name/variants/:variant/weight`
pub async fn set_weight<S>(
  State(state): State<ApiState<S>>,
  Path((name, variant)): Path<(String, String)>,
  Json(body): Json<WeightBody>,
) -> Result<Json<Variant>, ApiError>
where
  S: ExperimentStore + 'static,
{
  let weight = validate_weight(body.weight)?;
  let experiment = by_name(&state, &name).await?;
  let mut target = experiment
    .variant_named(&variant)
    .cloned()
    .ok_or_else(|| ApiError::NotFound(format!("variant {variant:?} not found in {name:?}")))?;

  let found = state
    .store
    .set_variant_weight(target.variant_id, weight)
    .await
    .map_err(ApiError::store)?;
  if !found {
    return Err(ApiError::NotFound(format!("variant {variant:?} not found in {name:?}")));
  }
  info!(experiment = %name, variant = %variant, old = target.weight, new = weight, "set variant weight");
  target.weight = weight;
  Ok(Json(target))
}
