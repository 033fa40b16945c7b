//! Request-path handlers: resolve, assign, and record outcomes.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/experiments/:name/active` | Experiment if live now, else `null` |
//! | `POST` | `/experiments/:name/assign` | Body: `{"user_id"?, "session_id"?}`; `null` when nothing is assigned |
//! | `POST` | `/assignments/:id/views` | 201 + view event |
//! | `POST` | `/assignments/:id/conversions` | Body: `{"conversion_type", "conversion_value"?}` |
//!
//! "No active experiment" is answered with `200 null` so that callers fall
//! through to their default rendering instead of handling an error.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use varia_core::{
  Error as CoreError,
  assignment::{Assignment, AssignmentRecord, Subject},
  experiment::Experiment,
  store::ExperimentStore,
};

use crate::{ApiState, error::ApiError};

// ─── Resolve ──────────────────────────────────────────────────────────────────

/// `GET /experiments/:name/active`
pub async fn active<S>(
  State(state): State<ApiState<S>>,
  Path(name): Path<String>,
) -> Result<Json<Option<Experiment>>, ApiError>
where
  S: ExperimentStore + 'static,
{
  Ok(Json(state.registry.resolve(&name).await?))
}

// ─── Assign ───────────────────────────────────────────────────────────────────

/// `POST /experiments/:name/assign`; the body is the [`Subject`].
pub async fn assign<S>(
  State(state): State<ApiState<S>>,
  Path(name): Path<String>,
  Json(subject): Json<Subject>,
) -> Result<Json<Option<Assignment>>, ApiError>
where
  S: ExperimentStore + 'static,
{
  let Some(experiment) = state.registry.resolve(&name).await? else {
    return Ok(Json(None));
  };
  Ok(Json(state.engine.assign(&experiment, &subject).await?))
}

// ─── Record ───────────────────────────────────────────────────────────────────

async fn load_assignment<S>(state: &ApiState<S>, id: Uuid) -> Result<AssignmentRecord, ApiError>
where
  S: ExperimentStore + 'static,
{
  state
    .store
    .get_assignment(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| CoreError::InvalidReference(id).into())
}

/// `POST /assignments/:id/views`
pub async fn record_view<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExperimentStore + 'static,
{
  let record = load_assignment(&state, id).await?;
  let view = state.recorder.record_view(&record).await?;
  Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct ConversionBody {
  pub conversion_type:  String,
  /// Defaults to `1.0`.
  pub conversion_value: Option<f64>,
}

/// `POST /assignments/:id/conversions`
pub async fn record_conversion<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ConversionBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExperimentStore + 'static,
{
  let record = load_assignment(&state, id).await?;
  let event = state
    .recorder
    .record_conversion(&record, &body.conversion_type, body.conversion_value)
    .await?;
  Ok((StatusCode::CREATED, Json(event)))
}
