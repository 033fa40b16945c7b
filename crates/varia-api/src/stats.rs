//! Handlers for statistics and on-demand rebalancing.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/experiments/:name/stats` | Optional `since`, `until` (RFC 3339) |
//! | `POST` | `/experiments/:name/rebalance` | Admin; runs one pass now |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use varia_core::{
  rebalance::RebalanceOutcome,
  stats::ExperimentStats,
  store::{ExperimentStore, StatsWindow},
};

use crate::{ApiState, error::ApiError, experiments::by_name};

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
  /// Only count subjects assigned at or after this instant.
  pub since: Option<DateTime<Utc>>,
  /// Only count subjects assigned at or before this instant.
  pub until: Option<DateTime<Utc>>,
}

/// `GET /experiments/:name/stats[?since=...][&until=...]`
pub async fn handler<S>(
  State(state): State<ApiState<S>>,
  Path(name): Path<String>,
  Query(params): Query<StatsParams>,
) -> Result<Json<ExperimentStats>, ApiError>
where
  S: ExperimentStore + 'static,
{
  let experiment = by_name(&state, &name).await?;
  let window = StatsWindow { since: params.since, until: params.until };
  Ok(Json(state.stats.compute(&experiment, window).await?))
}

/// `POST /experiments/:name/rebalance`
pub async fn rebalance<S>(
  State(state): State<ApiState<S>>,
  Path(name): Path<String>,
) -> Result<Json<RebalanceOutcome>, ApiError>
where
  S: ExperimentStore + 'static,
{
  let experiment = by_name(&state, &name).await?;
  Ok(Json(state.rebalancer.rebalance(&experiment).await?))
}
