//! HTTP server for Varia: configuration, admin auth, and the rebalancing
//! schedule wrapped around [`varia_api`].

pub mod auth;
pub mod error;
pub mod scheduler;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use varia_api::ApiState;
use varia_core::{rebalance::RebalanceConfig, store::ExperimentStore};

use auth::{AuthConfig, require_admin};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `VARIA_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  pub admin_username:      String,
  pub admin_password_hash: String,
  #[serde(default)]
  pub rebalance:           RebalanceSettings,
}

/// `[rebalance]` table. Every key is optional.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RebalanceSettings {
  /// Seconds between scheduled passes. `0` disables the schedule.
  pub interval_secs: u64,
  pub min_sample:    u64,
  pub min_weight:    f64,
  pub max_weight:    f64,
}

impl Default for RebalanceSettings {
  fn default() -> Self {
    let thresholds = RebalanceConfig::default();
    Self {
      interval_secs: 24 * 60 * 60,
      min_sample:    thresholds.min_sample,
      min_weight:    thresholds.min_weight,
      max_weight:    thresholds.max_weight,
    }
  }
}

impl RebalanceSettings {
  pub fn thresholds(&self) -> RebalanceConfig {
    RebalanceConfig {
      min_sample: self.min_sample,
      min_weight: self.min_weight,
      max_weight: self.max_weight,
    }
  }

  pub fn period(&self) -> Option<Duration> {
    (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state for the whole server.
pub struct AppState<S> {
  pub api:    ApiState<S>,
  pub config: Arc<ServerConfig>,
  pub auth:   Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      api:    self.api.clone(),
      config: self.config.clone(),
      auth:   self.auth.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server [`Router`]: public routes under `/api`, Basic-auth
/// protected admin routes under `/api/admin`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ExperimentStore + 'static,
{
  let admin = varia_api::admin_router(state.api.clone())
    .route_layer(middleware::from_fn_with_state(state.auth.clone(), require_admin));

  Router::new()
    .nest("/api", varia_api::public_router(state.api.clone()))
    .nest("/api/admin", admin)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::json;
  use tower::ServiceExt as _;
  use varia_core::{clock::SystemClock, random::StdRandom};
  use varia_store_sqlite::SqliteStore;

  use crate::auth::tests::{basic, hashed};

  async fn make_state() -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let auth = hashed("admin", "secret");
    let config = ServerConfig {
      host:                "127.0.0.1".to_string(),
      port:                8080,
      store_path:          PathBuf::from(":memory:"),
      admin_username:      auth.username.clone(),
      admin_password_hash: auth.password_hash.clone(),
      rebalance:           RebalanceSettings::default(),
    };
    AppState {
      api:    ApiState::new(
        Arc::new(store),
        Arc::new(SystemClock),
        Arc::new(StdRandom::with_seed(5)),
        config.rebalance.thresholds(),
      )
      .unwrap(),
      config: Arc::new(config),
      auth:   Arc::new(auth),
    }
  }

  fn create_body() -> String {
    let now = chrono::Utc::now();
    json!({
      "name": "hero_banner",
      "start_time": now - chrono::Duration::hours(1),
      "end_time": now + chrono::Duration::days(1),
      "variants": [{ "name": "control", "weight": 1.0 }],
    })
    .to_string()
  }

  async fn status_of(state: &AppState<SqliteStore>, req: Request<Body>) -> StatusCode {
    router(state.clone()).oneshot(req).await.unwrap().status()
  }

  #[tokio::test]
  async fn admin_requires_credentials() {
    let state = make_state().await;
    let req = Request::builder()
      .uri("/api/admin/experiments")
      .body(Body::empty())
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn admin_rejects_wrong_password() {
    let state = make_state().await;
    let req = Request::builder()
      .uri("/api/admin/experiments")
      .header(header::AUTHORIZATION, basic("admin", "nope"))
      .body(Body::empty())
      .unwrap();
    assert_eq!(status_of(&state, req).await, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn admin_create_then_public_assign() {
    let state = make_state().await;
    let req = Request::builder()
      .method("POST")
      .uri("/api/admin/experiments")
      .header(header::AUTHORIZATION, basic("admin", "secret"))
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(create_body()))
      .unwrap();
    assert_eq!(status_of(&state, req).await, StatusCode::CREATED);

    let req = Request::builder()
      .method("POST")
      .uri("/api/experiments/hero_banner/assign")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(json!({ "session_id": "s-1" }).to_string()))
      .unwrap();
    assert_eq!(status_of(&state, req).await, StatusCode::OK);
  }

  #[test]
  fn rebalance_settings_defaults() {
    let settings = RebalanceSettings::default();
    assert_eq!(settings.period(), Some(Duration::from_secs(86_400)));
    assert_eq!(settings.thresholds(), RebalanceConfig::default());

    let off = RebalanceSettings { interval_secs: 0, ..settings };
    assert_eq!(off.period(), None);
  }
}
