//! varia server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `VARIA_*` environment variables, opens the SQLite store, starts the
//! rebalancing schedule and serves the JSON API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash`:
//!
//! ```text
//! cargo run -p varia-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use varia_api::ApiState;
use varia_core::{clock::SystemClock, random::StdRandom};
use varia_server::{AppState, ServerConfig, auth::AuthConfig, scheduler};
use varia_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Varia experiment server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Run one rebalancing pass over all live experiments and exit.
  #[arg(long)]
  rebalance_now: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("VARIA").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let api = ApiState::new(
    Arc::new(store),
    Arc::new(SystemClock),
    Arc::new(StdRandom::from_entropy()),
    server_cfg.rebalance.thresholds(),
  )
  .context("invalid [rebalance] settings")?;

  if cli.rebalance_now {
    let summary = scheduler::rebalance_all(&api).await.context("rebalance pass failed")?;
    tracing::info!(
      examined = summary.examined,
      applied = summary.applied,
      skipped = summary.skipped,
      failed = summary.failed,
      "rebalance pass finished"
    );
    return Ok(());
  }

  if let Some(period) = server_cfg.rebalance.period() {
    tracing::info!(every_secs = period.as_secs(), "scheduling rebalancer");
    scheduler::spawn_rebalancer(api.clone(), period);
  }

  let state = AppState {
    api,
    auth: Arc::new(AuthConfig {
      username:      server_cfg.admin_username.clone(),
      password_hash: server_cfg.admin_password_hash.clone(),
    }),
    config: Arc::new(server_cfg.clone()),
  };

  let app = varia_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
