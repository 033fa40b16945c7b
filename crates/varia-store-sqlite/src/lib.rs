//! SQLite backend for the Varia experiment store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Sticky assignment relies on the
//! `UNIQUE (experiment_id, subject_key)` constraint, so several service
//! instances may share one database file.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
