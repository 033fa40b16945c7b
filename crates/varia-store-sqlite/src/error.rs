//! Error type for `varia-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("invalid stored value: {0}")]
  Decode(String),

  /// The insert lost a race but the winning row could not be read back.
  #[error("assignment for {0} vanished after insert")]
  AssignmentVanished(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
