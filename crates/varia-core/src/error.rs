//! Error types for `varia-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A view or conversion referenced an assignment that does not exist.
  #[error("assignment not found: {0}")]
  InvalidReference(Uuid),

  #[error("subject has neither a user id nor a session id")]
  AnonymousSubject,

  #[error("invalid weight {0}: weights must be finite and non-negative")]
  InvalidWeight(f64),

  #[error("invalid conversion value {0}: values must be finite")]
  InvalidValue(f64),

  #[error("activity window ends before it starts")]
  InvalidWindow,

  #[error("duplicate variant name {0:?}")]
  DuplicateVariant(String),

  /// An assignment points at a variant the experiment no longer carries.
  #[error("unknown variant: {0}")]
  UnknownVariant(Uuid),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error. Used as `.map_err(Error::store)`.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
