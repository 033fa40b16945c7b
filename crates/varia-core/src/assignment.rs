//! Subjects, assignment records, and the event streams attached to them.
//!
//! An assignment is written once, on a subject's first exposure to an
//! experiment, and never changes afterwards. Views and conversions are
//! append-only streams keyed by assignment.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, experiment::Variant};

// ─── Subject ─────────────────────────────────────────────────────────────────

/// The unit of assignment: a signed-in user, an anonymous session, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  #[serde(default)]
  pub user_id:    Option<String>,
  #[serde(default)]
  pub session_id: Option<String>,
}

impl Subject {
  pub fn user(id: impl Into<String>) -> Self {
    Self { user_id: Some(id.into()), session_id: None }
  }

  pub fn session(id: impl Into<String>) -> Self {
    Self { user_id: None, session_id: Some(id.into()) }
  }

  /// The identity used for stickiness. A user id wins over a session id so
  /// that a signed-in subject keeps its variant across sessions.
  pub fn key(&self) -> Result<SubjectKey> {
    fn non_empty(s: &Option<String>) -> Option<&str> {
      s.as_deref().filter(|s| !s.is_empty())
    }
    if let Some(user) = non_empty(&self.user_id) {
      Ok(SubjectKey(format!("user:{user}")))
    } else if let Some(session) = non_empty(&self.session_id) {
      Ok(SubjectKey(format!("session:{session}")))
    } else {
      Err(Error::AnonymousSubject)
    }
  }
}

/// Normalised subject identity; unique per experiment in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
  pub fn as_str(&self) -> &str { &self.0 }

  /// Rebuild a key read back from storage.
  pub fn from_stored(s: String) -> Self { Self(s) }
}

impl fmt::Display for SubjectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── AssignmentRecord ────────────────────────────────────────────────────────

/// Links a subject to the variant it was shown. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
  pub assignment_id: Uuid,
  pub experiment_id: Uuid,
  pub variant_id:    Uuid,
  pub subject_key:   SubjectKey,
  pub user_id:       Option<String>,
  pub session_id:    Option<String>,
  /// Server-assigned; never changes after creation.
  pub assigned_at:   DateTime<Utc>,
}

/// Input to [`crate::store::ExperimentStore::get_or_create_assignment`].
#[derive(Debug, Clone)]
pub struct NewAssignment {
  pub experiment_id: Uuid,
  pub variant_id:    Uuid,
  pub subject_key:   SubjectKey,
  pub subject:       Subject,
  pub assigned_at:   DateTime<Utc>,
}

/// The answer to "which variant does this subject see?".
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
  pub record:  AssignmentRecord,
  pub variant: Variant,
  /// `true` when this call wrote the record, `false` when an existing one
  /// (possibly from a concurrent caller) was returned.
  pub created: bool,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// One exposure of an assigned subject. Views are not deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewEvent {
  pub view_id:       Uuid,
  pub assignment_id: Uuid,
  pub recorded_at:   DateTime<Utc>,
}

/// An outcome attributed to an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
  pub conversion_id:    Uuid,
  pub assignment_id:    Uuid,
  /// Free-form label, e.g. `"purchase"` or `"test_drive_booked"`.
  pub conversion_type:  String,
  /// Positive values count as a conversion; zero or negative values are
  /// kept for history but do not.
  pub conversion_value: f64,
  pub recorded_at:      DateTime<Utc>,
}

impl ConversionEvent {
  /// The value recorded when the caller does not supply one.
  pub const DEFAULT_VALUE: f64 = 1.0;
}

/// Input to [`crate::store::ExperimentStore::append_conversion`].
#[derive(Debug, Clone)]
pub struct NewConversion {
  pub assignment_id:    Uuid,
  pub conversion_type:  String,
  pub conversion_value: f64,
  pub recorded_at:      DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn user_id_takes_precedence_over_session() {
    let subject = Subject {
      user_id:    Some("42".into()),
      session_id: Some("abc".into()),
    };
    assert_eq!(subject.key().unwrap().as_str(), "user:42");
  }

  #[test]
  fn session_only_subject() {
    assert_eq!(Subject::session("abc").key().unwrap().as_str(), "session:abc");
  }

  #[test]
  fn empty_identifiers_are_anonymous() {
    let subject = Subject {
      user_id:    Some(String::new()),
      session_id: None,
    };
    assert!(matches!(subject.key(), Err(Error::AnonymousSubject)));
    assert!(matches!(Subject::default().key(), Err(Error::AnonymousSubject)));
  }

  #[test]
  fn empty_user_id_falls_back_to_session() {
    let subject = Subject {
      user_id:    Some(String::new()),
      session_id: Some("abc".into()),
    };
    assert_eq!(subject.key().unwrap().as_str(), "session:abc");
  }
}
