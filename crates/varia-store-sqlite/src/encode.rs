//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that string comparison in SQL orders them
//! chronologically. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use uuid::Uuid;
use varia_core::{
  assignment::{AssignmentRecord, ConversionEvent, SubjectKey, ViewEvent},
  experiment::{Experiment, Variant},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop precision the column cannot hold, so values built in memory compare
/// equal to what a later read returns.
pub fn normalize_dt(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Counters ────────────────────────────────────────────────────────────────

pub fn decode_count(n: i64) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Decode(format!("negative count: {n}")))
}

pub fn decode_position(n: i64) -> Result<u32> {
  u32::try_from(n).map_err(|_| Error::Decode(format!("bad variant position: {n}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `experiments` row.
pub struct RawExperiment {
  pub experiment_id: String,
  pub name:          String,
  pub description:   Option<String>,
  pub is_active:     bool,
  pub start_time:    String,
  pub end_time:      String,
  pub created_at:    String,
}

impl RawExperiment {
  pub const COLUMNS: &'static str =
    "experiment_id, name, description, is_active, start_time, end_time, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      experiment_id: row.get(0)?,
      name:          row.get(1)?,
      description:   row.get(2)?,
      is_active:     row.get(3)?,
      start_time:    row.get(4)?,
      end_time:      row.get(5)?,
      created_at:    row.get(6)?,
    })
  }

  /// Combine with the experiment's variant rows, which must already be in
  /// position order.
  pub fn into_experiment(self, variants: Vec<RawVariant>) -> Result<Experiment> {
    Ok(Experiment {
      experiment_id: decode_uuid(&self.experiment_id)?,
      name:          self.name,
      description:   self.description,
      is_active:     self.is_active,
      start_time:    decode_dt(&self.start_time)?,
      end_time:      decode_dt(&self.end_time)?,
      created_at:    decode_dt(&self.created_at)?,
      variants:      variants
        .into_iter()
        .map(RawVariant::into_variant)
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw values read directly from a `variants` row.
pub struct RawVariant {
  pub variant_id:    String,
  pub experiment_id: String,
  pub name:          String,
  pub description:   Option<String>,
  pub weight:        f64,
  pub position:      i64,
}

impl RawVariant {
  pub const COLUMNS: &'static str =
    "variant_id, experiment_id, name, description, weight, position";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      variant_id:    row.get(0)?,
      experiment_id: row.get(1)?,
      name:          row.get(2)?,
      description:   row.get(3)?,
      weight:        row.get(4)?,
      position:      row.get(5)?,
    })
  }

  pub fn into_variant(self) -> Result<Variant> {
    Ok(Variant {
      variant_id:    decode_uuid(&self.variant_id)?,
      experiment_id: decode_uuid(&self.experiment_id)?,
      name:          self.name,
      description:   self.description,
      weight:        self.weight,
      position:      decode_position(self.position)?,
    })
  }
}

/// Raw values read directly from an `assignments` row.
pub struct RawAssignment {
  pub assignment_id: String,
  pub experiment_id: String,
  pub variant_id:    String,
  pub subject_key:   String,
  pub user_id:       Option<String>,
  pub session_id:    Option<String>,
  pub assigned_at:   String,
}

impl RawAssignment {
  pub const COLUMNS: &'static str =
    "assignment_id, experiment_id, variant_id, subject_key, user_id, session_id, assigned_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      assignment_id: row.get(0)?,
      experiment_id: row.get(1)?,
      variant_id:    row.get(2)?,
      subject_key:   row.get(3)?,
      user_id:       row.get(4)?,
      session_id:    row.get(5)?,
      assigned_at:   row.get(6)?,
    })
  }

  pub fn into_record(self) -> Result<AssignmentRecord> {
    Ok(AssignmentRecord {
      assignment_id: decode_uuid(&self.assignment_id)?,
      experiment_id: decode_uuid(&self.experiment_id)?,
      variant_id:    decode_uuid(&self.variant_id)?,
      subject_key:   SubjectKey::from_stored(self.subject_key),
      user_id:       self.user_id,
      session_id:    self.session_id,
      assigned_at:   decode_dt(&self.assigned_at)?,
    })
  }
}

/// Per-variant aggregate row from the tally query.
pub struct RawTally {
  pub variant_id:       String,
  pub assignments:      i64,
  pub impressions:      i64,
  pub converted:        i64,
  pub conversion_value: f64,
}

impl RawTally {
  pub fn into_tally(self) -> Result<varia_core::store::VariantTally> {
    Ok(varia_core::store::VariantTally {
      variant_id:       decode_uuid(&self.variant_id)?,
      assignments:      decode_count(self.assignments)?,
      impressions:      decode_count(self.impressions)?,
      converted:        decode_count(self.converted)?,
      conversion_value: self.conversion_value,
    })
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

// Events are built in memory before insert, so they only need encoding.

pub fn view_params(view: &ViewEvent) -> (String, String, String) {
  (
    encode_uuid(view.view_id),
    encode_uuid(view.assignment_id),
    encode_dt(view.recorded_at),
  )
}

pub fn conversion_params(c: &ConversionEvent) -> (String, String, String, f64, String) {
  (
    encode_uuid(c.conversion_id),
    encode_uuid(c.assignment_id),
    c.conversion_type.clone(),
    c.conversion_value,
    encode_dt(c.recorded_at),
  )
}
