//! [`SqliteStore`]: the SQLite implementation of [`ExperimentStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;
use varia_core::{
  assignment::{
    AssignmentRecord, ConversionEvent, NewAssignment, NewConversion,
    SubjectKey, ViewEvent,
  },
  experiment::{Experiment, NewExperiment, Variant},
  store::{ExperimentStore, StatsWindow, VariantTally},
};

use crate::{
  Error, Result,
  encode::{
    RawAssignment, RawExperiment, RawTally, RawVariant, conversion_params,
    encode_dt, encode_uuid, normalize_dt, view_params,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Varia experiment store backed by a single SQLite file.
///
/// Clones share one reference-counted connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch one experiment (plus variants) matching `column = value`.
  async fn load_experiment(
    &self,
    column: &'static str,
    value: String,
  ) -> Result<Option<Experiment>> {
    let raw: Option<(RawExperiment, Vec<RawVariant>)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM experiments WHERE {column} = ?1",
          RawExperiment::COLUMNS
        );
        let Some(experiment) = conn
          .query_row(&sql, rusqlite::params![value], RawExperiment::from_row)
          .optional()?
        else {
          return Ok(None);
        };
        let variants = select_variants(conn, &experiment.experiment_id)?;
        Ok(Some((experiment, variants)))
      })
      .await?;

    raw
      .map(|(experiment, variants)| experiment.into_experiment(variants))
      .transpose()
  }
}

fn select_variants(
  conn: &rusqlite::Connection,
  experiment_id: &str,
) -> rusqlite::Result<Vec<RawVariant>> {
  let sql = format!(
    "SELECT {} FROM variants WHERE experiment_id = ?1 ORDER BY position, variant_id",
    RawVariant::COLUMNS
  );
  let mut stmt = conn.prepare(&sql)?;
  stmt
    .query_map(rusqlite::params![experiment_id], RawVariant::from_row)?
    .collect()
}

// ─── ExperimentStore impl ────────────────────────────────────────────────────

impl ExperimentStore for SqliteStore {
  type Error = Error;

  // ── Experiments ───────────────────────────────────────────────────────────

  async fn create_experiment(&self, input: NewExperiment) -> Result<Experiment> {
    let experiment_id = Uuid::new_v4();
    let experiment = Experiment {
      experiment_id,
      name:        input.name,
      description: input.description,
      is_active:   input.is_active,
      start_time:  normalize_dt(input.start_time),
      end_time:    normalize_dt(input.end_time),
      created_at:  normalize_dt(Utc::now()),
      variants:    input
        .variants
        .into_iter()
        .enumerate()
        .map(|(i, v)| Variant {
          variant_id: Uuid::new_v4(),
          experiment_id,
          name: v.name,
          description: v.description,
          weight: v.weight,
          position: i as u32,
        })
        .collect(),
    };

    let row = (
      encode_uuid(experiment.experiment_id),
      experiment.name.clone(),
      experiment.description.clone(),
      experiment.is_active,
      encode_dt(experiment.start_time),
      encode_dt(experiment.end_time),
      encode_dt(experiment.created_at),
    );
    let variant_rows: Vec<_> = experiment
      .variants
      .iter()
      .map(|v| {
        (
          encode_uuid(v.variant_id),
          v.name.clone(),
          v.description.clone(),
          v.weight,
          i64::from(v.position),
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO experiments (
             experiment_id, name, description, is_active,
             start_time, end_time, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![row.0, row.1, row.2, row.3, row.4, row.5, row.6],
        )?;
        for (variant_id, name, description, weight, position) in variant_rows {
          tx.execute(
            "INSERT INTO variants (
               variant_id, experiment_id, name, description, weight, position
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![variant_id, row.0, name, description, weight, position],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(experiment)
  }

  async fn get_experiment(&self, id: Uuid) -> Result<Option<Experiment>> {
    self.load_experiment("experiment_id", encode_uuid(id)).await
  }

  async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
    self.load_experiment("name", name.to_owned()).await
  }

  async fn list_experiments(&self) -> Result<Vec<Experiment>> {
    let raws: Vec<(RawExperiment, Vec<RawVariant>)> = self
      .conn
      .call(|conn| {
        let sql = format!(
          "SELECT {} FROM experiments ORDER BY name",
          RawExperiment::COLUMNS
        );
        let experiments = {
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map([], RawExperiment::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut out = Vec::with_capacity(experiments.len());
        for experiment in experiments {
          let variants = select_variants(conn, &experiment.experiment_id)?;
          out.push((experiment, variants));
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|(experiment, variants)| experiment.into_experiment(variants))
      .collect()
  }

  async fn set_experiment_active(&self, id: Uuid, active: bool) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE experiments SET is_active = ?1 WHERE experiment_id = ?2",
          rusqlite::params![active, id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn set_variant_weight(&self, variant_id: Uuid, weight: f64) -> Result<bool> {
    let id_str = encode_uuid(variant_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE variants SET weight = ?1 WHERE variant_id = ?2",
          rusqlite::params![weight, id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Assignments ───────────────────────────────────────────────────────────

  async fn get_or_create_assignment(
    &self,
    input: NewAssignment,
  ) -> Result<(AssignmentRecord, bool)> {
    let assignment_id = encode_uuid(Uuid::new_v4());
    let experiment_id = encode_uuid(input.experiment_id);
    let variant_id    = encode_uuid(input.variant_id);
    let subject_key   = input.subject_key.as_str().to_owned();
    let user_id       = input.subject.user_id;
    let session_id    = input.subject.session_id;
    let assigned_at   = encode_dt(input.assigned_at);

    let lookup_key = subject_key.clone();
    let (raw, inserted): (Option<RawAssignment>, bool) = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front, so two processes sharing
        // the file cannot both read "absent" and then collide on upgrade.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
          "INSERT INTO assignments (
             assignment_id, experiment_id, variant_id, subject_key,
             user_id, session_id, assigned_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (experiment_id, subject_key) DO NOTHING",
          rusqlite::params![
            assignment_id,
            experiment_id,
            variant_id,
            subject_key,
            user_id,
            session_id,
            assigned_at,
          ],
        )?;
        let sql = format!(
          "SELECT {} FROM assignments WHERE experiment_id = ?1 AND subject_key = ?2",
          RawAssignment::COLUMNS
        );
        let raw = tx
          .query_row(&sql, rusqlite::params![experiment_id, subject_key], RawAssignment::from_row)
          .optional()?;
        tx.commit()?;
        Ok((raw, inserted == 1))
      })
      .await?;

    let raw = raw.ok_or(Error::AssignmentVanished(lookup_key))?;
    Ok((raw.into_record()?, inserted))
  }

  async fn find_assignment(
    &self,
    experiment_id: Uuid,
    subject_key: &SubjectKey,
  ) -> Result<Option<AssignmentRecord>> {
    let experiment_id = encode_uuid(experiment_id);
    let subject_key   = subject_key.as_str().to_owned();

    let raw: Option<RawAssignment> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM assignments WHERE experiment_id = ?1 AND subject_key = ?2",
          RawAssignment::COLUMNS
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![experiment_id, subject_key], RawAssignment::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAssignment::into_record).transpose()
  }

  async fn get_assignment(&self, assignment_id: Uuid) -> Result<Option<AssignmentRecord>> {
    let id_str = encode_uuid(assignment_id);

    let raw: Option<RawAssignment> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM assignments WHERE assignment_id = ?1",
          RawAssignment::COLUMNS
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawAssignment::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAssignment::into_record).transpose()
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn append_view(
    &self,
    assignment_id: Uuid,
    recorded_at: DateTime<Utc>,
  ) -> Result<ViewEvent> {
    let view = ViewEvent {
      view_id: Uuid::new_v4(),
      assignment_id,
      recorded_at: normalize_dt(recorded_at),
    };
    let (view_id, assignment_id, at) = view_params(&view);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO views (view_id, assignment_id, recorded_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![view_id, assignment_id, at],
        )?;
        Ok(())
      })
      .await?;

    Ok(view)
  }

  async fn append_conversion(&self, input: NewConversion) -> Result<ConversionEvent> {
    let event = ConversionEvent {
      conversion_id:    Uuid::new_v4(),
      assignment_id:    input.assignment_id,
      conversion_type:  input.conversion_type,
      conversion_value: input.conversion_value,
      recorded_at:      normalize_dt(input.recorded_at),
    };
    let (conversion_id, assignment_id, kind, value, at) = conversion_params(&event);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO conversions (
             conversion_id, assignment_id, conversion_type, conversion_value, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![conversion_id, assignment_id, kind, value, at],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn variant_tallies(
    &self,
    experiment_id: Uuid,
    window: StatsWindow,
  ) -> Result<Vec<VariantTally>> {
    let experiment_id = encode_uuid(experiment_id);
    let since = window.since.map(encode_dt);
    let until = window.until.map(encode_dt);

    let raws: Vec<RawTally> = self
      .conn
      .call(move |conn| {
        // Views and conversions are pre-aggregated per assignment so that
        // each assignment contributes at most once to `converted`.
        let mut stmt = conn.prepare(
          "SELECT
             a.variant_id,
             COUNT(*)                                              AS assignments,
             COALESCE(SUM(v.n), 0)                                 AS impressions,
             COALESCE(SUM(CASE WHEN c.positive > 0 THEN 1 ELSE 0 END), 0) AS converted,
             COALESCE(SUM(c.total), 0.0)                           AS conversion_value
           FROM assignments a
           LEFT JOIN (
             SELECT assignment_id, COUNT(*) AS n
             FROM views GROUP BY assignment_id
           ) v ON v.assignment_id = a.assignment_id
           LEFT JOIN (
             SELECT assignment_id,
                    SUM(CASE WHEN conversion_value > 0 THEN 1 ELSE 0 END) AS positive,
                    SUM(conversion_value)                                AS total
             FROM conversions GROUP BY assignment_id
           ) c ON c.assignment_id = a.assignment_id
           WHERE a.experiment_id = ?1
             AND (?2 IS NULL OR a.assigned_at >= ?2)
             AND (?3 IS NULL OR a.assigned_at <= ?3)
           GROUP BY a.variant_id",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![experiment_id, since, until], |row| {
            Ok(RawTally {
              variant_id:       row.get(0)?,
              assignments:      row.get(1)?,
              impressions:      row.get(2)?,
              converted:        row.get(3)?,
              conversion_value: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTally::into_tally).collect()
  }
}
