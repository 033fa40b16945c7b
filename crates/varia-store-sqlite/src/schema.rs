//! SQL schema for the Varia SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS experiments (
    experiment_id TEXT PRIMARY KEY,
    name          TEXT NOT NULL UNIQUE,
    description   TEXT,
    is_active     INTEGER NOT NULL DEFAULT 1,
    start_time    TEXT NOT NULL,   -- fixed-width RFC 3339 UTC
    end_time      TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    CHECK (end_time >= start_time)
);

-- Weight is the only column the core ever updates.
CREATE TABLE IF NOT EXISTS variants (
    variant_id    TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id),
    name          TEXT NOT NULL,
    description   TEXT,
    weight        REAL NOT NULL CHECK (weight >= 0),
    position      INTEGER NOT NULL,
    UNIQUE (experiment_id, name)
);

-- One row per (experiment, subject). First insert wins; never updated.
CREATE TABLE IF NOT EXISTS assignments (
    assignment_id TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id),
    variant_id    TEXT NOT NULL REFERENCES variants(variant_id),
    subject_key   TEXT NOT NULL,   -- 'user:<id>' | 'session:<id>'
    user_id       TEXT,
    session_id    TEXT,
    assigned_at   TEXT NOT NULL,
    UNIQUE (experiment_id, subject_key)
);

-- Append-only event streams.
CREATE TABLE IF NOT EXISTS views (
    view_id       TEXT PRIMARY KEY,
    assignment_id TEXT NOT NULL REFERENCES assignments(assignment_id),
    recorded_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversions (
    conversion_id    TEXT PRIMARY KEY,
    assignment_id    TEXT NOT NULL REFERENCES assignments(assignment_id),
    conversion_type  TEXT NOT NULL,
    conversion_value REAL NOT NULL DEFAULT 1.0,
    recorded_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS variants_experiment_idx    ON variants(experiment_id, position);
CREATE INDEX IF NOT EXISTS assignments_variant_idx    ON assignments(variant_id);
CREATE INDEX IF NOT EXISTS assignments_assigned_idx   ON assignments(experiment_id, assigned_at);
CREATE INDEX IF NOT EXISTS views_assignment_idx       ON views(assignment_id);
CREATE INDEX IF NOT EXISTS conversions_assignment_idx ON conversions(assignment_id);

PRAGMA user_version = 1;
";
