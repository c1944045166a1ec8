//! SQL migration definitions for the run history database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, members, cost_entries",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per pipeline run, finished or failed
CREATE TABLE IF NOT EXISTS runs (
    id              TEXT PRIMARY KEY,
    identifier      TEXT NOT NULL,
    company         TEXT,
    status          TEXT NOT NULL,
    stage           TEXT NOT NULL,
    last_completed  TEXT,
    member_count    INTEGER NOT NULL DEFAULT 0,
    cohesion_score  REAL,
    cohesion_level  TEXT,
    total_cost      INTEGER NOT NULL DEFAULT 0,
    failure_kind    TEXT,
    failure_message TEXT,
    flags_json      TEXT NOT NULL,
    report_json     TEXT,
    started_at      TEXT NOT NULL,
    finished_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);

-- Finalized group members of completed runs
CREATE TABLE IF NOT EXISTS members (
    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    rank       INTEGER NOT NULL,
    name       TEXT NOT NULL,
    title      TEXT NOT NULL,
    department TEXT NOT NULL,
    role       TEXT NOT NULL,
    influence  REAL NOT NULL,
    relevance  REAL NOT NULL,
    confidence REAL NOT NULL,
    enriched   INTEGER NOT NULL,
    PRIMARY KEY (run_id, rank)
);

-- Cost ledger entries, for completed and failed runs alike
CREATE TABLE IF NOT EXISTS cost_entries (
    run_id    TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    seq       INTEGER NOT NULL,
    kind      TEXT NOT NULL,
    units     INTEGER NOT NULL,
    succeeded INTEGER NOT NULL,
    detail    TEXT NOT NULL,
    at        TEXT NOT NULL,
    PRIMARY KEY (run_id, seq)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
