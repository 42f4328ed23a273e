//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: threads, triage runs, tasks
    r#"
    CREATE TABLE IF NOT EXISTS threads (
        provider                     TEXT NOT NULL,
        thread_id                    TEXT NOT NULL,
        subject                      TEXT,
        last_seen_at                 TEXT,
        last_analyzed_at             TEXT,
        digest_bucket                TEXT,
        last_seen_change_marker      TEXT,
        last_analyzed_change_marker  TEXT,
        PRIMARY KEY (provider, thread_id)
    );

    -- Append-only; one row per triage invocation
    CREATE TABLE IF NOT EXISTS triage_runs (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        provider         TEXT NOT NULL,
        thread_id        TEXT NOT NULL,
        run_at           TEXT NOT NULL,
        model            TEXT,
        confidence       REAL,
        output_json      TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_triage_runs_thread ON triage_runs(provider, thread_id);

    CREATE TABLE IF NOT EXISTS tasks (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        task_key         TEXT NOT NULL,
        provider         TEXT NOT NULL,
        thread_id        TEXT NOT NULL,
        created_at       TEXT NOT NULL,
        status           TEXT NOT NULL DEFAULT 'open',
        priority         TEXT NOT NULL,
        title            TEXT NOT NULL,
        due_date         TEXT,
        notes            TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
    CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_date);
    CREATE UNIQUE INDEX IF NOT EXISTS ux_tasks_task_key ON tasks(task_key);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
