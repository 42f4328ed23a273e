//! Database repository layer
//!
//! Provides query and insert operations for threads, triage runs and tasks.

use crate::error::{Error, Result};
use crate::staleness;
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

const TASK_COLUMNS: &str =
    "t.id, t.task_key, t.provider, t.thread_id, t.created_at, t.status, t.priority, t.title, t.due_date, t.notes";

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Thread operations
    // ============================================

    /// Record that a thread was observed. Analysis state is left untouched.
    pub fn upsert_thread(
        &self,
        provider: &str,
        thread_id: &str,
        subject: &str,
        seen_at: DateTime<Utc>,
        change_marker: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO threads (provider, thread_id, subject, last_seen_at, last_seen_change_marker)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(provider, thread_id) DO UPDATE SET
                subject = excluded.subject,
                last_seen_at = excluded.last_seen_at,
                last_seen_change_marker = excluded.last_seen_change_marker
            "#,
            params![provider, thread_id, subject, seen_at.to_rfc3339(), change_marker],
        )?;
        Ok(())
    }

    /// Get a thread by its key
    pub fn get_thread(&self, provider: &str, thread_id: &str) -> Result<Option<ThreadRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM threads WHERE provider = ?1 AND thread_id = ?2",
            params![provider, thread_id],
            Self::row_to_thread,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Whether a thread needs triage given the marker observed now.
    ///
    /// Unknown threads and threads observed without a marker always do.
    pub fn should_analyze_thread(
        &self,
        provider: &str,
        thread_id: &str,
        observed_marker: Option<&str>,
    ) -> Result<bool> {
        let Some(observed) = observed_marker else {
            return Ok(true);
        };
        let conn = self.conn.lock().unwrap();
        let stored: Option<Option<String>> = conn
            .query_row(
                "SELECT last_analyzed_change_marker FROM threads WHERE provider = ?1 AND thread_id = ?2",
                params![provider, thread_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match stored {
            None => true,
            Some(stored) => staleness::should_analyze(stored.as_deref(), observed),
        })
    }

    /// Overwrite a thread's digest bucket.
    pub fn set_digest_bucket(&self, provider: &str, thread_id: &str, bucket: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE threads SET digest_bucket = ?1 WHERE provider = ?2 AND thread_id = ?3",
            params![bucket, provider, thread_id],
        )?;
        Ok(())
    }

    fn row_to_thread(row: &Row) -> rusqlite::Result<ThreadRecord> {
        let seen_str: Option<String> = row.get("last_seen_at")?;
        let analyzed_str: Option<String> = row.get("last_analyzed_at")?;

        Ok(ThreadRecord {
            provider: row.get("provider")?,
            thread_id: row.get("thread_id")?,
            subject: row.get("subject")?,
            last_seen_at: seen_str.as_deref().and_then(parse_timestamp),
            last_analyzed_at: analyzed_str.as_deref().and_then(parse_timestamp),
            digest_bucket: row.get("digest_bucket")?,
            last_seen_change_marker: row.get("last_seen_change_marker")?,
            last_analyzed_change_marker: row.get("last_analyzed_change_marker")?,
        })
    }

    // ============================================
    // Triage run operations
    // ============================================

    /// Append a triage run and refresh the thread's analysis state.
    ///
    /// Both writes happen in one transaction. Returns the run id.
    pub fn record_triage(
        &self,
        provider: &str,
        thread_id: &str,
        run_at: DateTime<Utc>,
        model: &str,
        change_marker: Option<&str>,
        output: &ClassificationOutput,
    ) -> Result<i64> {
        let output_json = serde_json::to_string(output)?;
        let run_at = run_at.to_rfc3339();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO triage_runs (provider, thread_id, run_at, model, confidence, output_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![provider, thread_id, run_at, model, output.confidence, output_json],
        )?;
        let run_id = tx.last_insert_rowid();
        tx.execute(
            r#"
            UPDATE threads
            SET last_analyzed_at = ?1, digest_bucket = ?2, last_analyzed_change_marker = ?3
            WHERE provider = ?4 AND thread_id = ?5
            "#,
            params![run_at, output.domain, change_marker, provider, thread_id],
        )?;
        tx.commit()?;
        Ok(run_id)
    }

    /// All runs for a thread, oldest first
    pub fn get_triage_runs(&self, provider: &str, thread_id: &str) -> Result<Vec<TriageRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM triage_runs WHERE provider = ?1 AND thread_id = ?2 ORDER BY id",
        )?;
        let runs = stmt
            .query_map(params![provider, thread_id], Self::row_to_triage_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn row_to_triage_run(row: &Row) -> rusqlite::Result<TriageRun> {
        let run_at_str: String = row.get("run_at")?;
        let output_str: String = row.get("output_json")?;

        Ok(TriageRun {
            id: row.get("id")?,
            provider: row.get("provider")?,
            thread_id: row.get("thread_id")?,
            run_at: parse_timestamp(&run_at_str).unwrap_or_else(Utc::now),
            model: row.get("model")?,
            confidence: row.get::<_, Option<f64>>("confidence")?.unwrap_or(0.0),
            output: serde_json::from_str(&output_str).unwrap_or(serde_json::json!({})),
        })
    }

    // ============================================
    // Task operations
    // ============================================

    /// Insert a task unless its key already exists.
    ///
    /// Returns the stored row when inserted, `None` for a duplicate key.
    pub fn insert_task_if_absent(&self, task: &NewTask) -> Result<Option<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO tasks (task_key, provider, thread_id, created_at, status, priority, title, due_date, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                task.task_key,
                task.provider,
                task.thread_id,
                task.created_at.to_rfc3339(),
                TaskStatus::Open.as_str(),
                task.priority,
                task.title,
                task.due_date,
                task.notes,
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }

        Ok(Some(TaskRecord {
            id: conn.last_insert_rowid(),
            task_key: task.task_key.clone(),
            provider: task.provider.clone(),
            thread_id: task.thread_id.clone(),
            created_at: task.created_at,
            status: TaskStatus::Open,
            priority: task.priority.clone(),
            title: task.title.clone(),
            due_date: task.due_date.clone(),
            notes: task.notes.clone(),
        }))
    }

    /// Get a task by ID
    pub fn get_task(&self, id: i64) -> Result<Option<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1"),
            [id],
            Self::row_to_task,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Mark a task done. Unknown ids are an error; repeating is harmless.
    pub fn mark_task_done(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![TaskStatus::Done.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::TaskNotFound(id));
        }
        Ok(())
    }

    /// Open tasks joined with their thread, most pressing first.
    pub fn list_open_tasks(&self) -> Result<Vec<OpenTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {TASK_COLUMNS}, th.subject AS thread_subject, th.digest_bucket AS thread_bucket
            FROM tasks t
            LEFT JOIN threads th
                ON th.provider = t.provider AND th.thread_id = t.thread_id
            WHERE t.status = 'open'
            ORDER BY
                CASE t.priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 WHEN 'ignore' THEN 3 ELSE 9 END,
                COALESCE(t.due_date, '9999-12-31') ASC,
                t.id ASC
            "#
        ))?;
        let tasks = stmt
            .query_map([], |row| {
                Ok(OpenTask {
                    task: Self::row_to_task(row)?,
                    thread_subject: row.get("thread_subject")?,
                    thread_bucket: row.get("thread_bucket")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Total task rows, any status
    pub fn count_tasks(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0))?;
        Ok(count)
    }

    fn row_to_task(row: &Row) -> rusqlite::Result<TaskRecord> {
        let created_at_str: String = row.get("created_at")?;
        let status_str: String = row.get("status")?;

        Ok(TaskRecord {
            id: row.get("id")?,
            task_key: row.get("task_key")?,
            provider: row.get("provider")?,
            thread_id: row.get("thread_id")?,
            created_at: parse_timestamp(&created_at_str).unwrap_or_else(Utc::now),
            status: status_str.parse().unwrap_or(TaskStatus::Open),
            priority: row.get("priority")?,
            title: row.get("title")?,
            due_date: row.get("due_date")?,
            notes: row.get("notes")?,
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
