//! Task reconciliation
//!
//! Turns recommended actions into task rows. Every task carries a key derived
//! from the fields that define it, and the store ignores a second insert with
//! the same key, so re-running a cycle never duplicates work items.

use crate::db::Database;
use crate::error::Result;
use crate::types::{ClassificationOutput, NewTask, TaskRecord};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Title used when an action has none.
pub const DEFAULT_TASK_TITLE: &str = "Follow up";

/// Result of reconciling one classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub inserted: Vec<TaskRecord>,
    /// Actions whose key already existed
    pub duplicates: usize,
}

/// Stable dedup key for a task.
///
/// Titles compare case-insensitively after trimming; due dates after trimming.
pub fn task_key(provider: &str, thread_id: &str, title: &str, due_date: Option<&str>) -> String {
    let base = format!(
        "{}|{}|{}|{}",
        provider,
        thread_id,
        title.trim().to_lowercase(),
        due_date.unwrap_or("").trim()
    );
    hex::encode(Sha256::digest(base.as_bytes()))
}

/// Create tasks for the task-producing actions of a classification.
pub fn reconcile(
    db: &Database,
    provider: &str,
    thread_id: &str,
    created_at: DateTime<Utc>,
    classification: &ClassificationOutput,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();

    for action in classification
        .recommended_actions
        .iter()
        .filter(|a| a.action.creates_task())
    {
        let title = if action.title.is_empty() {
            DEFAULT_TASK_TITLE.to_string()
        } else {
            action.title.clone()
        };
        let notes = action
            .notes
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| classification.rationale.clone());
        let task = NewTask {
            task_key: task_key(provider, thread_id, &title, action.due_date.as_deref()),
            provider: provider.to_string(),
            thread_id: thread_id.to_string(),
            created_at,
            priority: classification.priority.as_str().to_string(),
            title,
            due_date: action.due_date.clone(),
            notes: Some(notes),
        };

        match db.insert_task_if_absent(&task)? {
            Some(record) => outcome.inserted.push(record),
            None => outcome.duplicates += 1,
        }
    }

    if !outcome.inserted.is_empty() || outcome.duplicates > 0 {
        tracing::debug!(
            provider,
            thread_id,
            inserted = outcome.inserted.len(),
            duplicates = outcome.duplicates,
            "Reconciled tasks"
        );
    }
    Ok(outcome)
}

/// Create one task outside of a classification (the follow-up scan).
#[allow(clippy::too_many_arguments)]
pub fn create_followup_task(
    db: &Database,
    provider: &str,
    thread_id: &str,
    created_at: DateTime<Utc>,
    priority: &str,
    title: &str,
    due_date: Option<&str>,
    notes: &str,
) -> Result<Option<TaskRecord>> {
    let task = NewTask {
        task_key: task_key(provider, thread_id, title, due_date),
        provider: provider.to_string(),
        thread_id: thread_id.to_string(),
        created_at,
        priority: priority.to_string(),
        title: title.to_string(),
        due_date: due_date.map(ToString::to_string),
        notes: Some(notes.to_string()),
    };
    db.insert_task_if_absent(&task)
}

/// Append a triage run and refresh the thread's bucket and analyzed marker.
pub fn record_triage(
    db: &Database,
    provider: &str,
    thread_id: &str,
    run_at: DateTime<Utc>,
    model: &str,
    change_marker: Option<&str>,
    output: &ClassificationOutput,
) -> Result<i64> {
    db.record_triage(provider, thread_id, run_at, model, change_marker, output)
}
