//! Core domain types for mailtriage
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Thread** | A provider-side conversation grouping of one or more messages |
//! | **Change marker** | Opaque provider token that changes when a thread changes; compared for equality only |
//! | **Triage** | Classifying a thread into domain/intent/priority and deriving recommended actions |
//! | **Task** | A persisted action item derived from a triage run or the follow-up scan |
//! | **Bucket** | A digest grouping derived from (but distinct from) the triage domain |
//! | **Task key** | Stable dedup identifier derived from the task-defining fields |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Classification
// ============================================

/// Triage priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Ignore,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Ignore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Ignore => "ignore",
        }
    }

    /// Sort rank: urgent first, unknown values last.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Ignore => 3,
        }
    }

    /// Rank for a stored priority string; unrecognized values rank 9.
    pub fn rank_of(value: &str) -> u8 {
        value.parse::<Priority>().map(|p| p.rank()).unwrap_or(9)
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "ignore" => Ok(Priority::Ignore),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateTask,
    SendReminder,
    ReviewNeeded,
    DraftReply,
    Suppress,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::CreateTask,
        ActionKind::SendReminder,
        ActionKind::ReviewNeeded,
        ActionKind::DraftReply,
        ActionKind::Suppress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateTask => "create_task",
            ActionKind::SendReminder => "send_reminder",
            ActionKind::ReviewNeeded => "review_needed",
            ActionKind::DraftReply => "draft_reply",
            ActionKind::Suppress => "suppress",
        }
    }

    /// Whether this action kind becomes a task row.
    pub fn creates_task(&self) -> bool {
        matches!(
            self,
            ActionKind::CreateTask | ActionKind::SendReminder | ActionKind::ReviewNeeded
        )
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown action kind: {}", s))
    }
}

/// One entry of `recommended_actions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action: ActionKind,
    pub title: String,
    pub notes: Option<String>,
    /// ISO date (`YYYY-MM-DD`)
    pub due_date: Option<String>,
    /// Free-form window such as `72h` or `7d`
    pub urgency_window: Option<String>,
}

impl RecommendedAction {
    /// The action injected for ignore outputs that state no action.
    pub fn suppress() -> Self {
        Self {
            action: ActionKind::Suppress,
            title: "Ignore low-impact email".to_string(),
            notes: Some("No action required.".to_string()),
            due_date: None,
            urgency_window: None,
        }
    }
}

/// A structured finding pulled out of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Extraction {
    pub fn signal(kind: &str, summary: &str, confidence: f64) -> Self {
        Self {
            kind: kind.to_string(),
            summary: summary.to_string(),
            due_date: None,
            amount: None,
            currency: None,
            invoice_id: None,
            counterparty: None,
            confidence: Some(confidence),
        }
    }
}

/// Normalized, schema-conformant triage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    pub domain: String,
    pub intent: String,
    pub priority: Priority,
    pub confidence: f64,
    pub rationale: String,
    pub extractions: Vec<Extraction>,
    pub recommended_actions: Vec<RecommendedAction>,
}

// ============================================
// Mail
// ============================================

/// A candidate thread as listed by the mail provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub subject: String,
    /// Provider change marker of the newest message, when supplied
    pub change_marker: Option<String>,
    #[serde(default)]
    pub snippet: String,
}

/// One message of a thread with its plain-text body extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailMessage {
    pub message_id: String,
    /// Provider receive timestamp (RFC 3339), when known
    pub timestamp: Option<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Raw `Date` header
    pub date: String,
    pub text: String,
}

// ============================================
// Persistent records
// ============================================

/// Stored state of an observed thread, keyed by (provider, thread_id).
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRecord {
    pub provider: String,
    pub thread_id: String,
    pub subject: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub digest_bucket: Option<String>,
    pub last_seen_change_marker: Option<String>,
    pub last_analyzed_change_marker: Option<String>,
}

/// Append-only record of one triage invocation.
#[derive(Debug, Clone)]
pub struct TriageRun {
    pub id: i64,
    pub provider: String,
    pub thread_id: String,
    pub run_at: DateTime<Utc>,
    pub model: Option<String>,
    pub confidence: f64,
    pub output: serde_json::Value,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Open,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "done" => Ok(TaskStatus::Done),
            _ => Err(format!("unknown task status: {}", s)),
        }
    }
}

/// A persisted action item.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: i64,
    pub task_key: String,
    pub provider: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    /// Stored as text; values outside [`Priority`] sort last
    pub priority: String,
    pub title: String,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

/// A task row about to be inserted; the key decides whether it already exists.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub task_key: String,
    pub provider: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub priority: String,
    pub title: String,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

/// An open task joined with its thread's subject and bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTask {
    pub task: TaskRecord,
    pub thread_subject: Option<String>,
    pub thread_bucket: Option<String>,
}
