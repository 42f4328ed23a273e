//! Digest bucketing
//!
//! Open tasks are assigned to display buckets (derived from, but not the same
//! as, the triage domain stored on their thread), then grouped and sorted for
//! rendering.
//!
//! ## Bucket rules (first match wins)
//!
//! 1. priority `urgent` → `urgent`
//! 2. due within three days (or overdue) → `urgent`
//! 3. title mentions "review" or notes mention "unclear" → `review`
//! 4. the thread's bucket if it is a configured domain, else the default domain

mod render;

pub use render::{escape_html, render_digest, thread_link, MAX_ROWS_PER_BUCKET};

use crate::config::Config;
use crate::types::{OpenTask, Priority};
use chrono::NaiveDate;
use std::collections::HashMap;

pub const URGENT_BUCKET: &str = "urgent";
pub const REVIEW_BUCKET: &str = "review";

/// Tasks due within this many days land in the urgent bucket.
const URGENT_WITHIN_DAYS: i64 = 3;

/// Sort key for tasks without a due date.
const NO_DUE_DATE: &str = "9999-12-31";

const BUILTIN_LABELS: [(&str, &str); 8] = [
    ("urgent", "Urgent (next 72h)"),
    ("expiry", "Expiries / Deadlines"),
    ("audit", "Audit / Evidence Requests"),
    ("followup", "Follow-ups You Owe"),
    ("payment", "Payments / Receivables"),
    ("review", "Review Needed"),
    ("other", "Other"),
    ("noise", "Suppressed / Noise (should be empty)"),
];

/// Bucket settings derived from the triage configuration.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    domains: Vec<String>,
    default_domain: String,
    labels: HashMap<String, String>,
}

impl DigestConfig {
    pub fn new(domains: &[String], default_domain: &str, labels: HashMap<String, String>) -> Self {
        let default_domain = match default_domain.trim().to_lowercase() {
            d if d.is_empty() => "other".to_string(),
            d => d,
        };
        let mut ordered: Vec<String> = Vec::new();
        for domain in domains.iter().map(|d| d.trim().to_lowercase()) {
            if !domain.is_empty() && !ordered.contains(&domain) {
                ordered.push(domain);
            }
        }
        if !ordered.contains(&default_domain) {
            ordered.push(default_domain.clone());
        }
        Self {
            domains: ordered,
            default_domain,
            labels,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.triage.domains,
            &config.triage.default_domain,
            config.triage.labels.clone(),
        )
    }

    /// Configured domains in digest order, default domain included.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn default_domain(&self) -> &str {
        &self.default_domain
    }

    /// `urgent`, the configured domains, then `review`.
    pub fn bucket_order(&self) -> Vec<String> {
        std::iter::once(URGENT_BUCKET.to_string())
            .chain(self.domains.iter().cloned())
            .chain(std::iter::once(REVIEW_BUCKET.to_string()))
            .collect()
    }

    /// Display label: configured, built-in, else the title-cased key.
    pub fn label(&self, key: &str) -> String {
        if let Some(label) = self.labels.get(key) {
            return label.clone();
        }
        BUILTIN_LABELS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| title_case(key))
    }
}

/// One digest section.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestBucket {
    pub key: String,
    pub label: String,
    pub tasks: Vec<OpenTask>,
}

/// Pick the display bucket for a task.
pub fn assign_bucket(task: &OpenTask, config: &DigestConfig, today: NaiveDate) -> String {
    let record = &task.task;
    if record.priority == Priority::Urgent.as_str() {
        return URGENT_BUCKET.to_string();
    }

    let due = record
        .due_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
    if let Some(due) = due {
        if (due - today).num_days() <= URGENT_WITHIN_DAYS {
            return URGENT_BUCKET.to_string();
        }
    }

    let needs_review = record.title.to_lowercase().contains("review")
        || record
            .notes
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains("unclear"));
    if needs_review {
        return REVIEW_BUCKET.to_string();
    }

    let thread_bucket = task
        .thread_bucket
        .as_deref()
        .map(|b| b.trim().to_lowercase())
        .unwrap_or_default();
    if config.domains.contains(&thread_bucket) {
        thread_bucket
    } else {
        config.default_domain.clone()
    }
}

/// Group tasks into every bucket of the digest order, each sorted by
/// priority rank then due date. Ties keep input order.
pub fn group_and_sort(tasks: Vec<OpenTask>, config: &DigestConfig, today: NaiveDate) -> Vec<DigestBucket> {
    let mut buckets: Vec<DigestBucket> = config
        .bucket_order()
        .into_iter()
        .map(|key| DigestBucket {
            label: config.label(&key),
            key,
            tasks: Vec::new(),
        })
        .collect();

    for task in tasks {
        let key = assign_bucket(&task, config, today);
        if let Some(bucket) = buckets.iter_mut().find(|b| b.key == key) {
            bucket.tasks.push(task);
        }
    }

    for bucket in &mut buckets {
        bucket.tasks.sort_by(|a, b| {
            let rank = |t: &OpenTask| Priority::rank_of(&t.task.priority);
            let due = |t: &OpenTask| t.task.due_date.clone().unwrap_or_else(|| NO_DUE_DATE.to_string());
            rank(a).cmp(&rank(b)).then_with(|| due(a).cmp(&due(b)))
        });
    }

    buckets
}

fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut at_word_start = true;
    for c in key.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
