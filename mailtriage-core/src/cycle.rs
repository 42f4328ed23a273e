//! One triage cycle
//!
//! ```text
//! follow-up scan ─► list threads ─► upsert ─► staleness gate ─► triage
//!                                                   │              │
//!                                              (unchanged)    record run
//!                                                   ▼              ▼
//!                                                 skip      reconcile tasks
//!
//! open tasks ─► bucket + sort ─► render ─► (send)
//! ```
//!
//! Mail-provider failures abort the cycle. A thread that fails triage is
//! logged and counted; its analyzed marker is untouched, so the next cycle
//! retries it.

use crate::config::Config;
use crate::db::Database;
use crate::digest::{group_and_sort, render_digest, DigestConfig};
use crate::error::{Error, Result};
use crate::followup::waiting_on_reply_at;
use crate::mail::MailProvider;
use crate::reconcile;
use crate::triage::TriageEngine;
use crate::types::{Priority, ThreadSummary};
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

/// Minimum delay between poll iterations.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Digest subject line for a configured prefix.
pub fn digest_subject(prefix: &str) -> String {
    format!("[{prefix}] Daily Action Digest")
}

/// Delay between poll iterations: the configured minutes, at least a minute.
pub fn poll_interval(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60)).max(MIN_POLL_INTERVAL)
}

/// Counters and output of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Follow-up tasks created by the waiting-on-reply scan
    pub followups_created: usize,
    pub threads_seen: usize,
    pub threads_analyzed: usize,
    /// Threads whose change marker matched the last analysis
    pub threads_unchanged: usize,
    /// Threads whose triage failed this cycle
    pub threads_failed: usize,
    /// Confident ignore outputs that created no tasks
    pub threads_suppressed: usize,
    pub tasks_created: usize,
    pub open_tasks: usize,
    pub digest_html: String,
    pub digest_sent: bool,
}

/// Runs cycles against one provider, engine and database.
pub struct TriageCycle<'a> {
    db: &'a Database,
    provider: &'a dyn MailProvider,
    engine: &'a TriageEngine,
    config: &'a Config,
    digest: DigestConfig,
}

impl<'a> TriageCycle<'a> {
    pub fn new(
        db: &'a Database,
        provider: &'a dyn MailProvider,
        engine: &'a TriageEngine,
        config: &'a Config,
    ) -> Self {
        Self {
            db,
            provider,
            engine,
            config,
            digest: DigestConfig::from_config(config),
        }
    }

    /// Run one cycle now.
    pub fn run_once(&self) -> Result<CycleReport> {
        self.run_at(Utc::now())
    }

    /// Run one cycle as of `now`.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let provider = self.provider.provider_name();

        let my_email = self.config.mail.my_email.as_deref().unwrap_or("").trim();
        if self.config.followup.enabled && !my_email.is_empty() {
            report.followups_created = self.followup_scan(my_email, now)?;
        }

        let threads = self
            .provider
            .fetch_recent_threads(self.config.cycle.lookback_days, self.config.cycle.max_threads)?;
        report.threads_seen = threads.len();
        tracing::info!(provider, threads = threads.len(), "Fetched candidate threads");

        for summary in &threads {
            self.process_thread(summary, now, &mut report)?;
        }

        let today = now.date_naive();
        let (html, open_tasks) = self.build_digest(today)?;
        report.open_tasks = open_tasks;

        if self.config.cycle.send_digest {
            let to = self
                .config
                .mail
                .digest_to
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| Error::Config("mail.digest_to is required to send the digest".to_string()))?;
            let subject = digest_subject(&self.config.mail.digest_subject_prefix);
            self.provider.send_mail(to, &subject, &html)?;
            report.digest_sent = true;
            tracing::info!(to, open_tasks, "Digest sent");
        }
        report.digest_html = html;

        tracing::info!(
            provider,
            followups_created = report.followups_created,
            threads_seen = report.threads_seen,
            threads_analyzed = report.threads_analyzed,
            threads_unchanged = report.threads_unchanged,
            threads_failed = report.threads_failed,
            threads_suppressed = report.threads_suppressed,
            tasks_created = report.tasks_created,
            open_tasks = report.open_tasks,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Render the digest for the current open tasks. Returns the HTML and the
    /// number of open tasks.
    pub fn build_digest(&self, today: NaiveDate) -> Result<(String, usize)> {
        let open = self.db.list_open_tasks()?;
        let count = open.len();
        let buckets = group_and_sort(open, &self.digest, today);
        Ok((render_digest(&buckets, today), count))
    }

    fn process_thread(
        &self,
        summary: &ThreadSummary,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let provider = self.provider.provider_name();
        let thread_id = summary.id.as_str();
        let marker = summary.change_marker.as_deref();

        self.db
            .upsert_thread(provider, thread_id, &summary.subject, now, marker)?;
        if !self.db.should_analyze_thread(provider, thread_id, marker)? {
            report.threads_unchanged += 1;
            tracing::debug!(thread_id, marker, "Thread unchanged, skipping");
            return Ok(());
        }

        let messages = self
            .provider
            .fetch_thread_messages(thread_id, self.config.mail.max_messages_per_thread)?;

        let output = match self.engine.triage(&summary.subject, &messages) {
            Ok(output) => output,
            Err(e) => {
                report.threads_failed += 1;
                tracing::warn!(thread_id, error = %e, "Triage failed; will retry next cycle");
                return Ok(());
            }
        };
        report.threads_analyzed += 1;

        reconcile::record_triage(
            self.db,
            provider,
            thread_id,
            now,
            self.engine.model_name(),
            marker,
            &output,
        )?;

        if output.priority == Priority::Ignore
            && output.confidence >= self.config.cycle.confidence_threshold
        {
            report.threads_suppressed += 1;
            tracing::debug!(thread_id, confidence = output.confidence, "Confident ignore, no tasks");
            return Ok(());
        }

        let outcome = reconcile::reconcile(self.db, provider, thread_id, now, &output)?;
        report.tasks_created += outcome.inserted.len();
        tracing::debug!(
            thread_id,
            domain = %output.domain,
            priority = %output.priority,
            inserted = outcome.inserted.len(),
            duplicates = outcome.duplicates,
            "Thread triaged"
        );
        Ok(())
    }

    /// Create follow-up tasks for threads where I am waiting on a reply.
    fn followup_scan(&self, my_email: &str, now: DateTime<Utc>) -> Result<usize> {
        let provider = self.provider.provider_name();
        let followup = &self.config.followup;
        let threads = self
            .provider
            .fetch_recent_threads(followup.lookback_days, followup.max_threads)?;

        let mut created = 0;
        for summary in &threads {
            let messages = self
                .provider
                .fetch_thread_messages(&summary.id, self.config.mail.max_messages_per_thread)?;
            let (true, Some(last_out)) =
                waiting_on_reply_at(&messages, my_email, followup.stale_days, now)
            else {
                continue;
            };

            self.db.upsert_thread(
                provider,
                &summary.id,
                &summary.subject,
                now,
                summary.change_marker.as_deref(),
            )?;
            // Once triaged, the thread keeps the bucket of its latest triage
            let triaged = self
                .db
                .get_thread(provider, &summary.id)?
                .is_some_and(|t| t.last_analyzed_at.is_some());
            if !triaged {
                self.db
                    .set_digest_bucket(provider, &summary.id, &followup.bucket)?;
            }

            let subject = match summary.subject.trim() {
                "" => "Email thread",
                s => s,
            };
            let title = format!("Follow up: {subject}");
            let notes = format!(
                "Waiting on reply. Last outbound from {} was {}.",
                my_email,
                last_out.date_naive()
            );
            // Due when the thread went stale, so the key is the same every day
            let due = (last_out.date_naive() + chrono::Days::new(followup.stale_days.max(0) as u64))
                .to_string();
            let task = reconcile::create_followup_task(
                self.db,
                provider,
                &summary.id,
                now,
                &followup.priority,
                &title,
                Some(&due),
                &notes,
            )?;
            if task.is_some() {
                created += 1;
            }
        }

        tracing::info!(provider, scanned = threads.len(), created, "Follow-up scan complete");
        Ok(created)
    }
}
