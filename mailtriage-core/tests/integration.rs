//! Integration tests for the mailtriage cycle
//!
//! These tests use the fixture mailbox in `tests/fixtures/` and an in-memory
//! database to verify the end-to-end flow from thread listing to digest.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use mailtriage_core::cycle::TriageCycle;
use mailtriage_core::db::Database;
use mailtriage_core::digest::{group_and_sort, DigestConfig};
use mailtriage_core::followup::waiting_on_reply_at;
use mailtriage_core::mail::{FixtureProvider, MailProvider};
use mailtriage_core::reconcile::reconcile;
use mailtriage_core::triage::simulate;
use mailtriage_core::types::{ActionKind, MailMessage, Priority};
use mailtriage_core::{logging, Config, Error, TriageEngine, TriageSchema};
use std::path::PathBuf;

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn test_db() -> Database {
    logging::init_test();
    let db = Database::open_in_memory().expect("in-memory database");
    db.migrate().expect("migrations");
    db
}

fn demo_config() -> Config {
    let mut config = Config::default();
    config.mail.my_email = Some("me@example.com".to_string());
    config.cycle.send_digest = false;
    config
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()
}

fn message(from: &str, date: DateTime<Utc>, text: &str) -> MailMessage {
    MailMessage {
        from: from.to_string(),
        date: date.to_rfc3339(),
        text: text.to_string(),
        ..Default::default()
    }
}

// ============================================
// Classification
// ============================================

#[test]
fn test_simulated_invoice_is_payment_task() {
    let out = simulate(
        "Invoice #1023 payment confirmation",
        &[message("ar@vendor.com", now(), "The invoice has been paid, please confirm.")],
    );

    assert_eq!(out.domain, "payment");
    assert_eq!(out.priority, Priority::High);
    assert!(out
        .recommended_actions
        .iter()
        .any(|a| a.action == ActionKind::CreateTask));
}

#[test]
fn test_simulated_newsletter_is_suppressed_noise() {
    let out = simulate(
        "This week",
        &[message("news@vendor.com", now(), "Our newsletter, fyi.")],
    );

    assert_eq!(out.domain, "noise");
    assert_eq!(out.priority, Priority::Ignore);
    assert_eq!(out.recommended_actions.len(), 1);
    assert_eq!(out.recommended_actions[0].action, ActionKind::Suppress);
}

#[test]
fn test_simulated_output_passes_bundled_schema() {
    let schema = TriageSchema::bundled(&[], None).unwrap();
    let out = simulate("Invoice #1023", &[]);
    let value = serde_json::to_value(&out).unwrap();

    assert_eq!(schema.validate(&value).unwrap(), out);
}

// ============================================
// Follow-up detection
// ============================================

#[test]
fn test_waiting_on_reply_after_twenty_days() {
    let sent = now() - Duration::days(20);
    let messages = vec![message("me@x.com", sent, "Any update on this?")];

    let (stale, last_out) = waiting_on_reply_at(&messages, "me@x.com", 14, now());
    assert!(stale);
    assert_eq!(last_out, Some(sent));
}

#[test]
fn test_inbound_reply_clears_waiting() {
    let sent = now() - Duration::days(20);
    let messages = vec![
        message("me@x.com", sent, "Any update on this?"),
        message("them@y.com", now() - Duration::days(5), "Yes, on it."),
    ];

    let (stale, last_out) = waiting_on_reply_at(&messages, "me@x.com", 14, now());
    assert!(!stale);
    assert_eq!(last_out, Some(sent));
}

// ============================================
// Reconciliation and digest
// ============================================

#[test]
fn test_reconcile_twice_keeps_one_task() {
    let db = test_db();
    db.upsert_thread("gmail", "t1", "Invoice #1023", now(), Some("1"))
        .unwrap();
    let out = simulate("Invoice #1023", &[]);

    let first = reconcile(&db, "gmail", "t1", now(), &out).unwrap();
    let second = reconcile(&db, "gmail", "t1", now(), &out).unwrap();

    assert_eq!(first.inserted.len(), 1);
    assert!(second.inserted.is_empty());
    assert_eq!(second.duplicates, 1);
    assert_eq!(db.count_tasks().unwrap(), 1);
}

#[test]
fn test_task_due_in_two_days_is_urgent() {
    let db = test_db();
    db.upsert_thread("gmail", "t1", "Invoice #1023", now(), Some("1"))
        .unwrap();
    let mut out = simulate("Invoice #1023", &[]);
    out.priority = Priority::Normal;
    out.recommended_actions[0].due_date = Some("2026-10-18".to_string());
    reconcile(&db, "gmail", "t1", now(), &out).unwrap();

    let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    let config = DigestConfig::from_config(&Config::default());
    let buckets = group_and_sort(db.list_open_tasks().unwrap(), &config, today);

    let urgent = buckets.iter().find(|b| b.key == "urgent").unwrap();
    assert_eq!(urgent.tasks.len(), 1);
    assert_eq!(urgent.tasks[0].task.priority, "normal");
}

#[test]
fn test_mark_done_removes_task_from_open_list() {
    let db = test_db();
    db.upsert_thread("gmail", "t1", "Invoice #1023", now(), Some("1"))
        .unwrap();
    let outcome = reconcile(&db, "gmail", "t1", now(), &simulate("Invoice #1023", &[])).unwrap();
    let id = outcome.inserted[0].id;

    db.mark_task_done(id).unwrap();
    assert!(db.list_open_tasks().unwrap().is_empty());
    assert!(matches!(db.mark_task_done(9999), Err(Error::TaskNotFound(9999))));
}

// ============================================
// Full cycle against the fixture mailbox
// ============================================

#[test]
fn test_demo_cycle_end_to_end() {
    let db = test_db();
    let config = demo_config();
    let provider = FixtureProvider::load(&fixture_path("demo_threads.json")).unwrap();
    let engine = TriageEngine::simulated(TriageSchema::bundled(&[], None).unwrap());

    let report = TriageCycle::new(&db, &provider, &engine, &config)
        .run_at(now())
        .expect("cycle should succeed");

    assert_eq!(report.threads_seen, 4);
    assert_eq!(report.threads_analyzed, 4);
    assert_eq!(report.threads_suppressed, 1);
    assert_eq!(report.followups_created, 1);
    assert_eq!(report.tasks_created, 3);
    assert_eq!(report.open_tasks, 4);
    assert!(!report.digest_sent);

    let html = &report.digest_html;
    assert!(html.contains("Daily Action Digest"));
    assert!(html.contains("October 16, 2026"));
    assert!(html.contains("<b>Urgent (next 72h):</b> 2"));
    assert!(html.contains("<b>Payments / Receivables:</b> 1"));
    assert!(html.contains("<b>Review Needed:</b> 1"));
    assert!(html.contains("Follow up: Q3 close numbers"));
    assert!(!html.contains("Weekly product newsletter"));

    let newsletter = db
        .get_thread(provider.provider_name(), "demo-newsletter")
        .unwrap()
        .unwrap();
    assert_eq!(newsletter.digest_bucket.as_deref(), Some("noise"));
    assert_eq!(newsletter.last_analyzed_change_marker.as_deref(), Some("90002"));
}

#[test]
fn test_demo_cycle_is_idempotent() {
    let db = test_db();
    let config = demo_config();
    let provider = FixtureProvider::load(&fixture_path("demo_threads.json")).unwrap();
    let engine = TriageEngine::simulated(TriageSchema::bundled(&[], None).unwrap());
    let cycle = TriageCycle::new(&db, &provider, &engine, &config);

    let first = cycle.run_at(now()).unwrap();
    let second = cycle.run_at(now()).unwrap();

    assert_eq!(second.threads_unchanged, 4);
    assert_eq!(second.threads_analyzed, 0);
    assert_eq!(second.tasks_created, 0);
    assert_eq!(second.followups_created, 0);
    assert_eq!(second.open_tasks, first.open_tasks);
    assert_eq!(
        db.get_triage_runs(provider.provider_name(), "demo-invoice-1023")
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_followup_survives_date_rollover_without_duplicates() {
    let db = test_db();
    let config = demo_config();
    let provider = FixtureProvider::load(&fixture_path("demo_threads.json")).unwrap();
    let engine = TriageEngine::simulated(TriageSchema::bundled(&[], None).unwrap());
    let cycle = TriageCycle::new(&db, &provider, &engine, &config);

    let before_midnight = Utc.with_ymd_and_hms(2026, 10, 16, 23, 55, 0).unwrap();
    let created: Vec<usize> = [
        before_midnight,
        before_midnight + Duration::minutes(10),
        before_midnight + Duration::days(1) + Duration::minutes(10),
    ]
    .into_iter()
    .map(|at| cycle.run_at(at).unwrap().followups_created)
    .collect();
    assert_eq!(created, vec![1, 0, 0]);

    let followups: Vec<_> = db
        .list_open_tasks()
        .unwrap()
        .into_iter()
        .filter(|t| t.task.title == "Follow up: Q3 close numbers")
        .collect();
    assert_eq!(followups.len(), 1);
    // Last outbound 2026-09-25 plus the 14 stale days
    assert_eq!(followups[0].task.due_date.as_deref(), Some("2026-10-09"));
}

#[test]
fn test_followup_scan_leaves_triaged_bucket_alone() {
    let db = test_db();
    let config = demo_config();
    let provider = FixtureProvider::load(&fixture_path("demo_threads.json")).unwrap();
    let engine = TriageEngine::simulated(TriageSchema::bundled(&[], None).unwrap());
    let cycle = TriageCycle::new(&db, &provider, &engine, &config);
    let name = provider.provider_name();

    let first = cycle.run_at(now()).unwrap();
    let after_first = db.get_thread(name, "demo-q3-numbers").unwrap().unwrap();
    let second = cycle.run_at(now()).unwrap();
    let after_second = db.get_thread(name, "demo-q3-numbers").unwrap().unwrap();

    let runs = db.get_triage_runs(name, "demo-q3-numbers").unwrap();
    assert_eq!(runs.len(), 1);
    let domain = runs[0].output["domain"].as_str().unwrap();
    assert_eq!(after_first.digest_bucket.as_deref(), Some(domain));
    assert_eq!(after_second.digest_bucket.as_deref(), Some(domain));
    assert_eq!(first.digest_html, second.digest_html);
}

#[test]
fn test_fixture_cannot_send_digest() {
    let db = test_db();
    let mut config = demo_config();
    config.cycle.send_digest = true;
    config.mail.digest_to = Some("me@example.com".to_string());
    let provider = FixtureProvider::load(&fixture_path("demo_threads.json")).unwrap();
    let engine = TriageEngine::simulated(TriageSchema::bundled(&[], None).unwrap());

    let result = TriageCycle::new(&db, &provider, &engine, &config).run_at(now());
    assert!(matches!(result, Err(Error::Provider(_))));
}
