//! Waiting-on-reply detection
//!
//! A thread is waiting on a reply when my newest outbound message has no
//! inbound message after it and is at least `stale_days` old.

use crate::triage::is_from_me;
use crate::types::MailMessage;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

/// Parse a message date: RFC 3339, RFC 2822, or a naive ISO timestamp/date
/// taken as UTC.
pub fn parse_message_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// [`waiting_on_reply_at`] evaluated against the current time.
pub fn waiting_on_reply(
    messages: &[MailMessage],
    my_email: &str,
    stale_days: i64,
) -> (bool, Option<DateTime<Utc>>) {
    waiting_on_reply_at(messages, my_email, stale_days, Utc::now())
}

/// Returns `(is_stale, last_outbound)`.
///
/// Messages whose date does not parse are ignored. `last_outbound` is set
/// whenever I sent something, even when the thread is not stale.
pub fn waiting_on_reply_at(
    messages: &[MailMessage],
    my_email: &str,
    stale_days: i64,
    now: DateTime<Utc>,
) -> (bool, Option<DateTime<Utc>>) {
    if my_email.trim().is_empty() {
        return (false, None);
    }

    let mut dated: Vec<(DateTime<Utc>, &MailMessage)> = messages
        .iter()
        .filter_map(|m| parse_message_date(&m.date).map(|d| (d, m)))
        .collect();
    dated.sort_by_key(|(d, _)| *d);

    let mut last_out = None;
    let mut last_in = None;
    for (date, message) in dated {
        if is_from_me(&message.from, my_email) {
            last_out = Some(date);
        } else {
            last_in = Some(date);
        }
    }

    let Some(last_out) = last_out else {
        return (false, None);
    };
    if matches!(last_in, Some(inbound) if inbound > last_out) {
        return (false, Some(last_out));
    }

    let age_days = (now - last_out).num_seconds().div_euclid(SECONDS_PER_DAY);
    (age_days >= stale_days, Some(last_out))
}
