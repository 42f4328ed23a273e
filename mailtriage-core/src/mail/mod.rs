//! Mail provider port
//!
//! The cycle talks to a mailbox only through [`MailProvider`]. [`GmailClient`]
//! speaks the Gmail REST API; [`FixtureProvider`] replays a JSON file for
//! demos and tests.

mod fixture;
mod gmail;

pub use fixture::FixtureProvider;
pub use gmail::{GmailClient, DEFAULT_GMAIL_API_BASE};

use crate::error::Result;
use crate::types::{MailMessage, ThreadSummary};

/// Mailbox access used by the triage cycle.
pub trait MailProvider {
    /// Name stored on thread and task rows.
    fn provider_name(&self) -> &str;

    /// Candidate threads changed within the lookback window, newest first.
    fn fetch_recent_threads(&self, lookback_days: u32, max_threads: usize) -> Result<Vec<ThreadSummary>>;

    /// The newest `max_messages` messages of a thread, oldest first.
    fn fetch_thread_messages(&self, thread_id: &str, max_messages: usize) -> Result<Vec<MailMessage>>;

    /// Send a single-part HTML message.
    fn send_mail(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}
