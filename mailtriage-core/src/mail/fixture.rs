//! Mail provider backed by a JSON fixture file.

use super::MailProvider;
use crate::error::{Error, Result};
use crate::types::{MailMessage, ThreadSummary};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    threads: Vec<FixtureThread>,
}

#[derive(Debug, Deserialize)]
struct FixtureThread {
    thread_id: String,
    #[serde(default)]
    subject: String,
    /// String or number; defaults to the thread id
    #[serde(default)]
    latest_history_id: Option<Value>,
    #[serde(default)]
    messages: Vec<MailMessage>,
}

/// Replays threads from a fixture. Sending is not supported.
#[derive(Debug)]
pub struct FixtureProvider {
    name: String,
    threads: Vec<FixtureThread>,
}

impl FixtureProvider {
    pub const DEFAULT_NAME: &'static str = "demo";

    /// Load `{"threads": [{"thread_id", "subject", "latest_history_id", "messages"}]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(content)?;
        tracing::debug!(threads = file.threads.len(), "Loaded mail fixture");
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            threads: file.threads,
        })
    }

    /// Override the provider name stored on rows.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn thread(&self, thread_id: &str) -> Result<&FixtureThread> {
        self.threads
            .iter()
            .find(|t| t.thread_id == thread_id)
            .ok_or_else(|| Error::Provider(format!("fixture has no thread {thread_id}")))
    }
}

impl MailProvider for FixtureProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn fetch_recent_threads(&self, _lookback_days: u32, max_threads: usize) -> Result<Vec<ThreadSummary>> {
        Ok(self
            .threads
            .iter()
            .take(max_threads)
            .map(|t| {
                let marker = match &t.latest_history_id {
                    None | Some(Value::Null) => t.thread_id.clone(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                ThreadSummary {
                    id: t.thread_id.clone(),
                    subject: t.subject.clone(),
                    change_marker: Some(marker),
                    snippet: t
                        .messages
                        .first()
                        .map(|m| m.text.chars().take(120).collect())
                        .unwrap_or_default(),
                }
            })
            .collect())
    }

    fn fetch_thread_messages(&self, thread_id: &str, max_messages: usize) -> Result<Vec<MailMessage>> {
        let messages = &self.thread(thread_id)?.messages;
        let skip = messages.len().saturating_sub(max_messages);
        Ok(messages[skip..].to_vec())
    }

    fn send_mail(&self, _to: &str, _subject: &str, _html: &str) -> Result<()> {
        Err(Error::Provider(
            "the fixture provider cannot send mail".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "threads": [
            {"thread_id": "t1", "subject": "Invoice", "latest_history_id": 501,
             "messages": [
                {"from": "a@x.com", "date": "2026-10-01T09:00:00Z", "text": "one"},
                {"from": "b@x.com", "date": "2026-10-02T09:00:00Z", "text": "two"},
                {"from": "a@x.com", "date": "2026-10-03T09:00:00Z", "text": "three"}
             ]},
            {"thread_id": "t2", "subject": "No marker", "messages": []}
        ]
    }"#;

    #[test]
    fn lists_threads_with_markers() {
        let provider = FixtureProvider::from_json(FIXTURE).unwrap();
        let threads = provider.fetch_recent_threads(2, 50).unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].change_marker.as_deref(), Some("501"));
        assert_eq!(threads[0].snippet, "one");
        assert_eq!(threads[1].change_marker.as_deref(), Some("t2"));
        assert_eq!(provider.fetch_recent_threads(2, 1).unwrap().len(), 1);
        assert_eq!(provider.provider_name(), "demo");
    }

    #[test]
    fn returns_newest_messages_in_order() {
        let provider = FixtureProvider::from_json(FIXTURE).unwrap();
        let messages = provider.fetch_thread_messages("t1", 2).unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
        assert!(provider.fetch_thread_messages("missing", 2).is_err());
    }

    #[test]
    fn sending_is_unsupported() {
        let provider = FixtureProvider::from_json(FIXTURE).unwrap().with_name("fixture");
        assert_eq!(provider.provider_name(), "fixture");
        assert!(matches!(provider.send_mail("a@x.com", "s", "<p>"), Err(Error::Provider(_))));
    }
}
