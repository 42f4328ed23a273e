//! Gmail REST v1 client using a stored bearer token.
//!
//! The OAuth consent flow and token refresh happen outside this crate; the
//! credentials file only has to hold a current access token.

use super::MailProvider;
use crate::config::MailConfig;
use crate::error::{Error, Result};
use crate::types::{MailMessage, ThreadSummary};
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

const REQUEST_TIMEOUT_SECS: u64 = 30;
const NO_SUBJECT: &str = "(no subject)";
const METADATA_HEADERS: [&str; 6] = ["From", "To", "Cc", "Subject", "Date", "Message-ID"];

/// Gmail bodies are base64url with or without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub struct GmailClient {
    name: String,
    base: String,
    user: String,
    access_token: String,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl GmailClient {
    /// Create a client from the mail settings and a credentials file holding
    /// `access_token` (or `token`).
    pub fn new(config: &MailConfig, credentials_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(credentials_path).map_err(|e| {
            Error::Config(format!(
                "failed to read credentials {}: {}",
                credentials_path.display(),
                e
            ))
        })?;
        let credentials: Value = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "malformed credentials {}: {}",
                credentials_path.display(),
                e
            ))
        })?;
        let access_token = ["access_token", "token"]
            .iter()
            .find_map(|key| credentials.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "credentials {} have no access_token",
                    credentials_path.display()
                ))
            })?
            .to_string();

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_GMAIL_API_BASE.to_string());
        let mut client = Self::with_token(&base, &config.user, &access_token)?;
        client.name = config.provider_name.clone();
        Ok(client)
    }

    /// Create a client for an explicit API base and token.
    pub fn with_token(base: &str, user: &str, access_token: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Provider(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: "gmail".to_string(),
            base: base.trim_end_matches('/').to_string(),
            user: user.to_string(),
            access_token: access_token.to_string(),
            runtime,
            http,
        })
    }

    fn user_url(&self, rest: &str) -> String {
        format!("{}/users/{}/{}", self.base, urlencoding::encode(&self.user), rest)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .map_err(|e| Error::Config(format!("invalid access token: {e}")))?,
        );
        Ok(headers)
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        let headers = self.headers()?;
        self.runtime.block_on(async {
            let resp = self
                .http
                .get(url)
                .headers(headers)
                .send()
                .await
                .map_err(|e| Error::Provider(format!("gmail request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| Error::Provider(format!("gmail read body failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Provider(format!(
                    "gmail returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }
            serde_json::from_str(&body)
                .map_err(|e| Error::Provider(format!("gmail response is not JSON: {e}")))
        })
    }

    fn post_json(&self, url: &str, payload: &Value) -> Result<Value> {
        let headers = self.headers()?;
        self.runtime.block_on(async {
            let resp = self
                .http
                .post(url)
                .headers(headers)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::Provider(format!("gmail request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| Error::Provider(format!("gmail read body failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Provider(format!(
                    "gmail returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }
            Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
        })
    }
}

impl MailProvider for GmailClient {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn fetch_recent_threads(&self, lookback_days: u32, max_threads: usize) -> Result<Vec<ThreadSummary>> {
        let query = recent_threads_query(lookback_days);
        let list = self.get_json(&format!(
            "{}?q={}&maxResults={}",
            self.user_url("threads"),
            urlencoding::encode(&query),
            max_threads
        ))?;

        let metadata_params: String = METADATA_HEADERS
            .iter()
            .map(|h| format!("&metadataHeaders={}", urlencoding::encode(h)))
            .collect();

        let mut summaries = Vec::new();
        for entry in list
            .get("threads")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            let Some(id) = entry.get("id").and_then(Value::as_str) else {
                continue;
            };
            let thread = self.get_json(&format!(
                "{}?format=metadata{}",
                self.user_url(&format!("threads/{}", urlencoding::encode(id))),
                metadata_params
            ))?;
            let snippet = thread
                .get("snippet")
                .or_else(|| entry.get("snippet"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let (subject, change_marker) = subject_and_marker(&thread, &snippet);
            summaries.push(ThreadSummary {
                id: id.to_string(),
                subject,
                change_marker,
                snippet,
            });
        }

        tracing::debug!(query = %query, threads = summaries.len(), "Listed Gmail threads");
        Ok(summaries)
    }

    fn fetch_thread_messages(&self, thread_id: &str, max_messages: usize) -> Result<Vec<MailMessage>> {
        let thread = self.get_json(&format!(
            "{}?format=full",
            self.user_url(&format!("threads/{}", urlencoding::encode(thread_id)))
        ))?;
        let messages = thread
            .get("messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let skip = messages.len().saturating_sub(max_messages);
        Ok(messages[skip..].iter().map(parse_message).collect())
    }

    fn send_mail(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let mailbox: Mailbox = to
            .parse()
            .map_err(|e| Error::Config(format!("invalid recipient {to}: {e}")))?;
        let email = Message::builder()
            .from(mailbox.clone())
            .to(mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| Error::Provider(format!("failed to build email: {e}")))?;
        let raw = URL_SAFE.encode(email.formatted());

        self.post_json(&self.user_url("messages/send"), &json!({ "raw": raw }))?;
        tracing::info!(to, subject, "Sent mail via Gmail");
        Ok(())
    }
}

/// Thread listing query for the lookback window.
pub fn recent_threads_query(lookback_days: u32) -> String {
    format!("newer_than:{lookback_days}d -category:promotions -category:social")
}

fn header_value(message: &Value, name: &str) -> String {
    message
        .pointer("/payload/headers")
        .and_then(Value::as_array)
        .and_then(|headers| {
            headers.iter().find(|h| {
                h.get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
        })
        .and_then(|h| h.get("value"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Subject from the first message, marker from the newest message's historyId.
fn subject_and_marker(thread: &Value, snippet: &str) -> (String, Option<String>) {
    let messages = thread
        .get("messages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
        let subject = if snippet.is_empty() { NO_SUBJECT } else { snippet };
        return (subject.to_string(), None);
    };

    let subject = match header_value(first, "Subject") {
        s if s.is_empty() => NO_SUBJECT.to_string(),
        s => s,
    };
    let marker = match last.get("historyId") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    (subject, marker)
}

fn parse_message(message: &Value) -> MailMessage {
    let timestamp = message
        .get("internalDate")
        .and_then(Value::as_str)
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339());

    MailMessage {
        message_id: message
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        timestamp,
        from: header_value(message, "From"),
        to: header_value(message, "To"),
        subject: header_value(message, "Subject"),
        date: header_value(message, "Date"),
        text: message
            .get("payload")
            .map(extract_plain_text)
            .unwrap_or_default(),
    }
}

/// First non-blank text/plain part, else the part's own body.
fn extract_plain_text(payload: &Value) -> String {
    if payload.get("mimeType").and_then(Value::as_str) == Some("text/plain") {
        return decode_body(payload);
    }
    if let Some(parts) = payload.get("parts").and_then(Value::as_array) {
        for part in parts {
            let text = extract_plain_text(part);
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
    decode_body(payload)
}

fn decode_body(part: &Value) -> String {
    part.pointer("/body/data")
        .and_then(Value::as_str)
        .and_then(|data| BODY_ENGINE.decode(data).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(text)
    }

    #[test]
    fn query_excludes_promotions_and_social() {
        assert_eq!(
            recent_threads_query(2),
            "newer_than:2d -category:promotions -category:social"
        );
    }

    #[test]
    fn subject_falls_back_to_snippet_without_messages() {
        let (subject, marker) = subject_and_marker(&json!({"id": "t1"}), "Quick note");
        assert_eq!(subject, "Quick note");
        assert!(marker.is_none());

        let (subject, _) = subject_and_marker(&json!({}), "");
        assert_eq!(subject, NO_SUBJECT);
    }

    #[test]
    fn subject_from_first_message_marker_from_last() {
        let thread = json!({"messages": [
            {"historyId": "10", "payload": {"headers": [{"name": "subject", "value": "Invoice 9"}]}},
            {"historyId": 12, "payload": {"headers": []}}
        ]});
        let (subject, marker) = subject_and_marker(&thread, "snippet");
        assert_eq!(subject, "Invoice 9");
        assert_eq!(marker.as_deref(), Some("12"));
    }

    #[test]
    fn extracts_nested_plain_text() {
        let payload = json!({
            "mimeType": "multipart/alternative",
            "parts": [
                {"mimeType": "multipart/related", "parts": [
                    {"mimeType": "text/plain", "body": {"data": encode("Hello there?")}}
                ]},
                {"mimeType": "text/html", "body": {"data": encode("<p>Hello</p>")}}
            ]
        });
        assert_eq!(extract_plain_text(&payload), "Hello there?");

        let html_only = json!({"mimeType": "text/html", "body": {"data": encode("<p>Hi</p>")}});
        assert_eq!(extract_plain_text(&html_only), "<p>Hi</p>");
    }

    #[test]
    fn new_requires_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"refresh_token": "r"}"#).unwrap();
        assert!(matches!(
            GmailClient::new(&MailConfig::default(), &path),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            GmailClient::new(&MailConfig::default(), &dir.path().join("missing.json")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn fetches_thread_summaries() {
        let mut server = Server::new();
        let list = server
            .mock("GET", "/users/me/threads")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "q".into(),
                    "newer_than:2d -category:promotions -category:social".into(),
                ),
                Matcher::UrlEncoded("maxResults".into(), "50".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"threads": [{"id": "t1", "snippet": "Please pay"}]}"#)
            .expect(1)
            .create();
        let get = server
            .mock("GET", "/users/me/threads/t1")
            .match_query(Matcher::UrlEncoded("format".into(), "metadata".into()))
            .with_status(200)
            .with_body(
                r#"{"id": "t1", "messages": [
                    {"historyId": "100", "payload": {"headers": [{"name": "Subject", "value": "Invoice 1023"}]}},
                    {"historyId": "105", "payload": {"headers": []}}
                ]}"#,
            )
            .expect(1)
            .create();

        let client = GmailClient::with_token(&server.url(), "me", "tok").unwrap();
        let threads = client.fetch_recent_threads(2, 50).unwrap();

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].subject, "Invoice 1023");
        assert_eq!(threads[0].change_marker.as_deref(), Some("105"));
        assert_eq!(threads[0].snippet, "Please pay");
        list.assert();
        get.assert();
    }

    #[test]
    fn fetches_newest_messages_with_bodies() {
        let mut server = Server::new();
        let body = json!({"id": "t1", "messages": [
            {"id": "m1", "internalDate": "1790000000000", "payload": {"mimeType": "text/plain",
                "headers": [{"name": "From", "value": "a@x.com"}], "body": {"data": encode("first")}}},
            {"id": "m2", "internalDate": "1790000100000", "payload": {"mimeType": "text/plain",
                "headers": [{"name": "From", "value": "Me <me@x.com>"}, {"name": "Date", "value": "Tue, 20 Oct 2026 10:00:00 +0000"}],
                "body": {"data": encode("second")}}}
        ]});
        let _mock = server
            .mock("GET", "/users/me/threads/t1")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_body(body.to_string())
            .create();

        let client = GmailClient::with_token(&server.url(), "me", "tok").unwrap();
        let messages = client.fetch_thread_messages("t1", 1).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "m2");
        assert_eq!(messages[0].from, "Me <me@x.com>");
        assert_eq!(messages[0].text, "second");
        assert_eq!(messages[0].date, "Tue, 20 Oct 2026 10:00:00 +0000");
        assert!(messages[0].timestamp.is_some());
    }

    #[test]
    fn sends_base64url_html_message() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/users/me/messages/send")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Regex(r#""raw":"[A-Za-z0-9_\-=]+""#.to_string()))
            .with_status(200)
            .with_body(r#"{"id": "sent1"}"#)
            .expect(1)
            .create();

        let client = GmailClient::with_token(&server.url(), "me", "tok").unwrap();
        client
            .send_mail("me@x.com", "[MAILTRIAGE DIGEST] Daily Action Digest", "<p>hi</p>")
            .unwrap();
        mock.assert();
    }

    #[test]
    fn http_errors_are_provider_errors() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", "/users/me/threads/t1")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("invalid credentials")
            .create();

        let client = GmailClient::with_token(&server.url(), "me", "tok").unwrap();
        match client.fetch_thread_messages("t1", 6) {
            Err(Error::Provider(message)) => assert!(message.contains("401")),
            other => panic!("expected provider error, got {other:?}"),
        }
    }
}
