//! Completion provider port and its OpenAI-compatible HTTP implementation.

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "Return a response that matches the provided JSON schema.";
const RESPONSE_FORMAT_NAME: &str = "EmailTriageResult";

/// Completion interface for delegated triage.
pub trait CompletionClient: Send + Sync {
    /// Send `prompt` with `schema` as a strict JSON response format and
    /// return the raw reply text.
    fn complete(&self, prompt: &str, schema: &Value) -> Result<String>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpCompletionClient {
    url: String,
    api_key: String,
    model: String,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Config("llm.base_url is required".to_string()))?;
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| Error::Config("llm.api_key (or LLM_API_KEY) is required".to_string()))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Provider(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            runtime,
            http,
        })
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, prompt: &str, schema: &Value) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Config(format!("invalid auth header: {e}")))?,
        );
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.2,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": RESPONSE_FORMAT_NAME,
                    "schema": schema,
                    "strict": true
                }
            }
        });

        self.runtime.block_on(async {
            let resp = self
                .http
                .post(&self.url)
                .headers(headers)
                .json(&payload)
                .send()
                .await
                .map_err(|e| Error::Provider(format!("completion request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| Error::Provider(format!("completion read body failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Provider(format!(
                    "completion endpoint returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }
            let json: Value = serde_json::from_str(&body)
                .map_err(|e| Error::Provider(format!("completion response is not JSON: {e}")))?;
            json.pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| {
                    Error::Provider(
                        "completion response missing choices[0].message.content".to_string(),
                    )
                })
        })
    }
}

/// Parse a reply as JSON, tolerating prose or code fences around the object.
pub fn parse_reply(raw: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(_) => {
            let extracted = extract_json_object(raw)?;
            serde_json::from_str(extracted).map_err(|e| {
                Error::SchemaValidation(format!("reply is not valid JSON: {e}"))
            })
        }
    }
}

fn extract_json_object(raw: &str) -> Result<&str> {
    let missing = || Error::SchemaValidation("reply did not contain a JSON object".to_string());
    let start = raw.find('{').ok_or_else(missing)?;
    let end = raw.rfind('}').ok_or_else(missing)?;
    if end <= start {
        return Err(Error::SchemaValidation(
            "reply JSON bounds are invalid".to_string(),
        ));
    }
    Ok(&raw[start..=end])
}
