//! Triage decision engine
//!
//! Turns a thread subject and its ordered messages into a normalized
//! [`ClassificationOutput`], either with the built-in keyword rules or by
//! delegating to a completion provider.

mod client;
mod normalize;
mod prompt;
mod simulate;

pub use client::{parse_reply, CompletionClient, HttpCompletionClient};
pub use normalize::normalize;
pub use prompt::{build_prompt, is_from_me, strip_quotes_and_signatures, MAX_BODY_CHARS};
pub use simulate::simulate;

use crate::config::{Config, LlmMode};
use crate::error::Result;
use crate::schema::TriageSchema;
use crate::types::{ClassificationOutput, MailMessage};

enum Classifier {
    Simulated,
    Delegated {
        client: Box<dyn CompletionClient>,
        model: String,
    },
}

/// Classifies threads in the configured mode.
pub struct TriageEngine {
    classifier: Classifier,
    schema: TriageSchema,
    my_email: String,
}

impl TriageEngine {
    /// Engine using the keyword rules.
    pub fn simulated(schema: TriageSchema) -> Self {
        Self {
            classifier: Classifier::Simulated,
            schema,
            my_email: String::new(),
        }
    }

    /// Engine delegating to `client`.
    pub fn delegated(
        schema: TriageSchema,
        client: Box<dyn CompletionClient>,
        model: impl Into<String>,
        my_email: impl Into<String>,
    ) -> Self {
        Self {
            classifier: Classifier::Delegated {
                client,
                model: model.into(),
            },
            schema,
            my_email: my_email.into(),
        }
    }

    /// Build the engine the configuration asks for.
    pub fn from_config(config: &Config, schema: TriageSchema) -> Result<Self> {
        match config.llm.mode {
            LlmMode::Simulate => Ok(Self::simulated(schema)),
            LlmMode::Delegated => {
                let client = HttpCompletionClient::new(&config.llm)?;
                Ok(Self::delegated(
                    schema,
                    Box::new(client),
                    config.llm.model.clone(),
                    config.mail.my_email.clone().unwrap_or_default(),
                ))
            }
        }
    }

    /// Model identifier recorded on triage runs.
    pub fn model_name(&self) -> &str {
        match &self.classifier {
            Classifier::Simulated => LlmMode::Simulate.as_str(),
            Classifier::Delegated { model, .. } => model,
        }
    }

    pub fn schema(&self) -> &TriageSchema {
        &self.schema
    }

    /// Classify one thread. Messages are ordered oldest first.
    pub fn triage(&self, subject: &str, messages: &[MailMessage]) -> Result<ClassificationOutput> {
        match &self.classifier {
            Classifier::Simulated => {
                // Not checked against the domain enum: a configured domain
                // list may leave out the keyword families' domains
                let value = normalize(serde_json::to_value(simulate(subject, messages))?);
                Ok(serde_json::from_value(value)?)
            }
            Classifier::Delegated { client, .. } => {
                let prompt = build_prompt(subject, messages, &self.my_email, &self.schema);
                let raw = client.complete(&prompt, self.schema.document())?;
                let value = normalize(parse_reply(&raw)?);
                let output = self.schema.validate(&value)?;
                tracing::debug!(
                    domain = %output.domain,
                    priority = %output.priority,
                    confidence = output.confidence,
                    "Delegated triage complete"
                );
                Ok(output)
            }
        }
    }
}
