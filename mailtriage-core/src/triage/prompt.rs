//! Prompt construction for the delegated classifier.

use crate::schema::TriageSchema;
use crate::types::MailMessage;
use regex::Regex;
use std::sync::LazyLock;

/// Cleaned bodies are cut to this many characters.
pub const MAX_BODY_CHARS: usize = 2500;

/// Signature markers only count past this character offset.
const SIGNATURE_MIN_OFFSET: usize = 80;

const SIGNATURE_MARKERS: [&str; 5] = ["--", "Sent from my", "Kind regards", "Best regards", "Regards,"];

static ATTRIBUTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^On .* wrote:$").unwrap());

/// Drop quoted lines and reply attributions, cut the signature and truncate.
pub fn strip_quotes_and_signatures(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with('>') && !ATTRIBUTION_LINE.is_match(trimmed)
        })
        .collect();
    let mut out = kept.join("\n").trim().to_string();

    // Markers are tried in order; only each marker's first occurrence counts.
    for marker in SIGNATURE_MARKERS {
        if let Some(idx) = out.find(marker) {
            if out[..idx].chars().count() > SIGNATURE_MIN_OFFSET {
                out = out[..idx].trim().to_string();
                break;
            }
        }
    }

    if out.chars().count() > MAX_BODY_CHARS {
        out = out.chars().take(MAX_BODY_CHARS).collect();
    }
    out
}

/// Whether a From header names my address.
pub fn is_from_me(from: &str, my_email: &str) -> bool {
    let me = my_email.trim().to_lowercase();
    !me.is_empty() && from.to_lowercase().contains(&me)
}

/// Build the classification prompt. Messages are listed oldest first.
pub fn build_prompt(
    subject: &str,
    messages: &[MailMessage],
    my_email: &str,
    schema: &TriageSchema,
) -> String {
    let mut parts = vec![
        "You are an AI assistant for a financial analyst and auditor.".to_string(),
        "Return ONLY valid JSON that matches the provided schema. Use EXACTLY these top-level keys and always include all of them:".to_string(),
        " domain, intent, priority, confidence, rationale, extractions, recommended_actions.".to_string(),
        "Be conservative: if low-impact or informational, set priority='ignore' and domain='noise'.".to_string(),
        "If no action is needed: domain=\"noise\", intent=\"fyi\", priority=\"ignore\", confidence between 0 and 1,".to_string(),
        "extractions=[], recommended_actions=[{\"action\":\"suppress\",\"title\":\"Ignore low-impact email\",\"notes\":\"No action required.\",\"due_date\":null,\"urgency_window\":null}]".to_string(),
        schema.allowed_values_text(),
    ];

    if !my_email.trim().is_empty() {
        parts.push(format!(
            "My address: {} (messages marked \"sent by me\" are my own outbound mail)",
            my_email.trim()
        ));
    }
    parts.push(format!("Thread subject: {subject}"));
    parts.push("Messages (newest last):".to_string());

    for message in messages {
        let marker = if is_from_me(&message.from, my_email) {
            " (sent by me)"
        } else {
            ""
        };
        parts.push(format!(
            "- From: {} | Date: {}{}",
            message.from, message.date, marker
        ));
        parts.push(format!(
            "  Body: {}",
            strip_quotes_and_signatures(&message.text)
        ));
    }

    parts.push("Return JSON now. No markdown. No extra keys.".to_string());
    parts.join("\n")
}
