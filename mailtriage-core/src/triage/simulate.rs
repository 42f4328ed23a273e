//! Deterministic keyword classifier used when no completion provider is
//! configured.

use crate::types::{
    ActionKind, ClassificationOutput, Extraction, MailMessage, Priority, RecommendedAction,
};

struct KeywordFamily {
    keywords: &'static [&'static str],
    domain: &'static str,
    intent: &'static str,
    priority: Priority,
    title: &'static str,
    notes: &'static str,
    window: &'static str,
    extraction_kind: &'static str,
    extraction_summary: &'static str,
    extraction_confidence: f64,
}

/// Tested in order; a later match overwrites domain, intent and priority.
const FAMILIES: [KeywordFamily; 3] = [
    KeywordFamily {
        keywords: &["invoice", "remittance", "payment", "paid", "wire", "ach"],
        domain: "payment",
        intent: "payment_commitment",
        priority: Priority::High,
        title: "Payment follow-up / confirm remittance",
        notes: "Check promised payment status.",
        window: "7d",
        extraction_kind: "payment",
        extraction_summary: "Payment-related conversation detected.",
        extraction_confidence: 0.65,
    },
    KeywordFamily {
        keywords: &["expires", "expiry", "renewal", "expiring"],
        domain: "expiry",
        intent: "deadline",
        priority: Priority::Urgent,
        title: "Track upcoming expiry / renewal",
        notes: "Confirm expiry date and renewal owner.",
        window: "72h",
        extraction_kind: "expiry",
        extraction_summary: "Expiry/renewal signal detected.",
        extraction_confidence: 0.65,
    },
    KeywordFamily {
        keywords: &["soc", "audit", "evidence", "pbc", "controls", "request"],
        domain: "audit",
        intent: "request",
        priority: Priority::High,
        title: "Audit request: respond / provide evidence",
        notes: "Identify requested items and due date.",
        window: "7d",
        extraction_kind: "document_request",
        extraction_summary: "Audit/evidence request detected.",
        extraction_confidence: 0.62,
    },
];

const NOISE_KEYWORDS: &[&str] = &["fyi", "newsletter", "promo", "update", "thank you"];

/// Classify a thread by keyword containment over its bodies and subject.
pub fn simulate(subject: &str, messages: &[MailMessage]) -> ClassificationOutput {
    let bodies: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    let text = format!("{} {}", bodies.join(" "), subject).to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

    let mut domain = "other";
    let mut intent = "other";
    let mut priority = Priority::Normal;
    let mut rationale = "Simulated triage.";
    let mut actions = Vec::new();
    let mut extractions = Vec::new();

    for family in &FAMILIES {
        if !has(family.keywords) {
            continue;
        }
        domain = family.domain;
        intent = family.intent;
        priority = family.priority;
        actions.push(RecommendedAction {
            action: ActionKind::CreateTask,
            title: family.title.to_string(),
            notes: Some(family.notes.to_string()),
            due_date: None,
            urgency_window: Some(family.window.to_string()),
        });
        extractions.push(Extraction::signal(
            family.extraction_kind,
            family.extraction_summary,
            family.extraction_confidence,
        ));
    }

    if actions.is_empty() && has(NOISE_KEYWORDS) {
        domain = "noise";
        intent = "fyi";
        priority = Priority::Ignore;
        actions.push(RecommendedAction::suppress());
        rationale = "Simulated: informational/noise.";
    }

    if actions.is_empty() {
        actions.push(RecommendedAction {
            action: ActionKind::ReviewNeeded,
            title: "Review thread".to_string(),
            notes: Some("Unclear intent; needs quick scan.".to_string()),
            due_date: None,
            urgency_window: Some("7d".to_string()),
        });
        rationale = "Simulated: ambiguous thread.";
    }

    ClassificationOutput {
        domain: domain.to_string(),
        intent: intent.to_string(),
        priority,
        confidence: if domain == "noise" { 0.75 } else { 0.62 },
        rationale: rationale.to_string(),
        extractions,
        recommended_actions: actions,
    }
}
