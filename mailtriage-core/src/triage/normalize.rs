//! Output normalization shared by both classifier modes.

use crate::types::RecommendedAction;
use serde_json::{json, Map, Value};

const PRIORITY_ALIASES: &[(&str, &str)] = &[
    ("medium", "normal"),
    ("med", "normal"),
    ("low", "ignore"),
    ("none", "ignore"),
    ("informational", "ignore"),
];

const DOMAIN_ALIASES: &[(&str, &str)] = &[
    ("receivables", "payment"),
    ("invoice", "payment"),
    ("billing", "payment"),
    ("renewals", "expiry"),
];

const INTENT_ALIASES: &[(&str, &str)] = &[
    ("follow_up", "followup_needed"),
    ("followup", "followup_needed"),
    ("pay", "payment_commitment"),
    ("payment", "payment_commitment"),
];

/// Fill defaults, canonicalize enumerated fields and inject the suppress
/// action for ignore outputs without actions.
///
/// Applying it twice yields the same value as applying it once.
pub fn normalize(raw: Value) -> Value {
    let mut obj = match raw {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    fill_default(&mut obj, "confidence", json!(0.5));
    fill_default(&mut obj, "rationale", json!(""));
    fill_default(&mut obj, "extractions", json!([]));
    fill_default(&mut obj, "recommended_actions", json!([]));

    canonicalize(&mut obj, "priority", PRIORITY_ALIASES, "normal");
    canonicalize(&mut obj, "domain", DOMAIN_ALIASES, "other");
    canonicalize(&mut obj, "intent", INTENT_ALIASES, "other");

    let no_actions = obj
        .get("recommended_actions")
        .and_then(Value::as_array)
        .map(Vec::is_empty)
        .unwrap_or(false);
    if obj.get("priority").and_then(Value::as_str) == Some("ignore") && no_actions {
        if let Ok(action) = serde_json::to_value(RecommendedAction::suppress()) {
            obj.insert("recommended_actions".to_string(), Value::Array(vec![action]));
        }
    }

    Value::Object(obj)
}

fn fill_default(obj: &mut Map<String, Value>, key: &str, default: Value) {
    match obj.get(key) {
        None | Some(Value::Null) => {
            obj.insert(key.to_string(), default);
        }
        Some(_) => {}
    }
}

/// Trim, lowercase and de-alias a string field. Empty or absent values take
/// the default; non-string values are left for validation to reject.
fn canonicalize(obj: &mut Map<String, Value>, key: &str, aliases: &[(&str, &str)], default: &str) {
    let current = match obj.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_lowercase(),
        Some(_) => return,
    };
    let mapped = aliases
        .iter()
        .find(|(alias, _)| *alias == current)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(current);
    let value = if mapped.is_empty() {
        default.to_string()
    } else {
        mapped
    };
    obj.insert(key.to_string(), Value::String(value));
}
