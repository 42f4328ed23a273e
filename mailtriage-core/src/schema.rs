//! Classification schema loading and validation
//!
//! The base schema is a JSON Schema document. At load time its domain enum is
//! patched from configuration and the allowed values are lifted into a typed
//! [`TriageSchema`]. The raw document is kept for the completion provider's
//! strict response format; validation of delegated output is a typed check
//! against the lifted values.

use crate::error::{Error, Result};
use crate::types::{ActionKind, ClassificationOutput, Priority};
use serde_json::{Map, Value};
use std::path::Path;

/// Schema shipped with the crate and written by `mailtriage init`.
pub const BASE_SCHEMA_JSON: &str = include_str!("../schema/triage_schema.json");

/// Domains every schema accepts: normalization defaults to `other` and the
/// simulated classifier emits `noise`.
pub const BUILTIN_DOMAINS: [&str; 2] = ["other", "noise"];

const TOP_LEVEL_FIELDS: [&str; 7] = [
    "domain",
    "intent",
    "priority",
    "confidence",
    "rationale",
    "extractions",
    "recommended_actions",
];

/// Typed view of the classification schema.
#[derive(Debug, Clone)]
pub struct TriageSchema {
    /// `None` when the document declares no domain enum (any domain accepted)
    domains: Option<Vec<String>>,
    priorities: Vec<Priority>,
    actions: Vec<ActionKind>,
    document: Value,
}

/// Load the base schema and patch its domain enum from configuration.
///
/// - A domain list with at least two entries replaces the enum.
/// - A default domain is appended to the enum when absent.
/// - Built-in domains are appended to the enum when absent.
pub fn load_schema(
    base_path: &Path,
    domain_list: &[String],
    default_domain: Option<&str>,
) -> Result<TriageSchema> {
    let content = std::fs::read_to_string(base_path).map_err(|e| {
        Error::Config(format!(
            "failed to read schema file {}: {}",
            base_path.display(),
            e
        ))
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "malformed schema file {}: {}",
            base_path.display(),
            e
        ))
    })?;

    let schema = TriageSchema::from_document(document, domain_list, default_domain)?;
    tracing::debug!(
        path = %base_path.display(),
        domains = ?schema.domains,
        "Loaded classification schema"
    );
    Ok(schema)
}

impl TriageSchema {
    /// Build from an already-parsed schema document.
    pub fn from_document(
        mut document: Value,
        domain_list: &[String],
        default_domain: Option<&str>,
    ) -> Result<Self> {
        if !document.is_object() {
            return Err(Error::Config(
                "schema document must be a JSON object".to_string(),
            ));
        }

        let configured: Vec<String> = domain_list
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .fold(Vec::new(), |mut acc, d| {
                if !acc.contains(&d) {
                    acc.push(d);
                }
                acc
            });

        if configured.len() >= 2 {
            let domain_prop = document
                .pointer_mut("/properties/domain")
                .and_then(Value::as_object_mut)
                .ok_or_else(|| {
                    Error::Config("schema has no properties.domain object".to_string())
                })?;
            domain_prop.insert(
                "enum".to_string(),
                Value::Array(configured.into_iter().map(Value::String).collect()),
            );
        }

        if let Some(domain_enum) = document
            .pointer_mut("/properties/domain/enum")
            .and_then(Value::as_array_mut)
        {
            let default_domain = default_domain
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty());
            let extra = default_domain
                .into_iter()
                .chain(BUILTIN_DOMAINS.iter().map(|d| d.to_string()));
            for domain in extra {
                if !domain_enum.iter().any(|v| v.as_str() == Some(domain.as_str())) {
                    domain_enum.push(Value::String(domain));
                }
            }
        }

        let domains = match document.pointer("/properties/domain/enum") {
            Some(Value::Array(values)) => Some(
                values
                    .iter()
                    .map(|v| {
                        v.as_str().map(ToString::to_string).ok_or_else(|| {
                            Error::Config("domain enum must contain strings".to_string())
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(_) => {
                return Err(Error::Config("domain enum must be an array".to_string()));
            }
            None => None,
        };

        let priorities = parse_enum(&document, "/properties/priority/enum", &Priority::ALL)?;
        let actions = parse_enum(
            &document,
            "/properties/recommended_actions/items/properties/action/enum",
            &ActionKind::ALL,
        )?;

        Ok(Self {
            domains,
            priorities,
            actions,
            document,
        })
    }

    /// The bundled base schema, patched from configuration.
    pub fn bundled(domain_list: &[String], default_domain: Option<&str>) -> Result<Self> {
        let document: Value = serde_json::from_str(BASE_SCHEMA_JSON)?;
        Self::from_document(document, domain_list, default_domain)
    }

    /// Allowed domains, or `None` when any domain is accepted.
    pub fn domains(&self) -> Option<&[String]> {
        self.domains.as_deref()
    }

    pub fn priorities(&self) -> &[Priority] {
        &self.priorities
    }

    pub fn actions(&self) -> &[ActionKind] {
        &self.actions
    }

    /// The patched JSON Schema document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Prompt text listing the allowed enumerated values.
    pub fn allowed_values_text(&self) -> String {
        let domains = match &self.domains {
            Some(domains) => domains.join(", "),
            None => "(any short lowercase label)".to_string(),
        };
        let priorities = self
            .priorities
            .iter()
            .map(Priority::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let actions = self
            .actions
            .iter()
            .map(ActionKind::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Allowed values:\n- domain: {domains}\n- priority: {priorities}\n- recommended_actions[].action: {actions}"
        )
    }

    /// Check a (normalized) classification payload against the schema.
    ///
    /// Every violation is collected and reported in one
    /// [`Error::SchemaValidation`].
    pub fn validate(&self, value: &Value) -> Result<ClassificationOutput> {
        let Some(obj) = value.as_object() else {
            return Err(Error::SchemaValidation(
                "output must be a JSON object".to_string(),
            ));
        };

        let mut violations = Vec::new();

        for field in TOP_LEVEL_FIELDS {
            if !obj.contains_key(field) {
                violations.push(format!("missing field `{field}`"));
            }
        }
        for key in obj.keys() {
            if !TOP_LEVEL_FIELDS.contains(&key.as_str()) {
                violations.push(format!("unexpected field `{key}`"));
            }
        }

        if let Some(domain) = obj.get("domain") {
            match domain.as_str() {
                Some(d) => {
                    if let Some(allowed) = &self.domains {
                        if !allowed.iter().any(|a| a == d) {
                            violations.push(format!("domain `{d}` is not one of [{}]", allowed.join(", ")));
                        }
                    }
                }
                None => violations.push("`domain` must be a string".to_string()),
            }
        }

        expect_string(obj, "intent", &mut violations);
        expect_string(obj, "rationale", &mut violations);

        if let Some(priority) = obj.get("priority") {
            match priority.as_str() {
                Some(p) => {
                    let known = p
                        .parse::<Priority>()
                        .map(|p| self.priorities.contains(&p))
                        .unwrap_or(false);
                    if !known {
                        violations.push(format!("priority `{p}` is not allowed"));
                    }
                }
                None => violations.push("`priority` must be a string".to_string()),
            }
        }

        if let Some(confidence) = obj.get("confidence") {
            check_unit_interval(confidence, "confidence", false, &mut violations);
        }

        if let Some(extractions) = obj.get("extractions") {
            match extractions.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        check_extraction(i, item, &mut violations);
                    }
                }
                None => violations.push("`extractions` must be an array".to_string()),
            }
        }

        if let Some(actions) = obj.get("recommended_actions") {
            match actions.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        self.check_action(i, item, &mut violations);
                    }
                }
                None => violations.push("`recommended_actions` must be an array".to_string()),
            }
        }

        if !violations.is_empty() {
            return Err(Error::SchemaValidation(violations.join("; ")));
        }

        serde_json::from_value(value.clone()).map_err(|e| Error::SchemaValidation(e.to_string()))
    }

    fn check_action(&self, index: usize, item: &Value, violations: &mut Vec<String>) {
        let path = format!("recommended_actions[{index}]");
        let Some(obj) = item.as_object() else {
            violations.push(format!("{path} must be an object"));
            return;
        };
        match obj.get("action").and_then(Value::as_str) {
            Some(kind) => {
                let known = kind
                    .parse::<ActionKind>()
                    .map(|k| self.actions.contains(&k))
                    .unwrap_or(false);
                if !known {
                    violations.push(format!("{path}.action `{kind}` is not allowed"));
                }
            }
            None => violations.push(format!("{path}.action must be a string")),
        }
        match obj.get("title") {
            Some(Value::String(_)) => {}
            _ => violations.push(format!("{path}.title must be a string")),
        }
        for field in ["notes", "due_date", "urgency_window"] {
            check_nullable_string(obj, field, &path, violations);
        }
    }
}

fn parse_enum<T>(document: &Value, pointer: &str, all: &[T]) -> Result<Vec<T>>
where
    T: Copy + std::str::FromStr<Err = String>,
{
    match document.pointer(pointer) {
        None => Ok(all.to_vec()),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| Error::Config(format!("{pointer} must contain strings")))
                    .and_then(|s| s.parse::<T>().map_err(Error::Config))
            })
            .collect(),
        Some(_) => Err(Error::Config(format!("{pointer} must be an array"))),
    }
}

fn expect_string(obj: &Map<String, Value>, field: &str, violations: &mut Vec<String>) {
    if let Some(value) = obj.get(field) {
        if !value.is_string() {
            violations.push(format!("`{field}` must be a string"));
        }
    }
}

fn check_nullable_string(
    obj: &Map<String, Value>,
    field: &str,
    path: &str,
    violations: &mut Vec<String>,
) {
    match obj.get(field) {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => violations.push(format!("{path}.{field} must be a string or null")),
    }
}

fn check_unit_interval(value: &Value, path: &str, nullable: bool, violations: &mut Vec<String>) {
    match value {
        Value::Null if nullable => {}
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or(f64::NAN);
            if !(0.0..=1.0).contains(&v) {
                violations.push(format!("{path} {v} is outside 0.0-1.0"));
            }
        }
        _ => violations.push(format!("{path} must be a number")),
    }
}

fn check_extraction(index: usize, item: &Value, violations: &mut Vec<String>) {
    let path = format!("extractions[{index}]");
    let Some(obj) = item.as_object() else {
        violations.push(format!("{path} must be an object"));
        return;
    };
    for field in ["type", "summary"] {
        match obj.get(field) {
            Some(Value::String(_)) => {}
            _ => violations.push(format!("{path}.{field} must be a string")),
        }
    }
    for field in ["due_date", "currency", "invoice_id", "counterparty"] {
        check_nullable_string(obj, field, &path, violations);
    }
    match obj.get("amount") {
        None | Some(Value::Null) | Some(Value::Number(_)) => {}
        Some(_) => violations.push(format!("{path}.amount must be a number or null")),
    }
    if let Some(confidence) = obj.get("confidence") {
        check_unit_interval(confidence, &format!("{path}.confidence"), true, violations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    fn valid_output() -> Value {
        json!({
            "domain": "payment",
            "intent": "payment_commitment",
            "priority": "high",
            "confidence": 0.8,
            "rationale": "Invoice due.",
            "extractions": [{
                "type": "payment",
                "summary": "Invoice 1023",
                "due_date": null,
                "amount": 120.5,
                "currency": "USD",
                "invoice_id": "1023",
                "counterparty": null,
                "confidence": 0.7
            }],
            "recommended_actions": [{
                "action": "create_task",
                "title": "Confirm remittance",
                "notes": null,
                "due_date": "2026-10-20",
                "urgency_window": "7d"
            }]
        })
    }

    #[test]
    fn bundled_schema_keeps_base_enum_without_domain_list() {
        let schema = TriageSchema::bundled(&[], None).unwrap();
        assert_eq!(
            schema.domains().unwrap(),
            &domains(&["payment", "expiry", "audit", "followup", "other", "noise"])
        );
        assert_eq!(schema.priorities().len(), 4);
        assert_eq!(schema.actions().len(), 5);
    }

    #[test]
    fn single_domain_list_does_not_overwrite() {
        let schema = TriageSchema::bundled(&domains(&["legal"]), None).unwrap();
        assert!(!schema.domains().unwrap().contains(&"legal".to_string()));
    }

    #[test]
    fn domain_list_overwrites_enum_and_appends_default_and_builtins() {
        let schema =
            TriageSchema::bundled(&domains(&["Legal", "hr", "legal"]), Some("misc")).unwrap();
        assert_eq!(
            schema.domains().unwrap(),
            &domains(&["legal", "hr", "misc", "other", "noise"])
        );
        assert_eq!(
            schema.document().pointer("/properties/domain/enum").unwrap(),
            &json!(["legal", "hr", "misc", "other", "noise"])
        );
    }

    #[test]
    fn default_domain_not_duplicated() {
        let schema = TriageSchema::bundled(&domains(&["payment", "other"]), Some("other")).unwrap();
        assert_eq!(schema.domains().unwrap(), &domains(&["payment", "other", "noise"]));
    }

    #[test]
    fn load_schema_reports_missing_and_malformed_files_as_config_errors() {
        let missing = load_schema(Path::new("/nonexistent/schema.json"), &[], None);
        assert!(matches!(missing, Err(Error::Config(_))));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let malformed = load_schema(file.path(), &[], None);
        assert!(matches!(malformed, Err(Error::Config(_))));
    }

    #[test]
    fn load_schema_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", BASE_SCHEMA_JSON).unwrap();
        let schema = load_schema(file.path(), &domains(&["a", "b"]), None).unwrap();
        assert_eq!(schema.domains().unwrap(), &domains(&["a", "b", "other", "noise"]));
    }

    #[test]
    fn schema_without_domain_enum_accepts_any_domain() {
        let document = json!({"type": "object", "properties": {"domain": {"type": "string"}}});
        let schema = TriageSchema::from_document(document, &[], Some("other")).unwrap();
        assert!(schema.domains().is_none());

        let mut output = valid_output();
        output["domain"] = json!("anything");
        assert!(schema.validate(&output).is_ok());
    }

    #[test]
    fn validate_accepts_conforming_output() {
        let schema = TriageSchema::bundled(&[], None).unwrap();
        let output = schema.validate(&valid_output()).unwrap();
        assert_eq!(output.domain, "payment");
        assert_eq!(output.priority, Priority::High);
        assert_eq!(output.extractions[0].invoice_id.as_deref(), Some("1023"));
        assert_eq!(output.recommended_actions[0].action, ActionKind::CreateTask);
    }

    #[test]
    fn validate_collects_every_violation() {
        let schema = TriageSchema::bundled(&[], None).unwrap();
        let mut output = valid_output();
        output["domain"] = json!("gardening");
        output["priority"] = json!("critical");
        output["confidence"] = json!(1.5);
        output["recommended_actions"][0]["action"] = json!("escalate");
        output.as_object_mut().unwrap().remove("rationale");

        let err = schema.validate(&output).unwrap_err();
        let Error::SchemaValidation(message) = err else {
            panic!("expected schema validation error");
        };
        assert!(message.contains("gardening"));
        assert!(message.contains("critical"));
        assert!(message.contains("outside"));
        assert!(message.contains("escalate"));
        assert!(message.contains("missing field `rationale`"));
    }

    #[test]
    fn validate_rejects_unexpected_fields_and_non_objects() {
        let schema = TriageSchema::bundled(&[], None).unwrap();
        let mut output = valid_output();
        output["mood"] = json!("cheerful");
        assert!(matches!(schema.validate(&output), Err(Error::SchemaValidation(_))));
        assert!(matches!(schema.validate(&json!([1, 2])), Err(Error::SchemaValidation(_))));
    }

    #[test]
    fn allowed_values_text_lists_enums() {
        let schema = TriageSchema::bundled(&domains(&["legal", "hr"]), None).unwrap();
        let text = schema.allowed_values_text();
        assert!(text.contains("domain: legal, hr, other, noise"));
        assert!(text.contains("priority: urgent, high, normal, ignore"));
        assert!(text.contains("suppress"));
    }
}
