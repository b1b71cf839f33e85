//! Compiled validators.
//!
//! The registry compiles each node label and edge triple into a validator
//! once at startup. A validator, given an arbitrary property map, returns
//! either the normalized map (defaults applied, enum members canonicalized)
//! or every offending path and cause at once.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult, ValidationIssue};
use crate::types::PropMap;

use super::{PropertyDef, PropertyKind};

/// Compiled validator for one node label.
#[derive(Debug, Clone)]
pub struct NodeValidator {
    label: String,
    properties: Arc<BTreeMap<String, PropertyDef>>,
    email_re: Arc<Regex>,
}

impl NodeValidator {
    pub(super) fn new(
        label: String,
        properties: BTreeMap<String, PropertyDef>,
        email_re: Arc<Regex>,
    ) -> Self {
        Self {
            label,
            properties: Arc::new(properties),
            email_re,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Validate and normalize a property map.
    ///
    /// Strict mode: unknown top-level keys are rejected. Defaults are applied
    /// only when the key is absent. On failure, every offending path is
    /// reported in one error.
    pub fn validate(&self, props: &PropMap) -> GraphResult<PropMap> {
        let mut issues = Vec::new();
        let mut normalized = PropMap::new();

        for key in props.keys() {
            if !self.properties.contains_key(key) {
                issues.push(ValidationIssue::new(
                    key.clone(),
                    format!("unknown property on label '{}'", self.label),
                ));
            }
        }

        for (name, def) in self.properties.iter() {
            match props.get(name) {
                Some(value) => match check_value(name, def, value, &self.email_re) {
                    Ok(v) => {
                        normalized.insert(name.clone(), v);
                    }
                    Err(issue) => issues.push(issue),
                },
                None => {
                    if let Some(default) = &def.default {
                        normalized.insert(name.clone(), default.clone());
                    } else if def.required {
                        issues.push(ValidationIssue::new(
                            name.clone(),
                            "required property is missing",
                        ));
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(normalized)
        } else {
            Err(GraphError::Validation {
                label: self.label.clone(),
                issues,
            })
        }
    }
}

/// Compiled validator for one edge triple.
///
/// An edge with no declared properties accepts any map, including an empty
/// one; declared properties make it behave like a node validator.
#[derive(Debug, Clone)]
pub struct EdgeValidator {
    descriptor: String,
    inner: Option<NodeValidator>,
}

impl EdgeValidator {
    pub(super) fn new(descriptor: String, inner: Option<NodeValidator>) -> Self {
        Self { descriptor, inner }
    }

    /// `from-[TYPE]->to`, for diagnostics.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn validate(&self, props: &PropMap) -> GraphResult<PropMap> {
        match &self.inner {
            Some(validator) => validator.validate(props),
            None => Ok(props.clone()),
        }
    }
}

/// Check a single value against its definition, producing the normalized
/// value on success.
fn check_value(
    name: &str,
    def: &PropertyDef,
    value: &JsonValue,
    email_re: &Regex,
) -> Result<JsonValue, ValidationIssue> {
    let mismatch = |expected: &str| {
        ValidationIssue::new(
            name.to_string(),
            format!("expected {expected}, got {}", kind_of(value)),
        )
    };

    match def.kind {
        PropertyKind::String => value
            .is_string()
            .then(|| value.clone())
            .ok_or_else(|| mismatch("a string")),
        PropertyKind::Number => value
            .is_number()
            .then(|| value.clone())
            .ok_or_else(|| mismatch("a number")),
        PropertyKind::Boolean => value
            .is_boolean()
            .then(|| value.clone())
            .ok_or_else(|| mismatch("a boolean")),
        PropertyKind::Date => {
            let Some(s) = value.as_str() else {
                return Err(mismatch("an ISO-8601 date string"));
            };
            let valid = DateTime::parse_from_rfc3339(s).is_ok()
                || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok();
            if valid {
                Ok(value.clone())
            } else {
                Err(ValidationIssue::new(
                    name.to_string(),
                    format!("'{s}' is not an ISO-8601 date or date-time with offset"),
                ))
            }
        }
        PropertyKind::Url => {
            let Some(s) = value.as_str() else {
                return Err(mismatch("a URL string"));
            };
            url::Url::parse(s)
                .map(|_| value.clone())
                .map_err(|e| ValidationIssue::new(name.to_string(), format!("invalid URL: {e}")))
        }
        PropertyKind::Email => {
            let Some(s) = value.as_str() else {
                return Err(mismatch("an email string"));
            };
            if email_re.is_match(s) {
                Ok(value.clone())
            } else {
                Err(ValidationIssue::new(
                    name.to_string(),
                    format!("'{s}' is not a valid email address"),
                ))
            }
        }
        PropertyKind::Enum => {
            let Some(s) = value.as_str() else {
                return Err(mismatch("an enum member string"));
            };
            let values = def.values.as_deref().unwrap_or_default();
            // Canonicalize to the declared casing
            match values.iter().find(|v| v.eq_ignore_ascii_case(s)) {
                Some(canonical) => Ok(JsonValue::String(canonical.clone())),
                None => Err(ValidationIssue::new(
                    name.to_string(),
                    format!("must be one of: {}", values.join(", ")),
                )),
            }
        }
        PropertyKind::StringList => {
            let Some(items) = value.as_array() else {
                return Err(mismatch("a list of strings"));
            };
            for (i, item) in items.iter().enumerate() {
                if !item.is_string() {
                    return Err(ValidationIssue::new(
                        format!("{name}[{i}]"),
                        format!("expected a string, got {}", kind_of(item)),
                    ));
                }
            }
            Ok(value.clone())
        }
        PropertyKind::Json => Ok(value.clone()),
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "an object",
    }
}
