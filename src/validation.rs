//! Field-level validation reports.
//!
//! Both failure sources of a request, deserialization of the merged object and
//! `validator` rules, are flattened into one ordered list of field errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

/// Field used when a failure is not attached to any property.
pub const ROOT_FIELD: &str = "request";

/// A single failed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `address.city` or `items[1].qty`.
    pub field: String,
    /// Human readable reason.
    pub message: String,
}

/// Ordered, de-duplicated list of field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report with a single entry.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.push(field, message);
        report
    }

    /// Add an error unless the same field/message pair is already present.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let error = FieldError {
            field: field.into(),
            message: message.into(),
        };
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    pub fn extend(&mut self, other: ValidationReport) {
        for error in other.errors {
            self.push(error.field, error.message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    /// Build a report from a failed deserialization of the merged object.
    pub fn from_deserialize(error: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = error.path().to_string();
        let message = error.inner().to_string();

        let field = match missing_field(&message) {
            Some(name) => join_field(&path, name),
            None => join_field(&path, ""),
        };

        Self::single(field, message)
    }

    /// Build a report from `validator` errors, nested structs and lists included.
    pub fn from_validator(errors: &ValidationErrors) -> Self {
        let mut report = Self::new();
        flatten("", errors, &mut report);
        report
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<ValidationErrors> for ValidationReport {
    fn from(errors: ValidationErrors) -> Self {
        Self::from_validator(&errors)
    }
}

/// Extracts `name` from serde's "missing field `name`" message.
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

fn join_field(parent: &str, child: &str) -> String {
    let parent = if parent == "." { "" } else { parent };
    match (parent.is_empty(), child.is_empty()) {
        (true, true) => ROOT_FIELD.to_string(),
        (true, false) => child.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent}.{child}"),
    }
}

fn flatten(prefix: &str, errors: &ValidationErrors, report: &mut ValidationReport) {
    let mut entries: Vec<(String, &ValidationErrorsKind)> = errors
        .errors()
        .iter()
        .map(|(field, kind)| (field.to_string(), kind))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (field, kind) in entries {
        // struct-level rules report under `__all__`
        let path = if field == "__all__" {
            join_field(prefix, "")
        } else {
            join_field(prefix, &field)
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    report.push(path.clone(), describe(error));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten(&path, inner, report),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten(&format!("{path}[{index}]"), inner, report);
                }
            }
        }
    }
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let param = |name: &str| error.params.get(name).map(render);

    match error.code.as_ref() {
        "length" => match (param("equal"), param("min"), param("max")) {
            (Some(equal), _, _) => format!("must have length {equal}"),
            (None, Some(min), Some(max)) => format!("must have length between {min} and {max}"),
            (None, Some(min), None) => format!("must have length at least {min}"),
            (None, None, Some(max)) => format!("must have length at most {max}"),
            _ => "has an invalid length".to_string(),
        },
        "range" => match (param("min"), param("max")) {
            (Some(min), Some(max)) => format!("must be between {min} and {max}"),
            (Some(min), None) => format!("must be at least {min}"),
            (None, Some(max)) => format!("must be at most {max}"),
            _ => "is out of range".to_string(),
        },
        "email" => "must be a valid email address".to_string(),
        "url" => "must be a valid URL".to_string(),
        "required" => "is required".to_string(),
        "must_match" => match param("other") {
            Some(other) => format!("must match `{other}`"),
            None => "must match".to_string(),
        },
        "contains" => match param("needle") {
            Some(needle) => format!("must contain `{needle}`"),
            None => "is missing a required substring".to_string(),
        },
        "does_not_contain" => match param("needle") {
            Some(needle) => format!("must not contain `{needle}`"),
            None => "contains a forbidden substring".to_string(),
        },
        "regex" => "has an invalid format".to_string(),
        "credit_card" => "must be a valid credit card number".to_string(),
        "non_control_character" => "must not contain control characters".to_string(),
        code => format!("failed `{code}` validation"),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct Address {
        #[validate(length(min = 2))]
        city: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(email)]
        email: String,
        #[validate(range(min = 18, max = 130))]
        age: u32,
        #[validate(nested)]
        address: Address,
        #[validate(length(min = 1, message = "pick at least one tag"))]
        tags: Vec<String>,
    }

    fn deserialize(value: serde_json::Value) -> Result<Signup, ValidationReport> {
        serde_path_to_error::deserialize(value).map_err(ValidationReport::from_deserialize)
    }

    #[test]
    fn test_missing_field_is_named() {
        let report = deserialize(json!({"email": "a@b.co", "age": 20, "tags": []})).unwrap_err();
        assert_eq!(report.errors()[0].field, "address");
        assert!(report.errors()[0].message.contains("missing field"));
    }

    #[test]
    fn test_nested_missing_field_has_path() {
        let report = deserialize(json!({
            "email": "a@b.co", "age": 20, "tags": [], "address": {}
        }))
        .unwrap_err();
        assert_eq!(report.errors()[0].field, "address.city");
    }

    #[test]
    fn test_type_error_points_at_field() {
        let report = deserialize(json!({
            "email": "a@b.co", "age": "old", "tags": [], "address": {"city": "Rome"}
        }))
        .unwrap_err();
        assert_eq!(report.errors()[0].field, "age");
        assert!(report.errors()[0].message.contains("invalid type"));
    }

    #[test]
    fn test_validator_errors_flattened_and_sorted() {
        let signup = Signup {
            email: "nope".into(),
            age: 5,
            address: Address { city: "X".into() },
            tags: vec![],
        };
        let report = ValidationReport::from_validator(&signup.validate().unwrap_err());
        let fields: Vec<&str> = report.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["address.city", "age", "email", "tags"]);

        let messages: Vec<&str> = report.errors().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages[0], "must have length at least 2");
        assert!(messages[1].starts_with("must be between 18"));
        assert_eq!(messages[2], "must be a valid email address");
        assert_eq!(messages[3], "pick at least one tag");
    }

    #[test]
    fn test_push_deduplicates() {
        let mut report = ValidationReport::single("id", "missing field `id`");
        report.extend(ValidationReport::single("id", "missing field `id`"));
        report.push("name", "is required");
        assert_eq!(report.errors().len(), 2);
        assert_eq!(report.to_string(), "id: missing field `id`; name: is required");
    }

    #[test]
    fn test_join_field_root() {
        assert_eq!(join_field(".", ""), ROOT_FIELD);
        assert_eq!(join_field(".", "name"), "name");
        assert_eq!(join_field("items[0]", "qty"), "items[0].qty");
    }
}
