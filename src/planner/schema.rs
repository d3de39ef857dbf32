//! Plan schema and validator
//!
//! Turns untrusted model output into a typed [`Plan`]. The validator never
//! fails by panicking or returning an error: it returns a tagged
//! [`ValidationOutcome`] that lists every field-level mismatch, and it logs
//! the outcome either way.

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Field holding the classification label
pub const QUERY_TYPE_FIELD: &str = "query_type";

/// Field holding the decomposed search strings
pub const SUB_QUERIES_FIELD: &str = "sub_queries";

/// Pseudo-field used for errors about the document as a whole
pub const ROOT_FIELD: &str = "$";

/// Closed set of query categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Comparison,
    Definition,
    Recommendation,
    Uses,
    /// Fallback for queries outside the guide's domain
    General,
}

impl QueryType {
    pub const ALL: [QueryType; 5] = [
        QueryType::Comparison,
        QueryType::Definition,
        QueryType::Recommendation,
        QueryType::Uses,
        QueryType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Comparison => "comparison",
            QueryType::Definition => "definition",
            QueryType::Recommendation => "recommendation",
            QueryType::Uses => "uses",
            QueryType::General => "general",
        }
    }

    /// Parse a label, ignoring case and surrounding whitespace
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == label)
    }

    /// Parse a label; anything outside the closed set maps to `General`
    pub fn from_label_or_general(label: &str) -> Self {
        match Self::from_label(label) {
            Some(t) => t,
            None => {
                tracing::warn!(label, "Unknown query_type label, using fallback 'general'");
                QueryType::General
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, QueryType::General)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured output of the planner stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub query_type: QueryType,
    pub sub_queries: Vec<String>,
}

impl Plan {
    pub fn new(query_type: QueryType, sub_queries: Vec<String>) -> Self {
        Self {
            query_type,
            sub_queries,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.query_type.is_fallback()
    }

    /// JSON form stored in session state and fed to the synthesizer
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            QUERY_TYPE_FIELD: self.query_type.as_str(),
            SUB_QUERIES_FIELD: self.sub_queries,
        })
    }

    /// Data-quality concerns that the schema itself does not reject
    pub fn quality_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.sub_queries.is_empty() {
            issues.push("sub_queries is empty".to_string());
        }

        let blank = self.sub_queries.iter().filter(|q| q.trim().is_empty()).count();
        if blank > 0 {
            issues.push(format!("{} blank sub-quer{}", blank, if blank == 1 { "y" } else { "ies" }));
        }

        if !self.is_fallback() && !(2..=3).contains(&self.sub_queries.len()) {
            issues.push(format!(
                "expected 2-3 sub-queries for '{}', got {}",
                self.query_type,
                self.sub_queries.len()
            ));
        }

        issues
    }
}

/// What went wrong with a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// Required field absent
    Missing,
    /// Field present with the wrong JSON type
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// One element of a sequence has the wrong type
    InvalidElement { index: usize, found: &'static str },
    /// Raw output was not a JSON object
    NotAnObject { found: &'static str },
    /// Raw output was not JSON at all
    MalformedJson { message: String },
    /// Sequence length outside the allowed range
    Count { min: usize, max: usize, found: usize },
}

/// Field-level schema mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    #[serde(flatten)]
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn new(field: &str, kind: FieldErrorKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldErrorKind::Missing => write!(f, "{}: field required", self.field),
            FieldErrorKind::WrongType { expected, found } => {
                write!(f, "{}: expected {}, found {}", self.field, expected, found)
            }
            FieldErrorKind::InvalidElement { index, found } => {
                write!(f, "{}[{}]: expected string, found {}", self.field, index, found)
            }
            FieldErrorKind::NotAnObject { found } => {
                write!(f, "{}: expected object, found {}", self.field, found)
            }
            FieldErrorKind::MalformedJson { message } => {
                write!(f, "{}: malformed JSON ({})", self.field, message)
            }
            FieldErrorKind::Count { min, max, found } => {
                write!(f, "{}: expected {}-{} entries, found {}", self.field, min, max, found)
            }
        }
    }
}

/// Tagged validation result; callers branch on the tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(Plan),
    Invalid(Vec<FieldError>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self {
            ValidationOutcome::Valid(plan) => Some(plan),
            ValidationOutcome::Invalid(_) => None,
        }
    }

    pub fn errors(&self) -> &[FieldError] {
        match self {
            ValidationOutcome::Valid(_) => &[],
            ValidationOutcome::Invalid(errors) => errors,
        }
    }

    /// Convert into the pipeline's error type for propagation
    pub fn into_result(self) -> Result<Plan> {
        match self {
            ValidationOutcome::Valid(plan) => Ok(plan),
            ValidationOutcome::Invalid(errors) => Err(PipelineError::SchemaValidation { errors }),
        }
    }
}

/// Schema validator for planner output
#[derive(Debug, Clone, Default)]
pub struct PlanValidator;

impl PlanValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate raw model text (parsed as JSON first)
    pub fn validate_str(&self, raw: &str) -> ValidationOutcome {
        match serde_json::from_str::<Value>(strip_code_fence(raw)) {
            Ok(value) => self.validate(&value),
            Err(e) => {
                let errors = vec![FieldError::new(
                    ROOT_FIELD,
                    FieldErrorKind::MalformedJson {
                        message: e.to_string(),
                    },
                )];
                tracing::error!(errors = %format_errors(&errors), "Schema mismatch: model returned non-JSON output");
                ValidationOutcome::Invalid(errors)
            }
        }
    }

    /// Validate an already-parsed mapping
    pub fn validate(&self, raw: &Value) -> ValidationOutcome {
        let outcome = check(raw);

        match &outcome {
            ValidationOutcome::Valid(plan) => {
                tracing::info!(
                    query_type = %plan.query_type,
                    sub_queries = plan.sub_queries.len(),
                    "Validation success: query classified as '{}'",
                    plan.query_type
                );
            }
            ValidationOutcome::Invalid(errors) => {
                tracing::error!(
                    error_count = errors.len(),
                    errors = %format_errors(errors),
                    "Schema mismatch: model returned incompatible JSON"
                );
            }
        }

        outcome
    }
}

/// Convenience wrapper around [`PlanValidator::validate`]
pub fn validate(raw: &Value) -> ValidationOutcome {
    PlanValidator::new().validate(raw)
}

fn check(raw: &Value) -> ValidationOutcome {
    let object = match raw.as_object() {
        Some(object) => object,
        None => {
            return ValidationOutcome::Invalid(vec![FieldError::new(
                ROOT_FIELD,
                FieldErrorKind::NotAnObject {
                    found: json_type(raw),
                },
            )]);
        }
    };

    let mut errors = Vec::new();

    let query_type = match object.get(QUERY_TYPE_FIELD) {
        None => {
            errors.push(FieldError::new(QUERY_TYPE_FIELD, FieldErrorKind::Missing));
            None
        }
        Some(Value::String(label)) => Some(label.as_str()),
        Some(other) => {
            errors.push(FieldError::new(
                QUERY_TYPE_FIELD,
                FieldErrorKind::WrongType {
                    expected: "string",
                    found: json_type(other),
                },
            ));
            None
        }
    };

    let sub_queries = match object.get(SUB_QUERIES_FIELD) {
        None => {
            errors.push(FieldError::new(SUB_QUERIES_FIELD, FieldErrorKind::Missing));
            None
        }
        Some(Value::Array(items)) => {
            let mut strings = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) => strings.push(s.clone()),
                    other => errors.push(FieldError::new(
                        SUB_QUERIES_FIELD,
                        FieldErrorKind::InvalidElement {
                            index,
                            found: json_type(other),
                        },
                    )),
                }
            }
            Some(strings)
        }
        Some(other) => {
            errors.push(FieldError::new(
                SUB_QUERIES_FIELD,
                FieldErrorKind::WrongType {
                    expected: "array of strings",
                    found: json_type(other),
                },
            ));
            None
        }
    };

    match (query_type, sub_queries) {
        (Some(label), Some(sub_queries)) if errors.is_empty() => ValidationOutcome::Valid(Plan {
            query_type: QueryType::from_label_or_general(label),
            sub_queries,
        }),
        _ => ValidationOutcome::Invalid(errors),
    }
}

/// Models sometimes wrap JSON mode output in a markdown fence
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn format_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
