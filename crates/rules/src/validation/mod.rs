//! Annotation validation with structured errors and suggestions.
//!
//! Validation runs before an annotation is saved or loaded, never during
//! evaluation. It checks the raw document shape (unknown keys, merge
//! strategy spelling), then compiles `applies_to` into a [`Predicate`]:
//! regexes are compiled and dates parsed exactly once here.
//! Returns a [`ValidationResult`] with errors (block save) and warnings (advisory).
//!
//! [`Predicate`]: crate::evaluator::Predicate

mod applies_to_checks;
mod document_checks;

mod fuzzy;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluator::parse_timestamp;
use crate::rule::Rule;
use crate::schema::Annotation;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    /// JSON-path-like location, e.g. `"applies_to.filename_regex"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.reject(path.into(), message.into(), None);
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.reject(path.into(), message.into(), Some(suggestion.into()));
    }

    fn reject(&mut self, path: String, message: String, suggestion: Option<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path,
            message,
            suggestion,
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Paths of all errors, handy for assertions and log fields.
    pub fn error_paths(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.path.as_str()).collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("valid");
        }
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            if e.path.is_empty() {
                write!(f, "{}", e.message)?;
            } else {
                write!(f, "{}: {}", e.path, e.message)?;
            }
            if let Some(s) = &e.suggestion {
                write!(f, " ({})", s)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationResult {}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a parsed [`Annotation`] without compiling it.
pub fn validate_annotation(annotation: &Annotation) -> ValidationResult {
    let mut result = ValidationResult::new();
    check(annotation, &mut result);
    result
}

/// Validate and compile an annotation into an evaluable [`Rule`].
///
/// The annotation must already carry an id (stores assign one on save).
pub fn compile(annotation: Annotation) -> Result<Rule, ValidationResult> {
    let mut result = ValidationResult::new();
    let compiled = check(&annotation, &mut result);
    match (compiled, annotation.id.clone()) {
        (Some((predicate, expires)), Some(id)) if result.valid => {
            Ok(Rule::from_parts(id, annotation, predicate, expires))
        }
        (_, None) => {
            result.error("id", "annotation id is required before compilation");
            Err(result)
        }
        _ => Err(result),
    }
}

/// Parse a raw JSON document and validate it. Unknown keys and misspelled
/// merge strategies produce suggestions instead of a bare serde error.
pub fn parse_value(value: &serde_json::Value) -> Result<Annotation, ValidationResult> {
    let mut result = ValidationResult::new();
    document_checks::validate_shape(value, &mut result);
    if !result.valid {
        return Err(result);
    }
    let annotation: Annotation = match serde_json::from_value(value.clone()) {
        Ok(a) => a,
        Err(e) => {
            result.error("", format!("invalid annotation document: {e}"));
            return Err(result);
        }
    };
    check(&annotation, &mut result);
    if result.valid {
        Ok(annotation)
    } else {
        Err(result)
    }
}

/// Parse a YAML annotation document.
pub fn parse_yaml(yaml: &str) -> Result<Annotation, ValidationResult> {
    match serde_yaml::from_str::<serde_json::Value>(yaml) {
        Ok(value) => parse_value(&value),
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", format!("YAML parse error: {e}"));
            Err(result)
        }
    }
}

/// Parse raw YAML and validate. Returns parse errors merged with validation errors.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    match parse_yaml(yaml) {
        Ok(annotation) => validate_annotation(&annotation),
        Err(result) => result,
    }
}

/// Run every check, returning the compiled parts when no error was found.
fn check(
    annotation: &Annotation,
    result: &mut ValidationResult,
) -> Option<(crate::evaluator::Predicate, Option<chrono::DateTime<chrono::Utc>>)> {
    document_checks::validate_document(annotation, result);
    let predicate = applies_to_checks::compile_applies_to(&annotation.applies_to, result);

    let expires = match annotation.metadata.expires.as_deref() {
        Some(raw) => match parse_timestamp(raw) {
            Some(ts) => Some(ts),
            None => {
                result.error(
                    "metadata.expires",
                    format!("unparseable date '{raw}'; expected YYYY-MM-DD or RFC 3339"),
                );
                None
            }
        },
        None => None,
    };

    if result.valid {
        predicate.map(|p| (p, expires))
    } else {
        None
    }
}

#[cfg(test)]
mod tests;
