use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form annotation payload: key → value with no fixed schema.
pub type Payload = BTreeMap<String, AnnotationValue>;

/// Typed payload value. Annotation documents are free-form, so values keep
/// their scalar/string/boolean/list shape instead of being coerced to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// Extract as string, returning None for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AnnotationValue]> {
        match self {
            AnnotationValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Convert into a JSON value for output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AnnotationValue::Boolean(b) => serde_json::Value::Bool(*b),
            AnnotationValue::Integer(i) => serde_json::Value::from(*i),
            AnnotationValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AnnotationValue::Text(s) => serde_json::Value::String(s.clone()),
            AnnotationValue::List(items) => {
                serde_json::Value::Array(items.iter().map(AnnotationValue::to_json).collect())
            }
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Boolean(b) => write!(f, "{}", b),
            AnnotationValue::Integer(i) => write!(f, "{}", i),
            AnnotationValue::Float(x) => write!(f, "{}", x),
            AnnotationValue::Text(s) => f.write_str(s),
            AnnotationValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for AnnotationValue {
    fn from(s: &str) -> Self {
        AnnotationValue::Text(s.to_string())
    }
}

impl From<String> for AnnotationValue {
    fn from(s: String) -> Self {
        AnnotationValue::Text(s)
    }
}

impl From<bool> for AnnotationValue {
    fn from(b: bool) -> Self {
        AnnotationValue::Boolean(b)
    }
}

impl From<i64> for AnnotationValue {
    fn from(i: i64) -> Self {
        AnnotationValue::Integer(i)
    }
}

impl From<f64> for AnnotationValue {
    fn from(f: f64) -> Self {
        AnnotationValue::Float(f)
    }
}

impl<T: Into<AnnotationValue>> From<Vec<T>> for AnnotationValue {
    fn from(items: Vec<T>) -> Self {
        AnnotationValue::List(items.into_iter().map(Into::into).collect())
    }
}
