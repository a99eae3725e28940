//! Merge strategy enum.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accepted spellings, used for "did you mean" suggestions.
pub const MERGE_STRATEGIES: &[&str] = &["default", "override", "addition"];

/// How an annotation's payload combines with other matching annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Most specific rule claims a key; broader rules only fill gaps.
    Default,
    /// Forced correction; the most specific override wins outright.
    Override,
    /// Accumulates values from several rules into a list.
    Addition,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Default => "default",
            MergeStrategy::Override => "override",
            MergeStrategy::Addition => "addition",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default" => Ok(MergeStrategy::Default),
            "override" => Ok(MergeStrategy::Override),
            "addition" => Ok(MergeStrategy::Addition),
            other => Err(format!("unknown merge strategy: '{}'", other)),
        }
    }
}
