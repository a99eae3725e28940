//! Annotation document schema with serde deserialization.
//!
//! Defines the types authors write in YAML/JSON:
//! - `AppliesTo`: the predicate vocabulary
//! - `Annotation`: predicate + payload + merge strategy + metadata
//! - `MergeStrategy`: default / override / addition

mod annotation;
mod applies_to;
mod strategy;

pub use annotation::*;
pub use applies_to::*;
pub use strategy::*;

#[cfg(test)]
mod tests;
