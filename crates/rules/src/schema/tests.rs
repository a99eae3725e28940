//! Tests for schema types.

use super::*;
use archivist_core::{AnnotationValue, ItemType};

const FORMAT_RULE_YAML: &str = r#"
id: nc-format
applies_to:
  ext: .nc
annotation:
  format: NetCDF-4
merge_strategy: default
metadata:
  created_by: scanner
  ticket: ARC-12
"#;

const NOTE_RULE_YAML: &str = r#"
applies_to:
  under: /data
  smaller: 1000
  older_mod_date: 30
annotation:
  note: tiny file
  tags: [small, cheap]
merge_strategy: addition
"#;

#[test]
fn parse_default_rule() {
    let rule: Annotation = serde_yaml::from_str(FORMAT_RULE_YAML).unwrap();
    assert_eq!(rule.id(), Some("nc-format"));
    assert_eq!(rule.applies_to.ext.as_deref(), Some(".nc"));
    assert_eq!(rule.merge_strategy, MergeStrategy::Default);
    assert_eq!(rule.annotation["format"].as_str(), Some("NetCDF-4"));
    assert_eq!(rule.metadata.created_by.as_deref(), Some("scanner"));
    assert_eq!(
        rule.metadata.extra.get("ticket"),
        Some(&serde_json::json!("ARC-12"))
    );
}

#[test]
fn parse_addition_rule_with_list_payload() {
    let rule: Annotation = serde_yaml::from_str(NOTE_RULE_YAML).unwrap();
    assert!(rule.id.is_none());
    assert_eq!(rule.merge_strategy, MergeStrategy::Addition);
    assert_eq!(rule.applies_to.smaller, Some(1000));
    assert_eq!(rule.applies_to.older_mod_date, Some(30));
    assert_eq!(
        rule.annotation["tags"],
        AnnotationValue::List(vec!["small".into(), "cheap".into()])
    );
}

#[test]
fn unknown_applies_to_key_is_rejected() {
    let yaml = r#"
applies_to:
  extension: .nc
annotation: {format: x}
merge_strategy: default
"#;
    assert!(serde_yaml::from_str::<Annotation>(yaml).is_err());
}

#[test]
fn unknown_merge_strategy_is_rejected() {
    let yaml = r#"
applies_to: {}
annotation: {format: x}
merge_strategy: replace
"#;
    assert!(serde_yaml::from_str::<Annotation>(yaml).is_err());
}

#[test]
fn missing_payload_is_rejected() {
    let yaml = r#"
applies_to: {ext: .nc}
merge_strategy: default
"#;
    assert!(serde_yaml::from_str::<Annotation>(yaml).is_err());
}

#[test]
fn constraint_count_ignores_absent_and_empty_fields() {
    let applies = AppliesTo {
        under: Some("/data".to_string()),
        ext: Some(String::new()),
        item_type: Some(ItemType::File),
        smaller: Some(10),
        younger_regex_date: Some(5),
        ..AppliesTo::default()
    };
    assert_eq!(applies.constraint_count(), 4);
    assert!(applies.has_regex_or_date());
    assert!(!applies.is_unscoped());
    assert_eq!(AppliesTo::default().constraint_count(), 0);
}

#[test]
fn serialization_omits_absent_constraints() {
    let applies = AppliesTo {
        ext: Some(".nc".to_string()),
        ..AppliesTo::default()
    };
    let json = serde_json::to_value(&applies).unwrap();
    assert_eq!(json, serde_json::json!({"ext": ".nc"}));
}

#[test]
fn merge_strategy_parses_from_str() {
    assert_eq!("override".parse::<MergeStrategy>(), Ok(MergeStrategy::Override));
    assert!("Override".parse::<MergeStrategy>().is_err());
    assert_eq!(MergeStrategy::Addition.to_string(), "addition");
}
