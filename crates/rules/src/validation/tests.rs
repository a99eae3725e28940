use super::*;
use crate::evaluator::Spatial;

fn yaml_result(yaml: &str) -> ValidationResult {
    validate_yaml(yaml)
}

#[test]
fn valid_annotation_compiles() {
    let annotation = parse_yaml(
        r#"
id: cmip5-project
applies_to:
  under: /data/cmip5/
  filename_regex: "^tas_"
annotation:
  project: CMIP5
merge_strategy: default
metadata:
  expires: 2030-01-01
"#,
    )
    .unwrap();
    let rule = compile(annotation).unwrap();
    assert_eq!(rule.id(), "cmip5-project");
    assert_eq!(rule.predicate.spatial, Spatial::Under("/data/cmip5".into()));
    assert!(rule.predicate.filename.is_some());
    assert!(rule.expires.is_some());
}

#[test]
fn unknown_applies_to_key_suggests() {
    let result = yaml_result(
        r#"
applies_to:
  undr: /data
annotation:
  a: 1
merge_strategy: default
"#,
    );
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "applies_to.undr");
    assert_eq!(
        result.errors[0].suggestion.as_deref(),
        Some("Did you mean 'under'?")
    );
}

#[test]
fn misspelled_strategy_suggests() {
    let result = yaml_result(
        r#"
applies_to: {}
annotation:
  a: 1
merge_strategy: overide
"#,
    );
    assert!(!result.valid);
    assert_eq!(result.error_paths(), vec!["merge_strategy"]);
    assert!(result.errors[0].suggestion.as_deref().unwrap().contains("override"));
}

#[test]
fn missing_payload_is_an_error() {
    let result = yaml_result("applies_to: {}\nmerge_strategy: default\n");
    assert!(!result.valid);
    assert!(result.error_paths().contains(&"annotation"));
}

#[test]
fn invalid_regex_rejected() {
    let result = yaml_result(
        r#"
applies_to:
  filename_regex: "tas_("
annotation:
  a: 1
merge_strategy: default
"#,
    );
    assert!(!result.valid);
    assert_eq!(result.error_paths(), vec!["applies_to.filename_regex"]);
}

#[test]
fn unparseable_dates_rejected() {
    let result = yaml_result(
        r#"
applies_to:
  before_regex_date: "next tuesday"
annotation:
  a: 1
merge_strategy: default
metadata:
  expires: soon
"#,
    );
    assert!(!result.valid);
    let paths = result.error_paths();
    assert!(paths.contains(&"applies_to.before_regex_date"));
    assert!(paths.contains(&"metadata.expires"));
}

#[test]
fn oversized_day_counts_rejected() {
    let result = yaml_result(
        r#"
applies_to:
  older_mod_date: 100000000
  younger_regex_date: 36500
annotation:
  a: 1
merge_strategy: default
"#,
    );
    assert!(!result.valid);
    assert_eq!(result.error_paths(), vec!["applies_to.older_mod_date"]);
}

#[test]
fn relative_paths_rejected() {
    let result = yaml_result(
        r#"
applies_to:
  under: data/cmip5
annotation:
  a: 1
merge_strategy: default
"#,
    );
    assert!(!result.valid);
    assert_eq!(result.error_paths(), vec!["applies_to.under"]);
}

#[test]
fn non_kebab_id_rejected() {
    let result = yaml_result(
        r#"
id: My_Rule
applies_to: {}
annotation:
  a: 1
merge_strategy: default
"#,
    );
    assert!(!result.valid);
    assert_eq!(result.error_paths(), vec!["id"]);
}

#[test]
fn ext_is_normalized_with_warning() {
    let annotation = parse_yaml(
        r#"
id: nc
applies_to:
  ext: NC
annotation:
  format: netcdf
merge_strategy: default
"#,
    )
    .unwrap();
    let result = validate_annotation(&annotation);
    assert!(result.valid);
    assert!(result.warnings.iter().any(|w| w.path == "applies_to.ext"));
    let rule = compile(annotation).unwrap();
    assert_eq!(rule.predicate.ext.as_deref(), Some(".nc"));
}

#[test]
fn contradictory_bounds_only_warn() {
    let annotation = parse_yaml(
        r#"
id: impossible
applies_to:
  larger: 100
  smaller: 50
  older_mod_date: 10
  younger_mod_date: 5
annotation:
  a: 1
merge_strategy: default
"#,
    )
    .unwrap();
    let result = validate_annotation(&annotation);
    assert!(result.valid);
    assert_eq!(result.warnings.len(), 2);
}

#[test]
fn reserved_payload_key_warns() {
    let result = yaml_result(
        r#"
applies_to: {}
annotation:
  size: huge
merge_strategy: default
"#,
    );
    assert!(result.valid);
    assert_eq!(result.warnings[0].path, "annotation.size");
}

#[test]
fn compile_requires_id() {
    let annotation = parse_yaml("applies_to: {}\nannotation:\n  a: 1\nmerge_strategy: default\n").unwrap();
    let err = compile(annotation).unwrap_err();
    assert_eq!(err.error_paths(), vec!["id"]);
}

#[test]
fn path_with_under_compiles_to_path_spatial() {
    let annotation = parse_yaml(
        r#"
id: narrow
applies_to:
  under: /data
  path: /data/cmip5
annotation:
  a: 1
merge_strategy: override
"#,
    )
    .unwrap();
    let rule = compile(annotation).unwrap();
    assert_eq!(rule.predicate.spatial.exact_path(), Some("/data/cmip5"));
    assert_eq!(rule.predicate.spatial.under(), Some("/data"));
}

#[test]
fn display_lists_errors() {
    let result = yaml_result("applies_to: {}\nannotation: 5\nmerge_strategy: default\n");
    assert_eq!(
        result.to_string(),
        "annotation: annotation payload must be a mapping"
    );
}
