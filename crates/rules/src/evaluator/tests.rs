use std::sync::Arc;

use archivist_core::{FileRecord, ItemType};
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::*;
use crate::rule::Rule;
use crate::validation::{compile, parse_yaml};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn rule(id: &str, applies_to: &str) -> Arc<Rule> {
    let yaml = format!(
        "id: {id}\napplies_to:\n{applies_to}\nannotation:\n  k: v\nmerge_strategy: default\n"
    );
    Arc::new(compile(parse_yaml(&yaml).unwrap()).unwrap())
}

fn predicate(applies_to: &str) -> Predicate {
    rule("p", applies_to).predicate.clone()
}

fn nc_file() -> FileRecord {
    FileRecord::file("/data/cmip5/file123.nc", 500, now() - Duration::days(60))
}

#[test]
fn empty_predicate_matches_everything() {
    let p = Predicate::match_all();
    assert!(matches(&p, &nc_file(), now()));
    assert!(matches(&p, &FileRecord::dir("/", now()), now()));
}

#[test]
fn constraints_are_anded() {
    let p = predicate("  under: /data\n  ext: .nc\n  smaller: 100");
    assert!(!matches(&p, &nc_file(), now()));
    let p = predicate("  under: /data\n  ext: .nc\n  smaller: 1000");
    assert!(matches(&p, &nc_file(), now()));
}

#[test]
fn under_is_segment_aware() {
    let p = predicate("  under: /data");
    assert!(matches(&p, &FileRecord::dir("/data", now()), now()));
    assert!(matches(&p, &nc_file(), now()));
    assert!(!matches(&p, &FileRecord::file("/database/x.nc", 1, now()), now()));
}

#[test]
fn path_matches_item_and_its_direct_entries() {
    let p = predicate("  path: /data/cmip5");
    assert!(matches(&p, &FileRecord::dir("/data/cmip5", now()), now()));
    assert!(matches(&p, &nc_file(), now()));
    assert!(!matches(
        &p,
        &FileRecord::file("/data/cmip5/deep/file.nc", 1, now()),
        now()
    ));
    assert!(!matches(&p, &FileRecord::file("/data/cmip6/file.nc", 1, now()), now()));
}

#[test]
fn ext_compare_ignores_case() {
    let p = predicate("  ext: .nc");
    let upper = FileRecord::file("/data/FILE.NC", 1, now());
    assert!(matches(&p, &upper, now()));
    assert!(!matches(&p, &FileRecord::file("/data/file.nc4", 1, now()), now()));
}

#[test]
fn item_type_filter() {
    let p = predicate("  item_type: dir");
    assert!(matches(&p, &FileRecord::dir("/data", now()), now()));
    assert!(!matches(&p, &nc_file(), now()));
    let link = FileRecord::new("/data/latest", None, ItemType::Link, now());
    assert!(!matches(&p, &link, now()));
}

#[test]
fn size_bounds_are_strict_and_need_a_size() {
    let larger = predicate("  larger: 500");
    let smaller = predicate("  smaller: 501");
    assert!(!matches(&larger, &nc_file(), now()));
    assert!(matches(&smaller, &nc_file(), now()));

    let sizeless = FileRecord::dir("/data", now());
    assert!(!matches(&larger, &sizeless, now()));
    assert!(!matches(&smaller, &sizeless, now()));
}

#[test]
fn filename_regex_searches_the_name_only() {
    let p = predicate("  filename_regex: \"file[0-9]+\"");
    assert!(matches(&p, &nc_file(), now()));
    let p = predicate("  filename_regex: \"^cmip5\"");
    assert!(!matches(&p, &nc_file(), now()));
}

#[test]
fn regex_date_uses_path_date() {
    let p = predicate("  after_regex_date: 2020-01-01\n  before_regex_date: 2021-01-01");
    let inside = FileRecord::file("/obs/2020/07/14/tas.nc", 1, now());
    let outside = FileRecord::file("/obs/tas_20210714.nc", 1, now());
    assert!(matches(&p, &inside, now()));
    assert!(!matches(&p, &outside, now()));
}

#[test]
fn regex_date_fails_closed_without_a_date() {
    let p = predicate("  older_regex_date: 1");
    assert!(!matches(&p, &nc_file(), now()));
    assert!(!matches(&p, &FileRecord::file("/obs/tas_999.nc", 1, now()), now()));
}

#[test]
fn relative_mod_date_boundaries() {
    let older = predicate("  older_mod_date: 60");
    let younger = predicate("  younger_mod_date: 60");
    let exactly = FileRecord::file("/data/x.nc", 1, now() - Duration::days(60));
    assert!(matches(&older, &exactly, now()));
    assert!(!matches(&younger, &exactly, now()));

    let recent = FileRecord::file("/data/y.nc", 1, now() - Duration::days(59));
    assert!(!matches(&older, &recent, now()));
    assert!(matches(&younger, &recent, now()));
}

#[test]
fn relative_regex_date_boundaries() {
    let older = predicate("  older_regex_date: 60");
    let younger = predicate("  younger_regex_date: 61");
    // 2024-04-02T00:00Z is 60.5 days before now.
    let dated = FileRecord::file("/obs/2024-04-02/x.nc", 1, now());
    assert!(matches(&older, &dated, now()));
    assert!(matches(&younger, &dated, now()));

    let recent = FileRecord::file("/obs/2024-04-03/x.nc", 1, now());
    assert!(!matches(&older, &recent, now()));
    assert!(matches(&younger, &recent, now()));

    let stale = FileRecord::file("/obs/2024-04-01/x.nc", 1, now());
    assert!(matches(&older, &stale, now()));
    assert!(!matches(&predicate("  younger_regex_date: 60"), &stale, now()));
}

#[test]
fn relative_regex_date_cutoff_is_inclusive_for_older() {
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let dated = FileRecord::file("/obs/tas_20240402.nc", 1, at);
    assert!(matches(&predicate("  older_regex_date: 60"), &dated, at));
    assert!(!matches(&predicate("  younger_regex_date: 60"), &dated, at));
}

#[test]
fn unrepresentable_day_counts_do_not_panic() {
    let huge = DateBounds {
        older_days: Some(u32::MAX),
        ..DateBounds::default()
    };
    let date = now() - Duration::days(60);
    assert!(!huge.matches(date, now()));

    let huge = DateBounds {
        younger_days: Some(u32::MAX),
        ..DateBounds::default()
    };
    assert!(huge.matches(date, now()));
}

#[test]
fn absolute_mod_date_bounds_are_strict() {
    let p = predicate("  before_mod_date: 2024-01-01");
    let at = FileRecord::file("/data/x.nc", 1, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    assert!(!matches(&p, &at, now()));
    let p = predicate("  after_mod_date: 2023-12-31");
    assert!(matches(&p, &at, now()));
}

#[test]
fn select_drops_expired_and_non_matching() {
    let live = rule("live", "  under: /data");
    let other = rule("other", "  under: /elsewhere");
    let yaml = "id: gone\napplies_to: {}\nannotation:\n  k: v\nmerge_strategy: default\nmetadata:\n  expires: 2024-06-01T12:00:00Z\n";
    let expired = Arc::new(compile(parse_yaml(yaml).unwrap()).unwrap());

    let selected = Evaluator::default().select(&[live, other, expired], &nc_file(), now());
    let ids: Vec<&str> = selected.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["live"]);
}

#[test]
fn restricted_formats_ignore_other_layouts() {
    let evaluator = Evaluator::new(DateRecognizer::new(&[DateFormat::Compact]));
    let p = predicate("  after_regex_date: 2020-01-01");
    let iso = FileRecord::file("/obs/2020-07-14/tas.nc", 1, now());
    assert!(!evaluator.matches(&p, &iso, now()));
    let compact = FileRecord::file("/obs/tas_20200714.nc", 1, now());
    assert!(evaluator.matches(&p, &compact, now()));
}
