//! `applies_to` checks and compilation into a [`Predicate`].

use archivist_core::{is_within, normalize_path};
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::evaluator::{parse_timestamp, DateBounds, Predicate, Spatial};
use crate::schema::AppliesTo;

use super::ValidationResult;

/// Upper bound for `older_*`/`younger_*` day counts (about a century).
pub(super) const MAX_RELATIVE_DAYS: u32 = 36_500;

/// Validate `applies_to` and build its compiled form. Returns `None` when
/// any error was recorded.
pub(super) fn compile_applies_to(
    applies: &AppliesTo,
    result: &mut ValidationResult,
) -> Option<Predicate> {
    let errors_before = result.errors.len();

    let under = applies
        .under
        .as_deref()
        .and_then(|u| absolute_path("applies_to.under", u, result));
    let path = applies
        .path
        .as_deref()
        .and_then(|p| absolute_path("applies_to.path", p, result));

    if let (Some(u), Some(p)) = (&under, &path) {
        if !is_within(p, u) && !is_within(u, p) {
            result.warn(
                "applies_to",
                format!("path '{p}' lies outside under '{u}'; the rule can never match"),
            );
        }
    }

    let spatial = match (under, path) {
        (None, None) => Spatial::Unscoped,
        (Some(u), None) => Spatial::Under(u),
        (under, Some(path)) => Spatial::Path { path, under },
    };

    let ext = applies.ext.as_deref().and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "." {
            result.error("applies_to.ext", "ext must not be empty");
            return None;
        }
        let normalized = if trimmed.starts_with('.') {
            trimmed.to_lowercase()
        } else {
            format!(".{}", trimmed.to_lowercase())
        };
        if normalized != raw {
            result.warn(
                "applies_to.ext",
                format!("ext '{raw}' normalized to '{normalized}'"),
            );
        }
        Some(normalized)
    });

    if let (Some(larger), Some(smaller)) = (applies.larger, applies.smaller) {
        if smaller <= larger.saturating_add(1) {
            result.warn(
                "applies_to",
                format!("no size is larger than {larger} and smaller than {smaller}; the rule can never match"),
            );
        }
    }

    let filename = applies.filename_regex.as_deref().and_then(|pattern| {
        match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                result.error(
                    "applies_to.filename_regex",
                    format!("invalid regex '{pattern}': {e}"),
                );
                None
            }
        }
    });

    let regex_date = DateBounds {
        before: threshold("applies_to.before_regex_date", &applies.before_regex_date, result),
        after: threshold("applies_to.after_regex_date", &applies.after_regex_date, result),
        older_days: day_count("applies_to.older_regex_date", applies.older_regex_date, result),
        younger_days: day_count("applies_to.younger_regex_date", applies.younger_regex_date, result),
    };
    let mod_date = DateBounds {
        before: threshold("applies_to.before_mod_date", &applies.before_mod_date, result),
        after: threshold("applies_to.after_mod_date", &applies.after_mod_date, result),
        older_days: day_count("applies_to.older_mod_date", applies.older_mod_date, result),
        younger_days: day_count("applies_to.younger_mod_date", applies.younger_mod_date, result),
    };
    check_bounds("regex_date", &regex_date, result);
    check_bounds("mod_date", &mod_date, result);

    if result.errors.len() > errors_before {
        return None;
    }

    Some(Predicate {
        spatial,
        ext,
        item_type: applies.item_type,
        larger: applies.larger,
        smaller: applies.smaller,
        filename,
        regex_date,
        mod_date,
    })
}

fn absolute_path(field: &str, raw: &str, result: &mut ValidationResult) -> Option<String> {
    if !raw.starts_with('/') {
        result.error(field, format!("'{raw}' must be an absolute path starting with '/'"));
        return None;
    }
    let normalized = normalize_path(raw);
    if normalized != raw {
        result.warn(field, format!("'{raw}' normalized to '{normalized}'"));
    }
    Some(normalized)
}

fn threshold(
    field: &str,
    raw: &Option<String>,
    result: &mut ValidationResult,
) -> Option<DateTime<Utc>> {
    let raw = raw.as_deref()?;
    match parse_timestamp(raw) {
        Some(ts) => Some(ts),
        None => {
            result.error(
                field,
                format!("unparseable date '{raw}'; expected YYYY-MM-DD or RFC 3339"),
            );
            None
        }
    }
}

fn day_count(field: &str, days: Option<u32>, result: &mut ValidationResult) -> Option<u32> {
    let days = days?;
    if days > MAX_RELATIVE_DAYS {
        result.error(
            field,
            format!("{days} days is out of range; at most {MAX_RELATIVE_DAYS} is allowed"),
        );
        return None;
    }
    Some(days)
}

fn check_bounds(family: &str, bounds: &DateBounds, result: &mut ValidationResult) {
    if let (Some(before), Some(after)) = (bounds.before, bounds.after) {
        if before <= after {
            result.warn(
                "applies_to",
                format!("before_{family} is not later than after_{family}; the rule can never match"),
            );
        }
    }
    if let (Some(older), Some(younger)) = (bounds.older_days, bounds.younger_days) {
        if older >= younger {
            result.warn(
                "applies_to",
                format!("older_{family} must be smaller than younger_{family} for the rule to match anything"),
            );
        }
    }
}
