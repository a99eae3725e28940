//! Date recognition inside paths and threshold date parsing.
//!
//! The recognizer scans a path for the first date-like substring in one of
//! its configured formats. Candidates touching other digits are ignored
//! (`120240320` is not `2024-03-20`) and impossible calendar dates are
//! skipped, so the scan keeps going past them.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::{Captures, Regex};

/// A recognizable date layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateFormat {
    /// `YYYY-MM-DD`
    Iso,
    /// `YYYYMMDD`
    Compact,
    /// `YYYY/MM/DD`
    Slashed,
    /// `YYYY_MM`, resolved to the first day of the month.
    YearMonth,
}

type CompiledPattern = Result<Regex, String>;

static ISO: OnceLock<CompiledPattern> = OnceLock::new();
static COMPACT: OnceLock<CompiledPattern> = OnceLock::new();
static SLASHED: OnceLock<CompiledPattern> = OnceLock::new();
static YEAR_MONTH: OnceLock<CompiledPattern> = OnceLock::new();

impl DateFormat {
    pub const ALL: [DateFormat; 4] = [
        DateFormat::Iso,
        DateFormat::Compact,
        DateFormat::Slashed,
        DateFormat::YearMonth,
    ];

    fn pattern(self) -> &'static str {
        match self {
            DateFormat::Iso => r"(?P<year>[0-9]{4})-(?P<month>[0-9]{2})-(?P<day>[0-9]{2})",
            DateFormat::Compact => r"(?P<year>[0-9]{4})(?P<month>[0-9]{2})(?P<day>[0-9]{2})",
            DateFormat::Slashed => r"(?P<year>[0-9]{4})/(?P<month>[0-9]{2})/(?P<day>[0-9]{2})",
            DateFormat::YearMonth => r"(?P<year>[0-9]{4})_(?P<month>[0-9]{2})",
        }
    }

    fn regex(self) -> Option<&'static Regex> {
        let cell = match self {
            DateFormat::Iso => &ISO,
            DateFormat::Compact => &COMPACT,
            DateFormat::Slashed => &SLASHED,
            DateFormat::YearMonth => &YEAR_MONTH,
        };
        match cell.get_or_init(|| Regex::new(self.pattern()).map_err(|e| e.to_string())) {
            Ok(re) => Some(re),
            Err(msg) => {
                tracing::error!(format = %self, error = %msg, "date pattern failed to compile");
                None
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DateFormat::Iso => "iso",
            DateFormat::Compact => "compact",
            DateFormat::Slashed => "slashed",
            DateFormat::YearMonth => "year_month",
        }
    }

    fn parse(caps: &Captures<'_>) -> Option<NaiveDate> {
        let field = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = i32::try_from(field("year")?).ok()?;
        let day = match caps.name("day") {
            Some(_) => field("day")?,
            None => 1,
        };
        NaiveDate::from_ymd_opt(year, field("month")?, day)
    }

    /// Earliest valid occurrence in `path` as `(start, len, date)`. A
    /// candidate touching another digit or naming an impossible calendar
    /// date is passed over and the search resumes one byte later.
    fn find(self, path: &str) -> Option<(usize, usize, NaiveDate)> {
        let re = self.regex()?;
        let bytes = path.as_bytes();
        let mut from = 0;
        while let Some(caps) = re.captures_at(path, from) {
            let whole = caps.get(0)?;
            let (start, end) = (whole.start(), whole.end());
            let touches_digit = (start > 0 && bytes[start - 1].is_ascii_digit())
                || bytes.get(end).is_some_and(u8::is_ascii_digit);
            if !touches_digit {
                if let Some(date) = Self::parse(&caps) {
                    return Some((start, end - start, date));
                }
            }
            // Matches start on an ASCII digit, so `start + 1` is a char boundary.
            from = start + 1;
        }
        None
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iso" | "YYYY-MM-DD" => Ok(DateFormat::Iso),
            "compact" | "YYYYMMDD" => Ok(DateFormat::Compact),
            "slashed" | "YYYY/MM/DD" => Ok(DateFormat::Slashed),
            "year_month" | "YYYY_MM" => Ok(DateFormat::YearMonth),
            other => Err(format!("unknown date format: '{}'", other)),
        }
    }
}

/// Finds the first date-like substring in a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRecognizer {
    formats: Vec<DateFormat>,
}

impl DateRecognizer {
    pub fn new(formats: &[DateFormat]) -> Self {
        let mut unique: Vec<DateFormat> = Vec::with_capacity(formats.len());
        for format in formats {
            if !unique.contains(format) {
                unique.push(*format);
            }
        }
        Self { formats: unique }
    }

    /// Build from configured format names, reporting the first unknown one.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let formats = names
            .iter()
            .map(|n| n.as_ref().parse::<DateFormat>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(&formats))
    }

    pub fn formats(&self) -> &[DateFormat] {
        &self.formats
    }

    /// First recognizable date in `path`, as midnight UTC. At equal
    /// positions the longest match wins.
    pub fn extract(&self, path: &str) -> Option<DateTime<Utc>> {
        self.formats
            .iter()
            .filter_map(|format| format.find(path))
            .min_by_key(|(start, len, _)| (*start, std::cmp::Reverse(*len)))
            .map(|(_, _, date)| midnight_utc(date))
    }
}

impl Default for DateRecognizer {
    fn default() -> Self {
        Self::new(&DateFormat::ALL)
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Parse a threshold or expiry: RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC) or
/// a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(midnight_utc)
}
