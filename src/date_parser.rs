//! Date bounds for mention filters and imports.
//!
//! `start`/`end` values may be plain dates, RFC 3339 or naive timestamps,
//! relative spans ("last 7 days", "3 weeks ago", "this month"), or anything
//! else `chrono-english` understands ("last friday"). Everything resolves to
//! UTC because `received_at` is stored in UTC.

use anyhow::{Result, anyhow};
use chrono::{
    DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc,
};
use chrono_english::{Dialect, parse_date_string};
use tracing::{debug, trace};

use crate::ExplorerError;

/// Naive layouts the scraper has been seen to write; read as UTC.
const NAIVE_LAYOUTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Largest number accepted inside a relative or English expression.
/// `chrono-english` panics on offsets that overflow its date arithmetic.
const MAX_EXPRESSION_NUMBER: u32 = 10_000;

/// Format a timestamp the way `received_at` is stored.
///
/// Second precision with a `Z` suffix keeps lexicographic and chronological
/// order identical, so range filters can compare the column as text.
#[must_use]
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse optional `start`/`end` query values into UTC bounds.
///
/// Blank values mean "no bound". A bare day is widened to its first second
/// for `start` and its last second for `end`, so both bounds are inclusive.
///
/// # Errors
///
/// Returns [`ExplorerError::InvalidDate`] when a value cannot be parsed and
/// [`ExplorerError::Validation`] when `start` is after `end`.
pub fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> crate::Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    parse_range_at(start, end, Utc::now())
}

fn parse_range_at(
    start: Option<&str>,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> crate::Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = parse_bound(start, "start", Edge::Start, now)?;
    let end = parse_bound(end, "end", Edge::End, now)?;

    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(ExplorerError::validation(
            "date range",
            format!(
                "start {} is after end {}",
                format_timestamp(s),
                format_timestamp(e)
            ),
        )),
        _ => Ok((start, end)),
    }
}

fn parse_bound(
    value: Option<&str>,
    field: &'static str,
    edge: Edge,
    now: DateTime<Utc>,
) -> crate::Result<Option<DateTime<Utc>>> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    resolve(raw, edge, now)
        .map(Some)
        .map_err(|_| ExplorerError::invalid_date(field, raw))
}

/// Which end of a whole day a date-only value snaps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Start,
    End,
}

impl Edge {
    fn of(self, date: NaiveDate) -> DateTime<Utc> {
        let (h, m, s) = match self {
            Self::Start => (0, 0, 0),
            Self::End => (23, 59, 59),
        };
        date.and_hms_opt(h, m, s)
            .unwrap_or_else(|| date.and_time(NaiveTime::default()))
            .and_utc()
    }
}

/// Parse one date expression.
///
/// With `prefer_end`, a value without a time of day resolves to the last
/// second of that day instead of the first.
///
/// # Errors
///
/// Returns an error if no supported layout or English expression matches.
pub fn parse_date_flexible(input: &str, prefer_end: bool) -> Result<DateTime<Utc>> {
    let edge = if prefer_end { Edge::End } else { Edge::Start };
    resolve(input, edge, Utc::now())
}

fn resolve(input: &str, edge: Edge, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Date expression is empty"));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(edge.of(date));
    }
    if let Some(dt) = parse_timestamp(trimmed) {
        return Ok(dt);
    }

    let lowered = trimmed.to_lowercase();
    if let Some((first, last)) = relative_span(&lowered, now.date_naive()) {
        trace!(input = trimmed, %first, %last, "Parsed relative span");
        return Ok(match edge {
            Edge::Start => edge.of(first),
            Edge::End => edge.of(last),
        });
    }

    if has_oversized_number(&lowered) {
        debug!(input = trimmed, "Rejected date expression with an out-of-range number");
        return Err(anyhow!("Number in '{trimmed}' is out of range"));
    }

    match parse_date_string(&lowered, now, Dialect::Us) {
        Ok(dt) if has_explicit_time(&lowered) => Ok(dt),
        Ok(dt) => {
            trace!(input = trimmed, "Snapped English date to day boundary");
            Ok(edge.of(dt.date_naive()))
        }
        Err(err) => {
            debug!(input = trimmed, "Failed to parse date expression");
            Err(anyhow!("Could not parse '{trimmed}' as a date ({err})"))
        }
    }
}

fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn parse(word: &str) -> Option<Self> {
        match word.strip_suffix('s').unwrap_or(word) {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// The date `n` units before `from`; month arithmetic clamps to the
    /// last day of a shorter month.
    fn back(self, from: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            Self::Day => from.checked_sub_days(Days::new(u64::from(n))),
            Self::Week => from.checked_sub_days(Days::new(u64::from(n) * 7)),
            Self::Month => from.checked_sub_months(Months::new(n)),
            Self::Year => from.checked_sub_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

/// First and last day covered by a relative expression, relative to `today`.
fn relative_span(expr: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let words: Vec<&str> = expr.split_whitespace().collect();
    let count = |word: &str| {
        word.parse::<u32>()
            .ok()
            .filter(|n| (1..=MAX_EXPRESSION_NUMBER).contains(n))
    };

    match words.as_slice() {
        ["today"] => Some((today, today)),
        ["yesterday"] => today.pred_opt().map(|d| (d, d)),
        ["this", "month"] => Some((today.with_day(1)?, today)),
        ["this", "year"] => Some((today.with_ordinal(1)?, today)),
        ["last" | "past", "week"] => Some((Unit::Day.back(today, 6)?, today)),
        ["last" | "past", "month"] => {
            let last = today.with_day(1)?.pred_opt()?;
            Some((last.with_day(1)?, last))
        }
        ["last" | "past", "year"] => {
            let year = today.year() - 1;
            Some((
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(year, 12, 31)?,
            ))
        }
        // Day and week windows include today.
        ["last" | "past", n, unit] => {
            let n = count(n)?;
            let first = match Unit::parse(unit)? {
                Unit::Day => Unit::Day.back(today, n - 1)?,
                Unit::Week => Unit::Day.back(today, n.checked_mul(7)? - 1)?,
                other => other.back(today, n)?,
            };
            Some((first, today))
        }
        [n, unit, "ago"] => {
            let day = Unit::parse(unit)?.back(today, count(n)?)?;
            Some((day, day))
        }
        _ => None,
    }
}

fn has_oversized_number(input: &str) -> bool {
    input
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| !token.is_empty())
        .any(|token| !matches!(token.parse::<u32>(), Ok(n) if n <= MAX_EXPRESSION_NUMBER))
}

/// Whether an English expression names a time of day ("5pm", "10:30", "noon").
fn has_explicit_time(input: &str) -> bool {
    if input.contains(':') {
        return true;
    }
    input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| {
            matches!(token, "am" | "pm" | "noon" | "midnight")
                || token
                    .strip_suffix("am")
                    .or_else(|| token.strip_suffix("pm"))
                    .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 10, 30, 0).single().unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn plain_dates_snap_to_day_edges() {
        assert_eq!(
            resolve("2023-01-01", Edge::Start, now()).unwrap(),
            at(2023, 1, 1, 0, 0, 0)
        );
        assert_eq!(
            resolve("2023-01-01", Edge::End, now()).unwrap(),
            at(2023, 1, 1, 23, 59, 59)
        );
    }

    #[test]
    fn timestamps_convert_to_utc() {
        assert_eq!(
            parse_timestamp("2023-01-01T12:00:00+02:00"),
            Some(at(2023, 1, 1, 10, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2023-01-01T12:00:00"),
            Some(at(2023, 1, 1, 12, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2023-01-01 08:15"),
            Some(at(2023, 1, 1, 8, 15, 0))
        );
        assert_eq!(
            parse_timestamp("2023-01-01T12:00:00.250"),
            Some(at(2023, 1, 1, 12, 0, 0) + Duration::milliseconds(250))
        );
        assert_eq!(parse_timestamp("01/02/2023"), None);
    }

    #[test]
    fn english_days_cover_the_whole_day() {
        assert_eq!(
            resolve("Yesterday", Edge::Start, now()).unwrap(),
            at(2025, 3, 14, 0, 0, 0)
        );
        assert_eq!(
            resolve("yesterday", Edge::End, now()).unwrap(),
            at(2025, 3, 14, 23, 59, 59)
        );
    }

    #[test]
    fn rolling_windows_include_today() {
        let today = now().date_naive();
        let day = |m, d| NaiveDate::from_ymd_opt(2025, m, d).unwrap();

        assert_eq!(relative_span("last 7 days", today), Some((day(3, 9), today)));
        assert_eq!(relative_span("past 2 weeks", today), Some((day(3, 2), today)));
        assert_eq!(relative_span("last week", today), Some((day(3, 9), today)));
        assert_eq!(relative_span("last 1 month", today), Some((day(2, 15), today)));
        assert_eq!(relative_span("last 0 days", today), None);
    }

    #[test]
    fn calendar_spans() {
        let today = now().date_naive();
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        assert_eq!(relative_span("this month", today), Some((day(2025, 3, 1), today)));
        assert_eq!(relative_span("this year", today), Some((day(2025, 1, 1), today)));
        assert_eq!(
            relative_span("last month", today),
            Some((day(2025, 2, 1), day(2025, 2, 28)))
        );
        assert_eq!(
            relative_span("last year", today),
            Some((day(2024, 1, 1), day(2024, 12, 31)))
        );
    }

    #[test]
    fn ago_names_a_single_day() {
        assert_eq!(
            resolve("2 weeks ago", Edge::Start, now()).unwrap(),
            at(2025, 3, 1, 0, 0, 0)
        );
        assert_eq!(
            resolve("2 weeks ago", Edge::End, now()).unwrap(),
            at(2025, 3, 1, 23, 59, 59)
        );
    }

    #[test]
    fn month_arithmetic_clamps() {
        let end_of_march = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            Unit::Month.back(end_of_march, 1),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn huge_counts_are_rejected() {
        assert!(resolve("next 99999999 days", Edge::Start, now()).is_err());
        assert!(resolve("99999 years ago", Edge::Start, now()).is_err());
        assert_eq!(relative_span("last 20000 days", now().date_naive()), None);
        assert!(resolve("3 days ago", Edge::Start, now()).is_ok());

        let err = parse_range_at(Some("in 123456789012 weeks"), None, now()).unwrap_err();
        assert!(matches!(err, ExplorerError::InvalidDate { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(resolve("sometime-ish maybe", Edge::Start, now()).is_err());
        assert!(resolve("   ", Edge::Start, now()).is_err());
    }

    #[test]
    fn range_parses_both_bounds() {
        let (start, end) = parse_range_at(Some("2023-01-01"), Some("2023-01-31"), now()).unwrap();
        assert_eq!(start, Some(at(2023, 1, 1, 0, 0, 0)));
        assert_eq!(end, Some(at(2023, 1, 31, 23, 59, 59)));
    }

    #[test]
    fn same_day_range_is_valid() {
        let (start, end) = parse_range_at(Some("2023-01-01"), Some("2023-01-01"), now()).unwrap();
        assert!(start < end);
    }

    #[test]
    fn range_treats_blank_as_unbounded() {
        let (start, end) = parse_range_at(Some("  "), None, now()).unwrap();
        assert!(start.is_none());
        assert!(end.is_none());
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let err = parse_range_at(Some("2023-02-01"), Some("2023-01-01"), now()).unwrap_err();
        assert!(matches!(err, ExplorerError::Validation { .. }));
    }

    #[test]
    fn range_reports_unparseable_field() {
        let err = parse_range_at(Some("2023-01-01"), Some("not a date"), now()).unwrap_err();
        match err {
            ExplorerError::InvalidDate { field, value } => {
                assert_eq!(field, "end");
                assert_eq!(value, "not a date");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn format_timestamp_is_second_precision_zulu() {
        let dt = at(2023, 1, 1, 12, 0, 0) + Duration::milliseconds(999);
        assert_eq!(format_timestamp(dt), "2023-01-01T12:00:00Z");
    }

    #[test]
    fn explicit_time_detection() {
        assert!(has_explicit_time("tomorrow 5pm"));
        assert!(has_explicit_time("friday 10:00"));
        assert!(has_explicit_time("noon"));
        assert!(!has_explicit_time("next friday"));
    }
}
