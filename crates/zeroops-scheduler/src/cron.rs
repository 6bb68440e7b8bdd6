//! Five-field cron expressions evaluated in a configured time zone.
//!
//! Format: `MIN HOUR DOM MON DOW`
//! - `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S`, and comma lists of those
//! - month names (`jan`..`dec`) and weekday names (`sun`..`sat`)
//! - weekday `0` and `7` are both Sunday
//! - `@hourly`, `@daily`/`@midnight`, `@weekly`, `@monthly`, `@yearly`/`@annually`
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! EITHER does (classic cron).

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;

use zeroops_core::{RelayError, Result};

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// How far ahead `next_after` looks before giving up on an expression that
/// can never fire (e.g. `0 0 30 2 *`).
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: Vec<bool>,
    hours: Vec<bool>,
    days_of_month: Vec<bool>,
    months: Vec<bool>,
    days_of_week: Vec<bool>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let expanded = expand_alias(trimmed).unwrap_or(trimmed);
        let parts: Vec<&str> = expanded.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(RelayError::InvalidSchedule(format!(
                "'{trimmed}' has {} fields, expected 5 (MIN HOUR DOM MON DOW)",
                parts.len()
            )));
        }

        let field = |idx: usize, name: &str, min: u32, max: u32, names: &[&str]| {
            parse_field(parts[idx], min, max, names).map_err(|e| {
                RelayError::InvalidSchedule(format!("'{trimmed}': {name} field: {e}"))
            })
        };

        let minutes = field(0, "minute", 0, 59, &[])?;
        let hours = field(1, "hour", 0, 23, &[])?;
        let days_of_month = field(2, "day-of-month", 1, 31, &[])?;
        let months = field(3, "month", 1, 12, &MONTH_NAMES)?;
        let mut days_of_week = field(4, "day-of-week", 0, 7, &WEEKDAY_NAMES)?;

        // Fold 7 onto Sunday.
        if days_of_week[7] {
            days_of_week[0] = true;
        }
        days_of_week.truncate(7);

        Ok(Self {
            source: trimmed.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !parts[2].starts_with('*'),
            dow_restricted: !parts[4].starts_with('*'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the wall-clock minute `t` matches (seconds ignored).
    pub fn matches(&self, t: &NaiveDateTime) -> bool {
        self.months[t.month() as usize]
            && self.day_matches(t.date())
            && self.hours[t.hour() as usize]
            && self.minutes[t.minute() as usize]
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month[date.day() as usize];
        let dow = self.days_of_week[date.weekday().num_days_from_sunday() as usize];
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// First matching wall-clock minute strictly after `after`.
    pub fn next_after_naive(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = start + Duration::days(SEARCH_HORIZON_DAYS);
        let mut candidate = start;

        while candidate <= horizon {
            if !self.months[candidate.month() as usize] {
                candidate = first_of_next_month(candidate.date())?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours[candidate.hour() as usize] {
                candidate = candidate.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes[candidate.minute() as usize] {
                candidate += Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }
        None
    }

    /// Next fire instant strictly after `after`, evaluated on `zone`'s wall
    /// clock. Wall-clock times that do not exist (DST gaps) are skipped; a
    /// repeated wall-clock time fires once, on its first occurrence.
    pub fn next_after(&self, after: DateTime<Utc>, zone: &Zone) -> Option<DateTime<Utc>> {
        let mut wall = zone.to_local(after);
        loop {
            let next = self.next_after_naive(wall)?;
            if let Some(instant) = zone.to_utc(next) {
                if instant > after {
                    return Some(instant);
                }
            }
            wall = next;
        }
    }
}

impl FromStr for CronExpr {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn expand_alias(expr: &str) -> Option<&'static str> {
    let expanded = match expr.to_ascii_lowercase().as_str() {
        "@hourly" => "0 * * * *",
        "@daily" | "@midnight" => "0 0 * * *",
        "@weekly" => "0 0 * * 0",
        "@monthly" => "0 0 1 * *",
        "@yearly" | "@annually" => "0 0 1 1 *",
        _ => return None,
    };
    Some(expanded)
}

/// Parse one field into a membership table indexed by value (`max + 1` long).
fn parse_field(
    field: &str,
    min: u32,
    max: u32,
    names: &[&str],
) -> std::result::Result<Vec<bool>, String> {
    let mut allowed = vec![false; max as usize + 1];

    for part in field.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err("empty list element".into());
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}'"))?;
                if step == 0 {
                    return Err("step must be positive".into());
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let lo = parse_value(a, min, max, names)?;
            let hi = parse_value(b, min, max, names)?;
            if lo > hi {
                return Err(format!("range {lo}-{hi} is reversed"));
            }
            (lo, hi)
        } else {
            let v = parse_value(range, min, max, names)?;
            // `N/S` runs from N to the end of the field.
            if step.is_some() { (v, max) } else { (v, v) }
        };

        let step = step.unwrap_or(1) as usize;
        for v in (lo..=hi).step_by(step) {
            allowed[v as usize] = true;
        }
    }

    Ok(allowed)
}

fn parse_value(raw: &str, min: u32, max: u32, names: &[&str]) -> std::result::Result<u32, String> {
    let raw = raw.trim();
    let lowered = raw.to_ascii_lowercase();
    let value = match names.iter().position(|n| *n == lowered) {
        // Months are 1-based, weekdays 0-based.
        Some(idx) => idx as u32 + min,
        None => raw
            .parse::<u32>()
            .map_err(|_| format!("invalid value '{raw}'"))?,
    };
    if value < min || value > max {
        return Err(format!("{value} out of range {min}-{max}"));
    }
    Ok(value)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

/// Time zone schedules are evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Named(Tz),
    /// The host's local zone.
    Local,
}

impl Zone {
    /// Parse an IANA name (`"Europe/Paris"`); `"Local"` or empty selects the
    /// host zone.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("local") {
            return Some(Self::Local);
        }
        name.parse::<Tz>().ok().map(Self::Named)
    }

    /// Like [`Zone::parse`], falling back to the host zone with a warning.
    pub fn resolve(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::warn!("⚠️ Unknown time zone '{}', using the host's local zone", name);
            Self::Local
        })
    }

    pub fn name(&self) -> String {
        match self {
            Self::Named(tz) => tz.name().to_string(),
            Self::Local => "Local".to_string(),
        }
    }

    pub fn to_local(&self, t: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Named(tz) => t.with_timezone(tz).naive_local(),
            Self::Local => t.with_timezone(&chrono::Local).naive_local(),
        }
    }

    /// Earliest instant showing `wall` on this zone's clock, or `None` when
    /// that wall-clock time is skipped.
    pub fn to_utc(&self, wall: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::Named(tz) => earliest(tz.from_local_datetime(&wall)),
            Self::Local => earliest(chrono::Local.from_local_datetime(&wall)),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.to_local(Utc::now()).date()
    }
}

fn earliest<T: TimeZone>(result: LocalResult<DateTime<T>>) -> Option<DateTime<Utc>> {
    match result {
        LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(a, b) => Some(a.with_timezone(&Utc).min(b.with_timezone(&Utc))),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn next_utc(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        CronExpr::parse(expr)
            .unwrap()
            .next_after(after, &Zone::Named(chrono_tz::UTC))
            .unwrap()
    }

    #[test]
    fn test_every_hour() {
        let next = next_utc("0 * * * *", utc(2026, 2, 22, 10, 30));
        assert_eq!(next, utc(2026, 2, 22, 11, 0));
    }

    #[test]
    fn test_specific_time() {
        let next = next_utc("0 8 * * *", utc(2026, 2, 22, 7, 0));
        assert_eq!(next, utc(2026, 2, 22, 8, 0));
    }

    #[test]
    fn test_next_is_strictly_after() {
        let next = next_utc("0 8 * * *", utc(2026, 2, 22, 8, 0));
        assert_eq!(next, utc(2026, 2, 23, 8, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        let next = next_utc("*/15 * * * *", utc(2026, 2, 22, 10, 2));
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_weekday_range_skips_weekend() {
        // 2026-02-21 is a Saturday.
        let next = next_utc("30 7 * * 1-5", utc(2026, 2, 21, 9, 0));
        assert_eq!(next, utc(2026, 2, 23, 7, 30));
    }

    #[test]
    fn test_names_and_lists() {
        let expr = CronExpr::parse("0 9 * JAN,jul mon-FRI").unwrap();
        let next = expr
            .next_after(utc(2026, 2, 1, 0, 0), &Zone::Named(chrono_tz::UTC))
            .unwrap();
        // First weekday of July 2026 is Wednesday the 1st.
        assert_eq!(next, utc(2026, 7, 1, 9, 0));
    }

    #[test]
    fn test_sunday_as_seven() {
        let a = CronExpr::parse("0 0 * * 7").unwrap();
        let b = CronExpr::parse("0 0 * * 0").unwrap();
        let after = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(a.next_after_naive(after), b.next_after_naive(after));
        // 2026-03-08 is a Sunday.
        assert_eq!(
            a.next_after_naive(after).unwrap().date(),
            NaiveDate::from_ymd_opt(2026, 3, 8).unwrap()
        );
    }

    #[test]
    fn test_dom_or_dow_when_both_restricted() {
        // The 15th, or any Monday.
        let expr = CronExpr::parse("0 12 15 * 1").unwrap();
        // 2026-03-10 is a Tuesday; next Monday is the 16th, the 15th comes first.
        let after = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let first = expr.next_after_naive(after).unwrap();
        assert_eq!(first.date(), NaiveDate::from_ymd_opt(2026, 3, 15).unwrap());
        let second = expr.next_after_naive(first).unwrap();
        assert_eq!(second.date(), NaiveDate::from_ymd_opt(2026, 3, 16).unwrap());
    }

    #[test]
    fn test_step_from_value_and_range() {
        let expr = CronExpr::parse("5/20 10-16/3 * * *").unwrap();
        let t = |h, m| {
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
        };
        assert!(expr.matches(&t(10, 5)));
        assert!(expr.matches(&t(13, 25)));
        assert!(expr.matches(&t(16, 45)));
        assert!(!expr.matches(&t(11, 5)));
        assert!(!expr.matches(&t(10, 0)));
    }

    #[test]
    fn test_aliases() {
        let next = next_utc("@daily", utc(2026, 2, 22, 10, 0));
        assert_eq!(next, utc(2026, 2, 23, 0, 0));
        let next = next_utc("@monthly", utc(2026, 2, 22, 10, 0));
        assert_eq!(next, utc(2026, 3, 1, 0, 0));
    }

    #[test]
    fn test_named_zone_offsets_fire_time() {
        let ny = Zone::parse("America/New_York").unwrap();
        // 09:00 EST is 14:00 UTC in winter.
        let next = CronExpr::parse("0 9 * * *")
            .unwrap()
            .next_after(utc(2026, 1, 10, 12, 0), &ny)
            .unwrap();
        assert_eq!(next, utc(2026, 1, 10, 14, 0));
    }

    #[test]
    fn test_dst_gap_is_skipped() {
        // 2026-03-08 02:30 does not exist in New York.
        let ny = Zone::parse("America/New_York").unwrap();
        let next = CronExpr::parse("30 2 * * *")
            .unwrap()
            .next_after(utc(2026, 3, 8, 5, 0), &ny)
            .unwrap();
        // Next day 02:30 EDT = 06:30 UTC.
        assert_eq!(next, utc(2026, 3, 9, 6, 30));
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let expr = CronExpr::parse("0 0 30 2 *").unwrap();
        assert!(expr.next_after(utc(2026, 1, 1, 0, 0), &Zone::Local).is_none());
    }

    #[test]
    fn test_invalid_expressions() {
        for bad in [
            "bad",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "1,,2 * * * *",
            "* * * foo *",
        ] {
            let err = CronExpr::parse(bad).unwrap_err();
            assert!(err.is_validation(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_zone_resolution() {
        assert_eq!(Zone::parse("Local"), Some(Zone::Local));
        assert_eq!(Zone::parse(""), Some(Zone::Local));
        assert_eq!(Zone::parse("Europe/Paris").unwrap().name(), "Europe/Paris");
        assert!(Zone::parse("Mars/Olympus").is_none());
        assert_eq!(Zone::resolve("Mars/Olympus"), Zone::Local);
    }
}
