//! Maps a source timestamp to its bucket-start timestamp under a fixed
//! interval or a calendar unit, in a configured time zone.
//!
//! Calendar boundaries are aligned to the zone's civil calendar (DST
//! respected); fixed-duration boundaries are aligned to epoch modulo the
//! interval, translated by the zone's UTC offset at the source instant.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::model::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// Either a fixed duration (in milliseconds) or a calendar unit. Calendar
/// intervals don't support multipliers (there is no single well-defined
/// "largest boundary" for e.g. "2 months"); that restriction is enforced at
/// config-validation time, not here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    Fixed(i64),
    Calendar(CalendarUnit),
}

impl Interval {
    pub fn fixed_millis(&self) -> Option<i64> {
        match self {
            Interval::Fixed(ms) => Some(*ms),
            Interval::Calendar(_) => None,
        }
    }
}

/// Returns the largest bucket-start timestamp `<= t_ms`. Pure and monotonic
/// in `t_ms`; allocation-free on the fixed-interval path.
pub fn round_down(t_ms: Timestamp, interval: &Interval, tz: &Tz) -> Timestamp {
    match interval {
        Interval::Fixed(interval_ms) => round_down_fixed(t_ms, *interval_ms, tz),
        Interval::Calendar(unit) => round_down_calendar(t_ms, *unit, tz),
    }
}

fn round_down_fixed(t_ms: Timestamp, interval_ms: i64, tz: &Tz) -> Timestamp {
    let offset_ms = zone_offset_ms(t_ms, tz);
    let local = t_ms + offset_ms;
    let bucket_local = local - local.rem_euclid(interval_ms);
    bucket_local - offset_ms
}

fn zone_offset_ms(t_ms: Timestamp, tz: &Tz) -> i64 {
    let utc = Utc
        .timestamp_millis_opt(t_ms)
        .single()
        .expect("timestamp out of range");
    let local = utc.with_timezone(tz);
    local.offset().fix().local_minus_utc() as i64 * 1000
}

fn to_local_naive(t_ms: Timestamp, tz: &Tz) -> NaiveDateTime {
    let utc = Utc
        .timestamp_millis_opt(t_ms)
        .single()
        .expect("timestamp out of range");
    utc.with_timezone(tz).naive_local()
}

/// Converts a truncated civil-calendar instant back to UTC millis,
/// resolving DST ambiguity by taking the earliest valid offset and DST
/// gaps by rounding forward to the next valid instant.
fn local_naive_to_ms(naive: NaiveDateTime, tz: &Tz) -> Timestamp {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.timestamp_millis(),
        chrono::LocalResult::Ambiguous(earliest, _latest) => earliest.timestamp_millis(),
        chrono::LocalResult::None => {
            // `naive` falls in a spring-forward gap; there is no such local
            // instant, so take the gap's far edge.
            let mut probe = naive;
            for _ in 0..48 {
                probe += chrono::Duration::minutes(30);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.timestamp_millis();
                }
            }
            naive.and_utc().timestamp_millis()
        }
    }
}

fn round_down_calendar(t_ms: Timestamp, unit: CalendarUnit, tz: &Tz) -> Timestamp {
    let local = to_local_naive(t_ms, tz);
    let truncated = match unit {
        CalendarUnit::Minute => local
            .date()
            .and_hms_opt(local.hour(), local.minute(), 0)
            .unwrap(),
        CalendarUnit::Hour => local.date().and_hms_opt(local.hour(), 0, 0).unwrap(),
        CalendarUnit::Day => local.date().and_hms_opt(0, 0, 0).unwrap(),
        CalendarUnit::Week => {
            let days_from_monday = local.weekday().num_days_from_monday();
            let monday = local.date() - chrono::Duration::days(days_from_monday as i64);
            monday.and_hms_opt(0, 0, 0).unwrap()
        }
        CalendarUnit::Month => NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        CalendarUnit::Quarter => {
            let quarter_start_month = ((local.month() - 1) / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(local.year(), quarter_start_month, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        }
        CalendarUnit::Year => NaiveDate::from_ymd_opt(local.year(), 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    };
    local_naive_to_ms(truncated, tz)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UTC: Tz = chrono_tz::UTC;

    fn ms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn fixed_hourly_rounds_down_in_utc() {
        let interval = Interval::Fixed(3_600_000);
        let t = ms(2024, 3, 1, 10, 40, 0);
        assert_eq!(round_down(t, &interval, &UTC), ms(2024, 3, 1, 10, 0, 0));
    }

    #[test]
    fn fixed_interval_is_monotonic() {
        let interval = Interval::Fixed(900_000); // 15m
        let mut prev = round_down(0, &interval, &UTC);
        for t in (0..10_000_000i64).step_by(137) {
            let bucket = round_down(t, &interval, &UTC);
            assert!(bucket <= t);
            assert!(bucket >= prev - 900_000);
            prev = bucket;
        }
    }

    #[test]
    fn fixed_interval_exact_boundary_is_idempotent() {
        let interval = Interval::Fixed(60_000);
        let boundary = ms(2024, 1, 1, 0, 1, 0);
        assert_eq!(round_down(boundary, &interval, &UTC), boundary);
    }

    #[test]
    fn calendar_month_truncates_to_first_of_month() {
        let interval = Interval::Calendar(CalendarUnit::Month);
        let t = ms(2024, 3, 17, 23, 59, 59);
        assert_eq!(round_down(t, &interval, &UTC), ms(2024, 3, 1, 0, 0, 0));
    }

    #[test]
    fn calendar_week_truncates_to_monday() {
        let interval = Interval::Calendar(CalendarUnit::Week);
        // 2024-03-17 is a Sunday.
        let t = ms(2024, 3, 17, 12, 0, 0);
        assert_eq!(round_down(t, &interval, &UTC), ms(2024, 3, 11, 0, 0, 0));
    }

    #[test]
    fn calendar_quarter_truncates_to_quarter_start() {
        let interval = Interval::Calendar(CalendarUnit::Quarter);
        let t = ms(2024, 8, 5, 0, 0, 0);
        assert_eq!(round_down(t, &interval, &UTC), ms(2024, 7, 1, 0, 0, 0));
    }

    #[test]
    fn calendar_respects_dst_transition() {
        // America/New_York springs forward on 2024-03-10 at 02:00 local.
        let ny: Tz = chrono_tz::America::New_York;
        let interval = Interval::Calendar(CalendarUnit::Day);
        // 2024-03-10 12:00 local (EDT, UTC-4) should round down to
        // 2024-03-10 00:00 local, which is 05:00 UTC (EST, UTC-5 that midnight).
        let t = ny
            .with_ymd_and_hms(2024, 3, 10, 12, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        let bucket = round_down(t, &interval, &ny);
        let expected = ny
            .with_ymd_and_hms(2024, 3, 10, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        assert_eq!(bucket, expected);
    }

    #[test]
    fn fixed_interval_respects_nonzero_utc_offset() {
        // UTC+5:30 (India) has no exact hour boundary with UTC; a fixed
        // 1h interval should still align to the local clock hour.
        let ist: Tz = chrono_tz::Asia::Kolkata;
        let interval = Interval::Fixed(3_600_000);
        let t = ist
            .with_ymd_and_hms(2024, 6, 1, 10, 45, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        let bucket = round_down(t, &interval, &ist);
        let expected = ist
            .with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        assert_eq!(bucket, expected);
    }
}
