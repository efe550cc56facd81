//! Date arithmetic helpers

use chrono::{Datelike, Duration, NaiveDateTime, Utc, Weekday};

use super::quarter::Quarter;
use crate::value::FieldValue;

/// The weekly rest day skipped by `AfterDays` / `AfterQDays`.
///
/// A single fixed day; there is no holiday calendar behind it.
pub const REST_DAY: Weekday = Weekday::Sun;

fn date_arg(args: &[FieldValue], i: usize) -> Option<NaiveDateTime> {
    args.get(i).and_then(FieldValue::as_datetime)
}

fn int_arg(args: &[FieldValue], i: usize) -> Option<i64> {
    args.get(i).and_then(FieldValue::as_integer)
}

/// Completed years between `date` and `as_of`
pub(crate) fn age_at(date: Option<NaiveDateTime>, as_of: NaiveDateTime) -> i64 {
    let Some(date) = date else { return 0 };
    let mut years = i64::from(as_of.year() - date.year());
    if (as_of.month(), as_of.day()) < (date.month(), date.day()) {
        years -= 1;
    }
    years
}

pub(crate) fn years_diff(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
    let mut years = i64::from(later.year() - earlier.year());
    if (later.month(), later.day()) < (earlier.month(), earlier.day()) {
        years -= 1;
    }
    years.abs()
}

pub(crate) fn months_diff(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
    let mut months = i64::from(later.year() - earlier.year()) * 12
        + i64::from(later.month()) - i64::from(earlier.month());
    if later.day() < earlier.day() {
        months -= 1;
    }
    months.abs()
}

pub(crate) fn days_diff(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (a.date() - b.date()).num_days().abs()
}

fn skip_rest_day(date: NaiveDateTime) -> Option<NaiveDateTime> {
    if date.weekday() == REST_DAY {
        date.checked_add_signed(Duration::days(1))
    } else {
        Some(date)
    }
}

pub(crate) fn after_days(date: NaiveDateTime, days: i64) -> Option<NaiveDateTime> {
    let shifted = date.checked_add_signed(Duration::try_days(days)?)?;
    skip_rest_day(shifted)
}

pub(crate) fn after_q_days(date: NaiveDateTime, quarters: i64, days: i64) -> Option<NaiveDateTime> {
    let end = Quarter::from_date(date.date()).offset(quarters).end()?;
    after_days(end.and_time(date.time()), days)
}

pub(crate) fn recent(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

pub(crate) fn former(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

pub(crate) fn when_recent(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (a, None) => a,
        (Some(a), Some(b)) if a > b => Some(a),
        _ => None,
    }
}

// Library entry points

pub(super) fn call_age_at(args: &[FieldValue]) -> FieldValue {
    let as_of = date_arg(args, 1).unwrap_or_else(|| Utc::now().naive_utc());
    FieldValue::Integer(age_at(date_arg(args, 0), as_of))
}

pub(super) fn call_age(args: &[FieldValue]) -> FieldValue {
    FieldValue::Integer(age_at(date_arg(args, 0), Utc::now().naive_utc()))
}

pub(super) fn call_years_diff(args: &[FieldValue]) -> FieldValue {
    match (date_arg(args, 0), date_arg(args, 1)) {
        (Some(a), Some(b)) => FieldValue::Integer(years_diff(a, b)),
        _ => FieldValue::Integer(0),
    }
}

pub(super) fn call_months_diff(args: &[FieldValue]) -> FieldValue {
    match (date_arg(args, 0), date_arg(args, 1)) {
        (Some(a), Some(b)) => FieldValue::Integer(months_diff(a, b)),
        _ => FieldValue::Integer(0),
    }
}

pub(super) fn call_days_diff(args: &[FieldValue]) -> FieldValue {
    match (date_arg(args, 0), date_arg(args, 1)) {
        (Some(a), Some(b)) => FieldValue::Integer(days_diff(a, b)),
        _ => FieldValue::Integer(0),
    }
}

pub(super) fn call_after_days(args: &[FieldValue]) -> FieldValue {
    date_arg(args, 0)
        .zip(int_arg(args, 1))
        .and_then(|(date, days)| after_days(date, days))
        .into()
}

pub(super) fn call_after_q_days(args: &[FieldValue]) -> FieldValue {
    match (date_arg(args, 0), int_arg(args, 1), int_arg(args, 2)) {
        (Some(date), Some(quarters), Some(days)) => after_q_days(date, quarters, days).into(),
        _ => FieldValue::Null,
    }
}

pub(super) fn call_recent(args: &[FieldValue]) -> FieldValue {
    recent(date_arg(args, 0), date_arg(args, 1)).into()
}

pub(super) fn call_former(args: &[FieldValue]) -> FieldValue {
    former(date_arg(args, 0), date_arg(args, 1)).into()
}

pub(super) fn call_when_recent(args: &[FieldValue]) -> FieldValue {
    when_recent(date_arg(args, 0), date_arg(args, 1)).into()
}

fn quarter_arg(args: &[FieldValue]) -> Option<Quarter> {
    match args.first()? {
        FieldValue::DateTime(dt) => Some(Quarter::from_date(dt.date())),
        FieldValue::Integer(index) => Some(Quarter::from_index(*index)),
        _ => None,
    }
}

pub(super) fn call_quarter(args: &[FieldValue]) -> FieldValue {
    match args.first() {
        Some(FieldValue::DateTime(dt)) => FieldValue::Integer(Quarter::from_date(dt.date()).index()),
        _ => FieldValue::Null,
    }
}

pub(super) fn call_quarter_start(args: &[FieldValue]) -> FieldValue {
    quarter_arg(args)
        .and_then(|q| q.start())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .into()
}

pub(super) fn call_quarter_end(args: &[FieldValue]) -> FieldValue {
    quarter_arg(args)
        .and_then(|q| q.end())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::parse_datetime;

    fn dt(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn test_age_at_counts_completed_years() {
        assert_eq!(age_at(Some(dt("2000-02-22")), dt("2017-05-15")), 17);
        assert_eq!(age_at(Some(dt("2000-05-16")), dt("2017-05-15")), 16);
        assert_eq!(age_at(Some(dt("2000-05-15")), dt("2017-05-15")), 17);
        assert_eq!(age_at(None, dt("2017-05-15")), 0);
    }

    #[test]
    fn test_age_two_years_apart() {
        let born = Some(dt("1990-05-01"));
        let first = age_at(born, dt("2020-08-10"));
        let second = age_at(born, dt("2022-08-10"));
        assert_eq!(second - first, 2);
    }

    #[test]
    fn test_diffs_are_non_negative() {
        assert_eq!(years_diff(dt("2017-05-15"), dt("2000-02-22")), 17);
        assert_eq!(years_diff(dt("2000-02-22"), dt("2017-02-21")), 16);
        assert_eq!(months_diff(dt("2017-01-31"), dt("2017-03-30")), 1);
        assert_eq!(months_diff(dt("2017-03-31"), dt("2017-01-31")), 2);
        assert_eq!(days_diff(dt("2017-01-01T23:00:00"), dt("2017-01-03T01:00:00")), 2);
        assert_eq!(days_diff(dt("2017-01-03"), dt("2017-01-01")), 2);
    }

    #[test]
    fn test_after_days_skips_rest_day() {
        // 2017-05-12 is a Friday
        assert_eq!(after_days(dt("2017-05-12"), 1), Some(dt("2017-05-13")));
        assert_eq!(after_days(dt("2017-05-12"), 2), Some(dt("2017-05-15")));
        assert_eq!(after_days(dt("2017-05-12"), i64::MAX), None);
    }

    #[test]
    fn test_after_q_days() {
        // end of Q2 2017 is Friday 2017-06-30
        assert_eq!(after_q_days(dt("2017-05-15"), 0, 0), Some(dt("2017-06-30")));
        // end of Q3 2017 is Saturday 2017-09-30; +1 lands on Sunday
        assert_eq!(after_q_days(dt("2017-05-15"), 1, 1), Some(dt("2017-10-02")));
    }

    #[test]
    fn test_recent_and_former_ignore_missing() {
        let a = Some(dt("2017-01-01"));
        let b = Some(dt("2018-01-01"));
        assert_eq!(recent(a, b), b);
        assert_eq!(former(a, b), a);
        assert_eq!(recent(None, b), b);
        assert_eq!(former(a, None), a);
        assert_eq!(recent(None, None), None);
    }

    #[test]
    fn test_when_recent() {
        let a = Some(dt("2018-01-01"));
        let b = Some(dt("2017-01-01"));
        assert_eq!(when_recent(a, None), a);
        assert_eq!(when_recent(a, b), a);
        assert_eq!(when_recent(b, a), None);
        assert_eq!(when_recent(a, a), None);
        assert_eq!(when_recent(None, b), None);
    }

    #[test]
    fn test_wrong_argument_types_give_empty_values() {
        assert_eq!(call_years_diff(&["x".into(), 1i64.into()]), FieldValue::Integer(0));
        assert_eq!(call_after_days(&[FieldValue::Null, 1i64.into()]), FieldValue::Null);
        assert_eq!(call_quarter(&["2017".into()]), FieldValue::Null);
    }

    #[test]
    fn test_quarter_entry_points() {
        let q = call_quarter(&[dt("2017-05-15").into()]);
        assert_eq!(q, FieldValue::Integer(2017 * 4 + 1));
        assert_eq!(call_quarter_start(&[q.clone()]), FieldValue::DateTime(dt("2017-04-01")));
        assert_eq!(call_quarter_end(&[dt("2017-05-15").into()]), FieldValue::DateTime(dt("2017-06-30")));
    }
}
