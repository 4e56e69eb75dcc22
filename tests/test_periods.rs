use chrono::{DateTime, NaiveDate, Utc};

use mlm_engine::model::period::{Cadence, Period, PeriodError};

// ── Builders ────────────────────────────────────────────────────────

fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

fn midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn test_key_shape_decides_the_cadence() {
    let monthly = Period::parse("2025-08").unwrap();
    assert_eq!(monthly.cadence, Cadence::Monthly);
    assert_eq!(monthly.start, midnight(2025, 8, 1));
    assert_eq!(monthly.end, midnight(2025, 9, 1));

    let weekly = Period::parse("2025-W34").unwrap();
    assert_eq!(weekly.cadence, Cadence::Weekly);
    assert_eq!(weekly.start, midnight(2025, 8, 18), "ISO weeks start Monday");
    assert_eq!(weekly.end, midnight(2025, 8, 25));

    let daily = Period::parse("2025-08-26").unwrap();
    assert_eq!(daily.cadence, Cadence::Daily);
    assert_eq!(daily.start, midnight(2025, 8, 26));
    assert_eq!(daily.end, midnight(2025, 8, 27));
}

#[test]
fn test_parse_canonicalizes_the_key() {
    assert_eq!(Period::parse("2025-8").unwrap().key, "2025-08");
    assert_eq!(Period::parse("2025-W3").unwrap().key, "2025-W03");
}

#[test]
fn test_bad_keys_are_rejected() {
    assert_eq!(
        Period::parse("august"),
        Err(PeriodError::InvalidKey("august".to_string()))
    );
    assert_eq!(
        Period::parse("2025-08-26-01"),
        Err(PeriodError::InvalidKey("2025-08-26-01".to_string()))
    );
    assert_eq!(
        Period::parse("2025-13"),
        Err(PeriodError::OutOfRange("2025-13".to_string()))
    );
    // 2025 has 52 ISO weeks.
    assert_eq!(
        Period::parse("2025-W53"),
        Err(PeriodError::OutOfRange("2025-W53".to_string()))
    );
}

#[test]
fn test_window_is_half_open() {
    let period = Period::parse("2025-03").unwrap();
    assert!(period.contains(period.start));
    assert!(!period.contains(period.end), "end belongs to the next period");
    assert!(period.contains(ts(2025, 3, 31)));
    assert!(!period.contains(ts(2025, 4, 1)));
}

#[test]
fn test_december_rolls_into_the_next_year() {
    let period = Period::monthly(2025, 12).unwrap();
    assert_eq!(period.end, midnight(2026, 1, 1));
    assert_eq!(period.previous().key, "2025-11");
}

#[test]
fn test_previous_crosses_year_and_week_boundaries() {
    assert_eq!(Period::parse("2025-01").unwrap().previous().key, "2024-12");
    // Week 1 of 2025 starts Monday 2024-12-30; the day before sits in
    // 2024's last week.
    assert_eq!(Period::parse("2025-W01").unwrap().previous().key, "2024-W52");
    assert_eq!(Period::parse("2025-03-01").unwrap().previous().key, "2025-02-28");
}

#[test]
fn test_containing_finds_the_window_around_a_date() {
    let at = ts(2025, 8, 20);
    assert_eq!(Period::containing(Cadence::Monthly, at).key, "2025-08");
    assert_eq!(Period::containing(Cadence::Weekly, at).key, "2025-W34");
    assert_eq!(Period::containing(Cadence::Daily, at).key, "2025-08-20");
    for cadence in [Cadence::Daily, Cadence::Weekly, Cadence::Monthly] {
        assert!(Period::containing(cadence, at).contains(at));
    }
}
