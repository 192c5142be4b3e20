// tests for the streak and totals math

use chrono::NaiveDate;
use stillmind::Progress;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_first_session_starts_streak() {
    let today = date(2025, 3, 10);
    let p = Progress::zero().after_session(300, today);

    assert_eq!(p.total_minutes, 5);
    assert_eq!(p.current_streak, 1);
    assert_eq!(p.longest_streak, 1);
    assert_eq!(p.sessions_completed, 1);
    assert_eq!(p.last_session_date, Some(today));
}

#[test]
fn test_minutes_truncate() {
    let today = date(2025, 3, 10);
    let p = Progress::zero().after_session(59, today);

    // under a minute adds nothing, but the session still counts
    assert_eq!(p.total_minutes, 0);
    assert_eq!(p.sessions_completed, 1);

    let p = p.after_session(119, today);
    assert_eq!(p.total_minutes, 1);
    assert_eq!(p.sessions_completed, 2);
}

#[test]
fn test_consecutive_day_extends_streak() {
    let p = Progress::zero().after_session(600, date(2025, 3, 10));
    let p = p.after_session(600, date(2025, 3, 11));

    assert_eq!(p.current_streak, 2);
    assert_eq!(p.longest_streak, 2);
    assert_eq!(p.last_session_date, Some(date(2025, 3, 11)));
}

#[test]
fn test_same_day_keeps_streak() {
    let today = date(2025, 3, 10);
    let p = Progress::zero().after_session(600, today);
    let p = p.after_session(300, today);

    // totals grow, streak does not double count the day
    assert_eq!(p.current_streak, 1);
    assert_eq!(p.total_minutes, 15);
    assert_eq!(p.sessions_completed, 2);
}

#[test]
fn test_gap_resets_streak() {
    let p = Progress::zero().after_session(600, date(2025, 3, 10));
    let p = p.after_session(600, date(2025, 3, 11));
    let p = p.after_session(600, date(2025, 3, 14));

    assert_eq!(p.current_streak, 1);
    assert_eq!(p.longest_streak, 2);
}

#[test]
fn test_future_last_date_resets() {
    // a stored date ahead of today (clock skew) behaves like a gap
    let p = Progress::zero().after_session(600, date(2025, 3, 20));
    let p = p.after_session(600, date(2025, 3, 15));

    assert_eq!(p.current_streak, 1);
    assert_eq!(p.last_session_date, Some(date(2025, 3, 15)));
}

#[test]
fn test_longest_streak_is_high_water_mark() {
    let mut p = Progress::zero();
    for day in 10..15 {
        p = p.after_session(60, date(2025, 3, day));
    }
    assert_eq!(p.current_streak, 5);
    assert_eq!(p.longest_streak, 5);

    // break the streak, longest stays
    let p = p.after_session(60, date(2025, 3, 20));
    assert_eq!(p.current_streak, 1);
    assert_eq!(p.longest_streak, 5);
}

#[test]
fn test_streak_across_month_boundary() {
    let p = Progress::zero().after_session(600, date(2025, 3, 31));
    let p = p.after_session(600, date(2025, 4, 1));

    assert_eq!(p.current_streak, 2);
}

#[test]
fn test_worked_example() {
    // 125 seconds on top of 10 minutes / streak 1 / last session yesterday
    let prior = Progress {
        total_minutes: 10,
        current_streak: 1,
        longest_streak: 1,
        sessions_completed: 2,
        last_session_date: Some(date(2025, 3, 9)),
    };
    let p = prior.after_session(125, date(2025, 3, 10));

    assert_eq!(p.total_minutes, 12);
    assert_eq!(p.sessions_completed, 3);
    assert_eq!(p.current_streak, 2);
    assert_eq!(p.longest_streak, 2);
}

#[test]
fn test_zero_duration_counts_session() {
    let p = Progress::zero().after_session(0, date(2025, 3, 10));

    assert_eq!(p.total_minutes, 0);
    assert_eq!(p.sessions_completed, 1);
    assert_eq!(p.current_streak, 1);
}

#[test]
fn test_huge_durations_saturate_total() {
    let today = date(2025, 3, 10);
    let mut p = Progress::zero();

    // enough maximal durations to exhaust the i64 range; the total
    // pins at the ceiling and never goes backwards
    for _ in 0..61 {
        p = p.after_session(i64::MAX, today);
    }
    assert_eq!(p.total_minutes, i64::MAX);
    assert_eq!(p.sessions_completed, 61);

    let p = p.after_session(600, today);
    assert_eq!(p.total_minutes, i64::MAX);
}
