// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use yare::parameterized;

fn ms(rfc3339: &str) -> u64 {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().timestamp_millis() as u64
}

#[parameterized(
    every_minute = { "* * * * *" },
    every_five = { "*/5 * * * *" },
    hourly = { "0 * * * *" },
    daily_at_six = { "0 6 * * *" },
    weekdays = { "30 9 * * 1-5" },
    lists = { "0,15,30,45 * * * *" },
    ranged_step = { "0-30/10 2 * * *" },
    sunday_alias = { "0 0 * * 7" },
)]
fn valid_expressions_parse(expr: &str) {
    assert!(CronExpr::parse(expr).is_ok(), "{expr} should parse");
}

#[parameterized(
    too_few = { "* * * *" },
    too_many = { "* * * * * *" },
    minute_range = { "60 * * * *" },
    hour_range = { "* 24 * * *" },
    month_zero = { "* * * 0 *" },
    zero_step = { "*/0 * * * *" },
    garbage = { "a * * * *" },
    inverted_range = { "30-10 * * * *" },
)]
fn invalid_expressions_fail(expr: &str) {
    assert!(CronExpr::parse(expr).is_err(), "{expr} should fail");
}

#[test]
fn every_five_minutes_next_boundary() {
    let cron = CronExpr::parse("*/5 * * * *").unwrap();
    let next = cron.next_after_ms(ms("2026-03-01T10:02:00Z")).unwrap();
    assert_eq!(next, ms("2026-03-01T10:05:00Z"));
}

#[test]
fn next_is_strictly_after_even_on_boundary() {
    let cron = CronExpr::parse("*/5 * * * *").unwrap();
    let next = cron.next_after_ms(ms("2026-03-01T10:05:00Z")).unwrap();
    assert_eq!(next, ms("2026-03-01T10:10:00Z"));
}

#[test]
fn daily_rolls_to_next_day() {
    let cron = CronExpr::parse("0 6 * * *").unwrap();
    let next = cron.next_after_ms(ms("2026-03-01T07:00:00Z")).unwrap();
    assert_eq!(next, ms("2026-03-02T06:00:00Z"));
}

#[test]
fn weekday_restriction_skips_weekend() {
    // 2026-03-06 is a Friday.
    let cron = CronExpr::parse("0 9 * * 1-5").unwrap();
    let next = cron.next_after_ms(ms("2026-03-06T10:00:00Z")).unwrap();
    assert_eq!(next, ms("2026-03-09T09:00:00Z"));
}

#[test]
fn dom_and_dow_match_either_when_both_restricted() {
    // Fires on the 15th OR any Monday; from the 10th the dom match on the
    // 15th (a Sunday) comes before Monday the 16th.
    let cron = CronExpr::parse("0 0 15 * 1").unwrap();
    let next = cron.next_after_ms(ms("2026-03-10T00:00:00Z")).unwrap();
    assert_eq!(next, ms("2026-03-15T00:00:00Z"));
}

#[test]
fn month_restriction_skips_to_month() {
    let cron = CronExpr::parse("0 0 1 7 *").unwrap();
    let next = cron.next_after_ms(ms("2026-03-01T00:00:00Z")).unwrap();
    assert_eq!(next, ms("2026-07-01T00:00:00Z"));
}

#[test]
fn impossible_date_returns_none() {
    let cron = CronExpr::parse("0 0 30 2 *").unwrap();
    assert_eq!(cron.next_after_ms(ms("2026-01-01T00:00:00Z")), None);
}

#[test]
fn sunday_alias_matches_sunday() {
    // 2026-03-08 is a Sunday.
    let cron = CronExpr::parse("0 0 * * 7").unwrap();
    let next = cron.next_after_ms(ms("2026-03-06T00:00:00Z")).unwrap();
    assert_eq!(next, ms("2026-03-08T00:00:00Z"));
}

#[test]
fn serde_round_trips_source() {
    let cron = CronExpr::parse("*/5 * * * *").unwrap();
    let json = serde_json::to_string(&cron).unwrap();
    assert_eq!(json, "\"*/5 * * * *\"");
    let back: CronExpr = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cron);
}

#[test]
fn successive_fires_strictly_increase() {
    let cron = CronExpr::parse("*/15 * * * *").unwrap();
    let mut at = ms("2026-03-01T00:07:00Z");
    for _ in 0..8 {
        let next = cron.next_after_ms(at).unwrap();
        assert!(next > at);
        at = next;
    }
    assert_eq!(at, ms("2026-03-01T02:00:00Z"));
}
