// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Five-field cron expressions.
//!
//! Supports the classic `minute hour day-of-month month day-of-week` form
//! with `*`, `*/step`, ranges (`a-b`, `a-b/step`), and comma lists.
//! Evaluation is on UTC wall-clock. Day-of-month and day-of-week follow the
//! standard rule: when both are restricted, a time matches if either does.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} value {value} out of range {min}..={max}")]
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },

    #[error("step of zero in {field} field")]
    ZeroStep { field: &'static str },
}

/// A parsed cron expression.
///
/// Serializes as its source string so schedules survive WAL replay without
/// re-validation surprises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: u64,
    hours: u32,
    dom: u32,
    months: u16,
    dow: u8,
    dom_restricted: bool,
    dow_restricted: bool,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DOM: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
const DOW: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7 };

impl CronExpr {
    /// Parse and validate a cron expression.
    pub fn parse(source: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = source.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let minutes = parse_field(fields[0], &MINUTE)?;
        let hours = parse_field(fields[1], &HOUR)? as u32;
        let dom = parse_field(fields[2], &DOM)? as u32;
        let months = parse_field(fields[3], &MONTH)? as u16;
        // Day-of-week 7 is an alias for Sunday (0).
        let raw_dow = parse_field(fields[4], &DOW)?;
        let mut dow_bits = raw_dow & 0x7f;
        if raw_dow & (1 << 7) != 0 {
            dow_bits |= 1;
        }

        Ok(Self {
            source: source.trim().to_string(),
            minutes,
            hours,
            dom,
            months,
            dow: (dow_bits & 0x7f) as u8,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    /// The original expression string.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the given UTC time matches this expression.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if self.minutes & (1 << at.minute()) == 0 {
            return false;
        }
        if self.hours & (1 << at.hour()) == 0 {
            return false;
        }
        if self.months & (1 << at.month()) == 0 {
            return false;
        }
        self.matches_day(at)
    }

    fn matches_day(&self, at: DateTime<Utc>) -> bool {
        let dom_ok = self.dom & (1 << at.day()) != 0;
        let dow_ok = self.dow & (1 << at.weekday().num_days_from_sunday()) != 0;
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }

    /// The next matching minute boundary strictly after `after_ms`.
    ///
    /// Returns `None` only for expressions that can never fire within five
    /// years (e.g. `0 0 30 2 *`).
    pub fn next_after_ms(&self, after_ms: u64) -> Option<u64> {
        const MINUTE_MS: u64 = 60_000;
        const HORIZON_MINUTES: u64 = 5 * 366 * 24 * 60;

        let mut cursor = (after_ms / MINUTE_MS + 1) * MINUTE_MS;
        let mut remaining = HORIZON_MINUTES;
        while remaining > 0 {
            let at = Utc.timestamp_millis_opt(cursor as i64).single()?;
            if self.months & (1 << at.month()) == 0 || !self.matches_day(at) {
                // Skip the rest of this day.
                let into_day = at.hour() as u64 * 60 + at.minute() as u64;
                let skip = 24 * 60 - into_day;
                cursor += skip * MINUTE_MS;
                remaining = remaining.saturating_sub(skip);
                continue;
            }
            if self.matches(at) {
                return Some(cursor);
            }
            cursor += MINUTE_MS;
            remaining -= 1;
        }
        None
    }
}

impl std::fmt::Display for CronExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for CronExpr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CronExpr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CronExpr::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse one cron field into a bitmask of matching values.
fn parse_field(field: &str, spec: &FieldSpec) -> Result<u64, CronError> {
    let mut mask: u64 = 0;
    for part in field.split(',') {
        mask |= parse_part(part, spec)?;
    }
    if mask == 0 {
        return Err(CronError::InvalidField { field: spec.name, value: field.to_string() });
    }
    Ok(mask)
}

fn parse_part(part: &str, spec: &FieldSpec) -> Result<u64, CronError> {
    let (range, step) = match part.split_once('/') {
        Some((range, step_str)) => {
            let step: u32 = step_str
                .parse()
                .map_err(|_| CronError::InvalidField { field: spec.name, value: part.into() })?;
            if step == 0 {
                return Err(CronError::ZeroStep { field: spec.name });
            }
            (range, step)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range == "*" {
        (spec.min, spec.max)
    } else if let Some((a, b)) = range.split_once('-') {
        let lo = parse_value(a, spec)?;
        let hi = parse_value(b, spec)?;
        if lo > hi {
            return Err(CronError::InvalidField { field: spec.name, value: part.into() });
        }
        (lo, hi)
    } else {
        let v = parse_value(range, spec)?;
        // A bare value with a step means "value to max" (vixie cron).
        if step > 1 {
            (v, spec.max)
        } else {
            (v, v)
        }
    };

    let mut mask = 0u64;
    let mut v = lo;
    while v <= hi {
        mask |= 1 << v;
        v += step;
    }
    Ok(mask)
}

fn parse_value(s: &str, spec: &FieldSpec) -> Result<u32, CronError> {
    let v: u32 = s
        .parse()
        .map_err(|_| CronError::InvalidField { field: spec.name, value: s.into() })?;
    if v < spec.min || v > spec.max {
        return Err(CronError::OutOfRange { field: spec.name, value: v, min: spec.min, max: spec.max });
    }
    Ok(v)
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
