use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron expression `{expr}`: {reason}")]
    InvalidCron { expr: String, reason: String },
}

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Accepts the classic five-field form (`min hour dom month dow`) and the
/// seconds-first six/seven-field form. Five-field input gets a `0` seconds
/// column and numeric weekdays (0 or 7 = Sunday) rewritten as names.
pub fn normalize_cron(expr: &str) -> Result<String, ScheduleError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = weekday_names(fields[4]).ok_or_else(|| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("bad day-of-week field `{}`", fields[4]),
            })?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], dow
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(ScheduleError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected 5 to 7 fields, found {n}"),
        }),
    }
}

fn weekday_names(field: &str) -> Option<String> {
    let parts = field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((r, s)) => (r, Some(s)),
                None => (part, None),
            };
            let range = range
                .split('-')
                .map(|token| match token.parse::<usize>() {
                    Ok(n) => DAY_NAMES.get(n).map(|name| name.to_string()),
                    Err(_) => Some(token.to_string()),
                })
                .collect::<Option<Vec<_>>>()?
                .join("-");
            Some(match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join(","))
}

pub fn parse_cron(expr: &str) -> Result<Schedule, ScheduleError> {
    let normalized = normalize_cron(expr)?;
    Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// First occurrence strictly after `after`.
pub fn next_fire_after(
    expr: &str,
    after: OffsetDateTime,
) -> Result<Option<OffsetDateTime>, ScheduleError> {
    let schedule = parse_cron(expr)?;
    let Some(after) = offset_to_utc(after) else {
        return Ok(None);
    };
    Ok(schedule.after(&after).next().and_then(utc_to_offset))
}

/// Whether an occurrence falls in `(last_fire, now]`.
pub fn is_due(
    expr: &str,
    last_fire: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<bool, ScheduleError> {
    Ok(next_fire_after(expr, last_fire)?
        .map(|next| next <= now)
        .unwrap_or(false))
}

pub fn offset_to_utc(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

pub fn utc_to_offset(dt: DateTime<Utc>) -> Option<OffsetDateTime> {
    let base = OffsetDateTime::from_unix_timestamp(dt.timestamp()).ok()?;
    base.replace_nanosecond(dt.timestamp_subsec_nanos()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn five_fields_gain_seconds_and_day_names() {
        assert_eq!(normalize_cron("0 9 * * 1-5").unwrap(), "0 0 9 * * MON-FRI");
        assert_eq!(normalize_cron("*/15 * * * *").unwrap(), "0 */15 * * * *");
        assert_eq!(normalize_cron("0 8 * * 0,7").unwrap(), "0 0 8 * * SUN,SUN");
        assert_eq!(normalize_cron("0 0 9 * * MON").unwrap(), "0 0 9 * * MON");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(matches!(
            normalize_cron("* *"),
            Err(ScheduleError::InvalidCron { .. })
        ));
        assert!(parse_cron("not a cron at all").is_err());
    }

    #[test]
    fn weekday_schedule_skips_weekend() {
        // 2025-01-03 is a Friday.
        let friday_evening = datetime!(2025-01-03 18:00 UTC);
        let next = next_fire_after("0 9 * * 1-5", friday_evening).unwrap().unwrap();
        assert_eq!(next, datetime!(2025-01-06 09:00 UTC));
    }

    #[test]
    fn due_only_once_window_contains_occurrence() {
        let last = datetime!(2025-01-06 09:00 UTC);
        assert!(!is_due("0 9 * * *", last, datetime!(2025-01-06 23:59 UTC)).unwrap());
        assert!(is_due("0 9 * * *", last, datetime!(2025-01-07 09:00 UTC)).unwrap());
    }

    #[test]
    fn conversions_round_trip() {
        let now = OffsetDateTime::now_utc();
        let back = utc_to_offset(offset_to_utc(now).unwrap()).unwrap();
        assert_eq!(back, now);
    }
}
