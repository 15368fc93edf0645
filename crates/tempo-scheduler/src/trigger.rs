//! Trigger resolution: frequency type + configuration map → fire-time generator.
//!
//! | Frequency  | Keys                                             | Fire times              |
//! |------------|--------------------------------------------------|-------------------------|
//! | `cron`     | `cron_expression`, optional `timezone`           | infinite, per crontab   |
//! | `interval` | any of `seconds`, `minutes`, `hours`, `days`     | `anchor + k·interval`   |
//! | `date`     | `run_date`, optional `timezone` for naive values | exactly one             |

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::{Result, SchedulerError};
use crate::types::{FrequencyConfig, FrequencyType};

/// Seconds per unit for each accepted interval key.
const INTERVAL_UNITS: [(&str, u64); 4] = [
    ("seconds", 1),
    ("minutes", 60),
    ("hours", 60 * 60),
    ("days", 24 * 60 * 60),
];

/// A resolved, validated trigger. Stateless: the same reference time always
/// yields the same answer.
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron {
        expression: String,
        schedule: Box<cron::Schedule>,
        timezone: Tz,
    },
    Interval {
        anchor: DateTime<Utc>,
        every: Duration,
    },
    Date {
        run_date: DateTime<Utc>,
    },
}

impl Trigger {
    /// The first fire time strictly after `reference`, or `None` once the
    /// trigger is exhausted.
    pub fn next_fire_after(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron {
                schedule, timezone, ..
            } => schedule
                .after(&reference.with_timezone(timezone))
                .next()
                .map(|t| t.with_timezone(&Utc)),

            Trigger::Interval { anchor, every } => {
                let step_ms = every.num_milliseconds();
                let k = if reference < *anchor {
                    1
                } else {
                    (reference - *anchor).num_milliseconds() / step_ms + 1
                };
                let candidate = anchor.checked_add_signed(Duration::milliseconds(step_ms.checked_mul(k)?))?;
                if candidate > reference {
                    Some(candidate)
                } else {
                    candidate.checked_add_signed(*every)
                }
            }

            Trigger::Date { run_date } => (*run_date > reference).then_some(*run_date),
        }
    }

    /// `false` only for one-shot `date` triggers.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Trigger::Date { .. })
    }

    pub fn frequency_type(&self) -> FrequencyType {
        match self {
            Trigger::Cron { .. } => FrequencyType::Cron,
            Trigger::Interval { .. } => FrequencyType::Interval,
            Trigger::Date { .. } => FrequencyType::Date,
        }
    }
}

/// Resolve and validate a trigger.
///
/// `anchor` is the start of interval spacing: registration time for new jobs,
/// `last_run` for restored ones. Cron and date triggers ignore it.
pub fn resolve(
    frequency_type: FrequencyType,
    config: &FrequencyConfig,
    anchor: DateTime<Utc>,
) -> Result<Trigger> {
    match frequency_type {
        FrequencyType::Cron => resolve_cron(config),
        FrequencyType::Interval => resolve_interval(config, anchor),
        FrequencyType::Date => resolve_date(config),
    }
}

fn resolve_cron(config: &FrequencyConfig) -> Result<Trigger> {
    let expression = config
        .get("cron_expression")
        .ok_or_else(|| SchedulerError::validation("cron_expression is required for cron frequency"))?
        .as_str()
        .ok_or_else(|| SchedulerError::validation("cron_expression must be a string"))?;

    let timezone = timezone_of(config)?;
    let normalized = normalize_crontab(expression)?;
    let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
        SchedulerError::validation(format!("invalid cron expression '{expression}': {e}"))
    })?;

    Ok(Trigger::Cron {
        expression: expression.to_string(),
        schedule: Box::new(schedule),
        timezone,
    })
}

fn resolve_interval(config: &FrequencyConfig, anchor: DateTime<Utc>) -> Result<Trigger> {
    let mut total: u64 = 0;
    let mut any = false;

    for (key, unit) in INTERVAL_UNITS {
        let Some(value) = config.get(key) else {
            continue;
        };
        any = true;
        let n = value.as_u64().ok_or_else(|| {
            SchedulerError::validation(format!("{key} must be a non-negative integer, got {value}"))
        })?;
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| SchedulerError::validation("interval is too large"))?;
    }

    if !any {
        return Err(SchedulerError::validation(
            "At least one interval (seconds, minutes, hours, days) must be specified",
        ));
    }
    if total == 0 {
        return Err(SchedulerError::validation("interval must be positive"));
    }

    let every = i64::try_from(total)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| SchedulerError::validation("interval is too large"))?;

    Ok(Trigger::Interval { anchor, every })
}

fn resolve_date(config: &FrequencyConfig) -> Result<Trigger> {
    let raw = config
        .get("run_date")
        .ok_or_else(|| SchedulerError::validation("run_date is required for date frequency"))?
        .as_str()
        .ok_or_else(|| SchedulerError::validation("run_date must be an ISO-8601 string"))?;

    let timezone = timezone_of(config)?;
    let run_date = parse_run_date(raw, timezone)
        .ok_or_else(|| SchedulerError::validation(format!("invalid run_date: {raw}")))?;

    Ok(Trigger::Date { run_date })
}

fn timezone_of(config: &FrequencyConfig) -> Result<Tz> {
    match config.get("timezone") {
        None | Some(Value::Null) => Ok(Tz::UTC),
        Some(Value::String(name)) => name
            .parse::<Tz>()
            .map_err(|_| SchedulerError::validation(format!("unknown timezone: {name}"))),
        Some(other) => Err(SchedulerError::validation(format!(
            "timezone must be a string, got {other}"
        ))),
    }
}

fn parse_run_date(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Turn a 5-field crontab (or 6-field with leading seconds) into the
/// seconds-first form the `cron` crate parses.
///
/// Crontab numbers weekdays 0–7 with Sunday as 0 and 7; the `cron` crate
/// uses 1–7 starting on Sunday, so numeric weekdays are shifted here.
fn normalize_crontab(expression: &str) -> Result<String> {
    let mut fields: Vec<String> = expression.split_whitespace().map(String::from).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => {
            return Err(SchedulerError::validation(format!(
                "invalid cron expression '{expression}': expected 5 or 6 fields, got {n}"
            )))
        }
    }
    fields[5] = crontab_weekdays(&fields[5])?;
    Ok(fields.join(" "))
}

fn crontab_weekdays(field: &str) -> Result<String> {
    let mut out: Vec<String> = Vec::new();

    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((r, s)) => (r, Some(s)),
            None => (item, None),
        };

        match range.split_once('-') {
            None => match range.parse::<u32>() {
                Ok(n) => {
                    let day = shift_weekday(n)?;
                    out.push(match step {
                        Some(s) => format!("{day}/{s}"),
                        None => day.to_string(),
                    });
                }
                // `*`, `?` and day names need no translation.
                Err(_) => out.push(item.to_string()),
            },
            Some((lo, hi)) => match (lo.parse::<u32>(), hi.parse::<u32>()) {
                (Ok(lo), Ok(hi)) => {
                    if lo > hi || hi > 7 {
                        return Err(SchedulerError::validation(format!(
                            "invalid day-of-week range: {range}"
                        )));
                    }
                    let step = match step {
                        Some(s) => s.parse::<usize>().ok().filter(|s| *s > 0).ok_or_else(|| {
                            SchedulerError::validation(format!("invalid day-of-week step: {s}"))
                        })?,
                        None => 1,
                    };
                    // Expanded so a range ending on Sunday (7) stays valid once shifted.
                    let mut days = (lo..=hi)
                        .step_by(step)
                        .map(shift_weekday)
                        .collect::<Result<Vec<u32>>>()?;
                    days.sort_unstable();
                    days.dedup();
                    out.extend(days.iter().map(u32::to_string));
                }
                _ => out.push(item.to_string()),
            },
        }
    }

    Ok(out.join(","))
}

fn shift_weekday(n: u32) -> Result<u32> {
    match n {
        0 | 7 => Ok(1),
        1..=6 => Ok(n + 1),
        _ => Err(SchedulerError::validation(format!(
            "day of week out of range: {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> FrequencyConfig {
        value.as_object().cloned().unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn cron_five_field_every_five_minutes() {
        let t = resolve(
            FrequencyType::Cron,
            &config(json!({"cron_expression": "*/5 * * * *"})),
            Utc::now(),
        )
        .unwrap();
        let next = t.next_fire_after(at("2024-03-01T10:02:30Z")).unwrap();
        assert_eq!(next, at("2024-03-01T10:05:00Z"));
    }

    #[test]
    fn cron_numeric_weekday_uses_crontab_numbering() {
        // 1 = Monday in crontab. 2024-01-06 is a Saturday.
        let t = resolve(
            FrequencyType::Cron,
            &config(json!({"cron_expression": "0 9 * * 1"})),
            Utc::now(),
        )
        .unwrap();
        let next = t.next_fire_after(at("2024-01-06T12:00:00Z")).unwrap();
        assert_eq!(next, at("2024-01-08T09:00:00Z"));
    }

    #[test]
    fn cron_sunday_as_zero_and_seven() {
        for expr in ["30 8 * * 0", "30 8 * * 7"] {
            let t = resolve(
                FrequencyType::Cron,
                &config(json!({ "cron_expression": expr })),
                Utc::now(),
            )
            .unwrap();
            // 2024-01-07 is a Sunday.
            let next = t.next_fire_after(at("2024-01-03T00:00:00Z")).unwrap();
            assert_eq!(next, at("2024-01-07T08:30:00Z"), "{expr}");
        }
    }

    #[test]
    fn cron_weekday_range_is_shifted() {
        assert_eq!(crontab_weekdays("1-5").unwrap(), "2,3,4,5,6");
        assert_eq!(crontab_weekdays("5-7").unwrap(), "1,6,7");
        assert_eq!(crontab_weekdays("MON-FRI").unwrap(), "MON-FRI");
        assert_eq!(crontab_weekdays("*").unwrap(), "*");
        assert!(crontab_weekdays("9").is_err());
    }

    #[test]
    fn cron_honours_timezone() {
        let t = resolve(
            FrequencyType::Cron,
            &config(json!({"cron_expression": "0 9 * * *", "timezone": "America/New_York"})),
            Utc::now(),
        )
        .unwrap();
        // 09:00 EST is 14:00 UTC.
        let next = t.next_fire_after(at("2024-01-15T00:00:00Z")).unwrap();
        assert_eq!(next, at("2024-01-15T14:00:00Z"));
    }

    #[test]
    fn cron_six_field_has_seconds() {
        let t = resolve(
            FrequencyType::Cron,
            &config(json!({"cron_expression": "*/10 * * * * *"})),
            Utc::now(),
        )
        .unwrap();
        let next = t.next_fire_after(at("2024-03-01T10:00:01Z")).unwrap();
        assert_eq!(next, at("2024-03-01T10:00:10Z"));
    }

    #[test]
    fn cron_fire_times_are_monotonic() {
        let t = resolve(
            FrequencyType::Cron,
            &config(json!({"cron_expression": "15 */2 * * MON-FRI", "timezone": "Europe/Rome"})),
            Utc::now(),
        )
        .unwrap();
        let mut reference = at("2024-03-29T00:00:00Z");
        for _ in 0..50 {
            let next = t.next_fire_after(reference).unwrap();
            assert!(next > reference);
            reference = next;
        }
    }

    #[test]
    fn cron_missing_expression_is_rejected() {
        let err = resolve(FrequencyType::Cron, &FrequencyConfig::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }

    #[test]
    fn cron_garbage_and_bad_timezone_are_rejected() {
        assert!(resolve(
            FrequencyType::Cron,
            &config(json!({"cron_expression": "every day at noon"})),
            Utc::now(),
        )
        .is_err());
        assert!(resolve(
            FrequencyType::Cron,
            &config(json!({"cron_expression": "0 9 * * *", "timezone": "Mars/Olympus"})),
            Utc::now(),
        )
        .is_err());
    }

    #[test]
    fn interval_sums_units_from_anchor() {
        let anchor = at("2024-01-01T00:00:00Z");
        let t = resolve(
            FrequencyType::Interval,
            &config(json!({"minutes": 1, "seconds": 30})),
            anchor,
        )
        .unwrap();
        assert_eq!(t.next_fire_after(anchor).unwrap(), at("2024-01-01T00:01:30Z"));
        assert_eq!(
            t.next_fire_after(at("2024-01-01T00:01:30Z")).unwrap(),
            at("2024-01-01T00:03:00Z")
        );
        assert_eq!(
            t.next_fire_after(at("2024-01-01T00:04:00.500Z")).unwrap(),
            at("2024-01-01T00:04:30Z")
        );
        // Before the anchor the first slot is still anchor + interval.
        assert_eq!(
            t.next_fire_after(at("2023-12-31T00:00:00Z")).unwrap(),
            at("2024-01-01T00:01:30Z")
        );
    }

    #[test]
    fn interval_without_any_unit_is_rejected() {
        for cfg in [json!({}), json!({"weeks": 1}), json!({"timezone": "UTC"})] {
            let err = resolve(FrequencyType::Interval, &config(cfg), Utc::now()).unwrap_err();
            assert!(matches!(err, SchedulerError::Validation(_)));
        }
    }

    #[test]
    fn interval_must_be_positive_integer() {
        for cfg in [json!({"seconds": 0}), json!({"seconds": -5}), json!({"hours": 1.5}), json!({"days": "2"})] {
            assert!(resolve(FrequencyType::Interval, &config(cfg), Utc::now()).is_err());
        }
    }

    #[test]
    fn date_fires_once() {
        let t = resolve(
            FrequencyType::Date,
            &config(json!({"run_date": "2030-06-01T12:00:00Z"})),
            Utc::now(),
        )
        .unwrap();
        let run = at("2030-06-01T12:00:00Z");
        assert_eq!(t.next_fire_after(at("2030-01-01T00:00:00Z")), Some(run));
        assert_eq!(t.next_fire_after(run), None);
        assert!(!t.is_recurring());
    }

    #[test]
    fn date_accepts_naive_timestamps_in_timezone() {
        let t = resolve(
            FrequencyType::Date,
            &config(json!({"run_date": "2030-06-01 12:00:00", "timezone": "Asia/Tokyo"})),
            Utc::now(),
        )
        .unwrap();
        match t {
            Trigger::Date { run_date } => assert_eq!(run_date, at("2030-06-01T03:00:00Z")),
            other => panic!("expected date trigger, got {other:?}"),
        }

        let t = resolve(
            FrequencyType::Date,
            &config(json!({"run_date": "2030-06-01"})),
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(t, Trigger::Date { run_date } if run_date == at("2030-06-01T00:00:00Z")));
    }

    #[test]
    fn date_rejects_missing_or_garbage() {
        assert!(resolve(FrequencyType::Date, &FrequencyConfig::new(), Utc::now()).is_err());
        assert!(resolve(
            FrequencyType::Date,
            &config(json!({"run_date": "next tuesday"})),
            Utc::now(),
        )
        .is_err());
    }
}
