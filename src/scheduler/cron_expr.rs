use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Parses a crontab expression.
///
/// Standard 5-field expressions get an implied seconds field of `0`, and
/// numeric days of week use crontab numbering (0 or 7 is Sunday). 6 and 7
/// field expressions are passed to the `cron` crate unchanged.
pub fn parse_cron(expr: &str) -> EngineResult<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => {
            let day_of_week = crontab_day_names(fields[4])?;
            format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], day_of_week
            )
        }
        6 | 7 => fields.join(" "),
        n => {
            return Err(EngineError::validation(format!(
                "cron expression {:?} has {} fields, expected 5",
                expr, n
            )))
        }
    };

    Schedule::from_str(&normalized).map_err(|e| {
        EngineError::validation(format!("invalid cron expression {:?}: {}", expr, e))
    })
}

/// First fire time strictly after `after`.
pub fn next_fire_after(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Rewrites a crontab day-of-week field with day names. Numeric ranges and
/// steps are expanded to explicit lists, since `cron` numbers Sunday as 1 and
/// rejects ranges such as `SAT-SUN`.
fn crontab_day_names(field: &str) -> EngineResult<String> {
    let mut items = Vec::new();
    for item in field.split(',') {
        if item.is_empty()
            || item == "?"
            || item.starts_with('*')
            || item.chars().any(|c| c.is_ascii_alphabetic())
        {
            items.push(item.to_string());
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(parse_day_number(step)?)),
            None => (item, None),
        };
        let (first, last) = match range.split_once('-') {
            Some((a, b)) => (parse_day_number(a)?, parse_day_number(b)?),
            None if step.is_some() => (parse_day_number(range)?, 6),
            None => {
                let day = parse_day_number(range)?;
                (day, day)
            }
        };
        if first > last {
            return Err(EngineError::validation(format!(
                "invalid day of week range {}",
                item
            )));
        }

        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(EngineError::validation(format!(
                "invalid day of week step in {}",
                item
            )));
        }
        for day in (first..=last).step_by(step) {
            let name = DAY_NAMES[day].to_string();
            if !items.contains(&name) {
                items.push(name);
            }
        }
    }
    Ok(items.join(","))
}

fn parse_day_number(s: &str) -> EngineResult<usize> {
    s.parse::<usize>()
        .ok()
        .filter(|day| *day < DAY_NAMES.len())
        .ok_or_else(|| EngineError::validation(format!("invalid day of week {}", s)))
}
