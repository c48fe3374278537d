//! Schedule resolution for recurring agent tasks
//!
//! Schedules are stored as standard five-field cron expressions
//! (`min hour dom month dow`, Sunday = 0). The `cron` crate wants a seconds
//! field and counts weekdays from Sunday = 1, so expressions are translated
//! before evaluation.

use chrono::{DateTime, Utc};
use cron::Schedule;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::str::FromStr;

/// Used when a phrase gives no usable timing hint
pub const DEFAULT_CRON: &str = "0 9 * * *";

static EVERY_N_MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bevery\s+(\d{1,2})\s+min(?:ute)?s?\b").unwrap());
static HOURLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:every\s+hour|hourly)\b").unwrap());
static WEEKDAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:every\s+weekday|weekdays)\b").unwrap());
static DAY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bevery\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)s?\b").unwrap()
});
static WEEKLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:every\s+week|weekly)\b").unwrap());
static DAILY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:every\s+day|daily)\b").unwrap());
static MORNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bmornings?\b").unwrap());
static EVENING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bevenings?\b").unwrap());
static NIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bnights?\b").unwrap());
static AT_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bat\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").unwrap());
static DOW_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(/?)(\d+)").unwrap());

/// Pick the cron expression for a new scheduled task.
///
/// An explicit expression wins. A phrase is translated when possible and
/// falls back to [`DEFAULT_CRON`]. Neither is an error.
pub fn resolve_cron(cron_expression: Option<&str>, phrase: Option<&str>) -> Result<String, String> {
    let cron_expression = cron_expression.map(str::trim).filter(|c| !c.is_empty());
    let phrase = phrase.map(str::trim).filter(|p| !p.is_empty());

    match (cron_expression, phrase) {
        (Some(expr), _) => Ok(expr.to_string()),
        (None, Some(phrase)) => Ok(cron_from_phrase(phrase).unwrap_or_else(|| {
            log::info!("[SCHEDULE] No timing found in '{}', using {}", phrase, DEFAULT_CRON);
            DEFAULT_CRON.to_string()
        })),
        (None, None) => Err("Provide either cronExpression or naturalLanguageSchedule".to_string()),
    }
}

/// Translate a simple English schedule ("every monday at 8:30am") into cron
pub fn cron_from_phrase(phrase: &str) -> Option<String> {
    let text = phrase.to_lowercase();

    if let Some(caps) = EVERY_N_MINUTES.captures(&text) {
        let n: u32 = caps[1].parse().ok()?;
        if (1..60).contains(&n) {
            return Some(format!("*/{} * * * *", n));
        }
    }
    if HOURLY.is_match(&text) {
        return Some("0 * * * *".to_string());
    }

    let day_field = if let Some(caps) = DAY_NAME.captures(&text) {
        Some(day_abbreviation(&caps[1]).to_string())
    } else if WEEKDAYS.is_match(&text) {
        Some("Mon-Fri".to_string())
    } else if WEEKLY.is_match(&text) {
        Some("Mon".to_string())
    } else {
        None
    };

    let part_of_day = if EVENING.is_match(&text) {
        Some(18)
    } else if NIGHT.is_match(&text) {
        Some(21)
    } else if MORNING.is_match(&text) {
        Some(9)
    } else {
        None
    };

    let explicit_time = AT_TIME.captures(&text).and_then(|caps| parse_clock(&caps));

    if day_field.is_none() && part_of_day.is_none() && explicit_time.is_none() && !DAILY.is_match(&text) {
        return None;
    }

    let (hour, minute) = explicit_time.unwrap_or((part_of_day.unwrap_or(9), 0));
    Some(format!(
        "{} {} * * {}",
        minute,
        hour,
        day_field.as_deref().unwrap_or("*")
    ))
}

fn day_abbreviation(day: &str) -> &'static str {
    match day {
        "monday" => "Mon",
        "tuesday" => "Tue",
        "wednesday" => "Wed",
        "thursday" => "Thu",
        "friday" => "Fri",
        "saturday" => "Sat",
        _ => "Sun",
    }
}

fn parse_clock(caps: &Captures) -> Option<(u32, u32)> {
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    match caps.get(3).map(|m| m.as_str()) {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Convert a five-field expression into the `cron` crate's dialect.
/// Six- and seven-field expressions are passed through untouched.
fn to_cron_crate(expr: &str) -> Result<String, String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = DOW_NUMBER.replace_all(fields[4], |caps: &Captures| {
                if &caps[1] == "/" {
                    return caps[0].to_string();
                }
                match caps[2].parse::<u32>() {
                    Ok(n) if n <= 7 => ((n % 7) + 1).to_string(),
                    _ => caps[2].to_string(),
                }
            });
            Ok(format!("0 {} {} {} {} {}", fields[0], fields[1], fields[2], fields[3], dow))
        }
        6 | 7 => Ok(expr.to_string()),
        n => Err(format!("Cron expression '{}' has {} fields, expected 5", expr, n)),
    }
}

/// Next fire time strictly after `after`
pub fn next_run_after(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let translated = to_cron_crate(expr)?;
    let schedule = Schedule::from_str(&translated)
        .map_err(|e| format!("Invalid cron expression '{}': {}", expr, e))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| format!("Cron expression '{}' never fires", expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_requires_some_schedule() {
        assert!(resolve_cron(None, None).is_err());
        assert!(resolve_cron(Some("  "), Some("")).is_err());
        assert_eq!(resolve_cron(Some("*/5 * * * *"), Some("every morning")).unwrap(), "*/5 * * * *");
        assert_eq!(resolve_cron(None, Some("whenever you feel like it")).unwrap(), DEFAULT_CRON);
    }

    #[test]
    fn test_phrases() {
        assert_eq!(cron_from_phrase("every morning").as_deref(), Some("0 9 * * *"));
        assert_eq!(cron_from_phrase("Every evening").as_deref(), Some("0 18 * * *"));
        assert_eq!(cron_from_phrase("every 15 minutes").as_deref(), Some("*/15 * * * *"));
        assert_eq!(cron_from_phrase("hourly").as_deref(), Some("0 * * * *"));
        assert_eq!(cron_from_phrase("every monday at 8:30am").as_deref(), Some("30 8 * * Mon"));
        assert_eq!(cron_from_phrase("weekdays at 5pm").as_deref(), Some("0 17 * * Mon-Fri"));
        assert_eq!(cron_from_phrase("daily at 12am").as_deref(), Some("0 0 * * *"));
        assert_eq!(cron_from_phrase("at 7").as_deref(), Some("0 7 * * *"));
        assert_eq!(cron_from_phrase("sometime"), None);
    }

    #[test]
    fn test_next_run_daily() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let next = next_run_after("0 9 * * *", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_run_numeric_weekday() {
        // 2024-01-03 is a Wednesday; 1 = Monday in standard cron
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let next = next_run_after("30 8 * * 1", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 8, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_named_weekday_range() {
        // Friday evening -> next Monday
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 20, 0, 0).unwrap();
        let next = next_run_after("0 17 * * Mon-Fri", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 8, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let now = Utc::now();
        assert!(next_run_after("not a cron", now).is_err());
        assert!(next_run_after("61 * * * *", now).is_err());
    }
}
