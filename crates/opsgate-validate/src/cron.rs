//! Cron schedule validation.
//!
//! Accepts the classic five-field form (`minute hour day-of-month month
//! day-of-week`) over the restricted alphabet `{digit, *, /, -, ,}`.
//! Names (`MON`, `JAN`) and macros (`@daily`) are rejected; wrappers
//! install entries verbatim and the restricted alphabet keeps them
//! unambiguous. The minute field must not fire more often than once
//! every five minutes.

use crate::error::{ValidationError, ValidationResult};

/// Inclusive value range of each cron field, in field order.
const FIELD_RANGES: [(u32, u32, &str); 5] = [
    (0, 59, "minute"),
    (0, 23, "hour"),
    (1, 31, "day-of-month"),
    (1, 12, "month"),
    (0, 7, "day-of-week"),
];

/// Minimum allowed period between firings, in minutes.
const MIN_PERIOD_MINUTES: u32 = 5;

/// Validate a five-field cron schedule.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCronSchedule`] if the expression
/// does not have exactly five fields, any field is syntactically
/// invalid or out of range, or the minute field fires more often than
/// every five minutes.
pub fn validate_cron_schedule(expr: &str) -> ValidationResult<()> {
    let reject = |reason: String| {
        Err(ValidationError::InvalidCronSchedule {
            expr: expr.to_string(),
            reason,
        })
    };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return reject(format!("expected 5 fields, found {}", fields.len()));
    }

    for (field, (min, max, name)) in fields.iter().zip(FIELD_RANGES) {
        if let Err(reason) = check_field(field, min, max) {
            return reject(format!("{name} field: {reason}"));
        }
    }

    // Expand the minute field and require a minimal circular gap of
    // five minutes between consecutive firings.
    let minutes = expand_field(fields[0], 0, 59)
        .map_err(|reason| ValidationError::InvalidCronSchedule {
            expr: expr.to_string(),
            reason: format!("minute field: {reason}"),
        })?;
    if let Some(gap) = min_circular_gap(&minutes, 60) {
        if gap < MIN_PERIOD_MINUTES {
            return reject(format!(
                "fires every {gap} minute(s); minimum period is {MIN_PERIOD_MINUTES} minutes"
            ));
        }
    }

    Ok(())
}

/// Syntax-check one field without expanding it.
fn check_field(field: &str, min: u32, max: u32) -> Result<(), String> {
    if field.is_empty() {
        return Err("empty".to_string());
    }
    if !field
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '*' | '/' | '-' | ','))
    {
        return Err("contains characters outside {digit, *, /, -, ,}".to_string());
    }
    for part in field.split(',') {
        check_part(part, min, max)?;
    }
    Ok(())
}

/// Check one comma-separated part: `*`, `N`, `A-B`, optionally `/S`.
fn check_part(part: &str, min: u32, max: u32) -> Result<(), String> {
    let base = match part.split_once('/') {
        Some((base, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid step {step:?}"))?;
            if step == 0 {
                return Err("step must be positive".to_string());
            }
            base
        },
        None => part,
    };

    if base == "*" {
        return Ok(());
    }
    if let Some((lo, hi)) = base.split_once('-') {
        let lo: u32 = lo.parse().map_err(|_| format!("invalid value {lo:?}"))?;
        let hi: u32 = hi.parse().map_err(|_| format!("invalid value {hi:?}"))?;
        if lo > hi {
            return Err(format!("range {lo}-{hi} is inverted"));
        }
        if lo < min || hi > max {
            return Err(format!("range {lo}-{hi} outside {min}-{max}"));
        }
        return Ok(());
    }
    let value: u32 = base.parse().map_err(|_| format!("invalid value {base:?}"))?;
    if value < min || value > max {
        return Err(format!("value {value} outside {min}-{max}"));
    }
    Ok(())
}

/// Expand a field to the sorted set of values it matches.
fn expand_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();
    for part in field.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step {step:?}"))?;
                (base, step)
            },
            None => (part, 1),
        };
        let (lo, hi) = if base == "*" {
            (min, max)
        } else if let Some((lo, hi)) = base.split_once('-') {
            (
                lo.parse().map_err(|_| format!("invalid value {lo:?}"))?,
                hi.parse().map_err(|_| format!("invalid value {hi:?}"))?,
            )
        } else {
            let v: u32 = base.parse().map_err(|_| format!("invalid value {base:?}"))?;
            // A bare value with a step ("5/10") behaves like "5-max/10".
            if step > 1 { (v, max) } else { (v, v) }
        };
        let mut v = lo;
        while v <= hi {
            values.push(v);
            v = v.saturating_add(step);
        }
    }
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

/// Minimal circular gap between consecutive values modulo `modulus`.
///
/// Returns `None` for sets of fewer than two values (a single firing
/// per hour can never violate the period rule).
fn min_circular_gap(values: &[u32], modulus: u32) -> Option<u32> {
    if values.len() < 2 {
        return None;
    }
    let mut min_gap = u32::MAX;
    for pair in values.windows(2) {
        min_gap = min_gap.min(pair[1].saturating_sub(pair[0]));
    }
    let wrap = modulus
        .saturating_sub(values[values.len().saturating_sub(1)])
        .saturating_add(values[0]);
    Some(min_gap.min(wrap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_schedules() {
        for expr in [
            "*/5 * * * *",
            "0 2 * * *",
            "30 4 1 * *",
            "0 0 * * 0",
            "15,45 */2 * * 1-5",
            "0 */6 * * *",
        ] {
            assert!(validate_cron_schedule(expr).is_ok(), "{expr}");
        }
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        assert!(validate_cron_schedule("* * * *").is_err());
        assert!(validate_cron_schedule("* * * * * *").is_err());
        assert!(validate_cron_schedule("").is_err());
    }

    #[test]
    fn test_rejects_bad_alphabet() {
        assert!(validate_cron_schedule("@daily * * * *").is_err());
        assert!(validate_cron_schedule("0 2 * * MON").is_err());
        assert!(validate_cron_schedule("0 2 * jan *").is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(validate_cron_schedule("60 * * * *").is_err());
        assert!(validate_cron_schedule("0 24 * * *").is_err());
        assert!(validate_cron_schedule("0 0 0 * *").is_err());
        assert!(validate_cron_schedule("0 0 * 13 *").is_err());
        assert!(validate_cron_schedule("0 0 * * 8").is_err());
        assert!(validate_cron_schedule("0 0 * * 7").is_ok());
    }

    #[test]
    fn test_rejects_too_frequent() {
        assert!(validate_cron_schedule("* * * * *").is_err());
        assert!(validate_cron_schedule("*/1 * * * *").is_err());
        assert!(validate_cron_schedule("*/4 * * * *").is_err());
        assert!(validate_cron_schedule("*/5 * * * *").is_ok());
        // 58 and 0 are two minutes apart across the hour boundary.
        assert!(validate_cron_schedule("0,58 * * * *").is_err());
        assert!(validate_cron_schedule("0,30 * * * *").is_ok());
        // Range without a step fires every minute.
        assert!(validate_cron_schedule("10-20 * * * *").is_err());
        assert!(validate_cron_schedule("10-40/10 * * * *").is_ok());
    }

    #[test]
    fn test_rejects_malformed_parts() {
        assert!(validate_cron_schedule("5-1 * * * *").is_err());
        assert!(validate_cron_schedule("*/0 * * * *").is_err());
        assert!(validate_cron_schedule("1- * * * *").is_err());
        assert!(validate_cron_schedule(", * * * *").is_err());
    }
}
