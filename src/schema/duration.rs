//! Human-readable duration strings (`"5min"`, `"1h 30min"`, `"90s"`).
//!
//! Grammar: one or more `<integer><unit>` terms, optionally separated by
//! whitespace. Units:
//!
//! | Unit | Accepted spellings |
//! |------|--------------------|
//! | milliseconds | `ms` |
//! | seconds | `s`, `sec`, `secs`, `second`, `seconds` |
//! | minutes | `m`, `min`, `mins`, `minute`, `minutes`, `T` |
//! | hours | `h`, `hr`, `hrs`, `hour`, `hours` |
//! | days | `d`, `day`, `days` |
//!
//! Signs are not part of the grammar; horizon intervals strip their own
//! sign before calling [`parse_duration`].

use crate::error::{Error, Result};
use chrono::TimeDelta;

fn unit_millis(unit: &str) -> Option<i64> {
    match unit {
        "ms" => Some(1),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1_000),
        "m" | "min" | "mins" | "minute" | "minutes" | "T" => Some(60_000),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3_600_000),
        "d" | "day" | "days" => Some(86_400_000),
        _ => None,
    }
}

/// Parse a duration string into a [`TimeDelta`].
///
/// # Examples
///
/// ```
/// use chrono::TimeDelta;
/// use solarnc_features::schema::parse_duration;
///
/// assert_eq!(parse_duration("5min").unwrap(), TimeDelta::minutes(5));
/// assert_eq!(parse_duration("1h 30min").unwrap(), TimeDelta::minutes(90));
/// assert!(parse_duration("5 parsecs").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let err = |reason: &str| Error::Duration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let text = input.trim();
    if text.is_empty() {
        return Err(err("empty duration"));
    }

    let mut total: i64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(err("expected a number"));
        }
        let amount: i64 = rest[..digits_end]
            .parse()
            .map_err(|_| err("number out of range"))?;
        rest = rest[digits_end..].trim_start();

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        if unit_end == 0 {
            return Err(err("missing unit"));
        }
        let scale = unit_millis(&rest[..unit_end]).ok_or_else(|| err("unknown unit"))?;
        rest = rest[unit_end..].trim_start();

        total = amount
            .checked_mul(scale)
            .and_then(|ms| total.checked_add(ms))
            .ok_or_else(|| err("duration overflow"))?;
    }

    Ok(TimeDelta::milliseconds(total))
}

/// Render a duration compactly (`"1h30min"`, `"45s"`); used in log output.
pub fn format_duration(d: TimeDelta) -> String {
    let mut ms = d.num_milliseconds();
    if ms == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    if ms < 0 {
        out.push('-');
        ms = -ms;
    }
    for (scale, unit) in [
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "min"),
        (1_000, "s"),
        (1, "ms"),
    ] {
        if ms >= scale {
            out.push_str(&format!("{}{unit}", ms / scale));
            ms %= scale;
        }
    }
    out
}
