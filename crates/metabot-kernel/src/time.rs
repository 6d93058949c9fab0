//! Time helpers shared by the scenario parser and the stopwatch service.
//!
//! Durations are written by scenario authors as a run of `<integer><unit>`
//! pairs, optionally separated by whitespace:
//!
//! ```text
//! 2h30m      1d 4h      45s      unread 10m
//! ```
//!
//! Units are `d`, `h`, `m` and `s`.  Words that are not duration tokens
//! (such as the `unread` flag) are skipped, so the same parser can be fed the
//! whole parenthesized label annotation.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{KernelError, Result};

/// Naive date-time layouts accepted for scheduled headings, interpreted in
/// the host's local time zone.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse a human duration such as `2h30m` or `1d 4h`.
///
/// Tokens that are not well-formed duration runs are ignored.  Text with no
/// duration in it yields [`Duration::ZERO`].
pub fn parse_duration(text: &str) -> Duration {
    let secs = text
        .split_whitespace()
        .filter_map(token_seconds)
        .fold(0u64, u64::saturating_add);
    Duration::from_secs(secs)
}

/// Seconds represented by a single whitespace-free token, or `None` when the
/// token is not a pure `(<digits><unit>)+` run.
fn token_seconds(token: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut number: Option<u64> = None;

    for c in token.chars() {
        if let Some(digit) = c.to_digit(10) {
            let n = number.unwrap_or(0);
            number = Some(n.saturating_mul(10).saturating_add(u64::from(digit)));
            continue;
        }
        let n = number.take()?;
        total = total.saturating_add(n.saturating_mul(unit_seconds(c)?));
    }

    // A trailing number without a unit makes the token malformed.
    if number.is_some() { None } else { Some(total) }
}

fn unit_seconds(unit: char) -> Option<u64> {
    match unit {
        'd' => Some(86_400),
        'h' => Some(3_600),
        'm' => Some(60),
        's' => Some(1),
        _ => None,
    }
}

/// Parse an absolute date as written in a scheduled step heading.
///
/// Accepts RFC 3339 (`2024-09-10T10:00:00+02:00`), a naive date-time in local
/// time (`2024-09-10 10:00`), or a bare date taken as midnight UTC
/// (`2024-09-10`).
pub fn parse_date(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format)
            && let Some(local) = Local.from_local_datetime(&naive).earliest()
        {
            return Ok(local.with_timezone(&Utc));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(Utc.from_utc_datetime(&midnight));
    }

    Err(KernelError::InvalidDate {
        input: text.to_string(),
    })
}
