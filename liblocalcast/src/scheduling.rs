//! Schedule-time parsing for the composer
//!
//! Accepts relative durations ("2h", "30m", "1 day") and natural
//! language ("tomorrow", "next friday 10am").

use crate::{LocalcastError, Result};
use chrono::{DateTime, Duration, Utc};

/// Parse a schedule string into a DateTime
///
/// # Errors
///
/// Returns an error if the time format cannot be parsed.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(LocalcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(LocalcastError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

fn parse_duration(input: &str) -> Result<Duration> {
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let seconds = std_duration.as_secs() as i64;
        return Duration::try_seconds(seconds)
            .ok_or_else(|| LocalcastError::InvalidInput("Duration out of range".to_string()));
    }

    Err(LocalcastError::InvalidInput(format!(
        "Could not parse duration: {}",
        input
    )))
}

fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| LocalcastError::InvalidInput(format!("Could not parse time: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_minutes() {
        let scheduled = parse_schedule("30m").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!(diff >= 29 && diff <= 31, "Expected ~30 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_duration_hours() {
        let scheduled = parse_schedule("2h").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!(diff >= 119 && diff <= 121, "Expected ~120 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_duration_with_space() {
        let scheduled = parse_schedule("1 hour").unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!(diff >= 59 && diff <= 61, "Expected ~60 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_tomorrow() {
        let scheduled = parse_schedule("tomorrow").unwrap();
        let diff = (scheduled - Utc::now()).num_hours();
        assert!(diff >= 20 && diff <= 28, "Expected ~24 hours, got {}", diff);
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(parse_schedule("").is_err());
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(parse_schedule("not a time").is_err());
    }
}
