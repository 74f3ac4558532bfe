// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable duration parsing for env-driven configuration.
//!
//! Accepts `30d`, `24h`, `5m`, `45s`, combined forms like `1h30m`, and raw
//! seconds (`3600`) for backward compatibility.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDurationError {
    input: String,
    reason: String,
}

impl ParseDurationError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseDurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseDurationError {}

/// Parse a human-readable duration string into seconds.
pub fn parse_duration(input: &str) -> Result<u64, ParseDurationError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(ParseDurationError::new(input, "empty string"));
    }

    // Raw seconds, kept for backward compatibility.
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(secs);
    }

    let mut total_secs: u64 = 0;
    let mut current_num = String::new();

    for c in input.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
        } else if c.is_ascii_alphabetic() {
            if current_num.is_empty() {
                return Err(ParseDurationError::new(
                    input,
                    format!("expected number before '{}'", c),
                ));
            }
            let num: u64 = current_num.parse().map_err(|_| {
                ParseDurationError::new(input, format!("invalid number '{}'", current_num))
            })?;
            current_num.clear();

            let multiplier = match c.to_ascii_lowercase() {
                'd' => 86400,
                'h' => 3600,
                'm' => 60,
                's' => 1,
                _ => {
                    return Err(ParseDurationError::new(
                        input,
                        format!("unknown unit '{}' (supported: d, h, m, s)", c),
                    ));
                }
            };

            total_secs = num
                .checked_mul(multiplier)
                .and_then(|part| total_secs.checked_add(part))
                .ok_or_else(|| ParseDurationError::new(input, "duration overflow"))?;
        } else if !c.is_whitespace() {
            return Err(ParseDurationError::new(
                input,
                format!("unexpected character '{}'", c),
            ));
        }
    }

    if !current_num.is_empty() {
        return Err(ParseDurationError::new(
            input,
            format!("number '{}' missing unit (use d, h, m, s)", current_num),
        ));
    }

    Ok(total_secs)
}

/// Parse a duration from an environment variable, falling back to a default
/// (in seconds) if unset or unparseable.
pub fn env_duration(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| parse_duration(&s).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn parses_simple_units() {
        assert_eq!(parse_duration("30d").unwrap(), 30 * 86400);
        assert_eq!(parse_duration("24h").unwrap(), 24 * 3600);
        assert_eq!(parse_duration("5m").unwrap(), 300);
        assert_eq!(parse_duration("45s").unwrap(), 45);
    }

    #[test]
    fn parses_raw_seconds_and_combined() {
        assert_eq!(parse_duration("3600").unwrap(), 3600);
        assert_eq!(parse_duration("1d12h").unwrap(), 86400 + 12 * 3600);
        assert_eq!(parse_duration("1h30m").unwrap(), 5400);
        assert_eq!(parse_duration("  1H  ").unwrap(), 3600);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30x").is_err());
        assert!(parse_duration("d").is_err());
        assert!(parse_duration("30d20").is_err());
        assert!(parse_duration("30d@").is_err());
    }

    #[test]
    #[serial]
    fn env_duration_falls_back() {
        let key = "SCOPEBLIND_TEST_DURATION_INTERNAL";

        std::env::remove_var(key);
        assert_eq!(env_duration(key, 5), 5);

        std::env::set_var(key, "1h");
        assert_eq!(env_duration(key, 0), 3600);

        std::env::set_var(key, "invalid");
        assert_eq!(env_duration(key, 5), 5);

        std::env::remove_var(key);
    }
}
