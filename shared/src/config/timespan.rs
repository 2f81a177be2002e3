//! Lookback timespan parsing.
//!
//! A timespan is given either as a simple duration expression (`2h30m45s`, `90m`)
//! or as a restricted ISO-8601 duration that only carries the time designator
//! (`PT2H30M45S`). Both forms normalize to a [`Duration`].

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while parsing a timespan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimespanError {
    /// The input was empty.
    #[error("empty duration")]
    Empty,

    /// The ISO-8601 input carried date components or no time designator.
    #[error("only time components supported: {0}")]
    UnsupportedComponents(String),

    /// The ISO-8601 input could not be parsed.
    #[error("invalid ISO-8601 duration '{input}': {reason}")]
    InvalidIso {
        /// The offending input.
        input: String,
        /// What went wrong.
        reason: String,
    },

    /// The simple duration expression could not be parsed.
    #[error("parse duration: {0}")]
    InvalidDuration(String),
}

/// A parsed lookback timespan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timespan {
    duration: Duration,
    iso: String,
}

impl Timespan {
    /// Parses a timespan in either accepted form.
    ///
    /// ISO inputs keep their (upper-cased) text; simple inputs are converted with
    /// [`to_iso8601`].
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or cannot be parsed.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::config::Timespan;
    /// use std::time::Duration;
    ///
    /// let simple = Timespan::parse("2h30m45s").unwrap();
    /// assert_eq!(simple.iso(), "PT2H30M45S");
    /// assert_eq!(simple.duration(), Duration::from_secs(2 * 3600 + 30 * 60 + 45));
    ///
    /// let iso = Timespan::parse("PT6H").unwrap();
    /// assert_eq!(iso.iso(), "PT6H");
    /// assert_eq!(iso.duration(), Duration::from_secs(6 * 3600));
    /// ```
    pub fn parse(input: &str) -> Result<Self, TimespanError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TimespanError::Empty);
        }

        if trimmed.starts_with(['P', 'p']) {
            let duration = parse_iso8601(trimmed)?;
            return Ok(Self {
                duration,
                iso: trimmed.to_ascii_uppercase(),
            });
        }

        let duration = humantime::parse_duration(trimmed)
            .map_err(|e| TimespanError::InvalidDuration(e.to_string()))?;
        Ok(Self {
            duration,
            iso: to_iso8601(duration),
        })
    }

    /// Creates a timespan from a duration.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            duration,
            iso: to_iso8601(duration),
        }
    }

    /// Returns the lookback duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the ISO-8601 text recorded in metadata and summaries.
    #[must_use]
    pub fn iso(&self) -> &str {
        &self.iso
    }
}

impl std::str::FromStr for Timespan {
    type Err = TimespanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Renders a duration as `PT{h}H{m}M{s}S`, truncated to whole seconds.
///
/// # Example
///
/// ```
/// use shared::config::timespan::to_iso8601;
/// use std::time::Duration;
///
/// assert_eq!(to_iso8601(Duration::from_secs(9045)), "PT2H30M45S");
/// assert_eq!(to_iso8601(Duration::ZERO), "PT0H0M0S");
/// ```
#[must_use]
pub fn to_iso8601(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("PT{hours}H{minutes}M{seconds}S")
}

/// Parses a restricted ISO-8601 duration carrying only hours, minutes and seconds.
///
/// Each component is optional but must appear in `H`, `M`, `S` order, at most once.
///
/// # Errors
///
/// Returns an error for date components, a missing `T` designator, unknown
/// designators or missing numbers.
pub fn parse_iso8601(input: &str) -> Result<Duration, TimespanError> {
    let iso = input.trim().to_ascii_uppercase();
    let Some(rest) = iso.strip_prefix('P') else {
        return Err(TimespanError::InvalidIso {
            input: iso,
            reason: "missing 'P' designator".to_string(),
        });
    };
    let Some(time_part) = rest.strip_prefix('T') else {
        return Err(TimespanError::UnsupportedComponents(iso));
    };
    if time_part.is_empty() {
        return Err(TimespanError::InvalidIso {
            input: iso,
            reason: "no time components".to_string(),
        });
    }

    let invalid = |reason: &str| TimespanError::InvalidIso {
        input: iso.clone(),
        reason: reason.to_string(),
    };

    let mut total: u64 = 0;
    let mut digits = String::new();
    // Designators must strictly follow H, M, S order.
    let mut last_rank = 0;
    for c in time_part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let (rank, unit_secs) = match c {
            'H' => (1, 3600),
            'M' => (2, 60),
            'S' => (3, 1),
            _ => return Err(invalid(&format!("unexpected designator '{c}'"))),
        };
        if rank <= last_rank {
            return Err(invalid("components out of order or repeated"));
        }
        if digits.is_empty() {
            return Err(invalid(&format!("missing value before '{c}'")));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| invalid("component value out of range"))?;
        total = value
            .checked_mul(unit_secs)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| invalid("duration out of range"))?;
        digits.clear();
        last_rank = rank;
    }
    if !digits.is_empty() {
        return Err(invalid("trailing number without designator"));
    }

    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_duration_round_trip() {
        let iso = Timespan::parse("2h30m45s").unwrap();
        assert_eq!(iso.iso(), "PT2H30M45S");

        let back = parse_iso8601(iso.iso()).unwrap();
        assert_eq!(back, Duration::from_secs(2 * 3600 + 30 * 60 + 45));
    }

    #[test]
    fn test_simple_duration_forms() {
        assert_eq!(
            Timespan::parse("90m").unwrap().duration(),
            Duration::from_secs(5400)
        );
        assert_eq!(Timespan::parse("45s").unwrap().iso(), "PT0H0M45S");
        assert_eq!(Timespan::parse("  6h ").unwrap().iso(), "PT6H0M0S");
    }

    #[test]
    fn test_iso_input_keeps_text() {
        let timespan = Timespan::parse("pt1h30m").unwrap();
        assert_eq!(timespan.iso(), "PT1H30M");
        assert_eq!(timespan.duration(), Duration::from_secs(5400));
    }

    #[test]
    fn test_parse_iso_components() {
        assert_eq!(parse_iso8601("PT6H").unwrap(), Duration::from_secs(21600));
        assert_eq!(parse_iso8601("PT30M").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_iso8601("PT15S").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_iso8601("PT0H0M0S").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_iso_rejects_date_components() {
        assert_eq!(
            parse_iso8601("P1D"),
            Err(TimespanError::UnsupportedComponents("P1D".to_string()))
        );
    }

    #[test]
    fn test_parse_iso_rejects_malformed() {
        assert!(parse_iso8601("PT").is_err());
        assert!(parse_iso8601("PTH").is_err());
        assert!(parse_iso8601("PT5").is_err());
        assert!(parse_iso8601("PT5M1H").is_err());
        assert!(parse_iso8601("PT1X").is_err());
        assert!(parse_iso8601("2H").is_err());
    }

    #[test]
    fn test_empty_timespan() {
        assert_eq!(Timespan::parse("   "), Err(TimespanError::Empty));
    }

    #[test]
    fn test_invalid_simple_duration() {
        assert!(matches!(
            Timespan::parse("two hours"),
            Err(TimespanError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_to_iso8601_truncates_subseconds() {
        assert_eq!(to_iso8601(Duration::from_millis(61_999)), "PT0H1M1S");
    }

    #[test]
    fn test_from_str() {
        let timespan: Timespan = "PT2H".parse().unwrap();
        assert_eq!(timespan.duration(), Duration::from_secs(7200));
    }
}
