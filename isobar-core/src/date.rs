//! Forecast base date handling.
//!
//! The backend addresses forecast runs by a date string whose layout varies
//! between deployments. A [`ForecastDate`] remembers which layout the raw
//! string used so that shifted candidates can be formatted back the same
//! way.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::DateError;

/// Layout of a forecast date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePattern {
    /// `2024-01-15T06:00:00.000Z`
    Rfc3339MillisZulu,
    /// `2024-01-15T06:00:00Z`
    Rfc3339Zulu,
    /// `2024-01-15T06:00:00+02:00`
    Rfc3339Offset(FixedOffset),
    /// `2024-01-15T06:00:00`
    IsoSeconds,
    /// `2024-01-15T06:00`
    IsoMinutes,
    /// `2024-01-15 06:00:00`
    SpacedSeconds,
    /// `2024-01-15 06:00`
    SpacedMinutes,
    /// `2024011506`
    CompactHour,
    /// `2024-01-15`
    DateOnly,
}

// Order matters: chrono treats the fraction in `%.3f` as optional, so the
// plain Zulu layout has to win first.
const NAIVE_PATTERNS: [(DatePattern, &str); 6] = [
    (DatePattern::Rfc3339Zulu, "%Y-%m-%dT%H:%M:%SZ"),
    (DatePattern::Rfc3339MillisZulu, "%Y-%m-%dT%H:%M:%S%.3fZ"),
    (DatePattern::IsoSeconds, "%Y-%m-%dT%H:%M:%S"),
    (DatePattern::IsoMinutes, "%Y-%m-%dT%H:%M"),
    (DatePattern::SpacedSeconds, "%Y-%m-%d %H:%M:%S"),
    (DatePattern::SpacedMinutes, "%Y-%m-%d %H:%M"),
];

impl DatePattern {
    /// Detect the layout of `raw` and parse it to a UTC instant.
    pub fn detect(raw: &str) -> Result<(Self, DateTime<Utc>), DateError> {
        let raw = raw.trim();

        for (pattern, format) in NAIVE_PATTERNS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok((pattern, Utc.from_utc_datetime(&naive)));
            }
        }

        if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%:z") {
            return Ok((
                Self::Rfc3339Offset(*parsed.offset()),
                parsed.with_timezone(&Utc),
            ));
        }

        if let Some(instant) = parse_compact_hour(raw) {
            return Ok((Self::CompactHour, instant));
        }

        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| DateError::OutOfRange {
                reason: format!("no midnight for {}", date),
            })?;
            return Ok((Self::DateOnly, Utc.from_utc_datetime(&midnight)));
        }

        Err(DateError::Unrecognized {
            raw: raw.to_string(),
        })
    }

    /// Format `instant` in this layout.
    pub fn format(&self, instant: DateTime<Utc>) -> String {
        match self {
            Self::Rfc3339MillisZulu => instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            Self::Rfc3339Zulu => instant.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            Self::Rfc3339Offset(offset) => instant
                .with_timezone(offset)
                .format("%Y-%m-%dT%H:%M:%S%:z")
                .to_string(),
            Self::IsoSeconds => instant.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Self::IsoMinutes => instant.format("%Y-%m-%dT%H:%M").to_string(),
            Self::SpacedSeconds => instant.format("%Y-%m-%d %H:%M:%S").to_string(),
            Self::SpacedMinutes => instant.format("%Y-%m-%d %H:%M").to_string(),
            Self::CompactHour => instant.format("%Y%m%d%H").to_string(),
            Self::DateOnly => instant.format("%Y-%m-%d").to_string(),
        }
    }
}

fn parse_compact_hour(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() != 10 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = NaiveDate::parse_from_str(&raw[..8], "%Y%m%d").ok()?;
    let hour: u32 = raw[8..].parse().ok()?;
    let naive = date.and_hms_opt(hour, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// A parsed forecast base date together with the layout it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastDate {
    instant: DateTime<Utc>,
    pattern: DatePattern,
    raw: String,
}

impl ForecastDate {
    pub fn parse(raw: &str) -> Result<Self, DateError> {
        let (pattern, instant) = DatePattern::detect(raw)?;
        Ok(Self {
            instant,
            pattern,
            raw: raw.trim().to_string(),
        })
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn pattern(&self) -> DatePattern {
        self.pattern
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The date `hours` away from this one, formatted in the same layout.
    pub fn shifted(&self, hours: i64) -> Result<Self, DateError> {
        let instant = Duration::try_hours(hours)
            .and_then(|delta| self.instant.checked_add_signed(delta))
            .ok_or_else(|| DateError::OutOfRange {
                reason: format!("{} shifted by {}h", self.raw, hours),
            })?;
        Ok(Self {
            instant,
            pattern: self.pattern,
            raw: self.pattern.format(instant),
        })
    }
}
