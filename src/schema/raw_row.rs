//! Raw access log rows
//!
//! A raw row is exactly what the CSV file holds: three untyped string columns.
//! Validation turns a row into either a typed record or a skip reason.

use crate::types::{GateDirection, GateEvent};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout of the `event_time` column (UTC, millisecond precision)
///
/// chrono treats `%.f` as optional, so the fraction is checked separately.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Longest accepted fractional-seconds part
pub const MAX_FRACTION_DIGITS: usize = 6;

/// Column names of the input table, in file order
pub const INPUT_COLUMNS: [&str; 3] = ["user_id", "event_type", "event_time"];

/// One row of the access log, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGateRow {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub event_time: String,
}

impl RawGateRow {
    pub fn new(
        user_id: impl Into<String>,
        event_type: impl Into<String>,
        event_time: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            event_type: event_type.into(),
            event_time: event_time.into(),
        }
    }

    /// Validate the row and normalize its fields
    ///
    /// Checks run in column order, so the reported reason is the first
    /// offending column.
    pub fn validate(&self) -> Result<ValidatedRow, SkipReason> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(SkipReason::MissingUserId);
        }

        let direction = GateDirection::parse(&self.event_type).ok_or_else(|| {
            SkipReason::UnknownEventType {
                value: self.event_type.clone(),
            }
        })?;

        let timestamp =
            parse_event_time(&self.event_time).map_err(|e| SkipReason::InvalidTimestamp {
                value: self.event_time.clone(),
                reason: e.to_string(),
            })?;

        Ok(ValidatedRow {
            user_id: user_id.to_string(),
            direction,
            timestamp,
        })
    }
}

/// A row that passed validation, still carrying the raw gate vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRow {
    pub user_id: String,
    pub direction: GateDirection,
    pub timestamp: DateTime<Utc>,
}

impl ValidatedRow {
    /// Convert into an event typed by the consumer's vocabulary
    pub fn into_event<K: From<GateDirection>>(self) -> GateEvent<K> {
        GateEvent {
            user_id: self.user_id,
            kind: K::from(self.direction),
            timestamp: self.timestamp,
        }
    }
}

/// Why a raw row was dropped during cleaning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("missing user_id")]
    MissingUserId,

    #[error("unrecognized event_type {value:?}")]
    UnknownEventType { value: String },

    #[error("invalid event_time {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Why an `event_time` value could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("expected fractional seconds with 1 to {MAX_FRACTION_DIGITS} digits")]
    Fraction,

    #[error(transparent)]
    Format(#[from] chrono::ParseError),
}

/// Parse an `event_time` value such as `2023-01-31T08:18:36.000Z`
///
/// The fractional seconds are required.
pub fn parse_event_time(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let raw = raw.trim();
    let naive = NaiveDateTime::parse_from_str(raw, EVENT_TIME_FORMAT)?;
    if !has_fraction(raw) {
        return Err(TimestampError::Fraction);
    }
    Ok(Utc.from_utc_datetime(&naive))
}

fn has_fraction(raw: &str) -> bool {
    let Some((_, fraction)) = raw.strip_suffix('Z').and_then(|body| body.rsplit_once('.')) else {
        return false;
    };
    (1..=MAX_FRACTION_DIGITS).contains(&fraction.len())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttendanceKind, SessionKind};
    use chrono::Timelike;

    #[test]
    fn test_parse_event_time() {
        let ts = parse_event_time("2023-01-31T08:18:36.000Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2023, 1, 31, 8, 18, 36).unwrap());

        let ts = parse_event_time("2023-01-31T08:18:36.250Z").unwrap();
        assert_eq!(ts.nanosecond(), 250_000_000);

        let ts = parse_event_time("2023-01-31T08:18:36.5Z").unwrap();
        assert_eq!(ts.nanosecond(), 500_000_000);

        assert!(parse_event_time("INVALID_TIMESTAMP").is_err());
        assert!(parse_event_time("2023-01-31 08:18:36").is_err());
        assert!(parse_event_time("").is_err());
    }

    #[test]
    fn test_parse_event_time_requires_fraction() {
        assert_eq!(
            parse_event_time("2023-01-02T08:30:00Z"),
            Err(TimestampError::Fraction)
        );
        assert_eq!(
            TimestampError::Fraction.to_string(),
            "expected fractional seconds with 1 to 6 digits"
        );
        assert!(parse_event_time("2023-01-02T08:30:00.123456Z").is_ok());
        assert_eq!(
            parse_event_time("2023-01-02T08:30:00.123456789Z"),
            Err(TimestampError::Fraction)
        );

        let row = RawGateRow::new("789", "GATE_OUT", "2023-01-02T08:30:00Z");
        assert!(matches!(
            row.validate(),
            Err(SkipReason::InvalidTimestamp { ref value, .. }) if value == "2023-01-02T08:30:00Z"
        ));
    }

    #[test]
    fn test_validate_normalizes_fields() {
        let row = RawGateRow::new(" 123 ", "gate_in", "2023-01-31T08:18:36.000Z");
        let validated = row.validate().unwrap();

        assert_eq!(validated.user_id, "123");
        assert_eq!(validated.direction, GateDirection::GateIn);
    }

    #[test]
    fn test_validate_reasons() {
        let missing = RawGateRow::new("", "GATE_IN", "2023-01-31T08:00:00.000Z");
        assert_eq!(missing.validate(), Err(SkipReason::MissingUserId));

        let blank = RawGateRow::new("   ", "GATE_IN", "2023-01-31T08:00:00.000Z");
        assert_eq!(blank.validate(), Err(SkipReason::MissingUserId));

        let bad_type = RawGateRow::new("789", "INVALID", "2023-01-31T09:00:00.000Z");
        assert_eq!(
            bad_type.validate(),
            Err(SkipReason::UnknownEventType {
                value: "INVALID".to_string()
            })
        );

        let bad_time = RawGateRow::new("123", "GATE_IN", "INVALID_TIMESTAMP");
        assert!(matches!(
            bad_time.validate(),
            Err(SkipReason::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_into_event_vocabularies() {
        let row = RawGateRow::new("456", "GATE_OUT", "2023-01-31T18:00:00.000Z");

        let attendance = row.validate().unwrap().into_event::<AttendanceKind>();
        assert_eq!(attendance.kind, AttendanceKind::Exit);

        let session = row.validate().unwrap().into_event::<SessionKind>();
        assert_eq!(session.kind, SessionKind::Out);
        assert_eq!(session.user_id, "456");
    }

    #[test]
    fn test_skip_reason_serialization() {
        let json = serde_json::to_string(&SkipReason::UnknownEventType {
            value: "X".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"kind\":\"unknown_event_type\""));
        assert!(json.contains("\"value\":\"X\""));
    }
}
