//! Event cleaning
//!
//! Converts raw access log rows into typed gate events. Invalid rows are never
//! fatal: each one is dropped and recorded in a [`CleaningReport`].
//!
//! Two policies exist:
//! - **Strict** (attendance): every dropped row is logged at warn level
//! - **Lenient** (sessions): dropped rows are only logged at debug level

use crate::schema::raw_row::{RawGateRow, SkipReason};
use crate::types::{AttendanceKind, GateDirection, GateEvent, SessionKind};
use serde::Serialize;

/// Cleaning policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningMode {
    Strict,
    Lenient,
}

/// A dropped row and the reason it was dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub user_id: String,
    pub reason: SkipReason,
}

/// Number of dropped rows per reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub missing_user_id: usize,
    pub unknown_event_type: usize,
    pub invalid_timestamp: usize,
}

/// Outcome of a cleaning pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningReport {
    pub mode: CleaningMode,
    pub total_rows: usize,
    pub accepted_rows: usize,
    pub skipped: Vec<SkippedRow>,
}

impl CleaningReport {
    fn new(mode: CleaningMode) -> Self {
        Self {
            mode,
            total_rows: 0,
            accepted_rows: 0,
            skipped: Vec::new(),
        }
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn skip_counts(&self) -> SkipCounts {
        let mut counts = SkipCounts::default();
        for skipped in &self.skipped {
            match skipped.reason {
                SkipReason::MissingUserId => counts.missing_user_id += 1,
                SkipReason::UnknownEventType { .. } => counts.unknown_event_type += 1,
                SkipReason::InvalidTimestamp { .. } => counts.invalid_timestamp += 1,
            }
        }
        counts
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} rows accepted, {} skipped",
            self.accepted_rows,
            self.total_rows,
            self.skipped_rows()
        )
    }
}

/// Typed events in arrival order, plus the report of what was dropped
#[derive(Debug, Clone)]
pub struct CleanedEvents<K> {
    pub events: Vec<GateEvent<K>>,
    pub report: CleaningReport,
}

/// Cleaner for raw access log rows
#[derive(Debug, Clone, Copy)]
pub struct EventCleaner {
    mode: CleaningMode,
}

impl EventCleaner {
    pub fn new(mode: CleaningMode) -> Self {
        Self { mode }
    }

    pub fn strict() -> Self {
        Self::new(CleaningMode::Strict)
    }

    pub fn lenient() -> Self {
        Self::new(CleaningMode::Lenient)
    }

    pub fn mode(&self) -> CleaningMode {
        self.mode
    }

    /// Clean rows into events of the vocabulary `K`, preserving row order
    pub fn clean<K: From<GateDirection>>(&self, rows: &[RawGateRow]) -> CleanedEvents<K> {
        let mut report = CleaningReport::new(self.mode);
        let mut events: Vec<GateEvent<K>> = Vec::with_capacity(rows.len());

        for (idx, row) in rows.iter().enumerate() {
            report.total_rows += 1;

            match row.validate() {
                Ok(validated) => {
                    events.push(validated.into_event());
                    report.accepted_rows += 1;
                }
                Err(reason) => {
                    self.log_skip(idx + 1, row, &reason);
                    report.skipped.push(SkippedRow {
                        row: idx + 1,
                        user_id: row.user_id.clone(),
                        reason,
                    });
                }
            }
        }

        CleanedEvents { events, report }
    }

    fn log_skip(&self, row_number: usize, row: &RawGateRow, reason: &SkipReason) {
        match self.mode {
            CleaningMode::Strict => tracing::warn!(
                row = row_number,
                user_id = %row.user_id,
                event_type = %row.event_type,
                event_time = %row.event_time,
                "Skipping invalid row: {}",
                reason
            ),
            CleaningMode::Lenient => tracing::debug!(
                row = row_number,
                "Skipping invalid row (longest session): {}",
                reason
            ),
        }
    }
}

/// Clean rows for the attendance aggregator (strict, ENTRY/EXIT)
pub fn clean_for_attendance(rows: &[RawGateRow]) -> CleanedEvents<AttendanceKind> {
    EventCleaner::strict().clean(rows)
}

/// Clean rows for the session reconstructor (lenient, IN/OUT)
pub fn clean_for_sessions(rows: &[RawGateRow]) -> CleanedEvents<SessionKind> {
    EventCleaner::lenient().clean(rows)
}
