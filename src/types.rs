//! Core types for the Gate Analytics pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: typed gate events, attendance rows, longest sessions, feature
//! vectors, and cluster assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw gate direction as stored in the access log (`GATE_IN` / `GATE_OUT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDirection {
    GateIn,
    GateOut,
}

impl GateDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDirection::GateIn => "GATE_IN",
            GateDirection::GateOut => "GATE_OUT",
        }
    }

    /// Parse a raw event type, ignoring case and surrounding whitespace
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "GATE_IN" => Some(GateDirection::GateIn),
            "GATE_OUT" => Some(GateDirection::GateOut),
            _ => None,
        }
    }
}

/// Event vocabulary consumed by the attendance aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceKind {
    Entry,
    Exit,
}

impl From<GateDirection> for AttendanceKind {
    fn from(direction: GateDirection) -> Self {
        match direction {
            GateDirection::GateIn => AttendanceKind::Entry,
            GateDirection::GateOut => AttendanceKind::Exit,
        }
    }
}

/// Event vocabulary consumed by the session reconstructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionKind {
    In,
    Out,
}

impl From<GateDirection> for SessionKind {
    fn from(direction: GateDirection) -> Self {
        match direction {
            GateDirection::GateIn => SessionKind::In,
            GateDirection::GateOut => SessionKind::Out,
        }
    }
}

/// A validated gate event, typed by the vocabulary of its consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvent<K> {
    pub user_id: String,
    pub kind: K,
    pub timestamp: DateTime<Utc>,
}

impl<K> GateEvent<K> {
    pub fn new(user_id: impl Into<String>, kind: K, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            timestamp,
        }
    }
}

/// Event with ENTRY/EXIT vocabulary
pub type AttendanceEvent = GateEvent<AttendanceKind>;

/// Event with IN/OUT vocabulary
pub type SessionEvent = GateEvent<SessionKind>;

/// Per-user attendance summary
///
/// Serialized with the column names of the attendance table
/// (`user_id,time,days,average_per_day,rank`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAttendance {
    pub user_id: String,
    /// Total hours inside the building (rounded to 2 decimals)
    #[serde(rename = "time")]
    pub total_hours: f64,
    /// Distinct calendar dates with a completed entry/exit pair
    #[serde(rename = "days")]
    pub days_present: u32,
    /// Average hours per present day (rounded to 2 decimals)
    pub average_per_day: f64,
    /// Position by descending average, starting at 1
    pub rank: u32,
}

/// A presence interval; open sessions have no end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Session {
    pub fn open(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration in hours, 0 for open sessions
    pub fn duration_hours(&self) -> f64 {
        match self.end {
            Some(end) => hours_between(self.start, end),
            None => 0.0,
        }
    }
}

/// Longest merged session for a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLongestSession {
    pub user_id: String,
    #[serde(rename = "session_length")]
    pub session_length_hours: f64,
}

/// Clustering input: (average hours per day, days present)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub average_per_day: f64,
    pub days_present: f64,
}

impl FeatureVector {
    pub fn new(average_per_day: f64, days_present: f64) -> Self {
        Self {
            average_per_day,
            days_present,
        }
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.average_per_day, self.days_present]
    }

    /// Euclidean distance on the raw (unnormalized) feature space
    pub fn distance(&self, other: &FeatureVector) -> f64 {
        let da = self.average_per_day - other.average_per_day;
        let dd = self.days_present - other.days_present;
        (da * da + dd * dd).sqrt()
    }
}

/// Cluster membership for a single user (`cluster` is 1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub user_id: String,
    #[serde(rename = "cluster")]
    pub cluster_id: usize,
}

/// Final centroid of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub cluster: usize,
    pub average_per_day: f64,
    pub days_present: f64,
}

/// Elapsed time between two instants in fractional hours
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}

/// Round to 2 decimal places, as used in every output table
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
