//! Attendance aggregation
//!
//! Pairs ENTRY/EXIT events per user into time spent in the building, counts the
//! distinct days with a completed visit, and ranks users by their average
//! hours per day.
//!
//! Pairing is last-entry-wins: a second ENTRY before an EXIT replaces the
//! pending one, and an EXIT without a pending ENTRY is ignored.

use crate::types::{hours_between, round2, AttendanceEvent, AttendanceKind, UserAttendance};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};

/// Running totals for one user
#[derive(Debug)]
struct UserAccumulator {
    user_id: String,
    pending_entry: Option<DateTime<Utc>>,
    total_hours: f64,
    dates: BTreeSet<NaiveDate>,
}

impl UserAccumulator {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            pending_entry: None,
            total_hours: 0.0,
            dates: BTreeSet::new(),
        }
    }

    fn record(&mut self, kind: AttendanceKind, timestamp: DateTime<Utc>) {
        match kind {
            AttendanceKind::Entry => self.pending_entry = Some(timestamp),
            AttendanceKind::Exit => {
                if let Some(entry) = self.pending_entry.take() {
                    self.total_hours += hours_between(entry, timestamp);
                    self.dates.insert(entry.date_naive());
                }
            }
        }
    }

    fn finish(self) -> UserAttendance {
        let days_present = self.dates.len() as u32;
        let average_per_day = if days_present > 0 {
            self.total_hours / days_present as f64
        } else {
            0.0
        };

        UserAttendance {
            user_id: self.user_id,
            total_hours: round2(self.total_hours),
            days_present,
            average_per_day: round2(average_per_day),
            rank: 0,
        }
    }
}

/// Aggregator for per-user attendance statistics
///
/// Users are kept in first-appearance order so that ranking ties resolve
/// deterministically.
#[derive(Debug, Default)]
pub struct AttendanceAggregator {
    index: HashMap<String, usize>,
    users: Vec<UserAccumulator>,
}

impl AttendanceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single event
    pub fn push(&mut self, event: &AttendanceEvent) {
        let slot = match self.index.get(&event.user_id) {
            Some(&slot) => slot,
            None => {
                let slot = self.users.len();
                self.index.insert(event.user_id.clone(), slot);
                self.users.push(UserAccumulator::new(&event.user_id));
                slot
            }
        };

        self.users[slot].record(event.kind, event.timestamp);
    }

    /// Number of distinct users seen so far
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Finalize totals and assign ranks
    pub fn finish(self) -> Vec<UserAttendance> {
        let results = self.users.into_iter().map(UserAccumulator::finish).collect();
        rank_by_average(results)
    }
}

/// Compute per-user attendance for an ordered event stream
pub fn calculate_attendance(events: &[AttendanceEvent]) -> Vec<UserAttendance> {
    let mut aggregator = AttendanceAggregator::new();
    for event in events {
        aggregator.push(event);
    }
    aggregator.finish()
}

/// Sort by descending average per day and assign ranks 1..N
///
/// The sort is stable, so equal averages keep their incoming order.
pub fn rank_by_average(mut results: Vec<UserAttendance>) -> Vec<UserAttendance> {
    results.sort_by(|a, b| b.average_per_day.total_cmp(&a.average_per_day));
    for (idx, result) in results.iter_mut().enumerate() {
        result.rank = idx as u32 + 1;
    }
    results
}
