//! Session reconstruction
//!
//! Rebuilds presence intervals from IN/OUT events and reports each user's
//! longest continuous session.
//!
//! Pipeline per user:
//! 1. Pairing - IN opens a candidate, OUT closes the most recent open candidate
//! 2. Merging - completed candidates separated by at most the gap tolerance
//!    are joined into one session
//! 3. Measuring - the longest merged session in hours

use crate::types::{Session, SessionEvent, SessionKind, UserLongestSession};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Default idle time allowed between two sessions for them to count as one
pub const DEFAULT_GAP_TOLERANCE_MINUTES: i64 = 120;

/// Reconstructor for per-user work sessions
#[derive(Debug, Clone, Copy)]
pub struct SessionReconstructor {
    gap_tolerance: Duration,
}

impl Default for SessionReconstructor {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_GAP_TOLERANCE_MINUTES))
    }
}

impl SessionReconstructor {
    /// Create a reconstructor with a specific gap tolerance
    pub fn new(gap_tolerance: Duration) -> Self {
        Self { gap_tolerance }
    }

    pub fn gap_tolerance(&self) -> Duration {
        self.gap_tolerance
    }

    /// Longest merged session per user, sorted by length descending
    ///
    /// Every user present in the input is reported, with 0.0 when no session
    /// was ever closed. Equal lengths keep first-appearance order.
    pub fn longest_sessions(&self, events: &[SessionEvent]) -> Vec<UserLongestSession> {
        let mut longest: Vec<UserLongestSession> = group_by_user(events)
            .into_iter()
            .map(|(user_id, user_events)| {
                let candidates = pair_events(&user_events);
                let merged = self.merge(&candidates);
                let session_length_hours = merged
                    .iter()
                    .map(Session::duration_hours)
                    .fold(0.0, f64::max);

                UserLongestSession {
                    user_id,
                    session_length_hours,
                }
            })
            .collect();

        longest.sort_by(|a, b| b.session_length_hours.total_cmp(&a.session_length_hours));
        longest
    }

    /// Merge completed sessions whose gap is within the tolerance
    ///
    /// Open candidates are skipped. A merged session spans the earliest start
    /// and latest end of its candidates, so the returned sessions are all
    /// closed and never overlap.
    pub fn merge(&self, candidates: &[Session]) -> Vec<Session> {
        let mut merged = Vec::new();
        let mut current: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

        for candidate in candidates {
            let Some(end) = candidate.end else {
                continue;
            };

            current = match current {
                Some((start, current_end)) if candidate.start - current_end <= self.gap_tolerance => {
                    Some((start.min(candidate.start), current_end.max(end)))
                }
                Some((start, current_end)) => {
                    merged.push(Session {
                        start,
                        end: Some(current_end),
                    });
                    Some((candidate.start, end))
                }
                None => Some((candidate.start, end)),
            };
        }

        if let Some((start, end)) = current {
            merged.push(Session {
                start,
                end: Some(end),
            });
        }

        merged
    }
}

/// Longest session per user with the default 2 hour tolerance
pub fn calculate_longest_sessions(events: &[SessionEvent]) -> Vec<UserLongestSession> {
    SessionReconstructor::default().longest_sessions(events)
}

/// Group events by user, keeping first-appearance order of users and arrival
/// order of events
fn group_by_user(events: &[SessionEvent]) -> Vec<(String, Vec<&SessionEvent>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&SessionEvent>)> = Vec::new();

    for event in events {
        let slot = *index.entry(event.user_id.as_str()).or_insert_with(|| {
            groups.push((event.user_id.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(event);
    }

    groups
}

/// Pair IN/OUT events into candidate sessions, in opening order
///
/// An OUT closes the most recently opened candidate that is still open. An
/// OUT with nothing open is ignored.
pub fn pair_events(events: &[&SessionEvent]) -> Vec<Session> {
    let mut candidates: Vec<Session> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for event in events {
        match event.kind {
            SessionKind::In => {
                open.push(candidates.len());
                candidates.push(Session::open(event.timestamp));
            }
            SessionKind::Out => {
                if let Some(slot) = open.pop() {
                    candidates[slot].end = Some(event.timestamp);
                }
            }
        }
    }

    candidates
}
