//! Feature derivation
//!
//! This module derives clustering features from attendance rows:
//! - Average hours per present day
//! - Number of days present
//!
//! Features are used on their raw scales; no standardization is applied.

use crate::types::{FeatureVector, UserAttendance};

/// A feature vector tagged with the user it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct UserFeatures {
    pub user_id: String,
    pub features: FeatureVector,
}

/// Feature deriver for attendance-based clustering
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive the feature vector of a single attendance row
    pub fn derive(attendance: &UserAttendance) -> FeatureVector {
        FeatureVector::new(attendance.average_per_day, attendance.days_present as f64)
    }

    /// Derive features for every row, preserving order
    pub fn derive_all(attendance: &[UserAttendance]) -> Vec<UserFeatures> {
        attendance
            .iter()
            .map(|row| UserFeatures {
                user_id: row.user_id.clone(),
                features: Self::derive(row),
            })
            .collect()
    }
}
