//! Error types for Gate Analytics

use thiserror::Error;

/// Errors that can occur while loading, analyzing, or writing gate data
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("input data is empty")]
    EmptyInput,

    #[error("k exceeds dataset size (k={k}, n={n})")]
    ClusterCountExceedsData { k: usize, n: usize },

    #[error("Invalid cluster count: {0}")]
    InvalidClusterCount(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalyticsError {
    /// Whether this error is a clustering precondition failure
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AnalyticsError::EmptyInput
                | AnalyticsError::ClusterCountExceedsData { .. }
                | AnalyticsError::InvalidClusterCount(_)
        )
    }
}
