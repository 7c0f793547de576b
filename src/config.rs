//! Pipeline configuration
//!
//! All fields have defaults, so a config file only needs to name the values it
//! changes. Stored as JSON.

use crate::clustering::{KMeans, DEFAULT_CLUSTER_COUNT, DEFAULT_MAX_ITERATIONS};
use crate::error::AnalyticsError;
use crate::sessions::{SessionReconstructor, DEFAULT_GAP_TOLERANCE_MINUTES};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Output file names, relative to the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFiles {
    pub attendance: String,
    pub longest_sessions: String,
    pub clusters: String,
    pub centroids: String,
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            attendance: "attendance.csv".to_string(),
            longest_sessions: "longest_sessions.csv".to_string(),
            clusters: "clusters.csv".to_string(),
            centroids: "centroids.csv".to_string(),
        }
    }
}

/// Settings for a full analytics run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum idle time between two sessions for them to merge
    pub gap_tolerance_minutes: i64,
    /// Number of k-means clusters
    pub cluster_count: usize,
    /// K-means iteration cap
    pub max_iterations: usize,
    /// Fixed seed for centroid initialization; unseeded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub outputs: OutputFiles,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_minutes: DEFAULT_GAP_TOLERANCE_MINUTES,
            cluster_count: DEFAULT_CLUSTER_COUNT,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: None,
            outputs: OutputFiles::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, AnalyticsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, AnalyticsError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.gap_tolerance_minutes < 0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "gap_tolerance_minutes must be non-negative, got {}",
                self.gap_tolerance_minutes
            )));
        }
        if Duration::try_minutes(self.gap_tolerance_minutes).is_none() {
            return Err(AnalyticsError::InvalidConfig(format!(
                "gap_tolerance_minutes is out of range, got {}",
                self.gap_tolerance_minutes
            )));
        }
        if self.cluster_count == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "cluster_count must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let files = [
            &self.outputs.attendance,
            &self.outputs.longest_sessions,
            &self.outputs.clusters,
            &self.outputs.centroids,
        ];
        if files.iter().any(|f| f.trim().is_empty()) {
            return Err(AnalyticsError::InvalidConfig(
                "output file names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Out-of-range tolerances saturate; `validate` reports them
    pub fn session_reconstructor(&self) -> SessionReconstructor {
        let tolerance = Duration::try_minutes(self.gap_tolerance_minutes.max(0))
            .unwrap_or_else(Duration::max_value);
        SessionReconstructor::new(tolerance)
    }

    pub fn kmeans(&self) -> KMeans {
        let kmeans = KMeans::new(self.cluster_count).with_max_iterations(self.max_iterations);
        match self.seed {
            Some(seed) => kmeans.with_seed(seed),
            None => kmeans,
        }
    }
}
