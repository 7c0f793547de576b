//! Pipeline orchestration
//!
//! This module provides the public API for Gate Analytics.
//! It runs the full pipeline from raw access log rows to result tables.
//!
//! Pipeline stages:
//! 1. Attendance - strict cleaning, aggregation, ranking
//! 2. Sessions - lenient cleaning, session reconstruction
//! 3. Clustering - feature derivation, k-means
//!
//! When writing to disk, each stage persists its table as soon as it finishes.
//! A failing stage stops the run; tables already written are kept.

use crate::attendance::calculate_attendance;
use crate::clustering::{cluster_users, ClusterOutcome};
use crate::config::PipelineConfig;
use crate::encoder::TableEncoder;
use crate::error::AnalyticsError;
use crate::features::FeatureDeriver;
use crate::schema::{clean_for_attendance, clean_for_sessions, CleaningReport, RawGateRow};
use crate::types::{UserAttendance, UserLongestSession};
use crate::{PRODUCER_NAME, VERSION};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything produced by an in-memory run
#[derive(Debug, Clone)]
pub struct AnalyticsOutput {
    pub attendance: Vec<UserAttendance>,
    pub longest_sessions: Vec<UserLongestSession>,
    pub clusters: ClusterOutcome,
    pub attendance_cleaning: CleaningReport,
    pub session_cleaning: CleaningReport,
}

/// Pipeline stage identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Attendance,
    Sessions,
    Clustering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Attendance => "attendance",
            Stage::Sessions => "sessions",
            Stage::Clustering => "clustering",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
}

/// Outcome of one stage of a run
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    /// Rows written by the stage
    pub rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Clustering statistics of a run
#[derive(Debug, Clone, Serialize)]
pub struct ClusteringSummary {
    pub requested_clusters: usize,
    pub active_clusters: usize,
    pub iterations: usize,
    pub converged: bool,
}

/// Summary of a run written to disk
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub producer: String,
    pub version: String,
    pub run_id: String,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input_rows: usize,
    pub stages: Vec<StageOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_cleaning: Option<CleaningReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_cleaning: Option<CleaningReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ClusteringSummary>,
}

impl PipelineReport {
    fn new(input: &Path, output_dir: &Path) -> Self {
        let now = Utc::now();
        Self {
            producer: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            started_at: now,
            finished_at: now,
            input_rows: 0,
            stages: Vec::new(),
            attendance_cleaning: None,
            session_cleaning: None,
            clustering: None,
        }
    }

    /// Whether every stage completed
    pub fn succeeded(&self) -> bool {
        self.failed_stage().is_none()
    }

    /// The stage that stopped the run, if any
    pub fn failed_stage(&self) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Failed)
    }

    fn complete(&mut self, stage: Stage, rows: usize, outputs: Vec<PathBuf>) {
        tracing::info!(%stage, rows, "Stage completed");
        self.stages.push(StageOutcome {
            stage,
            status: StageStatus::Completed,
            rows,
            outputs,
            error: None,
        });
    }

    fn fail(&mut self, stage: Stage, error: &AnalyticsError) {
        tracing::error!(%stage, %error, "Stage failed, stopping pipeline");
        self.stages.push(StageOutcome {
            stage,
            status: StageStatus::Failed,
            rows: 0,
            outputs: Vec::new(),
            error: Some(error.to_string()),
        });
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

/// Analytics pipeline with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct AnalyticsPipeline {
    config: PipelineConfig,
}

impl AnalyticsPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in memory
    ///
    /// Clustering precondition failures (no users, too few users for `k`) are
    /// returned as errors.
    pub fn analyze(&self, rows: &[RawGateRow]) -> Result<AnalyticsOutput, AnalyticsError> {
        let (attendance, attendance_cleaning) = self.attendance(rows);
        let (longest_sessions, session_cleaning) = self.sessions(rows);
        let clusters = self.clusters(&attendance)?;

        Ok(AnalyticsOutput {
            attendance,
            longest_sessions,
            clusters,
            attendance_cleaning,
            session_cleaning,
        })
    }

    /// Load `input`, run every stage and write the result tables to `output_dir`
    ///
    /// Failing to read the input or create the output directory is returned
    /// as an error. Stage failures are recorded in the report instead.
    pub fn run(&self, input: &Path, output_dir: &Path) -> Result<PipelineReport, AnalyticsError> {
        let mut report = PipelineReport::new(input, output_dir);

        let rows = TableEncoder::read_raw_rows(input)?;
        report.input_rows = rows.len();
        tracing::info!(input = %input.display(), rows = rows.len(), "Loaded access log");

        fs::create_dir_all(output_dir)?;
        let outputs = &self.config.outputs;

        // Stage 1: Attendance
        let (attendance, cleaning) = self.attendance(&rows);
        report.attendance_cleaning = Some(cleaning);
        let attendance_path = output_dir.join(&outputs.attendance);
        match TableEncoder::write(&attendance_path, &attendance) {
            Ok(()) => report.complete(Stage::Attendance, attendance.len(), vec![attendance_path]),
            Err(e) => {
                report.fail(Stage::Attendance, &e);
                return Ok(report.finish());
            }
        }

        // Stage 2: Longest sessions
        let (longest_sessions, cleaning) = self.sessions(&rows);
        report.session_cleaning = Some(cleaning);
        let sessions_path = output_dir.join(&outputs.longest_sessions);
        match TableEncoder::write(&sessions_path, &longest_sessions) {
            Ok(()) => report.complete(Stage::Sessions, longest_sessions.len(), vec![sessions_path]),
            Err(e) => {
                report.fail(Stage::Sessions, &e);
                return Ok(report.finish());
            }
        }

        // Stage 3: Clustering
        let clusters_path = output_dir.join(&outputs.clusters);
        let centroids_path = output_dir.join(&outputs.centroids);
        let clustered = self.clusters(&attendance).and_then(|outcome| {
            let clusters_csv = TableEncoder::encode_to_string(&outcome.assignments)?;
            let centroids_csv = TableEncoder::encode_to_string(&outcome.centroids)?;

            // The two tables are kept or dropped together
            fs::write(&clusters_path, clusters_csv)?;
            if let Err(e) = fs::write(&centroids_path, centroids_csv) {
                if let Err(cleanup) = fs::remove_file(&clusters_path) {
                    tracing::warn!(
                        path = %clusters_path.display(),
                        %cleanup,
                        "Could not remove partial cluster table"
                    );
                }
                return Err(e.into());
            }
            Ok(outcome)
        });
        match clustered {
            Ok(outcome) => {
                report.clustering = Some(ClusteringSummary {
                    requested_clusters: self.config.cluster_count,
                    active_clusters: outcome.centroids.len(),
                    iterations: outcome.iterations,
                    converged: outcome.converged,
                });
                report.complete(
                    Stage::Clustering,
                    outcome.assignments.len(),
                    vec![clusters_path, centroids_path],
                );
            }
            Err(e) => report.fail(Stage::Clustering, &e),
        }

        Ok(report.finish())
    }

    fn attendance(&self, rows: &[RawGateRow]) -> (Vec<UserAttendance>, CleaningReport) {
        let cleaned = clean_for_attendance(rows);
        if !cleaned.report.is_clean() {
            tracing::info!(summary = %cleaned.report.summary(), "Attendance cleaning");
        }
        (calculate_attendance(&cleaned.events), cleaned.report)
    }

    fn sessions(&self, rows: &[RawGateRow]) -> (Vec<UserLongestSession>, CleaningReport) {
        let cleaned = clean_for_sessions(rows);
        let reconstructor = self.config.session_reconstructor();
        (reconstructor.longest_sessions(&cleaned.events), cleaned.report)
    }

    fn clusters(&self, attendance: &[UserAttendance]) -> Result<ClusterOutcome, AnalyticsError> {
        let features = FeatureDeriver::derive_all(attendance);
        cluster_users(&features, &self.config.kmeans())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn sample_rows() -> Vec<RawGateRow> {
        vec![
            RawGateRow::new("123", "GATE_IN", "2023-01-01T08:00:00.000Z"),
            RawGateRow::new("123", "GATE_OUT", "2023-01-01T12:00:00.000Z"),
            RawGateRow::new("123", "GATE_IN", "2023-01-01T13:00:00.000Z"),
            RawGateRow::new("123", "GATE_OUT", "2023-01-01T18:00:00.000Z"),
            RawGateRow::new("456", "gate_in", "2023-01-01T09:00:00.000Z"),
            RawGateRow::new("456", "gate_out", "2023-01-01T17:00:00.000Z"),
            RawGateRow::new("789", "GATE_IN", "2023-01-02T07:00:00.000Z"),
            RawGateRow::new("789", "GATE_OUT", "2023-01-02T09:00:00.000Z"),
            RawGateRow::new("", "GATE_IN", "2023-01-01T08:00:00.000Z"),
            RawGateRow::new("789", "GATE_IN", "not a time"),
        ]
    }

    fn seeded(k: usize) -> AnalyticsPipeline {
        AnalyticsPipeline::new(PipelineConfig {
            cluster_count: k,
            seed: Some(17),
            ..Default::default()
        })
    }

    #[test]
    fn test_analyze() {
        let output = seeded(2).analyze(&sample_rows()).unwrap();

        let attendance: Vec<(&str, f64, u32, u32)> = output
            .attendance
            .iter()
            .map(|a| (a.user_id.as_str(), a.total_hours, a.days_present, a.rank))
            .collect();
        assert_eq!(
            attendance,
            vec![("123", 9.0, 1, 1), ("456", 8.0, 1, 2), ("789", 2.0, 1, 3)]
        );

        let sessions: Vec<(&str, f64)> = output
            .longest_sessions
            .iter()
            .map(|s| (s.user_id.as_str(), s.session_length_hours))
            .collect();
        assert_eq!(sessions, vec![("123", 10.0), ("456", 8.0), ("789", 2.0)]);

        assert_eq!(output.clusters.assignments.len(), 3);
        assert_eq!(output.attendance_cleaning.skipped_rows(), 2);
        assert_eq!(output.session_cleaning.skipped_rows(), 2);
    }

    #[test]
    fn test_analyze_no_valid_rows() {
        let rows = vec![RawGateRow::new("", "GATE_IN", "2023-01-01T08:00:00.000Z")];
        let err = seeded(3).analyze(&rows).unwrap_err();
        assert!(matches!(err, AnalyticsError::EmptyInput));
    }

    #[test]
    fn test_run_writes_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.csv");
        TableEncoder::write(&input, &sample_rows()).unwrap();
        let out = dir.path().join("out");

        let report = seeded(2).run(&input, &out).unwrap();

        assert!(report.succeeded());
        assert_eq!(report.input_rows, 10);
        let stages: Vec<Stage> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Attendance, Stage::Sessions, Stage::Clustering]
        );

        let attendance: Vec<UserAttendance> =
            TableEncoder::read(&out.join("attendance.csv")).unwrap();
        assert_eq!(attendance.len(), 3);

        let clusters: Vec<crate::types::ClusterAssignment> =
            TableEncoder::read(&out.join("clusters.csv")).unwrap();
        let users: HashSet<String> = clusters.into_iter().map(|c| c.user_id).collect();
        assert_eq!(users.len(), 3);

        assert!(out.join("longest_sessions.csv").exists());
        assert!(out.join("centroids.csv").exists());
        assert!(report.clustering.is_some());
    }

    #[test]
    fn test_clustering_failure_keeps_earlier_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.csv");
        TableEncoder::write(&input, &sample_rows()).unwrap();

        let report = seeded(10).run(&input, dir.path()).unwrap();

        assert!(!report.succeeded());
        let failed = report.failed_stage().unwrap();
        assert_eq!(failed.stage, Stage::Clustering);
        assert!(failed
            .error
            .as_deref()
            .unwrap()
            .contains("k exceeds dataset size"));

        assert!(dir.path().join("attendance.csv").exists());
        assert!(dir.path().join("longest_sessions.csv").exists());
        assert!(!dir.path().join("clusters.csv").exists());
    }

    #[test]
    fn test_centroid_write_failure_removes_cluster_table() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.csv");
        TableEncoder::write(&input, &sample_rows()).unwrap();
        let out = dir.path().join("out");
        // A directory in place of the centroid table makes its write fail
        fs::create_dir_all(out.join("centroids.csv")).unwrap();

        let report = seeded(2).run(&input, &out).unwrap();

        let failed = report.failed_stage().unwrap();
        assert_eq!(failed.stage, Stage::Clustering);
        assert!(report.clustering.is_none());
        assert!(out.join("attendance.csv").exists());
        assert!(!out.join("clusters.csv").exists());
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = seeded(2).run(&dir.path().join("missing.csv"), dir.path());
        assert!(matches!(result, Err(AnalyticsError::Io(_))));
    }

    #[test]
    fn test_report_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.csv");
        TableEncoder::write(&input, &sample_rows()).unwrap();

        let report = seeded(2).run(&input, dir.path()).unwrap();
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();

        assert_eq!(json["producer"], "gate-analytics");
        assert_eq!(json["stages"][0]["stage"], "attendance");
        assert_eq!(json["stages"][2]["status"], "completed");
        assert_eq!(json["attendance_cleaning"]["mode"], "strict");
        assert_eq!(json["session_cleaning"]["skipped"][0]["reason"]["kind"], "missing_user_id");
    }
}
