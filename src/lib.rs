//! Gate Analytics - Attendance and session analytics for gate access logs
//!
//! Gate Analytics turns raw gate access events into per-user attendance
//! tables, longest-session tables and behavioral clusters through a
//! deterministic pipeline: row cleaning → attendance aggregation → session
//! reconstruction → feature derivation → k-means clustering.
//!
//! ## Modules
//!
//! - **Attendance**: Pair entries with exits, total hours, days present, rank
//! - **Sessions**: Pair IN/OUT events and merge sessions across short breaks
//! - **Clustering**: Group users by average hours and days present

pub mod attendance;
pub mod clustering;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod schema;
pub mod sessions;
pub mod types;

pub use attendance::{calculate_attendance, AttendanceAggregator};
pub use clustering::{cluster_users, ClusterOutcome, KMeans};
pub use config::PipelineConfig;
pub use error::AnalyticsError;
pub use pipeline::{AnalyticsOutput, AnalyticsPipeline, PipelineReport};
pub use sessions::{calculate_longest_sessions, SessionReconstructor};

// Schema exports
pub use schema::{CleaningReport, EventCleaner, RawGateRow, SkipReason};

/// Crate version reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run reports
pub const PRODUCER_NAME: &str = "gate-analytics";
