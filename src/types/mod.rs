pub mod metrics;
pub mod report;
pub mod video;

pub use metrics::{AnalyticsMetrics, ReportingMetrics};
pub use report::{ConnectionReport, RunSummary, StepFailure, SyncState, SyncStep};
pub use video::{DiscoveredVideo, VideoType, parse_iso8601_duration, thumbnail_url};
