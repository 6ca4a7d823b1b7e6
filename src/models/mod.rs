// Domain models: archives, samples, monitoring sessions and reports

mod archive;
mod report;
mod sample;
mod session;

pub use archive::{ArchiveRecord, RetentionPolicy, Tier};
pub use report::{CorrelatedReport, TaskOutcome};
pub use sample::{ProcessUsage, Sample, TopProcesses};
pub use session::{
    Metric, MetricSummary, MonitoringSession, PeakRecord, SessionSummary,
};
