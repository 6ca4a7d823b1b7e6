// Correlated report: a task's result merged with the resources used while it ran

use serde::{Deserialize, Serialize};

use super::MonitoringSession;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TaskOutcome<T> {
    Completed { value: T },
    Failed { error: String },
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedReport<T> {
    pub task_result: TaskOutcome<T>,
    /// Sealed before the report is assembled.
    pub session: MonitoringSession,
    pub wall_clock_ms: u64,
}
