use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// `Pending -> Running -> {Completed | Failed | Cancelled}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    /// Job is registered and waiting for its executor to start.
    Pending,
    /// Job is currently executing its stages.
    Running,
    /// Every stage ran without cancellation.
    Completed,
    /// A stage raised an unrecovered error.
    Failed,
    /// A stop request was observed at a checkpoint.
    Cancelled,
}

impl JobStatus {
    /// Returns `true` if the job is in a terminal state (won't transition further).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns `true` if the job is still active (pending or running).
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}
