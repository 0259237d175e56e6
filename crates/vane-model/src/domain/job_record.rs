use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;

use crate::{JobFamily, JobId, JobParams, JobStatus, Progress};

/// Status, progress and outcome of one submitted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique job identifier.
    pub id: JobId,
    /// Family the job belongs to.
    pub family: JobFamily,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Fraction of work done, non-decreasing while running.
    pub progress: Progress,
    /// Human-readable description of the current stage.
    pub message: String,
    /// Submission arguments.
    pub params: JobParams,
    #[serde(with = "crate::domain::time_serde")]
    pub created_at: SystemTime,
    #[serde(with = "crate::domain::time_serde")]
    pub updated_at: SystemTime,
    /// Set once the job reaches a terminal state.
    #[serde(
        default,
        with = "crate::domain::time_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<SystemTime>,
    /// Success payload, only when `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure cause, only when `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    /// Fresh `Pending` record.
    pub fn pending(id: JobId, params: JobParams, message: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            family: params.family(),
            status: JobStatus::Pending,
            progress: 0.0,
            message: message.into(),
            params,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnalysisParams;

    #[test]
    fn pending_record_has_no_outcome() {
        let rec = JobRecord::pending(
            JobId::from("job-1"),
            JobParams::Analysis(AnalysisParams::default()),
            "queued",
        );

        assert_eq!(rec.family, JobFamily::Analysis);
        assert_eq!(rec.status, JobStatus::Pending);
        assert_eq!(rec.progress, 0.0);
        assert!(rec.completed_at.is_none());
        assert!(rec.result.is_none() && rec.error.is_none());
    }

    #[test]
    fn serde_keeps_optional_fields_out() {
        let rec = JobRecord::pending(
            JobId::from("job-1"),
            JobParams::Analysis(AnalysisParams::default()),
            "queued",
        );

        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("error"));
        assert!(!json.contains("completedAt"));

        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, rec.id);
        assert_eq!(back.params, rec.params);
        assert_eq!(back.status, JobStatus::Pending);
    }
}
