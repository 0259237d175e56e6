use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;

use crate::{JobFamily, JobId, JobParams, JobRecord};

/// Reply to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub job_id: JobId,
    /// `true` when a singleton family already had an active job and its id was returned instead.
    #[serde(default)]
    pub already_running: bool,
}

impl SubmitOutcome {
    pub fn started(job_id: JobId) -> Self {
        Self {
            job_id,
            already_running: false,
        }
    }

    pub fn existing(job_id: JobId) -> Self {
        Self {
            job_id,
            already_running: true,
        }
    }
}

/// Completed job result as kept in memory and written to the family result file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub job_id: JobId,
    pub family: JobFamily,
    pub message: String,
    pub params: JobParams,
    #[serde(with = "crate::domain::time_serde")]
    pub created_at: SystemTime,
    #[serde(with = "crate::domain::time_serde")]
    pub completed_at: SystemTime,
    pub payload: Value,
    /// Set by the reader when served from the durable file rather than memory.
    #[serde(default)]
    pub from_cache: bool,
}

impl StoredResult {
    /// Builds the stored form of a completed record; `None` for any other state.
    pub fn from_record(record: &JobRecord) -> Option<Self> {
        let payload = record.result.clone()?;
        Some(Self {
            job_id: record.id.clone(),
            family: record.family,
            message: record.message.clone(),
            params: record.params.clone(),
            created_at: record.created_at,
            completed_at: record.completed_at?,
            payload,
            from_cache: false,
        })
    }
}
