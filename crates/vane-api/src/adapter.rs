use std::sync::Arc;

use async_trait::async_trait;
use vane_core::JobSupervisor;
use vane_model::{JobFamily, JobId, JobPage, JobParams, JobQuery, JobRecord, StoredResult, SubmitOutcome};

use crate::error::ApiError;
use crate::handler::ApiHandler;

/// Adapter that bridges [`JobSupervisor`] to [`ApiHandler`].
pub struct SupervisorApiAdapter {
    supervisor: Arc<JobSupervisor>,
}

impl SupervisorApiAdapter {
    pub fn new(supervisor: Arc<JobSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl ApiHandler for SupervisorApiAdapter {
    async fn submit_job(&self, params: JobParams) -> Result<SubmitOutcome, ApiError> {
        self.supervisor.submit(params).map_err(ApiError::from)
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<JobRecord>, ApiError> {
        Ok(self.supervisor.status(id))
    }

    async fn list_jobs(&self, query: JobQuery) -> Result<JobPage<JobRecord>, ApiError> {
        Ok(self.supervisor.list(&query))
    }

    async fn stop_job(&self, id: &JobId) -> Result<bool, ApiError> {
        Ok(self.supervisor.stop(id))
    }

    async fn last_completed(&self, family: JobFamily) -> Result<Option<JobRecord>, ApiError> {
        Ok(self.supervisor.last_completed(family))
    }

    async fn latest_result(&self, family: JobFamily) -> Result<Option<StoredResult>, ApiError> {
        Ok(self.supervisor.latest_result(family).await?)
    }
}
