use crate::{JobFamily, JobStatus};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query parameters for listing jobs with filtering and pagination.
#[derive(Debug, Clone)]
pub struct JobQuery {
    pub family: Option<JobFamily>,
    pub status: Option<JobStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// Result of a paginated job query.
#[derive(Debug, Clone)]
pub struct JobPage<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl JobQuery {
    pub fn new() -> Self {
        Self {
            family: None,
            status: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_family(mut self, family: JobFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for JobQuery {
    fn default() -> Self {
        Self::new()
    }
}
