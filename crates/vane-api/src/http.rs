use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vane_model::{JobFamily, JobId, JobParams, JobQuery, JobRecord, JobStatus};

use crate::{error::ApiError, handler::ApiHandler};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST /api/v1/jobs - Start a job
    /// - GET /api/v1/jobs - List jobs (filter by query params)
    /// - GET /api/v1/jobs/{id} - Job status
    /// - POST /api/v1/jobs/{id}/stop - Request a stop
    /// - GET /api/v1/families/{family}/last - Last completed job
    /// - GET /api/v1/families/{family}/result - Latest stored result
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/jobs", post(submit_job::<H>).get(list_jobs::<H>))
            .route("/api/v1/jobs/{id}", get(get_job::<H>))
            .route("/api/v1/jobs/{id}/stop", post(stop_job::<H>))
            .route("/api/v1/families/{family}/last", get(last_completed::<H>))
            .route("/api/v1/families/{family}/result", get(latest_result::<H>))
            .with_state(self.handler)
    }
}

#[derive(Debug, Deserialize)]
struct ListJobsParams {
    family: Option<String>,
    status: Option<String>,
    /// default 100, max 1000
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListJobsResponse {
    jobs: Vec<JobRecord>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    accepted: bool,
}

/// POST /api/v1/jobs
///
/// `202 Accepted` for a new job, `200 OK` when a singleton family is already running.
async fn submit_job<H>(
    State(handler): State<Arc<H>>,
    Json(params): Json<JobParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    debug!(family = %params.family(), "submitting job");
    let outcome = handler.submit_job(params).await?;
    let status = if outcome.already_running {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(outcome)))
}

/// GET /api/v1/jobs/{id}
async fn get_job<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let job_id = JobId::from(id);
    match handler.get_job(&job_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::JobNotFound(job_id.to_string())),
    }
}

/// GET /api/v1/jobs?family=analysis&status=running&limit=50&offset=0
async fn list_jobs<H>(
    State(handler): State<Arc<H>>,
    Query(params): Query<ListJobsParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let mut query = JobQuery::new();
    if let Some(family) = params.family {
        query = query.with_family(parse_family(&family)?);
    }
    if let Some(status) = params.status {
        query = query.with_status(parse_status(&status)?);
    }
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }
    if let Some(offset) = params.offset {
        query = query.with_offset(offset);
    }

    let page = handler.list_jobs(query).await?;
    debug!(count = page.items.len(), total = page.total, "jobs listed");
    Ok(Json(ListJobsResponse {
        jobs: page.items,
        total: page.total,
    }))
}

/// POST /api/v1/jobs/{id}/stop
async fn stop_job<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    if id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("job id cannot be empty".into()));
    }
    let job_id = JobId::from(id);
    let accepted = handler.stop_job(&job_id).await?;
    debug!(%job_id, accepted, "stop requested");
    Ok(Json(StopResponse { accepted }))
}

/// GET /api/v1/families/{family}/last
async fn last_completed<H>(
    State(handler): State<Arc<H>>,
    Path(family): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let family = parse_family(&family)?;
    match handler.last_completed(family).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NoResult(family.to_string())),
    }
}

/// GET /api/v1/families/{family}/result
async fn latest_result<H>(
    State(handler): State<Arc<H>>,
    Path(family): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let family = parse_family(&family)?;
    match handler.latest_result(family).await? {
        Some(result) => Ok(Json(result)),
        None => Err(ApiError::NoResult(family.to_string())),
    }
}

fn parse_family(s: &str) -> Result<JobFamily, ApiError> {
    s.parse()
        .map_err(|e: vane_model::ParseFamilyError| ApiError::InvalidRequest(e.to_string()))
}

fn parse_status(s: &str) -> Result<JobStatus, ApiError> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
        _ => Err(ApiError::InvalidRequest(format!(
            "invalid status: '{s}' (valid: pending, running, completed, failed, cancelled)"
        ))),
    }
}
