use std::borrow::Borrow;

use tracing::{debug, error, info, trace, warn};
use vane_core::{EventKind, JobEvent};

/// Read-only accessors over a [`JobEvent`] with log-friendly fallbacks.
pub trait View {
    fn as_job(&self) -> &str;
    fn as_family(&self) -> &'static str;
    fn as_stage(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn progress(&self) -> f64;
    fn kind(&self) -> EventKind;
}

impl<T> View for T
where
    T: Borrow<JobEvent>,
{
    #[inline]
    fn as_job(&self) -> &str {
        self.borrow().job.as_str()
    }
    #[inline]
    fn as_family(&self) -> &'static str {
        self.borrow().family.as_str()
    }
    #[inline]
    fn as_stage(&self) -> &str {
        self.borrow().stage.as_deref().unwrap_or("-")
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn progress(&self) -> f64 {
        self.borrow().progress.unwrap_or(0.0)
    }
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // submission
        EventKind::JobSubmitted => "job submitted",
        EventKind::JobRejected => "submission joined an already running job",

        // lifecycle
        EventKind::JobStarted => "job started",
        EventKind::StageEntered => "stage entered",
        EventKind::StageSkipped => "stage skipped",
        EventKind::ItemFailed => "batch item failed; continuing with the rest",
        EventKind::BatchFinished => "batch finished",
        EventKind::StopRequested => "stop requested",

        // terminal
        EventKind::JobCompleted => "job completed",
        EventKind::JobFailed => "job failed",
        EventKind::JobCancelled => "job cancelled",

        // results
        EventKind::PersistFailed => "result could not be persisted; kept in memory only",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        // submission
        EventKind::JobSubmitted => info!(job = e.as_job(), family = e.as_family(), "{msg}"),
        EventKind::JobRejected => debug!(job = e.as_job(), family = e.as_family(), "{msg}"),

        // lifecycle
        EventKind::JobStarted => debug!(job = e.as_job(), family = e.as_family(), "{msg}"),
        EventKind::StageEntered => trace!(
            job = e.as_job(),
            stage = e.as_stage(),
            progress = e.progress(),
            "{msg}"
        ),
        EventKind::StageSkipped => debug!(
            job = e.as_job(),
            stage = e.as_stage(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::ItemFailed => warn!(
            job = e.as_job(),
            stage = e.as_stage(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::BatchFinished => debug!(
            job = e.as_job(),
            stage = e.as_stage(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::StopRequested => info!(job = e.as_job(), family = e.as_family(), "{msg}"),

        // terminal
        EventKind::JobCompleted => info!(job = e.as_job(), family = e.as_family(), "{msg}"),
        EventKind::JobFailed => error!(
            job = e.as_job(),
            family = e.as_family(),
            stage = e.as_stage(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::JobCancelled => info!(
            job = e.as_job(),
            family = e.as_family(),
            progress = e.progress(),
            "{msg}"
        ),

        // results
        EventKind::PersistFailed => {
            error!(job = e.as_job(), family = e.as_family(), reason = e.as_reason(), "{msg}")
        }
    }
}
