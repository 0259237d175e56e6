//! Job lifecycle events and their fan-out to subscribers.

use std::{sync::Arc, time::SystemTime};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;
use vane_model::{JobFamily, JobId, Progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // submission
    JobSubmitted,
    JobRejected,

    // lifecycle
    JobStarted,
    StageEntered,
    StageSkipped,
    ItemFailed,
    BatchFinished,
    StopRequested,

    // terminal
    JobCompleted,
    JobFailed,
    JobCancelled,

    // results
    PersistFailed,
}

/// One observable thing that happened to a job.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub kind: EventKind,
    pub job: JobId,
    pub family: JobFamily,
    pub at: SystemTime,
    pub stage: Option<String>,
    pub reason: Option<String>,
    pub progress: Option<Progress>,
}

impl JobEvent {
    pub fn new(kind: EventKind, job: JobId, family: JobFamily) -> Self {
        Self {
            kind,
            job,
            family,
            at: SystemTime::now(),
            stage: None,
            reason: None,
            progress: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Receives job events on a dedicated worker.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &JobEvent);

    fn name(&self) -> &'static str;

    /// Bounded queue length; events beyond it are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

/// Non-blocking fan-out of events to every subscriber.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<Vec<Sink>>,
}

struct Sink {
    name: &'static str,
    tx: mpsc::Sender<Arc<JobEvent>>,
}

impl EventBus {
    /// Spawn one worker per subscriber. Must be called inside a Tokio runtime
    /// when `subscribers` is non-empty.
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let sinks = subscribers
            .into_iter()
            .map(|sub| {
                let (tx, mut rx) = mpsc::channel::<Arc<JobEvent>>(sub.queue_capacity().max(1));
                let name = sub.name();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        sub.on_event(&event).await;
                    }
                });
                Sink { name, tx }
            })
            .collect();

        Self {
            sinks: Arc::new(sinks),
        }
    }

    pub fn publish(&self, event: JobEvent) {
        if self.sinks.is_empty() {
            return;
        }

        let event = Arc::new(event);
        for sink in self.sinks.iter() {
            if let Err(e) = sink.tx.try_send(event.clone()) {
                warn!(subscriber = sink.name, kind = ?event.kind, error = %e, "event dropped");
            }
        }
    }
}
