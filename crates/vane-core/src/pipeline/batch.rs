use std::{fmt::Display, future::Future};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{error::StageError, pipeline::StageContext, subscriber::EventKind};

/// Outcome counters of one batch stage, as embedded in result payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub stage: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Batch outcome plus the outputs of successful items, in input order.
#[derive(Debug)]
pub struct BatchReport<R> {
    pub summary: BatchSummary,
    pub outputs: Vec<R>,
}

impl<R> BatchReport<R> {
    pub fn succeeded(&self) -> usize {
        self.summary.succeeded
    }

    pub fn failed(&self) -> usize {
        self.summary.failed
    }

    pub fn cancelled(&self) -> bool {
        self.summary.cancelled
    }
}

impl StageContext<'_> {
    /// Run `work` over every item with per-item failure isolation.
    ///
    /// A failed item is logged and counted; iteration continues. Progress moves
    /// linearly with items processed. A stop request is observed between items,
    /// after which the remaining items are left untouched. Fails only when every
    /// item of a non-empty batch failed.
    pub async fn for_each<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        mut work: F,
    ) -> Result<BatchReport<R>, StageError>
    where
        T: Display + Send,
        R: Send,
        F: FnMut(T) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<R>> + Send,
    {
        let stage = self.spec().name;
        let job = self.job();
        let total = items.len();
        let mut summary = BatchSummary {
            stage: stage.to_string(),
            total,
            succeeded: 0,
            failed: 0,
            cancelled: false,
        };
        let mut outputs = Vec::with_capacity(total);

        for (i, item) in items.into_iter().enumerate() {
            if self.is_cancelled() {
                summary.cancelled = true;
                debug!(job = %job.id(), stage, processed = i, total, "batch stopped on request");
                break;
            }

            let label = item.to_string();
            match work(item).await {
                Ok(out) => {
                    summary.succeeded += 1;
                    outputs.push(out);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(job = %job.id(), stage, item = %label, error = %e, "batch item failed");
                    job.metrics.item_failed(job.family(), stage);
                    job.publish(
                        job.event(EventKind::ItemFailed)
                            .with_stage(stage)
                            .with_reason(format!("{label}: {e:#}")),
                    );
                }
            }

            let done = i + 1;
            self.report(
                done as f64 / total as f64,
                &format!(
                    "{}: {done}/{total} (failed {})",
                    self.spec().description,
                    summary.failed
                ),
            );
        }

        job.publish(
            job.event(EventKind::BatchFinished)
                .with_stage(stage)
                .with_reason(format!(
                    "succeeded={} failed={} total={total}",
                    summary.succeeded, summary.failed
                )),
        );

        if total > 0 && summary.succeeded == 0 && !summary.cancelled {
            return Err(StageError::AllItemsFailed { total });
        }
        Ok(BatchReport { summary, outputs })
    }
}
