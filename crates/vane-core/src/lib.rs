//! Background job orchestration: registry, cooperative cancellation, staged
//! pipelines with batch isolation, singleton admission and result storage.

pub mod admission;
pub mod cancel;
pub mod config;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod pipeline;
pub mod results;
pub mod router;
pub mod runner;
pub mod state;
pub mod subscriber;
pub mod supervisor;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use error::{CoreError, StageError, StoreError};
pub use metrics::{JobOutcome, MetricsBackend, MetricsHandle, NoopMetrics};
pub use pipeline::{
    BatchReport, BatchSummary, Completion, JobContext, JobPipeline, Pipeline, PipelineOutcome,
    Stage, StageContext, StageSpec,
};
pub use results::ResultStore;
pub use router::PipelineRouter;
pub use runner::{BuildContext, Runner, RunnerError};
pub use state::JobRegistry;
pub use subscriber::{EventBus, EventKind, JobEvent, Subscribe};
pub use supervisor::{JobSupervisor, SupervisorBuilder};
