//! Prometheus metrics backend for the vane job engine.
//!
//! [`PrometheusMetrics`] implements [`vane_core::MetricsBackend`] and owns its
//! own [`Registry`], or registers into one supplied by the host.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use vane_core::{EngineConfig, JobSupervisor};
//! use vane_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let supervisor = JobSupervisor::builder(EngineConfig::default())
//!     .with_metrics(Arc::new(metrics.clone()))
//!     .build();
//!
//! // serve `metrics.render()?` from the host's /metrics route
//! # drop(supervisor);
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `vane_jobs_submitted_total{family}` - Counter
//! - `vane_jobs_rejected_total{family}` - Counter
//! - `vane_jobs_finished_total{family, outcome}` - Counter
//! - `vane_job_duration_seconds{family}` - Histogram
//! - `vane_batch_item_failures_total{family, stage}` - Counter

mod backend;
pub use backend::{MetricsError, PrometheusMetrics};

pub use prometheus::{Encoder, Registry, TextEncoder};
