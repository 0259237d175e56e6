use thiserror::Error;
use vane_model::JobFamily;

use crate::runner::RunnerError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("no runner registered for family: {0}")]
    NoRunner(JobFamily),

    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("result store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of a single pipeline stage.
///
/// Setup failures and fatal stage failures both end the job as `Failed`;
/// cancellation is never reported through this type.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{0}")]
    Setup(String),

    #[error("all {total} items failed")]
    AllItemsFailed { total: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    pub fn setup(msg: impl Into<String>) -> Self {
        StageError::Setup(msg.into())
    }
}

/// Durable result file errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed result file {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
