use tokio_util::sync::CancellationToken;

/// Cooperative stop flag shared by a job's controller and its worker.
///
/// Requesting is idempotent and never reverts. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop at its next check point.
    pub fn request(&self) {
        self.inner.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once a stop has been requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}
