use std::{env, path::PathBuf, time::Duration};

use vane_model::JobFamily;

use crate::state::DEFAULT_RETAIN_FINISHED;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the durable per-family result files.
    pub results_dir: PathBuf,
    /// Terminal records kept per family before the oldest are evicted.
    pub retain_finished: usize,
    /// Poll period used by `wait_terminal`.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("./data"),
            retain_finished: DEFAULT_RETAIN_FINISHED,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `VANE_RESULTS_DIR` and `VANE_RETAIN_FINISHED`.
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = env::var("VANE_RESULTS_DIR")
            && !dir.trim().is_empty()
        {
            cfg.results_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var("VANE_RETAIN_FINISHED")
            && let Ok(n) = raw.trim().parse::<usize>()
        {
            cfg.retain_finished = n;
        }
        cfg
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_retain_finished(mut self, n: usize) -> Self {
        self.retain_finished = n;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Durable result file of a family.
    pub fn result_file(&self, family: JobFamily) -> PathBuf {
        self.results_dir.join(result_file_name(family))
    }
}

pub fn result_file_name(family: JobFamily) -> &'static str {
    match family {
        JobFamily::Analysis => "ranking.json",
        JobFamily::ConceptCollection => "concepts.json",
        JobFamily::ExtendedAnalysis => "extended_analysis_results.json",
    }
}
