//! In-memory result cache mirrored to one durable file per family.

mod file;

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Mutex as AsyncMutex;

use serde_json::Value;
use tracing::{debug, trace};
use vane_model::{JobFamily, JobId, StoredResult};

use crate::{
    config::{EngineConfig, result_file_name},
    error::StoreError,
    state::DEFAULT_RETAIN_FINISHED,
};

#[derive(Default)]
struct ResultCache {
    by_job: HashMap<JobId, StoredResult>,
    /// Cached job ids per family, oldest first.
    order: HashMap<JobFamily, VecDeque<JobId>>,
    latest: HashMap<JobFamily, JobId>,
    /// Derived data computed from a family's latest result.
    views: HashMap<JobFamily, Value>,
    /// Cache order of results not yet handed to `persist`.
    unwritten: HashMap<JobId, u64>,
    seq: u64,
}

impl ResultCache {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// Completed results by job id and by family.
///
/// Guarded by its own mutex; critical sections are map operations only, file
/// I/O always runs outside the lock. Writes to one family file are serialized
/// by a per-family async lock, and a write older than the one already on disk
/// is dropped.
#[derive(Clone)]
pub struct ResultStore {
    inner: Arc<Mutex<ResultCache>>,
    /// Per family: sequence of the result currently on disk.
    writers: Arc<Mutex<HashMap<JobFamily, Arc<AsyncMutex<u64>>>>>,
    dir: PathBuf,
    retain: usize,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResultCache::default())),
            writers: Arc::new(Mutex::new(HashMap::new())),
            dir: dir.into(),
            retain: DEFAULT_RETAIN_FINISHED,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        let mut store = Self::new(cfg.results_dir.clone());
        store.retain = cfg.retain_finished.max(1);
        store
    }

    fn lock(&self) -> MutexGuard<'_, ResultCache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn file_path(&self, family: JobFamily) -> PathBuf {
        self.dir.join(result_file_name(family))
    }

    fn writer(&self, family: JobFamily) -> Arc<AsyncMutex<u64>> {
        self.writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(family)
            .or_default()
            .clone()
    }

    /// Sequence assigned when `id` was cached, or a fresh one.
    fn write_seq(&self, id: &JobId) -> u64 {
        let mut cache = self.lock();
        match cache.unwritten.remove(id) {
            Some(seq) => seq,
            None => cache.next_seq(),
        }
    }

    /// Store a completed result and make it the family's latest.
    pub fn cache(&self, result: StoredResult) {
        let mut cache = self.lock();
        let family = result.family;
        let id = result.job_id.clone();
        let seq = cache.next_seq();
        cache.unwritten.insert(id.clone(), seq);

        let order = cache.order.entry(family).or_default();
        order.push_back(id.clone());
        let mut evicted = Vec::new();
        while order.len() > self.retain {
            if let Some(old) = order.pop_front() {
                evicted.push(old);
            }
        }
        for old in evicted {
            cache.by_job.remove(&old);
        }

        cache.latest.insert(family, id.clone());
        cache.by_job.insert(id, result);
    }

    /// Overwrite the family file with `result`.
    ///
    /// Results are ordered by when they were cached (or by call order when
    /// never cached). If a later result already reached the file this is a
    /// no-op.
    pub async fn persist(&self, result: &StoredResult) -> Result<PathBuf, StoreError> {
        let path = self.file_path(result.family);
        let seq = self.write_seq(&result.job_id);

        let writer = self.writer(result.family);
        let mut on_disk = writer.lock().await;
        if *on_disk > seq {
            debug!(family = %result.family, job = %result.job_id, "newer result already persisted");
            return Ok(path);
        }
        file::write_json(&path, result).await?;
        *on_disk = seq;
        trace!(family = %result.family, path = %path.display(), "result persisted");
        Ok(path)
    }

    /// Result of a specific job, if still cached.
    pub fn get(&self, id: &JobId) -> Option<StoredResult> {
        self.lock().by_job.get(id).cloned()
    }

    /// Latest in-memory result of a family.
    pub fn latest_cached(&self, family: JobFamily) -> Option<StoredResult> {
        let cache = self.lock();
        let id = cache.latest.get(&family)?;
        cache.by_job.get(id).cloned()
    }

    /// Latest result of a family: memory first, then the durable file
    /// (returned with `from_cache = true`).
    pub async fn latest(&self, family: JobFamily) -> Result<Option<StoredResult>, StoreError> {
        if let Some(hit) = self.latest_cached(family) {
            return Ok(Some(hit));
        }

        let loaded: Option<StoredResult> = file::read_json(&self.file_path(family)).await?;
        Ok(loaded.map(|mut r| {
            r.from_cache = true;
            r
        }))
    }

    pub fn put_view(&self, family: JobFamily, view: Value) {
        self.lock().views.insert(family, view);
    }

    pub fn view(&self, family: JobFamily) -> Option<Value> {
        self.lock().views.get(&family).cloned()
    }

    pub fn invalidate(&self, family: JobFamily) -> bool {
        self.lock().views.remove(&family).is_some()
    }

    /// Drop derived views of every family depending on `family`.
    pub fn invalidate_dependents(&self, family: JobFamily) {
        let mut cache = self.lock();
        for dep in family.dependents() {
            if cache.views.remove(dep).is_some() {
                debug!(source = %family, family = %dep, "derived view invalidated");
            }
        }
    }
}
