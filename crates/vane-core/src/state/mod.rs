use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use serde_json::Value;
use vane_model::{
    JobFamily, JobId, JobPage, JobQuery, JobRecord, JobStatus, Progress, RUNNING_PROGRESS_CEILING,
};

/// Default number of finished records kept per family.
pub const DEFAULT_RETAIN_FINISHED: usize = 200;

/// Terminal transition applied by [`JobRegistry::finalize`].
#[derive(Debug, Clone)]
pub enum Terminal {
    Completed { result: Value, message: String },
    Failed { error: String, message: String },
    Cancelled,
}

impl Terminal {
    pub fn status(&self) -> JobStatus {
        match self {
            Terminal::Completed { .. } => JobStatus::Completed,
            Terminal::Failed { .. } => JobStatus::Failed,
            Terminal::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// In-memory job state storage, namespaced by family.
///
/// Readers (status polls) and the single executor owning each id share one lock
/// that protects the map structure; per-id writes never overlap.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    retain_finished: usize,
}

struct RegistryInner {
    /// Records indexed by id.
    jobs: HashMap<JobId, JobRecord>,
    /// Index: family -> ids in submission order.
    by_family: HashMap<JobFamily, Vec<JobId>>,
    /// Snapshot of the most recently completed record per family.
    last_completed: HashMap<JobFamily, JobRecord>,
}

impl JobRegistry {
    /// Create empty registry.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAIN_FINISHED)
    }

    /// Create empty registry keeping at most `retain_finished` terminal records per family.
    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                jobs: HashMap::new(),
                by_family: HashMap::new(),
                last_completed: HashMap::new(),
            })),
            retain_finished: retain_finished.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly submitted record. Returns `false` if the id is taken.
    pub fn create(&self, record: JobRecord) -> bool {
        let mut inner = self.write();
        if inner.jobs.contains_key(&record.id) {
            return false;
        }

        let id = record.id.clone();
        let family = record.family;
        inner.jobs.insert(id.clone(), record);
        inner.by_family.entry(family).or_default().push(id);
        true
    }

    /// Move `Pending -> Running`.
    pub fn mark_running(&self, id: &JobId, message: &str) -> bool {
        let mut inner = self.write();
        match inner.jobs.get_mut(id) {
            Some(rec) if rec.status.can_transition_to(JobStatus::Running) => {
                rec.status = JobStatus::Running;
                rec.message = message.to_string();
                rec.updated_at = SystemTime::now();
                true
            }
            _ => false,
        }
    }

    /// Report progress of a running job.
    ///
    /// Unknown or non-running ids are ignored. Progress never decreases and stays
    /// below `1.0` until completion; the message is always overwritten.
    pub fn update_progress(&self, id: &JobId, progress: Progress, message: &str) -> bool {
        let mut inner = self.write();
        let Some(rec) = inner.jobs.get_mut(id) else {
            return false;
        };
        if rec.status != JobStatus::Running {
            return false;
        }

        if progress.is_finite() {
            let clamped = progress.clamp(0.0, RUNNING_PROGRESS_CEILING);
            if clamped > rec.progress {
                rec.progress = clamped;
            }
        }
        rec.message = message.to_string();
        rec.updated_at = SystemTime::now();
        true
    }

    /// Apply a terminal transition exactly once.
    ///
    /// Returns the finalized record, or `None` if the id is unknown or the
    /// job is not `Running`.
    pub fn finalize(&self, id: &JobId, terminal: Terminal) -> Option<JobRecord> {
        self.finalize_with(id, terminal, |_| {})
    }

    /// Like [`finalize`](Self::finalize), but runs `then` on the finalized
    /// record before the registry lock is released.
    ///
    /// Readers never observe the terminal state without whatever `then`
    /// installed. `then` must not call back into the registry.
    pub fn finalize_with(
        &self,
        id: &JobId,
        terminal: Terminal,
        then: impl FnOnce(&JobRecord),
    ) -> Option<JobRecord> {
        let mut inner = self.write();
        let rec = inner.jobs.get_mut(id)?;
        if !rec.status.can_transition_to(terminal.status()) {
            return None;
        }

        let now = SystemTime::now();
        rec.status = terminal.status();
        rec.updated_at = now;
        rec.completed_at = Some(now);
        match terminal {
            Terminal::Completed { result, message } => {
                rec.progress = 1.0;
                rec.message = message;
                rec.result = Some(result);
            }
            Terminal::Failed { error, message } => {
                rec.message = message;
                rec.error = Some(error);
            }
            // progress and message stay frozen at their last values
            Terminal::Cancelled => {}
        }

        let snapshot = rec.clone();
        if snapshot.status == JobStatus::Completed {
            inner.last_completed.insert(snapshot.family, snapshot.clone());
        }
        inner.evict_finished(snapshot.family, self.retain_finished);
        then(&snapshot);
        Some(snapshot)
    }

    /// Get record by id.
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.read().jobs.get(id).cloned()
    }

    /// Most recently completed record of a family.
    pub fn last_completed(&self, family: JobFamily) -> Option<JobRecord> {
        self.read().last_completed.get(&family).cloned()
    }

    /// First non-terminal record of a family, in submission order.
    pub fn find_active(&self, family: JobFamily) -> Option<JobRecord> {
        let inner = self.read();
        inner
            .by_family
            .get(&family)?
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .find(|rec| rec.status.is_active())
            .cloned()
    }

    /// List all records of a family in submission order.
    pub fn list_by_family(&self, family: JobFamily) -> Vec<JobRecord> {
        let inner = self.read();

        inner
            .by_family
            .get(&family)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.jobs.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of every record.
    pub fn list_all(&self) -> Vec<JobRecord> {
        let inner = self.read();
        JobFamily::ALL
            .iter()
            .filter_map(|family| inner.by_family.get(family))
            .flatten()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Query records with combined filters and pagination.
    ///
    /// `total` reflects the count after filtering, before pagination.
    pub fn query(&self, q: &JobQuery) -> JobPage<JobRecord> {
        let inner = self.read();

        let families: &[JobFamily] = match &q.family {
            Some(family) => std::slice::from_ref(family),
            None => &JobFamily::ALL,
        };

        let filtered: Vec<&JobRecord> = families
            .iter()
            .filter_map(|family| inner.by_family.get(family))
            .flatten()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|rec| q.status.is_none_or(|status| rec.status == status))
            .collect();
        let total = filtered.len();

        let items = filtered
            .into_iter()
            .skip(q.offset)
            .take(q.limit)
            .cloned()
            .collect();

        JobPage { items, total }
    }

    /// Drop every terminal record of a family. Active jobs and the
    /// last-completed snapshot are kept. Returns the number removed.
    pub fn clear(&self, family: JobFamily) -> usize {
        let mut inner = self.write();
        inner.evict_finished(family, 0)
    }
}

impl RegistryInner {
    /// Evict oldest terminal records of `family` beyond `keep`.
    fn evict_finished(&mut self, family: JobFamily, keep: usize) -> usize {
        let Some(ids) = self.by_family.get(&family) else {
            return 0;
        };

        let finished: Vec<JobId> = ids
            .iter()
            .filter(|id| self.jobs.get(*id).is_some_and(JobRecord::is_terminal))
            .cloned()
            .collect();
        if finished.len() <= keep {
            return 0;
        }

        let doomed = &finished[..finished.len() - keep];
        for id in doomed {
            self.jobs.remove(id);
        }
        if let Some(ids) = self.by_family.get_mut(&family) {
            ids.retain(|id| !doomed.contains(id));
        }
        doomed.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
