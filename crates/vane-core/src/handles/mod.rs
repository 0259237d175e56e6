use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::task::JoinHandle;
use vane_model::JobId;

use crate::cancel::CancelToken;

/// Live control handles of a running job.
struct JobHandle {
    token: CancelToken,
    join: Option<JoinHandle<()>>,
}

/// Per-job cancel tokens and worker handles.
///
/// An entry exists exactly while the job's worker is alive; it is removed by
/// the worker itself on every exit path through [`HandleRelease`].
#[derive(Clone, Default)]
pub struct HandleRegistry {
    inner: Arc<Mutex<HashMap<JobId, JobHandle>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a token for a job about to start. Returns `false` if one exists.
    pub fn insert(&self, id: JobId, token: CancelToken) -> bool {
        let mut map = self.lock();
        if map.contains_key(&id) {
            return false;
        }
        map.insert(id, JobHandle { token, join: None });
        true
    }

    /// Attach the worker handle. Ignored if the worker already released its entry.
    pub fn attach(&self, id: &JobId, join: JoinHandle<()>) -> bool {
        match self.lock().get_mut(id) {
            Some(handle) => {
                handle.join = Some(join);
                true
            }
            None => false,
        }
    }

    /// Request cancellation. Returns `true` if the job was tracked.
    pub fn cancel(&self, id: &JobId) -> bool {
        match self.lock().get(id) {
            Some(handle) => {
                handle.token.request();
                true
            }
            None => false,
        }
    }

    /// Ids of every tracked job.
    pub fn ids(&self) -> Vec<JobId> {
        self.lock().keys().cloned().collect()
    }

    /// Drop the entry of a job, handing back its worker handle if attached.
    pub fn release(&self, id: &JobId) -> Option<JoinHandle<()>> {
        self.lock().remove(id).and_then(|handle| handle.join)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Guard that releases `id` when dropped, including on panic unwind.
    pub fn release_on_drop(&self, id: JobId) -> HandleRelease {
        HandleRelease {
            registry: self.clone(),
            id,
        }
    }
}

/// Releases a job's handles when dropped.
pub struct HandleRelease {
    registry: HandleRegistry,
    id: JobId,
}

impl Drop for HandleRelease {
    fn drop(&mut self) {
        // dropping the handle detaches; the worker is the one running this guard
        let _ = self.registry.release(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_cancel_release() {
        let reg = HandleRegistry::new();
        let id = JobId::from("job-1");
        let token = CancelToken::new();

        assert!(reg.insert(id.clone(), token.clone()));
        assert!(!reg.insert(id.clone(), CancelToken::new()));
        assert!(reg.cancel(&id));
        assert!(token.is_requested());

        reg.release(&id);
        assert!(!reg.contains(&id));
        assert!(!reg.cancel(&id));
    }

    #[test]
    fn guard_releases_on_drop() {
        let reg = HandleRegistry::new();
        let id = JobId::from("job-1");
        reg.insert(id.clone(), CancelToken::new());

        {
            let _guard = reg.release_on_drop(id.clone());
            assert!(reg.contains(&id));
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn ids_lists_tracked_jobs() {
        let reg = HandleRegistry::new();
        reg.insert(JobId::from("a"), CancelToken::new());
        reg.insert(JobId::from("b"), CancelToken::new());
        reg.release(&JobId::from("a"));

        assert_eq!(reg.ids(), vec![JobId::from("b")]);
    }

    #[tokio::test]
    async fn attach_after_release_is_ignored() {
        let reg = HandleRegistry::new();
        let id = JobId::from("job-1");
        reg.insert(id.clone(), CancelToken::new());
        reg.release(&id);

        let join = tokio::spawn(async {});
        assert!(!reg.attach(&id, join));
        assert!(reg.is_empty());
    }
}
