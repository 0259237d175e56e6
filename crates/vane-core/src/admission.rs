use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use vane_model::{JobId, JobRecord};

use crate::{cancel::CancelToken, handles::HandleRegistry, state::JobRegistry};

/// Decision taken for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission<T> {
    /// Record and handles registered; carries what `prepare` produced. The
    /// caller must start the worker.
    New(T),
    /// Singleton family already has an active job with this id.
    Existing(JobId),
}

/// Serializes check-then-register for singleton families.
///
/// Holding the gate across the active-job lookup, preparation, record creation
/// and handle registration means two concurrent submissions can never both
/// start, and a rejected duplicate never reaches `prepare`.
#[derive(Clone, Default)]
pub struct AdmissionController {
    gate: Arc<Mutex<()>>,
}

impl AdmissionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `record`, running `prepare` only once the job is known to start.
    ///
    /// If `prepare` fails nothing is registered.
    pub fn admit<T, E>(
        &self,
        registry: &JobRegistry,
        handles: &HandleRegistry,
        record: JobRecord,
        token: CancelToken,
        prepare: impl FnOnce() -> Result<T, E>,
    ) -> Result<Admission<T>, E> {
        if !record.family.is_singleton() {
            return Self::register(registry, handles, record, token, prepare);
        }

        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = registry.find_active(record.family) {
            debug!(family = %record.family, job = %active.id, "singleton already active");
            return Ok(Admission::Existing(active.id));
        }
        Self::register(registry, handles, record, token, prepare)
    }

    fn register<T, E>(
        registry: &JobRegistry,
        handles: &HandleRegistry,
        record: JobRecord,
        token: CancelToken,
        prepare: impl FnOnce() -> Result<T, E>,
    ) -> Result<Admission<T>, E> {
        let prepared = prepare()?;
        let id = record.id.clone();
        registry.create(record);
        handles.insert(id, token);
        Ok(Admission::New(prepared))
    }
}
