//! In-flight job registry.
//!
//! Each media unit (and, once submitted, its backend job id) is owned by at
//! most one task per coordinator. Ownership is an RAII [`InFlightClaim`]; a
//! second claim for the same key is refused.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use vigil_models::{JobId, MediaId};

#[derive(Debug, Default)]
struct Owned {
    media: HashSet<MediaId>,
    jobs: HashSet<JobId>,
}

/// Registry of media units and jobs currently owned by a task.
#[derive(Debug, Clone, Default)]
pub struct InFlightJobs {
    inner: Arc<Mutex<Owned>>,
}

impl InFlightJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Owned> {
        // Sets stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `media_id`, or `None` if another task already owns it.
    pub fn claim(&self, media_id: &MediaId) -> Option<InFlightClaim> {
        if !self.lock().media.insert(media_id.clone()) {
            return None;
        }
        Some(InFlightClaim {
            registry: self.clone(),
            media_id: media_id.clone(),
            job_id: None,
        })
    }

    pub fn len(&self) -> usize {
        self.lock().media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.lock().jobs.contains(job_id)
    }
}

/// Ownership of one media unit; released on drop.
#[derive(Debug)]
pub struct InFlightClaim {
    registry: InFlightJobs,
    media_id: MediaId,
    job_id: Option<JobId>,
}

impl InFlightClaim {
    pub fn media_id(&self) -> &MediaId {
        &self.media_id
    }

    /// Bind the backend job id. Returns `false` if another task polls it.
    pub fn bind_job(&mut self, job_id: &JobId) -> bool {
        if self.job_id.as_ref() == Some(job_id) {
            return true;
        }
        if !self.registry.lock().jobs.insert(job_id.clone()) {
            return false;
        }
        if let Some(previous) = self.job_id.replace(job_id.clone()) {
            self.registry.lock().jobs.remove(&previous);
        }
        true
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let mut owned = self.registry.lock();
        owned.media.remove(&self.media_id);
        if let Some(job_id) = &self.job_id {
            owned.jobs.remove(job_id);
        }
    }
}
