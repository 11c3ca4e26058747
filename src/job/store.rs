//! Durable job state behind a trait.
//!
//! The scheduler only ever writes through per-unit patches, never whole-job
//! read-modify-write, so concurrent ticks touching different units of the
//! same job cannot clobber each other. [`InMemoryJobStore`] keeps an arena of
//! per-job records for single-process use and tests; a database-backed
//! implementation would map `update_unit` to an atomic JSON path update.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::record::{JobStatus, TranslationJob, UnitPatch, UnitStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("unit {index} not found in job {job_id}")]
    UnitNotFound { job_id: String, index: usize },

    #[error("store backend error: {0}")]
    Backend(String),
}

pub trait JobStore: Send + Sync {
    fn insert_job(&self, job: TranslationJob) -> Result<(), StoreError>;

    fn get_job(&self, job_id: &str) -> Result<Option<TranslationJob>, StoreError>;

    /// Apply a partial update to one unit. Fields absent from the patch are
    /// left untouched. A stale patch that would revert a `Translated` unit to
    /// an earlier status, or demote a claimed `Processing` unit back to an
    /// attemptable one, is dropped; `reset_unit` is the sanctioned path back.
    fn update_unit(
        &self,
        job_id: &str,
        unit_index: usize,
        patch: UnitPatch,
    ) -> Result<(), StoreError>;

    fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<(), StoreError>;

    /// Atomically move a candidate unit to `Processing`, so a concurrently
    /// running tick skips it. Returns `false` when the unit is not claimable
    /// (already processing or translated, or still inside backoff).
    fn claim_unit(
        &self,
        job_id: &str,
        unit_index: usize,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Force a unit back to `Pending`, clearing backoff and last error.
    /// With `clear_results`, prior translations and model are dropped too.
    fn reset_unit(
        &self,
        job_id: &str,
        unit_index: usize,
        clear_results: bool,
    ) -> Result<(), StoreError>;
}

/// Mutex-guarded arena of job records.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, TranslationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_unit<R>(
        &self,
        job_id: &str,
        unit_index: usize,
        f: impl FnOnce(&mut TranslationJob, usize) -> R,
    ) -> Result<R, StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Backend("job store lock poisoned".into()))?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if unit_index >= job.units.len() {
            return Err(StoreError::UnitNotFound {
                job_id: job_id.to_string(),
                index: unit_index,
            });
        }
        Ok(f(job, unit_index))
    }
}

impl JobStore for InMemoryJobStore {
    fn insert_job(&self, job: TranslationJob) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Backend("job store lock poisoned".into()))?;
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<TranslationJob>, StoreError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Backend("job store lock poisoned".into()))?;
        Ok(jobs.get(job_id).cloned())
    }

    fn update_unit(
        &self,
        job_id: &str,
        unit_index: usize,
        patch: UnitPatch,
    ) -> Result<(), StoreError> {
        self.with_unit(job_id, unit_index, |job, index| {
            let unit = &mut job.units[index];

            // Stale-write guards: a translated unit only leaves that status
            // through reset_unit, and a claimed unit cannot be demoted back
            // to an attemptable status (that would let a second tick win a
            // claim on a unit already dispatched).
            if unit.status == UnitStatus::Translated
                && matches!(patch.status, Some(s) if s != UnitStatus::Translated)
            {
                return;
            }
            if unit.status == UnitStatus::Processing
                && matches!(patch.status, Some(UnitStatus::Pending | UnitStatus::Queued))
            {
                return;
            }

            if let Some(status) = patch.status {
                unit.status = status;
            }
            if let Some(translations) = patch.translations {
                unit.translations = translations;
            }
            if let Some(model) = patch.model_used {
                unit.model_used = Some(model);
            }
            if let Some(retry_count) = patch.retry_count {
                unit.retry_count = retry_count;
            }
            if let Some(backoff_until) = patch.backoff_until {
                unit.backoff_until = backoff_until;
            }
            if let Some(last_error) = patch.last_error {
                unit.last_error = last_error;
            }
            let now = Utc::now();
            unit.updated_at = now;
            job.updated_at = now;
        })
    }

    fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Backend("job store lock poisoned".into()))?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.status = status;
        job.updated_at = Utc::now();
        Ok(())
    }

    fn claim_unit(
        &self,
        job_id: &str,
        unit_index: usize,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.with_unit(job_id, unit_index, |job, index| {
            let unit = &mut job.units[index];
            if !unit.is_candidate(now) {
                return false;
            }
            unit.status = UnitStatus::Processing;
            unit.updated_at = now;
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Processing;
            }
            job.updated_at = now;
            true
        })
    }

    fn reset_unit(
        &self,
        job_id: &str,
        unit_index: usize,
        clear_results: bool,
    ) -> Result<(), StoreError> {
        self.with_unit(job_id, unit_index, |job, index| {
            let unit = &mut job.units[index];
            unit.status = UnitStatus::Pending;
            unit.backoff_until = None;
            unit.last_error = None;
            if clear_results {
                unit.translations.clear();
                unit.model_used = None;
            }
            let now = Utc::now();
            unit.updated_at = now;
            job.updated_at = now;
        })
    }
}
