//! The tick scheduler: one bounded invocation that advances a job.
//!
//! Each tick selects eligible units (lowest index first), reserves rate-limit
//! budget per unit, persists the `Processing` claim *before* dispatching the
//! external call, runs up to the concurrency bound in parallel, and applies
//! results back through per-unit patches. A unit's repeated failure never
//! blocks its siblings; a tick makes forward progress whenever budget and
//! eligible units both exist, even with a zero time budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::backoff::BackoffConfig;
use crate::error::{TranslaliaError, TranslationFailure};
use crate::job::record::{JobStatus, TranslationJob, UnitPatch, UnitStatus};
use crate::job::store::JobStore;
use crate::notify::Notifier;
use crate::progress::{self, ProgressSummary, ReadyUnit};
use crate::provider::Generator;
use crate::ratelimit::{CounterStore, RateLimiter};
use crate::translator::{UnitContext, UnitTranslator};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on simultaneous generation calls within one tick.
    pub concurrency: usize,
    /// Maximum generation calls per rate window, shared across the subject's
    /// jobs and browser tabs.
    pub rate_limit: u32,
    pub rate_window_secs: i64,
    pub backoff: BackoffConfig,
    /// Per-user key scoping the shared rate-limit counter.
    pub subject: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            rate_limit: 20,
            rate_window_secs: 60,
            backoff: BackoffConfig::default(),
            subject: "anonymous".into(),
        }
    }
}

/// What one tick did, plus the progress projection the client renders.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub job_status: JobStatus,
    pub summary: ProgressSummary,
    /// Units ready to render, regardless of overall job status.
    pub ready: Vec<ReadyUnit>,
    /// True only when the tick made zero progress because the rate budget
    /// was exhausted. Poll again after the window resets.
    pub rate_limited: bool,
    /// Unit indices dispatched by this tick, ascending.
    pub attempted: Vec<usize>,
    /// Subset of `attempted` that reached `Translated`, ascending.
    pub newly_translated: Vec<usize>,
}

pub struct TickScheduler<S, G, C> {
    store: Arc<S>,
    translator: Arc<UnitTranslator<G>>,
    limiter: RateLimiter<C>,
    notifier: Option<Notifier>,
    config: SchedulerConfig,
}

impl<S, G, C> TickScheduler<S, G, C>
where
    S: JobStore,
    G: Generator + 'static,
    C: CounterStore,
{
    pub fn new(
        store: Arc<S>,
        translator: UnitTranslator<G>,
        limiter: RateLimiter<C>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            translator: Arc::new(translator),
            limiter,
            notifier: None,
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run one tick against a job, bounded by an advisory time budget.
    ///
    /// The budget stops new dispatch waves from starting; it never cancels
    /// calls already in flight, and the first wave always runs.
    pub async fn tick(
        &self,
        job_id: &str,
        budget: Duration,
    ) -> Result<TickReport, TranslaliaError> {
        let started = Instant::now();
        let job = self.require_job(job_id)?;
        let mut remaining = candidate_indices(&job, Utc::now());

        if remaining.is_empty() {
            return self.finish(job_id, false, Vec::new(), Vec::new());
        }

        let mut attempted: Vec<usize> = Vec::new();
        let mut newly_translated: Vec<usize> = Vec::new();
        let mut denied = false;

        while !remaining.is_empty() && !denied {
            if !attempted.is_empty() && started.elapsed() >= budget {
                break;
            }

            // Reserve budget one unit at a time; stop at the first denial.
            let wave_size = self.config.concurrency.min(remaining.len());
            let mut reserved = 0usize;
            for _ in 0..wave_size {
                let decision = self
                    .limiter
                    .check_and_reserve(
                        &self.config.subject,
                        self.config.rate_limit,
                        self.config.rate_window_secs,
                    )
                    .await;
                if !decision.allowed {
                    denied = true;
                    break;
                }
                reserved += 1;
            }
            if reserved == 0 {
                break;
            }
            let wave: Vec<usize> = remaining.drain(..reserved).collect();

            // claim_unit is the single atomic candidate -> Processing
            // transition; a concurrently-invoked tick loses the claim and
            // skips the unit.
            let mut dispatch = Vec::new();
            for &index in &wave {
                if self.store.claim_unit(job_id, index, Utc::now())? {
                    dispatch.push(index);
                }
            }

            let mut set = JoinSet::new();
            for index in dispatch {
                let translator = Arc::clone(&self.translator);
                let ctx = unit_context(&job, index);
                attempted.push(index);
                set.spawn(async move {
                    let outcome = translator.translate_unit(&ctx).await;
                    (index, outcome)
                });
            }
            while let Some(joined) = set.join_next().await {
                let Ok((index, outcome)) = joined else {
                    continue;
                };
                let prior_retries = job.units[index].retry_count;
                if self.apply_outcome(job_id, index, prior_retries, outcome)? {
                    newly_translated.push(index);
                }
            }
        }

        let rate_limited = attempted.is_empty() && denied;
        attempted.sort_unstable();
        newly_translated.sort_unstable();
        self.finish(job_id, rate_limited, attempted, newly_translated)
    }

    /// Force one unit back to eligible, ignoring backoff, and attempt it
    /// immediately, outside the tick's batch selection. With `force` a
    /// `Translated` unit is reset (and its cached result dropped) so the
    /// attempt is fresh; without it, a translated unit is left alone. A unit
    /// currently held by an in-flight tick is left to that tick, force or not.
    pub async fn retry_unit(
        &self,
        job_id: &str,
        unit_index: usize,
        force: bool,
    ) -> Result<TickReport, TranslaliaError> {
        let job = self.require_job(job_id)?;
        let unit = job
            .unit(unit_index)
            .ok_or_else(|| TranslaliaError::UnitNotFound {
                job_id: job_id.to_string(),
                index: unit_index,
            })?;

        if unit.status == UnitStatus::Translated && !force {
            return self.finish(job_id, false, Vec::new(), Vec::new());
        }
        if unit.status == UnitStatus::Processing {
            // An in-flight tick owns the unit; its result will land on its own.
            return self.finish(job_id, false, Vec::new(), Vec::new());
        }
        let prior_retries = unit.retry_count;

        self.store.reset_unit(job_id, unit_index, force)?;
        if force {
            self.translator.invalidate(job_id, unit_index);
        }

        let decision = self
            .limiter
            .check_and_reserve(
                &self.config.subject,
                self.config.rate_limit,
                self.config.rate_window_secs,
            )
            .await;
        if !decision.allowed {
            return self.finish(job_id, true, Vec::new(), Vec::new());
        }
        if !self.store.claim_unit(job_id, unit_index, Utc::now())? {
            // A concurrent tick got there first; let it finish.
            return self.finish(job_id, false, Vec::new(), Vec::new());
        }

        let ctx = unit_context(&job, unit_index);
        let outcome = self.translator.translate_unit(&ctx).await;
        let translated = self.apply_outcome(job_id, unit_index, prior_retries, outcome)?;
        let newly_translated = if translated { vec![unit_index] } else { Vec::new() };
        self.finish(job_id, false, vec![unit_index], newly_translated)
    }

    /// Reset every unit of one stanza to `Pending` (optionally clearing prior
    /// results) and run an immediate tick.
    pub async fn retry_stanza(
        &self,
        job_id: &str,
        stanza_index: usize,
        clear_results: bool,
        budget: Duration,
    ) -> Result<TickReport, TranslaliaError> {
        let job = self.require_job(job_id)?;
        let members: Vec<usize> = job
            .units
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.stanza_index == stanza_index)
            .map(|(index, _)| index)
            .collect();
        if members.is_empty() {
            return Err(TranslaliaError::StanzaNotFound {
                job_id: job_id.to_string(),
                index: stanza_index,
            });
        }
        for index in members {
            // Units held by an in-flight tick keep their claim.
            if job.units[index].status == UnitStatus::Processing {
                continue;
            }
            self.store.reset_unit(job_id, index, clear_results)?;
            if clear_results {
                self.translator.invalidate(job_id, index);
            }
        }
        self.tick(job_id, budget).await
    }

    /// Progress projection without attempting anything.
    pub fn report(&self, job_id: &str) -> Result<TickReport, TranslaliaError> {
        self.finish(job_id, false, Vec::new(), Vec::new())
    }

    /// Persist one attempt's outcome. Returns whether the unit translated.
    fn apply_outcome(
        &self,
        job_id: &str,
        unit_index: usize,
        prior_retries: u32,
        outcome: Result<crate::translator::TranslationResult, TranslationFailure>,
    ) -> Result<bool, TranslaliaError> {
        match outcome {
            Ok(result) => {
                self.store.update_unit(
                    job_id,
                    unit_index,
                    UnitPatch::translated(result.variants, result.model),
                )?;
                if let Some(notifier) = &self.notifier {
                    notifier.unit_translated(job_id, unit_index);
                }
                Ok(true)
            }
            Err(failure) => {
                let retry_count = prior_retries + 1;
                let now = Utc::now();
                let backoff_until = self.config.backoff.backoff_until(retry_count, now);
                let delay_ms = self.config.backoff.delay_for_retry(retry_count);
                log_unit_failure(unit_index, retry_count, &failure, delay_ms);
                self.store.update_unit(
                    job_id,
                    unit_index,
                    UnitPatch::failed(retry_count, backoff_until, failure.to_string()),
                )?;
                Ok(false)
            }
        }
    }

    fn finish(
        &self,
        job_id: &str,
        rate_limited: bool,
        attempted: Vec<usize>,
        newly_translated: Vec<usize>,
    ) -> Result<TickReport, TranslaliaError> {
        let job = self.require_job(job_id)?;
        let job_status = if job.is_complete() {
            if job.status != JobStatus::Completed {
                self.store.update_job_status(job_id, JobStatus::Completed)?;
                if let Some(notifier) = &self.notifier {
                    notifier.job_completed(job_id);
                }
            }
            JobStatus::Completed
        } else {
            job.status
        };
        Ok(TickReport {
            job_status,
            summary: progress::summarize(&job),
            ready: progress::ready_units(&job),
            rate_limited,
            attempted,
            newly_translated,
        })
    }

    fn require_job(&self, job_id: &str) -> Result<TranslationJob, TranslaliaError> {
        self.store
            .get_job(job_id)?
            .ok_or_else(|| TranslaliaError::JobNotFound(job_id.to_string()))
    }
}

/// Eligible unit indices in ascending order: pending or queued units, plus
/// failed units whose backoff window has passed. Units inside backoff are
/// skipped without logging.
fn candidate_indices(job: &TranslationJob, now: chrono::DateTime<Utc>) -> Vec<usize> {
    job.units
        .iter()
        .enumerate()
        .filter(|(_, unit)| unit.is_candidate(now))
        .map(|(index, _)| index)
        .collect()
}

fn unit_context(job: &TranslationJob, index: usize) -> UnitContext {
    let unit = &job.units[index];
    UnitContext {
        job_id: job.id.clone(),
        unit_index: index,
        source_text: unit.original_text.clone(),
        previous_text: index
            .checked_sub(1)
            .map(|i| job.units[i].original_text.clone()),
        next_text: job.units.get(index + 1).map(|u| u.original_text.clone()),
        full_text: job.full_text(),
        is_first: index == 0,
        is_last: index + 1 == job.units.len(),
        source_lang: job.source_lang.clone(),
        target_lang: job.target_lang.clone(),
        style_notes: job.style_notes.clone(),
    }
}

fn log_unit_failure(index: usize, attempt: u32, failure: &TranslationFailure, delay_ms: u64) {
    eprintln!("  ↻ unit {index} attempt {attempt} failed: {failure} (backing off {delay_ms}ms)");
}
