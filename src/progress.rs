//! Read-side projection of a job's progress.
//!
//! Derived fresh from the job record on every call; nothing here is stored,
//! and nothing here mutates. Clients poll this to render ready units
//! incrementally, independent of whole-job completion.

use serde::{Deserialize, Serialize};

use crate::job::record::{TranslationJob, UnitStatus, Variant};

/// Counts per unit status. The five counts always sum to `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub pending: usize,
    pub queued: usize,
    pub processing: usize,
    pub translated: usize,
    pub failed: usize,
    pub total: usize,
    /// Percent of units translated, 0–100.
    pub percent: u8,
}

/// A unit whose translations are ready to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyUnit {
    pub unit_index: usize,
    pub line_number: usize,
    pub variants: Vec<Variant>,
}

pub fn summarize(job: &TranslationJob) -> ProgressSummary {
    let mut summary = ProgressSummary {
        pending: 0,
        queued: 0,
        processing: 0,
        translated: 0,
        failed: 0,
        total: job.units.len(),
        percent: 0,
    };
    for unit in &job.units {
        match unit.status {
            UnitStatus::Pending => summary.pending += 1,
            UnitStatus::Queued => summary.queued += 1,
            UnitStatus::Processing => summary.processing += 1,
            UnitStatus::Translated => summary.translated += 1,
            UnitStatus::Failed => summary.failed += 1,
        }
    }
    if summary.total > 0 {
        summary.percent = (summary.translated * 100 / summary.total) as u8;
    }
    summary
}

/// Every unit currently in `Translated` status, in unit order.
pub fn ready_units(job: &TranslationJob) -> Vec<ReadyUnit> {
    job.units
        .iter()
        .enumerate()
        .filter(|(_, unit)| unit.status == UnitStatus::Translated)
        .map(|(index, unit)| ReadyUnit {
            unit_index: index,
            line_number: unit.line_number,
            variants: unit.translations.clone(),
        })
        .collect()
}
