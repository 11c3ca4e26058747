use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backoff;
use crate::segment::Granularity;

/// Lifecycle status of a whole translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Lifecycle status of a single unit within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Queued,
    Processing,
    Translated,
    Failed,
}

/// One word-level correspondence between source and translated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedWord {
    pub source: String,
    pub target: String,
    pub part_of_speech: String,
}

/// One of the three alternative translations produced for a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub text: String,
    pub alignment: Vec<AlignedWord>,
    /// How literal this rendering is, in [0, 1].
    pub literalness: f64,
    pub char_count: usize,
    pub rhyme_preserved: bool,
    pub meter_preserved: bool,
}

/// The smallest schedulable piece of translation work: one line, or one
/// stanza when the job was created with stanza granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    /// Line number of this unit's first line in the original poem (1-based).
    pub line_number: usize,
    /// Index of the stanza this unit belongs to (0-based).
    pub stanza_index: usize,
    pub original_text: String,
    #[serde(rename = "translation_status")]
    pub status: UnitStatus,
    /// Empty until the unit reaches `Translated`; then exactly three variants.
    pub translations: Vec<Variant>,
    pub model_used: Option<String>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    pub fn new(line_number: usize, stanza_index: usize, original_text: String) -> Self {
        Self {
            line_number,
            stanza_index,
            original_text,
            status: UnitStatus::Pending,
            translations: Vec::new(),
            model_used: None,
            retry_count: 0,
            backoff_until: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Synthesized stand-in for a missing array entry (see `segment::repair_units`).
    pub fn placeholder(line_number: usize, stanza_index: usize, original_text: String) -> Self {
        Self::new(line_number, stanza_index, original_text)
    }

    /// Whether this unit may be attempted by the current tick.
    ///
    /// `Pending` and `Queued` units are always candidates; `Failed` units only
    /// once their backoff window has passed. `Processing` units belong to an
    /// in-flight tick and are never candidates.
    pub fn is_candidate(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            UnitStatus::Pending | UnitStatus::Queued => true,
            UnitStatus::Failed => backoff::is_eligible(self.backoff_until, now),
            UnitStatus::Processing | UnitStatus::Translated => false,
        }
    }
}

/// One translation job: a fixed set of units plus aggregate status.
/// The unit set never changes after creation; only unit fields do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationJob {
    pub id: String,
    pub status: JobStatus,
    pub source_lang: String,
    pub target_lang: String,
    /// Opaque style/preference notes, passed through to the generation call.
    pub style_notes: Option<String>,
    pub granularity: Granularity,
    pub units: Vec<Unit>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranslationJob {
    pub fn new(
        source_lang: String,
        target_lang: String,
        style_notes: Option<String>,
        granularity: Granularity,
        units: Vec<Unit>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            source_lang,
            target_lang,
            style_notes,
            granularity,
            units,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    pub fn is_complete(&self) -> bool {
        !self.units.is_empty()
            && self
                .units
                .iter()
                .all(|unit| unit.status == UnitStatus::Translated)
    }

    /// The whole poem as the units hold it, used as document context.
    pub fn full_text(&self) -> String {
        self.units
            .iter()
            .map(|unit| unit.original_text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Partial update to one unit. `None` fields are left untouched, so a patch
/// scoped to one unit can never clobber a sibling's concurrent update.
#[derive(Debug, Clone, Default)]
pub struct UnitPatch {
    pub status: Option<UnitStatus>,
    pub translations: Option<Vec<Variant>>,
    pub model_used: Option<String>,
    pub retry_count: Option<u32>,
    /// `Some(None)` clears the backoff window.
    pub backoff_until: Option<Option<DateTime<Utc>>>,
    /// `Some(None)` clears the last error.
    pub last_error: Option<Option<String>>,
}

impl UnitPatch {
    pub fn status(status: UnitStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch for a successful translation attempt.
    pub fn translated(variants: Vec<Variant>, model: String) -> Self {
        Self {
            status: Some(UnitStatus::Translated),
            translations: Some(variants),
            model_used: Some(model),
            backoff_until: Some(None),
            last_error: Some(None),
            ..Default::default()
        }
    }

    /// Patch for a failed attempt: bump the retry count and open a backoff window.
    pub fn failed(retry_count: u32, backoff_until: DateTime<Utc>, error: String) -> Self {
        Self {
            status: Some(UnitStatus::Failed),
            retry_count: Some(retry_count),
            backoff_until: Some(Some(backoff_until)),
            last_error: Some(Some(error)),
            ..Default::default()
        }
    }
}
