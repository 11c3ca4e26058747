//! Poem segmentation: turning pasted text into a job's fixed unit set.
//!
//! A poem splits into stanzas on blank lines and into lines within each
//! stanza. [`Granularity`] decides whether one unit is a line or a whole
//! stanza. The unit set produced here is fixed for the job's lifetime; the
//! scheduler only ever transitions unit statuses.

use serde::{Deserialize, Serialize};

use crate::config::TranslaliaConfig;
use crate::error::TranslaliaError;
use crate::job::record::{TranslationJob, Unit};

/// The unit size a job is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Line,
    Stanza,
}

/// One segmented piece of the poem, before it becomes a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentLine {
    /// 1-based line number of the piece's first line in the original poem.
    pub line_number: usize,
    /// 0-based stanza index.
    pub stanza_index: usize,
    pub text: String,
}

/// Inputs for job creation beyond the poem itself.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source_lang: String,
    pub target_lang: String,
    /// Opaque style bundle, forwarded untouched to the generation call.
    pub style_notes: Option<String>,
}

/// Split a poem into schedulable pieces.
pub fn segment_poem(poem: &str, granularity: Granularity) -> Vec<SegmentLine> {
    let mut segments = Vec::new();
    let mut stanza_index = 0usize;
    let mut in_stanza = false;
    let mut stanza_start = 0usize;
    let mut stanza_lines: Vec<&str> = Vec::new();

    let mut flush_stanza =
        |segments: &mut Vec<SegmentLine>, start: usize, index: usize, lines: &mut Vec<&str>| {
            if lines.is_empty() {
                return;
            }
            if granularity == Granularity::Stanza {
                segments.push(SegmentLine {
                    line_number: start,
                    stanza_index: index,
                    text: lines.join("\n"),
                });
            }
            lines.clear();
        };

    for (i, line) in poem.lines().enumerate() {
        let line_number = i + 1;
        if line.trim().is_empty() {
            if in_stanza {
                flush_stanza(&mut segments, stanza_start, stanza_index, &mut stanza_lines);
                stanza_index += 1;
                in_stanza = false;
            }
            continue;
        }
        if !in_stanza {
            in_stanza = true;
            stanza_start = line_number;
        }
        match granularity {
            Granularity::Line => segments.push(SegmentLine {
                line_number,
                stanza_index,
                text: line.trim_end().to_string(),
            }),
            Granularity::Stanza => stanza_lines.push(line.trim_end()),
        }
    }
    flush_stanza(&mut segments, stanza_start, stanza_index, &mut stanza_lines);

    segments
}

/// Create a job from a poem, validating configuration up front.
///
/// Missing provider credentials are fatal here: the job must never start and
/// then trickle unit failures that look retryable.
pub fn create_job(
    poem: &str,
    granularity: Granularity,
    request: JobRequest,
    config: &TranslaliaConfig,
) -> Result<TranslationJob, TranslaliaError> {
    if config.api_key.trim().is_empty() {
        return Err(TranslaliaError::Config(
            "missing provider API key; set ANTHROPIC_API_KEY or translalia.toml api_key".into(),
        ));
    }
    let segments = segment_poem(poem, granularity);
    if segments.is_empty() {
        return Err(TranslaliaError::Config(
            "poem is empty after segmentation".into(),
        ));
    }
    let units = segments
        .into_iter()
        .map(|segment| Unit::new(segment.line_number, segment.stanza_index, segment.text))
        .collect();
    Ok(TranslationJob::new(
        request.source_lang,
        request.target_lang,
        request.style_notes,
        granularity,
        units,
    ))
}

/// Restore the invariant that the unit array length equals the segmentation's
/// piece count. Missing entries are synthesized as `Pending` placeholders;
/// surplus entries (a corrupt record) are dropped. Returns how many units
/// were synthesized.
pub fn repair_units(job: &mut TranslationJob, expected: &[SegmentLine]) -> usize {
    job.units.truncate(expected.len());
    let existing = job.units.len();
    let mut synthesized = 0;
    for segment in expected.iter().skip(existing) {
        job.units.push(Unit::placeholder(
            segment.line_number,
            segment.stanza_index,
            segment.text.clone(),
        ));
        synthesized += 1;
    }
    synthesized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::record::UnitStatus;

    const POEM: &str = "No meio do caminho tinha uma pedra\ntinha uma pedra no meio do caminho\n\ntinha uma pedra\nno meio do caminho tinha uma pedra.";

    #[test]
    fn line_granularity_keeps_original_line_numbers() {
        let segments = segment_poem(POEM, Granularity::Line);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].line_number, 1);
        assert_eq!(segments[1].line_number, 2);
        // The blank separator line is skipped, not numbered over.
        assert_eq!(segments[2].line_number, 4);
        assert_eq!(segments[2].stanza_index, 1);
        assert_eq!(segments[3].stanza_index, 1);
    }

    #[test]
    fn stanza_granularity_joins_lines() {
        let segments = segment_poem(POEM, Granularity::Stanza);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].line_number, 1);
        assert!(segments[0].text.contains('\n'));
        assert_eq!(segments[1].line_number, 4);
        assert_eq!(segments[1].stanza_index, 1);
    }

    #[test]
    fn leading_and_trailing_blank_lines_are_ignored() {
        let segments = segment_poem("\n\numa pedra\n\n\n", Granularity::Stanza);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].line_number, 3);
        assert_eq!(segments[0].stanza_index, 0);
    }

    #[test]
    fn create_job_requires_api_key() {
        let config = TranslaliaConfig::default();
        let request = JobRequest {
            source_lang: "pt".into(),
            target_lang: "en".into(),
            style_notes: None,
        };
        let err = create_job(POEM, Granularity::Line, request, &config).unwrap_err();
        assert!(matches!(err, TranslaliaError::Config(_)));
    }

    #[test]
    fn create_job_rejects_empty_poem() {
        let config = TranslaliaConfig {
            api_key: "sk-test".into(),
            ..Default::default()
        };
        let request = JobRequest {
            source_lang: "pt".into(),
            target_lang: "en".into(),
            style_notes: None,
        };
        let err = create_job("\n  \n", Granularity::Line, request, &config).unwrap_err();
        assert!(matches!(err, TranslaliaError::Config(_)));
    }

    #[test]
    fn create_job_builds_pending_units() {
        let config = TranslaliaConfig {
            api_key: "sk-test".into(),
            ..Default::default()
        };
        let request = JobRequest {
            source_lang: "pt".into(),
            target_lang: "en".into(),
            style_notes: Some("drummond, keep it spare".into()),
        };
        let job = create_job(POEM, Granularity::Line, request, &config).unwrap();
        assert_eq!(job.units.len(), 4);
        assert!(job.units.iter().all(|u| u.status == UnitStatus::Pending));
        assert_eq!(job.style_notes.as_deref(), Some("drummond, keep it spare"));
    }

    #[test]
    fn repair_synthesizes_missing_units_as_pending() {
        let config = TranslaliaConfig {
            api_key: "sk-test".into(),
            ..Default::default()
        };
        let request = JobRequest {
            source_lang: "pt".into(),
            target_lang: "en".into(),
            style_notes: None,
        };
        let segments = segment_poem(POEM, Granularity::Line);
        let mut job = create_job(POEM, Granularity::Line, request, &config).unwrap();

        // Simulate a corrupt record missing its tail.
        job.units.truncate(2);
        let synthesized = repair_units(&mut job, &segments);
        assert_eq!(synthesized, 2);
        assert_eq!(job.units.len(), 4);
        assert_eq!(job.units[3].status, UnitStatus::Pending);
        assert_eq!(job.units[3].original_text, segments[3].text);
    }

    #[test]
    fn repair_drops_surplus_units() {
        let segments = segment_poem("uma pedra", Granularity::Line);
        let mut job = TranslationJob::new(
            "pt".into(),
            "en".into(),
            None,
            Granularity::Line,
            vec![
                Unit::new(1, 0, "uma pedra".into()),
                Unit::new(2, 0, "fantasma".into()),
            ],
        );
        let synthesized = repair_units(&mut job, &segments);
        assert_eq!(synthesized, 0);
        assert_eq!(job.units.len(), 1);
    }
}
