//! Unit translation against the external generation provider.
//!
//! One call per unit per attempt. The raw response is parsed as structured
//! JSON and validated against the three-variant shape; malformed output goes
//! through a single plain-text fallback attempt, and shape problems are
//! repaired with field-level defaults rather than rejected. A unit-level
//! cache keyed by (job id, unit index, model) makes repeated calls with
//! identical input short-circuit the provider entirely.
//!
//! The translator never writes to the job store; that is the scheduler's job.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;

use crate::error::TranslationFailure;
use crate::job::record::{AlignedWord, Variant};
use crate::provider::{capabilities_for, GenerationRequest, Generator, Message, ProviderError};

/// Every successful translation carries exactly this many ranked variants.
pub const VARIANT_COUNT: usize = 3;

/// Everything the translator needs to know about one unit.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub job_id: String,
    pub unit_index: usize,
    pub source_text: String,
    pub previous_text: Option<String>,
    pub next_text: Option<String>,
    pub full_text: String,
    pub is_first: bool,
    pub is_last: bool,
    pub source_lang: String,
    pub target_lang: String,
    /// Opaque style bundle, passed through to the prompt untouched.
    pub style_notes: Option<String>,
}

/// A normalized, schema-valid translation for one unit.
#[derive(Debug, Clone)]
pub struct TranslationResult {
    /// Exactly [`VARIANT_COUNT`] ranked variants.
    pub variants: Vec<Variant>,
    /// The model that actually produced the result (may be the fallback).
    pub model: String,
    /// Shape coercions applied to the raw response. Empty means the response
    /// validated as-is. Repairs are success, logged for observability only.
    pub repairs: Vec<String>,
    /// True when the result came from the plain-text fallback mode.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub job_id: String,
    pub unit_index: usize,
    pub model: String,
}

/// Result cache seam. Implementations must be safe under concurrent ticks.
pub trait TranslationCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<TranslationResult>;
    fn put(&self, key: CacheKey, result: TranslationResult);
    /// Drop a cached result so the next call hits the provider again.
    fn invalidate(&self, key: &CacheKey);
}

#[derive(Default)]
pub struct InMemoryTranslationCache {
    entries: Mutex<HashMap<CacheKey, TranslationResult>>,
}

impl TranslationCache for InMemoryTranslationCache {
    fn get(&self, key: &CacheKey) -> Option<TranslationResult> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn put(&self, key: CacheKey, result: TranslationResult) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, result);
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub model: String,
    pub fallback_model: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptMode {
    /// Full JSON contract: three variants with alignments and metadata.
    Structured,
    /// Degraded mode: three plain-text renderings, one per line.
    Plain,
}

pub struct UnitTranslator<G> {
    generator: G,
    cache: Box<dyn TranslationCache>,
    config: TranslatorConfig,
}

impl<G: Generator> UnitTranslator<G> {
    pub fn new(generator: G, config: TranslatorConfig) -> Self {
        Self::with_cache(generator, config, Box::new(InMemoryTranslationCache::default()))
    }

    pub fn with_cache(
        generator: G,
        config: TranslatorConfig,
        cache: Box<dyn TranslationCache>,
    ) -> Self {
        Self {
            generator,
            cache,
            config,
        }
    }

    /// Translate one unit, returning a normalized result or a typed failure.
    pub async fn translate_unit(
        &self,
        ctx: &UnitContext,
    ) -> Result<TranslationResult, TranslationFailure> {
        let key = CacheKey {
            job_id: ctx.job_id.clone(),
            unit_index: ctx.unit_index,
            model: self.config.model.clone(),
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let result = self.attempt(ctx).await?;
        self.cache.put(key, result.clone());
        Ok(result)
    }

    /// Drop the cached result for one unit, if any. Used by forced retries so
    /// the new attempt actually reaches the provider.
    pub fn invalidate(&self, job_id: &str, unit_index: usize) {
        self.cache.invalidate(&CacheKey {
            job_id: job_id.to_string(),
            unit_index,
            model: self.config.model.clone(),
        });
    }

    #[cfg(test)]
    pub(crate) fn generator_ref(&self) -> &G {
        &self.generator
    }

    async fn attempt(&self, ctx: &UnitContext) -> Result<TranslationResult, TranslationFailure> {
        let caps = capabilities_for(&self.config.model);

        if caps.supports_structured_output {
            let (text, model_used) = self.call(ctx, PromptMode::Structured).await?;
            match parse_variants(&text) {
                Ok((variants, repairs)) => {
                    return Ok(TranslationResult {
                        variants,
                        model: model_used,
                        repairs,
                        degraded: false,
                    });
                }
                Err(_) => {
                    // Fall through to the single plain-text attempt below.
                }
            }
        }

        let (text, model_used) = self.call(ctx, PromptMode::Plain).await?;
        let variants = plain_variants(&text).ok_or_else(|| {
            TranslationFailure::generation("provider returned no usable text in plain mode")
        })?;
        Ok(TranslationResult {
            variants,
            model: model_used,
            repairs: vec!["plain_text_fallback".into()],
            degraded: true,
        })
    }

    /// One provider call, with a single fallback-model substitution when the
    /// configured model is unavailable.
    async fn call(
        &self,
        ctx: &UnitContext,
        mode: PromptMode,
    ) -> Result<(String, String), TranslationFailure> {
        let request = self.build_request(&self.config.model, ctx, mode);
        match self.generator.generate(request).await {
            Ok(response) => Ok((response.text(), self.config.model.clone())),
            Err(ProviderError::ModelNotFound { .. })
                if self.config.fallback_model != self.config.model =>
            {
                let request = self.build_request(&self.config.fallback_model, ctx, mode);
                match self.generator.generate(request).await {
                    Ok(response) => Ok((response.text(), self.config.fallback_model.clone())),
                    Err(e) => Err(map_provider_error(e)),
                }
            }
            Err(e) => Err(map_provider_error(e)),
        }
    }

    fn build_request(&self, model: &str, ctx: &UnitContext, mode: PromptMode) -> GenerationRequest {
        let caps = capabilities_for(model);
        GenerationRequest {
            model: model.to_string(),
            max_tokens: caps.max_output_tokens,
            temperature: caps.supports_temperature.then_some(self.config.temperature),
            messages: vec![Message {
                role: "user".into(),
                content: build_prompt(ctx, mode),
            }],
        }
    }
}

fn map_provider_error(error: ProviderError) -> TranslationFailure {
    match error {
        ProviderError::RateLimited { retry_after_ms } => TranslationFailure::rate_limited(format!(
            "provider rate limited, retry after {retry_after_ms}ms"
        )),
        ProviderError::Timeout => TranslationFailure::timeout("provider request timed out"),
        other => TranslationFailure::generation(other.to_string()),
    }
}

fn build_prompt(ctx: &UnitContext, mode: PromptMode) -> String {
    let mut context_block = String::new();
    if let Some(previous) = &ctx.previous_text {
        context_block.push_str(&format!("Previous line: {previous}\n"));
    }
    if let Some(next) = &ctx.next_text {
        context_block.push_str(&format!("Next line: {next}\n"));
    }
    if ctx.is_first {
        context_block.push_str("This is the opening of the poem.\n");
    }
    if ctx.is_last {
        context_block.push_str("This is the closing of the poem.\n");
    }
    if let Some(style) = &ctx.style_notes {
        context_block.push_str(&format!("Style preferences: {style}\n"));
    }

    match mode {
        PromptMode::Structured => format!(
            "You are translating a poem from {src} to {dst}. \
             Respond with ONLY valid JSON, no other text.\n\
             \n\
             Format:\n\
             {{\"variants\": [\n\
               {{\"text\": \"<full translated line>\", \
                 \"alignment\": [{{\"source\": \"<source fragment>\", \"target\": \"<translated fragment>\", \"part_of_speech\": \"<pos>\"}}], \
                 \"literalness\": <0.0-1.0>, \"char_count\": <int>, \
                 \"rhyme_preserved\": <bool>, \"meter_preserved\": <bool>}}\n\
             ]}}\n\
             \n\
             Rules:\n\
             - Produce exactly 3 variants, ordered from most literal to most free\n\
             - Align every significant word of the source to its translated counterpart\n\
             \n\
             Full poem for context:\n{poem}\n\n{context}\
             Line to translate: {line}",
            src = ctx.source_lang,
            dst = ctx.target_lang,
            poem = ctx.full_text,
            context = context_block,
            line = ctx.source_text,
        ),
        PromptMode::Plain => format!(
            "Translate this line of poetry from {src} to {dst}. \
             Respond with exactly 3 alternative translations, one per line, \
             most literal first. No JSON, no numbering, no commentary.\n\
             \n\
             {context}\
             Line: {line}",
            src = ctx.source_lang,
            dst = ctx.target_lang,
            context = context_block,
            line = ctx.source_text,
        ),
    }
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    variants: Vec<RawVariant>,
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    text: String,
    #[serde(default)]
    alignment: Vec<RawAlignedWord>,
    literalness: Option<f64>,
    char_count: Option<usize>,
    rhyme_preserved: Option<bool>,
    meter_preserved: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawAlignedWord {
    source: String,
    target: String,
    part_of_speech: Option<String>,
}

/// Parse and validate a structured response, coercing shape problems into a
/// usable result. Returns the variants plus the list of repairs applied.
/// Only an unparseable or variant-free payload is an error.
fn parse_variants(text: &str) -> Result<(Vec<Variant>, Vec<String>), String> {
    let cleaned = strip_code_fences(text);
    let payload: RawPayload =
        serde_json::from_str(cleaned).map_err(|e| format!("invalid JSON: {e}"))?;
    if payload.variants.is_empty() {
        return Err("payload contains no variants".into());
    }

    let mut repairs = Vec::new();
    let raw_count = payload.variants.len();
    let mut variants: Vec<Variant> = payload
        .variants
        .into_iter()
        .take(VARIANT_COUNT)
        .enumerate()
        .map(|(i, raw)| coerce_variant(i, raw, &mut repairs))
        .collect();

    if raw_count > VARIANT_COUNT {
        repairs.push(format!("truncated {raw_count} variants to {VARIANT_COUNT}"));
    }
    while variants.len() < VARIANT_COUNT {
        let last = variants
            .last()
            .cloned()
            .expect("variants is non-empty here");
        variants.push(last);
        repairs.push(format!("padded variants from {raw_count} to {VARIANT_COUNT}"));
    }

    Ok((variants, repairs))
}

fn coerce_variant(index: usize, raw: RawVariant, repairs: &mut Vec<String>) -> Variant {
    let literalness = match raw.literalness {
        Some(value) if (0.0..=1.0).contains(&value) => value,
        Some(value) => {
            repairs.push(format!("variant {index}: clamped literalness {value}"));
            value.clamp(0.0, 1.0)
        }
        None => {
            repairs.push(format!("variant {index}: defaulted literalness"));
            0.0
        }
    };
    let char_count = match raw.char_count {
        Some(count) => count,
        None => {
            repairs.push(format!("variant {index}: derived char_count"));
            raw.text.chars().count()
        }
    };
    let rhyme_preserved = raw.rhyme_preserved.unwrap_or_else(|| {
        repairs.push(format!("variant {index}: defaulted rhyme_preserved"));
        false
    });
    let meter_preserved = raw.meter_preserved.unwrap_or_else(|| {
        repairs.push(format!("variant {index}: defaulted meter_preserved"));
        false
    });
    let alignment = raw
        .alignment
        .into_iter()
        .map(|word| AlignedWord {
            source: word.source,
            target: word.target,
            part_of_speech: word.part_of_speech.unwrap_or_else(|| {
                repairs.push(format!("variant {index}: defaulted part_of_speech"));
                "neutral".into()
            }),
        })
        .collect();

    Variant {
        text: raw.text,
        alignment,
        literalness,
        char_count,
        rhyme_preserved,
        meter_preserved,
    }
}

/// Build variants from a plain-text response: one rendering per non-blank
/// line, padded to [`VARIANT_COUNT`] by repeating the last. No alignment.
fn plain_variants(text: &str) -> Option<Vec<Variant>> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(VARIANT_COUNT)
        .collect();
    if lines.is_empty() {
        return None;
    }

    let mut variants: Vec<Variant> = lines
        .into_iter()
        .map(|line| Variant {
            text: line.to_string(),
            alignment: Vec::new(),
            literalness: 0.0,
            char_count: line.chars().count(),
            rhyme_preserved: false,
            meter_preserved: false,
        })
        .collect();
    while variants.len() < VARIANT_COUNT {
        let last = variants.last().cloned()?;
        variants.push(last);
    }
    Some(variants)
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ContentBlock, GenerationResponse, Usage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted generator: pops one canned response per call and records
    /// every request it sees.
    struct MockGenerator {
        responses: Mutex<VecDeque<Result<String, ProviderError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl MockGenerator {
        fn scripted(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn ok(text: &str) -> Self {
            Self::scripted(vec![Ok(text.to_string())])
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request_models(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }
    }

    impl Generator for MockGenerator {
        async fn generate(
            &self,
            req: GenerationRequest,
        ) -> Result<GenerationResponse, ProviderError> {
            self.requests.lock().unwrap().push(req.clone());
            let scripted = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok("".to_string()));
            scripted.map(|text| GenerationResponse {
                id: "mock".into(),
                content: vec![ContentBlock::text_block(text)],
                model: req.model,
                stop_reason: Some("end_turn".into()),
                usage: Usage::default(),
            })
        }
    }

    fn config() -> TranslatorConfig {
        TranslatorConfig {
            model: "claude-sonnet-4-5-20250929".into(),
            fallback_model: "claude-haiku-4-5-20251001".into(),
            temperature: 0.7,
        }
    }

    fn ctx() -> UnitContext {
        UnitContext {
            job_id: "job-1".into(),
            unit_index: 0,
            source_text: "tinha uma pedra".into(),
            previous_text: None,
            next_text: Some("no meio do caminho".into()),
            full_text: "tinha uma pedra\nno meio do caminho".into(),
            is_first: true,
            is_last: false,
            source_lang: "pt".into(),
            target_lang: "en".into(),
            style_notes: None,
        }
    }

    fn full_variant(text: &str) -> serde_json::Value {
        serde_json::json!({
            "text": text,
            "alignment": [
                {"source": "pedra", "target": "stone", "part_of_speech": "noun"}
            ],
            "literalness": 0.9,
            "char_count": text.chars().count(),
            "rhyme_preserved": false,
            "meter_preserved": true,
        })
    }

    fn full_payload() -> String {
        serde_json::json!({
            "variants": [
                full_variant("there was a stone"),
                full_variant("a stone was there"),
                full_variant("a stone lay in the road"),
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn valid_three_variant_payload_has_zero_repairs() {
        let translator = UnitTranslator::new(MockGenerator::ok(&full_payload()), config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(result.variants.len(), 3);
        assert!(result.repairs.is_empty());
        assert!(!result.degraded);
        assert_eq!(result.variants[0].alignment[0].target, "stone");
    }

    #[tokio::test]
    async fn code_fenced_payload_is_accepted() {
        let fenced = format!("```json\n{}\n```", full_payload());
        let translator = UnitTranslator::new(MockGenerator::ok(&fenced), config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(result.variants.len(), 3);
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn short_variant_list_is_padded() {
        let payload = serde_json::json!({
            "variants": [full_variant("there was a stone")]
        })
        .to_string();
        let translator = UnitTranslator::new(MockGenerator::ok(&payload), config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(result.variants.len(), 3);
        assert_eq!(result.variants[1].text, result.variants[0].text);
        assert!(result.repairs.iter().any(|r| r.contains("padded")));
    }

    #[tokio::test]
    async fn surplus_variants_are_truncated() {
        let payload = serde_json::json!({
            "variants": [
                full_variant("a"), full_variant("b"), full_variant("c"),
                full_variant("d"), full_variant("e"),
            ]
        })
        .to_string();
        let translator = UnitTranslator::new(MockGenerator::ok(&payload), config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(result.variants.len(), 3);
        assert!(result.repairs.iter().any(|r| r.contains("truncated")));
    }

    #[tokio::test]
    async fn missing_fields_get_defaults() {
        let payload = serde_json::json!({
            "variants": [
                {"text": "there was a stone",
                 "alignment": [{"source": "pedra", "target": "stone"}]},
                {"text": "a stone was there"},
                {"text": "a stone lay in the road"},
            ]
        })
        .to_string();
        let translator = UnitTranslator::new(MockGenerator::ok(&payload), config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(result.variants[0].alignment[0].part_of_speech, "neutral");
        assert_eq!(result.variants[0].literalness, 0.0);
        assert_eq!(
            result.variants[1].char_count,
            "a stone was there".chars().count()
        );
        assert!(!result.variants[2].rhyme_preserved);
        assert!(!result.repairs.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_literalness_is_clamped() {
        let payload = serde_json::json!({
            "variants": [
                {"text": "a", "literalness": 3.5},
                {"text": "b", "literalness": -1.0},
                {"text": "c", "literalness": 0.5},
            ]
        })
        .to_string();
        let translator = UnitTranslator::new(MockGenerator::ok(&payload), config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(result.variants[0].literalness, 1.0);
        assert_eq!(result.variants[1].literalness, 0.0);
        assert_eq!(result.variants[2].literalness, 0.5);
    }

    #[tokio::test]
    async fn malformed_json_falls_back_to_plain_mode() {
        let generator = MockGenerator::scripted(vec![
            Ok("this is not json".into()),
            Ok("there was a stone\na stone was there\na stone lay there".into()),
        ]);
        let translator = UnitTranslator::new(generator, config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert!(result.degraded);
        assert_eq!(result.variants.len(), 3);
        assert!(result.variants.iter().all(|v| v.alignment.is_empty()));
        assert_eq!(result.repairs, vec!["plain_text_fallback".to_string()]);
    }

    #[tokio::test]
    async fn malformed_json_twice_is_a_generation_error() {
        let generator = MockGenerator::scripted(vec![
            Ok("garbage".into()),
            Ok("".into()),
        ]);
        let translator = UnitTranslator::new(generator, config());
        let failure = translator.translate_unit(&ctx()).await.unwrap_err();
        assert_eq!(failure.kind, crate::error::FailureKind::Generation);
    }

    #[tokio::test]
    async fn model_not_found_substitutes_fallback_model() {
        let generator = MockGenerator::scripted(vec![
            Err(ProviderError::ModelNotFound {
                model: "claude-sonnet-4-5-20250929".into(),
            }),
            Ok(full_payload()),
        ]);
        let translator = UnitTranslator::new(generator, config());
        let result = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(result.model, "claude-haiku-4-5-20251001");
        assert_eq!(
            translator.generator.request_models(),
            vec![
                "claude-sonnet-4-5-20250929".to_string(),
                "claude-haiku-4-5-20251001".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn fallback_model_failure_surfaces_as_generation_error() {
        let generator = MockGenerator::scripted(vec![
            Err(ProviderError::ModelNotFound {
                model: "a".into(),
            }),
            Err(ProviderError::ApiError {
                status: 500,
                message: "down".into(),
            }),
        ]);
        let translator = UnitTranslator::new(generator, config());
        let failure = translator.translate_unit(&ctx()).await.unwrap_err();
        assert_eq!(failure.kind, crate::error::FailureKind::Generation);
    }

    #[tokio::test]
    async fn provider_rate_limit_maps_to_rate_limited_failure() {
        let generator =
            MockGenerator::scripted(vec![Err(ProviderError::RateLimited { retry_after_ms: 500 })]);
        let translator = UnitTranslator::new(generator, config());
        let failure = translator.translate_unit(&ctx()).await.unwrap_err();
        assert_eq!(failure.kind, crate::error::FailureKind::RateLimited);
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_provider() {
        let generator = MockGenerator::scripted(vec![Ok(full_payload())]);
        let translator = UnitTranslator::new(generator, config());
        let first = translator.translate_unit(&ctx()).await.unwrap();
        let second = translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(first.variants, second.variants);
        assert_eq!(translator.generator.request_count(), 1);
    }

    #[tokio::test]
    async fn temperature_is_gated_by_the_capability_table() {
        let translator = UnitTranslator::new(MockGenerator::ok(&full_payload()), config());
        translator.translate_unit(&ctx()).await.unwrap();
        let requests = translator.generator.requests.lock().unwrap();
        // Sonnet supports temperature, so the request carries one.
        assert_eq!(requests[0].temperature, Some(0.7));
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_provider_call() {
        let generator =
            MockGenerator::scripted(vec![Ok(full_payload()), Ok(full_payload())]);
        let translator = UnitTranslator::new(generator, config());
        translator.translate_unit(&ctx()).await.unwrap();
        translator.invalidate("job-1", 0);
        translator.translate_unit(&ctx()).await.unwrap();
        assert_eq!(translator.generator.request_count(), 2);
    }

    #[test]
    fn plain_variants_pads_and_trims() {
        let variants = plain_variants("  one  \n\ntwo\n").unwrap();
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].text, "one");
        assert_eq!(variants[2].text, "two");
        assert!(plain_variants("\n  \n").is_none());
    }
}
