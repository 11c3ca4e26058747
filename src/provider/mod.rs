pub mod client;
pub mod error;
pub mod models;
pub mod types;

pub use client::GenerationClient;
pub use error::ProviderError;
pub use models::{capabilities_for, ModelCapabilities};
pub use types::{ContentBlock, GenerationRequest, GenerationResponse, Message, Usage};

use std::future::Future;

/// The seam between the translator and the outside world.
///
/// `GenerationClient` is the production implementation; tests and demo mode
/// substitute local ones. Futures are `Send` so callers can dispatch
/// generation calls onto spawned tasks.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        req: GenerationRequest,
    ) -> impl Future<Output = Result<GenerationResponse, ProviderError>> + Send;
}

/// Deterministic offline generator used by demo mode.
///
/// Produces a schema-valid three-variant payload derived from the prompt's
/// final line, without any network call.
pub struct OfflineGenerator;

impl Generator for OfflineGenerator {
    async fn generate(&self, req: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let source = req
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
            .lines()
            .last()
            .unwrap_or_default()
            .trim()
            .to_string();

        let variant = |text: String, literalness: f64| {
            let target = text_first_word(&text);
            let char_count = text.chars().count();
            serde_json::json!({
                "text": text,
                "alignment": [
                    {"source": source.as_str(), "target": target, "part_of_speech": "neutral"}
                ],
                "literalness": literalness,
                "char_count": char_count,
                "rhyme_preserved": false,
                "meter_preserved": false,
            })
        };

        let payload = serde_json::json!({
            "variants": [
                variant(format!("[literal] {source}"), 1.0),
                variant(format!("[balanced] {source}"), 0.5),
                variant(format!("[free] {source}"), 0.1),
            ]
        });

        Ok(GenerationResponse {
            id: "offline".into(),
            content: vec![ContentBlock::text_block(payload.to_string())],
            model: req.model,
            stop_reason: Some("end_turn".into()),
            usage: Usage::default(),
        })
    }
}

fn text_first_word(text: &str) -> String {
    text.split_whitespace().next().unwrap_or_default().to_string()
}
