//! Capability table for generation models.
//!
//! Capability gating is keyed by exact model identifier rather than prefix
//! string matching, so adding a model means adding one table row.

/// What a given model supports, and where to fall back when it is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Whether the model accepts a sampling temperature.
    pub supports_temperature: bool,
    /// Whether the model reliably follows a JSON output contract.
    /// Models without this go straight to the plain-text prompt mode.
    pub supports_structured_output: bool,
    /// Upper bound on `max_tokens` for a single response.
    pub max_output_tokens: u32,
}

const DEFAULT_CAPABILITIES: ModelCapabilities = ModelCapabilities {
    supports_temperature: false,
    supports_structured_output: true,
    max_output_tokens: 2048,
};

const CAPABILITIES: &[(&str, ModelCapabilities)] = &[
    (
        "claude-haiku-4-5-20251001",
        ModelCapabilities {
            supports_temperature: true,
            supports_structured_output: true,
            max_output_tokens: 4096,
        },
    ),
    (
        "claude-sonnet-4-5-20250929",
        ModelCapabilities {
            supports_temperature: true,
            supports_structured_output: true,
            max_output_tokens: 8192,
        },
    ),
    (
        "claude-opus-4-6",
        ModelCapabilities {
            supports_temperature: true,
            supports_structured_output: true,
            max_output_tokens: 8192,
        },
    ),
];

/// Look up capabilities for a model identifier.
///
/// Unknown models get a conservative default instead of an error: translation
/// should degrade, not refuse, when a new model id shows up in config.
pub fn capabilities_for(model: &str) -> ModelCapabilities {
    CAPABILITIES
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, caps)| *caps)
        .unwrap_or(DEFAULT_CAPABILITIES)
}
