use thiserror::Error;

use crate::job::store::StoreError;
use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum TranslaliaError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Unit {index} not found in job {job_id}")]
    UnitNotFound { job_id: String, index: usize },

    #[error("Stanza {index} not found in job {job_id}")]
    StanzaNotFound { job_id: String, index: usize },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classifies why a single unit's translation attempt failed.
///
/// All kinds are retryable; they are recorded on the unit and drive the
/// backoff schedule, never aborting the surrounding tick or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The external call failed or returned unusable content after all
    /// repair and fallback attempts.
    Generation,
    /// The provider refused the call with HTTP 429.
    RateLimited,
    /// The request-level timeout fired before the provider answered.
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Generation => write!(f, "generation_error"),
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Typed failure returned by the unit translator.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{kind}: {message}")]
pub struct TranslationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TranslationFailure {
    pub fn generation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Generation,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_display() {
        assert_eq!(FailureKind::Generation.to_string(), "generation_error");
        assert_eq!(FailureKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
    }

    #[test]
    fn translation_failure_display() {
        let f = TranslationFailure::generation("provider returned garbage");
        assert_eq!(f.to_string(), "generation_error: provider returned garbage");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TranslaliaError>();
        assert_send_sync::<TranslationFailure>();
    }
}
