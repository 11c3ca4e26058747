//! Tipos de erro para o cliente do provedor de geração.
//!
//! Define [`ProviderError`] com variantes para rate limiting, modelo
//! indisponível, erros da API e erros de rede. Usa `thiserror` para derivar
//! `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com a API de geração.
///
/// As variantes cobrem os cenários de falha relevantes para o agendador:
/// - [`RateLimited`](ProviderError::RateLimited) — o servidor retornou HTTP 429
/// - [`ModelNotFound`](ProviderError::ModelNotFound) — o modelo pedido não existe (4xx)
/// - [`ApiError`](ProviderError::ApiError) — qualquer outro erro HTTP (4xx/5xx)
/// - [`Timeout`](ProviderError::Timeout) — o timeout da requisição disparou
/// - [`NetworkError`](ProviderError::NetworkError) — falha na camada de rede
#[derive(Debug, Error)]
pub enum ProviderError {
    /// O servidor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// O modelo solicitado não existe ou não está disponível para esta conta.
    /// Dispara a substituição pelo modelo de fallback configurado.
    #[error("model not available: {model}")]
    ModelNotFound { model: String },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// O timeout da requisição disparou antes de uma resposta completa.
    #[error("request timed out")]
    Timeout,

    /// Falha de rede subjacente (DNS, conexão recusada).
    /// Encapsula o erro original do `reqwest` via `#[from]`.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = ProviderError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn model_not_found_display() {
        let err = ProviderError::ModelNotFound {
            model: "claude-nonexistent".into(),
        };
        assert_eq!(err.to_string(), "model not available: claude-nonexistent");
    }

    #[test]
    fn api_error_display() {
        let err = ProviderError::ApiError {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "API error (status 401): Invalid API key");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProviderError>();
    }
}
