use std::time::Duration;

use reqwest::Client;

use super::error::ProviderError;
use super::types::{GenerationRequest, GenerationResponse};
use super::Generator;

const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// HTTP client for the external generation provider.
pub struct GenerationClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl GenerationClient {
    pub fn new(api_key: String, request_timeout_secs: u64) -> Self {
        Self::with_base_url(api_key, API_URL.to_string(), request_timeout_secs)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String, request_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self {
            api_key,
            client,
            base_url,
        }
    }

    async fn send(&self, req: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::NetworkError(e)
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::ModelNotFound {
                model: req.model.clone(),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            // Some gateways report an unavailable model as a plain 400.
            if status.as_u16() == 400 && message.contains("model") {
                return Err(ProviderError::ModelNotFound {
                    model: req.model.clone(),
                });
            }
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<GenerationResponse>()
            .await
            .map_err(ProviderError::NetworkError)?;
        Ok(body)
    }
}

impl Generator for GenerationClient {
    async fn generate(&self, req: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        self.send(&req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::Message;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> GenerationRequest {
        GenerationRequest {
            model: model.into(),
            max_tokens: 256,
            temperature: None,
            messages: vec![Message {
                role: "user".into(),
                content: "translate".into(),
            }],
        }
    }

    async fn client_for(server: &MockServer) -> GenerationClient {
        GenerationClient::with_base_url(
            "test-key".into(),
            format!("{}/v1/messages", server.uri()),
            5,
        )
    }

    #[tokio::test]
    async fn successful_call_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "content": [{"type": "text", "text": "olá"}],
                "model": "claude-haiku-4-5-20251001",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 2}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let resp = client.generate(request("claude-haiku-4-5-20251001")).await.unwrap();
        assert_eq!(resp.text(), "olá");
        assert_eq!(resp.model, "claude-haiku-4-5-20251001");
    }

    #[tokio::test]
    async fn http_429_maps_to_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(request("m")).await.unwrap_err();
        match err {
            ProviderError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 7000),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_404_maps_to_model_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(request("claude-gone")).await.unwrap_err();
        match err {
            ProviderError::ModelNotFound { model } => assert_eq!(model, "claude-gone"),
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_400_mentioning_model_maps_to_model_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error": "unknown model: x"}"#),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(request("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn other_http_errors_map_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(request("m")).await.unwrap_err();
        match err {
            ProviderError::ApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
