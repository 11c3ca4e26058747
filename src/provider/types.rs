//! Tipos de dados para requisições e respostas da API de geração.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o formato esperado pelo endpoint `v1/messages` do provedor.

use serde::{Deserialize, Serialize};

/// Corpo da requisição para o endpoint `/v1/messages` do provedor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Identificador do modelo a ser usado (ex.: "claude-sonnet-4-5-20250929").
    pub model: String,
    /// Número máximo de tokens na resposta gerada pelo modelo.
    pub max_tokens: u32,
    /// Temperatura de amostragem. Omitida quando o modelo não a suporta
    /// (ver a tabela de capacidades em [`models`](super::models)).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Lista de mensagens compondo a conversa (usuário e assistente).
    pub messages: Vec<Message>,
}

/// Uma única mensagem em uma conversa com o provedor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Papel do remetente: "user" ou "assistant".
    pub role: String,
    /// Conteúdo textual da mensagem.
    pub content: String,
}

/// Resposta retornada pelo endpoint `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Identificador único da resposta (gerado pela API).
    pub id: String,
    /// Blocos de conteúdo na resposta (normalmente texto).
    pub content: Vec<ContentBlock>,
    /// Modelo que gerou a resposta.
    pub model: String,
    /// Motivo da parada da geração (ex.: "end_turn", "max_tokens").
    pub stop_reason: Option<String>,
    /// Estatísticas de uso de tokens (entrada e saída).
    pub usage: Usage,
}

impl GenerationResponse {
    /// Concatena o texto de todos os blocos de conteúdo.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Um bloco de conteúdo dentro da resposta — atualmente apenas texto.
///
/// O campo `content_type` é serializado como `"type"` no JSON via `serde(rename)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Tipo do bloco ("text"). Serializado como "type" no JSON.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Conteúdo textual deste bloco.
    pub text: String,
}

impl ContentBlock {
    /// Constrói um bloco de texto simples.
    pub fn text_block(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".into(),
            text: text.into(),
        }
    }
}

/// Estatísticas de consumo de tokens para uma chamada à API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Número de tokens consumidos na entrada (prompt).
    pub input_tokens: u32,
    /// Número de tokens gerados na saída (resposta).
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_request_roundtrip() {
        let req = GenerationRequest {
            model: "claude-sonnet-4-5-20250929".into(),
            max_tokens: 2048,
            temperature: Some(0.7),
            messages: vec![Message {
                role: "user".into(),
                content: "Translate this line".into(),
            }],
        };
        let json = serde_json::to_string(&req).unwrap();
        let parsed: GenerationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model, "claude-sonnet-4-5-20250929");
        assert_eq!(parsed.max_tokens, 2048);
        assert_eq!(parsed.temperature, Some(0.7));
        assert_eq!(parsed.messages.len(), 1);
    }

    #[test]
    fn temperature_is_omitted_when_none() {
        let req = GenerationRequest {
            model: "m".into(),
            max_tokens: 16,
            temperature: None,
            messages: vec![],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn content_block_type_field_renames_correctly() {
        let block = ContentBlock::text_block("hello");
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type""#));
        assert!(!json.contains("content_type"));
    }

    #[test]
    fn response_text_joins_all_blocks() {
        let resp = GenerationResponse {
            id: "msg_1".into(),
            content: vec![
                ContentBlock::text_block("foo"),
                ContentBlock::text_block("bar"),
            ],
            model: "test".into(),
            stop_reason: Some("end_turn".into()),
            usage: Usage::default(),
        };
        assert_eq!(resp.text(), "foobar");
    }

    #[test]
    fn response_deserializes_from_api_format() {
        let api_json = r#"{
            "id": "msg_123",
            "content": [{"type": "text", "text": "Response here"}],
            "model": "claude-sonnet-4-5-20250929",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 15}
        }"#;
        let resp: GenerationResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.id, "msg_123");
        assert_eq!(resp.content[0].text, "Response here");
        assert_eq!(resp.usage.output_tokens, 15);
    }

    #[test]
    fn response_null_stop_reason() {
        let json = r#"{
            "id": "msg_456",
            "content": [],
            "model": "test",
            "stop_reason": null,
            "usage": {"input_tokens": 0, "output_tokens": 0}
        }"#;
        let resp: GenerationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.stop_reason, None);
    }
}
