//! Configuração do Translalia carregada a partir de `translalia.toml`.
//!
//! A struct [`TranslaliaConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `ANTHROPIC_API_KEY` tem precedência sobre o arquivo.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Configuração de nível superior carregada de `translalia.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslaliaConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    /// Modelo padrão para geração.
    #[serde(default = "default_model")]
    pub model: String,

    /// Modelo substituto quando o padrão não está disponível.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Temperatura de amostragem, quando o modelo suporta.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Teto do atraso de backoff em milissegundos.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Máximo de chamadas de geração simultâneas por tick.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout por requisição HTTP, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Máximo de chamadas de geração por janela de rate limit.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Duração da janela de rate limit, em segundos.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: i64,

    /// Quando o contador de rate limit está inacessível:
    /// `false` permite a chamada (fail open), `true` nega (fail closed).
    #[serde(default)]
    pub fail_closed: bool,

    /// Granularidade padrão de segmentação: "line" ou "stanza".
    #[serde(default = "default_granularity")]
    pub granularity: String,

    /// Webhook opcional notificado a cada unidade traduzida.
    #[serde(default)]
    pub notify_url: Option<String>,
}

// Valores padrão: modelos correntes da API Anthropic.
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_fallback_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_rate_limit() -> u32 {
    20
}

fn default_rate_window_secs() -> i64 {
    60
}

fn default_granularity() -> String {
    "line".to_string()
}

impl Default for TranslaliaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            fallback_model: default_fallback_model(),
            temperature: default_temperature(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
            fail_closed: false,
            granularity: default_granularity(),
            notify_url: None,
        }
    }
}

impl TranslaliaConfig {
    /// Carrega a configuração de `translalia.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("translalia.toml"))
    }

    /// Carrega de um caminho explícito, com os mesmos defaults e precedência.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<TranslaliaConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para a chave API.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }

        Ok(config)
    }
}
