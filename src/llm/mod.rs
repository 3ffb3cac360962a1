pub mod anthropic;
pub mod client;
pub mod openai;

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::{Config, ProviderKind};
use crate::error::AppError;

pub use client::{LlmClient, RetryPolicy};

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stage: String,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
    pub provider: String,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("authentication rejected ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("rate limited ({status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid request ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Maps a non-success HTTP status and its extracted message to an error kind.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        let code = status.as_u16();
        match code {
            401 | 403 => ProviderError::Authentication {
                status: code,
                message,
            },
            408 => ProviderError::Timeout(format!("({code}) {message}")),
            429 => ProviderError::RateLimited {
                status: code,
                message,
            },
            500..=599 => ProviderError::Server {
                status: code,
                message,
            },
            _ => ProviderError::InvalidRequest {
                status: code,
                message,
            },
        }
    }

    /// Rate limits, timeouts, 5xx and dropped connections may clear up on
    /// their own; anything else fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout(_)
                | ProviderError::Server { .. }
                | ProviderError::Network(_)
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ProviderError::Authentication { .. } => "auth_error",
            ProviderError::RateLimited { .. } => "rate_limit",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::InvalidRequest { .. } => "invalid_request",
            ProviderError::Server { .. } => "server_error",
            ProviderError::Network(_) => "network_error",
            ProviderError::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ProviderError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status, err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;
    fn name(&self) -> &str;
    fn base_url(&self) -> &reqwest::Url;
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn parse_base_url(raw: &str) -> Result<reqwest::Url, AppError> {
    reqwest::Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| AppError::Config(format!("invalid LLM_BASE_URL {raw:?}: {e}")))
}

/// Builds the configured provider. A provider that needs a key and has none
/// is rejected here, before any request leaves the process.
pub fn build_provider(config: &Config) -> Result<Arc<dyn Provider>, AppError> {
    let api_key = match (&config.llm_api_key, config.llm_provider.api_key_var()) {
        (Some(key), _) => Some(key.clone()),
        (None, None) => None,
        (None, Some(var)) => {
            return Err(AppError::Authentication(format!(
                "no API key configured for {}: set {var} or LLM_API_KEY",
                config.llm_provider
            )));
        }
    };

    let provider: Arc<dyn Provider> = match config.llm_provider {
        ProviderKind::Anthropic => Arc::new(anthropic::AnthropicProvider::new(
            &config.llm_base_url,
            api_key.as_deref().unwrap_or_default(),
            config.request_timeout,
        )?),
        kind => Arc::new(openai::OpenAiCompatibleProvider::new(
            kind.as_str(),
            &config.llm_base_url,
            api_key.as_deref(),
            config.request_timeout,
        )?),
    };

    tracing::info!(
        provider = provider.name(),
        base_url = %provider.base_url(),
        model = %config.llm_model,
        "LLM provider initialized"
    );

    Ok(provider)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        let cases = vec![
            (401, "auth_error", false),
            (403, "auth_error", false),
            (400, "invalid_request", false),
            (404, "invalid_request", false),
            (422, "invalid_request", false),
            (408, "timeout", true),
            (429, "rate_limit", true),
            (500, "server_error", true),
            (502, "server_error", true),
            (503, "server_error", true),
        ];

        for (code, expected_type, retryable) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            let err = ProviderError::from_status(status, "boom".to_string());
            assert_eq!(err.error_type(), expected_type, "status {code}");
            assert_eq!(err.is_retryable(), retryable, "status {code}");
        }
    }

    #[test]
    fn test_non_status_errors() {
        assert!(ProviderError::Network("connection reset".into()).is_retryable());
        assert!(ProviderError::Timeout("elapsed".into()).is_retryable());
        assert!(!ProviderError::MalformedResponse("no choices".into()).is_retryable());
    }

    #[test]
    fn test_build_provider_requires_key() {
        let config = Config::from_lookup(|_| None).unwrap();
        let err = build_provider(&config).err().unwrap();
        assert!(matches!(err, AppError::Authentication(_)));
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn test_build_provider_ollama_without_key() {
        let config = Config::from_lookup(|key| {
            (key == "LLM_PROVIDER").then(|| "ollama".to_string())
        })
        .unwrap();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url().as_str(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_build_provider_anthropic() {
        let config = Config::from_lookup(|key| match key {
            "LLM_PROVIDER" => Some("anthropic".to_string()),
            "ANTHROPIC_API_KEY" => Some("sk-ant".to_string()),
            _ => None,
        })
        .unwrap();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        assert!(parse_base_url("not a url").is_err());
        assert_eq!(
            parse_base_url("https://api.groq.com/openai/v1/").unwrap().as_str(),
            "https://api.groq.com/openai/v1"
        );
    }
}
