use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    OpenAi,
    OpenRouter,
    Ollama,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "gemma2-9b-it",
            ProviderKind::OpenAi => "gpt-4.1-mini",
            ProviderKind::OpenRouter => "openai/gpt-4.1-mini",
            ProviderKind::Ollama => "llama3.1",
            ProviderKind::Anthropic => "claude-haiku-4-5-20251001",
        }
    }

    /// Provider-specific variable consulted when `LLM_API_KEY` is unset.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::OpenRouter => Some("OPENROUTER_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_var().is_some()
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(ProviderKind::Groq),
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "ollama" => Ok(ProviderKind::Ollama),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(AppError::Config(format!(
                "unknown LLM_PROVIDER {other:?} (expected groq, openai, openrouter, ollama or anthropic)"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            other => Err(AppError::Config(format!(
                "unknown REPORT_FORMAT {other:?} (expected markdown or json)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub llm_provider: ProviderKind,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub output_format: OutputFormat,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_provider: ProviderKind = match var("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => ProviderKind::Groq,
        };

        let llm_api_key = var("LLM_API_KEY")
            .or_else(|| llm_provider.api_key_var().and_then(|key| var(key)));

        let max_attempts: u32 = parse_var(&var, "LLM_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(AppError::Config(
                "LLM_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let temperature: f32 = parse_var(&var, "LLM_TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AppError::Config(format!(
                "LLM_TEMPERATURE must be between 0.0 and 2.0, got {temperature}"
            )));
        }

        let timeout_secs: u64 = parse_var(&var, "LLM_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(AppError::Config(
                "LLM_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            environment: var("APP_ENV").unwrap_or_else(|| "development".to_string()),
            llm_provider,
            llm_base_url: var("LLM_BASE_URL")
                .unwrap_or_else(|| llm_provider.default_base_url().to_string()),
            llm_api_key,
            llm_model: var("LLM_MODEL")
                .unwrap_or_else(|| llm_provider.default_model().to_string()),
            temperature,
            max_tokens: parse_var(&var, "LLM_MAX_TOKENS", 4096)?,
            request_timeout: Duration::from_secs(timeout_secs),
            max_attempts,
            output_format: match var("REPORT_FORMAT") {
                Some(raw) => raw.parse()?,
                None => OutputFormat::default(),
            },
            otel_service_name: var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "business-model-stress-tester".to_string()),
            otel_exporter_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.llm_provider, ProviderKind::Groq);
        assert_eq!(config.llm_model, "gemma2-9b-it");
        assert_eq!(config.llm_base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.output_format, OutputFormat::Markdown);
        assert!(config.llm_api_key.is_none());
        assert!(config.otel_exporter_endpoint.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn test_provider_specific_key_fallback() {
        let config = config_from(&[("LLM_PROVIDER", "openai"), ("OPENAI_API_KEY", "sk-test")])
            .unwrap();
        assert_eq!(config.llm_provider, ProviderKind::OpenAi);
        assert_eq!(config.llm_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm_model, "gpt-4.1-mini");
    }

    #[test]
    fn test_generic_key_wins() {
        let config = config_from(&[("LLM_API_KEY", "generic"), ("GROQ_API_KEY", "groq")]).unwrap();
        assert_eq!(config.llm_api_key.as_deref(), Some("generic"));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("LLM_MODEL", "  "), ("LLM_TEMPERATURE", "")]).unwrap();
        assert_eq!(config.llm_model, "gemma2-9b-it");
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LLM_PROVIDER", "Anthropic"),
            ("LLM_BASE_URL", "http://127.0.0.1:9000/v1"),
            ("LLM_MODEL", "claude-sonnet-4-5"),
            ("LLM_TEMPERATURE", "0.2"),
            ("LLM_MAX_ATTEMPTS", "5"),
            ("REPORT_FORMAT", "json"),
            ("APP_ENV", "production"),
        ])
        .unwrap();
        assert_eq!(config.llm_provider, ProviderKind::Anthropic);
        assert_eq!(config.llm_base_url, "http://127.0.0.1:9000/v1");
        assert_eq!(config.llm_model, "claude-sonnet-4-5");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert!(config.is_production());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = config_from(&[("LLM_PROVIDER", "mystery")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let err = config_from(&[("LLM_MAX_TOKENS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("LLM_MAX_TOKENS"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = config_from(&[("LLM_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        for raw in ["2.5", "-0.1"] {
            let err = config_from(&[("LLM_TEMPERATURE", raw)]).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{raw}");
            assert!(err.to_string().contains("LLM_TEMPERATURE"));
        }
        assert_eq!(config_from(&[("LLM_TEMPERATURE", "2")]).unwrap().temperature, 2.0);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = config_from(&[("LLM_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        let config = config_from(&[("LLM_TIMEOUT_SECS", "5")]).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(!ProviderKind::Ollama.requires_api_key());
        assert!(ProviderKind::Groq.requires_api_key());
    }
}
