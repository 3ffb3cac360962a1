use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{GenerateRequest, GenerateResponse, Provider, ProviderError};
use crate::error::AppError;

/// Chat-completions client for any OpenAI-compatible endpoint
/// (OpenAI, Groq, OpenRouter, Ollama).
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: reqwest::Url,
    api_key: Option<String>,
    provider_name: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        provider_name: &str,
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: super::parse_base_url(base_url)?,
            api_key: api_key.map(str::to_string),
            provider_name: provider_name.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatError {
    error: ChatErrorDetail,
}

#[derive(Deserialize)]
struct ChatErrorDetail {
    message: String,
}

pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ChatError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                ProviderError::Authentication {
                    status: 0,
                    message: format!("invalid API key header: {e}"),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut messages = Vec::with_capacity(2);
        if !req.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &req.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &req.prompt,
        });

        let body = ChatRequest {
            model: &req.model,
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, error_message(&error_body)));
        }

        let resp: ChatResponse = response.json().await?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("response has no choices".into()))?;

        let (input_tokens, output_tokens) = match &resp.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (0, 0),
        };

        Ok(GenerateResponse {
            content: choice.message.content.unwrap_or_default(),
            model: resp.model.unwrap_or_else(|| req.model.clone()),
            input_tokens,
            output_tokens,
            finish_reason: choice.finish_reason.unwrap_or_default(),
            provider: String::new(),
        })
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }
}
