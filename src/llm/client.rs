use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{GenerateRequest, GenerateResponse, Provider, ProviderError};
use crate::error::AppError;
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RETRY_COUNT, GEN_AI_TOKEN_USAGE,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Exponential delay before the retry that follows `attempt` (zero-based),
    /// capped at `max_delay`, without jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        // 25% jitter
        let jitter_ms = fastrand::u64(0..=base.as_millis() as u64 / 4);
        base + Duration::from_millis(jitter_ms)
    }
}

pub struct LlmClient {
    pub provider: Arc<dyn Provider>,
    pub retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn generate_once(
        &self,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        let provider = self.provider.as_ref();
        let provider_name = provider.name().to_string();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let base_url = provider.base_url();
        let server_addr = base_url.host_str().unwrap_or("unknown").to_string();
        let server_port = base_url.port_or_known_default().map(i64::from).unwrap_or(443);

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = %server_addr,
            server.port = server_port,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        {
            let mut user_event_attrs =
                vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))];
            if !req.system.is_empty() {
                user_event_attrs.push(KeyValue::new(
                    "gen_ai.system_instructions",
                    truncate(&req.system, 500),
                ));
            }
            span.add_event("gen_ai.user.message", user_event_attrs);
        }

        let result = provider.generate(req).instrument(span.clone()).await;

        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name.clone();

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name);
                let model_kv = KeyValue::new("gen_ai.request.model", resp.model.clone());

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(duration, &[op_kv, provider_kv, model_kv]);

                Ok(resp)
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.type", err.error_type());

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                        KeyValue::new("error.type", err.error_type()),
                    ],
                );

                Err(err)
            }
        }
    }

    /// Sends `req`, retrying transient failures with exponential backoff.
    /// Authentication and malformed-request errors return after one call.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, AppError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let provider_name = self.provider_name();
        let mut attempt: u32 = 0;

        loop {
            let err = match self.generate_once(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };
            attempt += 1;

            if !err.is_retryable() {
                tracing::error!(
                    attempt,
                    provider = provider_name,
                    model = %req.model,
                    error = %err,
                    "LLM call failed with a non-retryable error"
                );
                return Err(match err {
                    ProviderError::Authentication { .. } => {
                        AppError::Authentication(err.to_string())
                    }
                    other => AppError::InvalidRequest(other.to_string()),
                });
            }

            if attempt >= max_attempts {
                tracing::error!(
                    attempts = attempt,
                    provider = provider_name,
                    model = %req.model,
                    error = %err,
                    "LLM call failed, retry budget exhausted"
                );
                return Err(AppError::RequestFailed {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.retry.backoff(attempt - 1);
            tracing::warn!(
                attempt,
                max_attempts,
                provider = provider_name,
                model = %req.model,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "LLM call failed, retrying"
            );

            GEN_AI_RETRY_COUNT.add(
                1,
                &[
                    KeyValue::new("gen_ai.provider.name", provider_name.to_string()),
                    KeyValue::new("gen_ai.request.model", req.model.clone()),
                    KeyValue::new("error.type", err.error_type()),
                ],
            );

            tokio::time::sleep(delay).await;
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}
