use crate::error::AppError;
use crate::input::BusinessModelDescription;
use crate::llm::{GenerateRequest, LlmClient};

use super::GenerationSettings;
use super::prompt::{ANALYST_SYSTEM, build_analysis_prompt};
use super::scenarios::ScenarioCategory;

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[tracing::instrument(
    name = "pipeline_stage analyze",
    skip_all,
    fields(
        pipeline.stage = "analyze",
        business.name = %description.name,
        analysis.prompt_chars,
        analysis.response_chars,
    )
)]
pub async fn analyze(
    llm_client: &LlmClient,
    settings: &GenerationSettings,
    description: &BusinessModelDescription,
    scenarios: Option<&[ScenarioCategory]>,
) -> Result<AnalysisResult, AppError> {
    let prompt = build_analysis_prompt(description, scenarios);

    let span = tracing::Span::current();
    span.record("analysis.prompt_chars", prompt.chars().count());

    let resp = llm_client
        .generate(&GenerateRequest {
            model: settings.model.clone(),
            system: ANALYST_SYSTEM.to_string(),
            prompt,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            stage: "analyze".to_string(),
        })
        .await?;

    span.record("analysis.response_chars", resp.content.chars().count());

    Ok(AnalysisResult {
        content: resp.content,
        model: resp.model,
        provider: resp.provider,
        input_tokens: resp.input_tokens,
        output_tokens: resp.output_tokens,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::input::fixtures::acme;
    use crate::llm::RetryPolicy;
    use crate::llm::testing::{ScriptedProvider, unauthorized};

    fn settings() -> GenerationSettings {
        GenerationSettings {
            model: "test-model".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> LlmClient {
        LlmClient::new(
            provider,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn test_analyze_returns_raw_content() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("the analysis".to_string())]));
        let result = assert_ok!(analyze(&client(provider.clone()), &settings(), &acme(), None).await);
        assert_eq!(result.content, "the analysis");
        assert_eq!(result.model, "test-model");
        assert_eq!(result.provider, "scripted");
        assert_eq!(result.input_tokens, 120);
        assert_eq!(result.output_tokens, 80);
        assert_eq!(provider.calls(), 1);
        assert!(provider.prompts()[0].contains("Acme Robotics"));
    }

    #[tokio::test]
    async fn test_analyze_propagates_auth_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(unauthorized())]));
        let err = assert_err!(analyze(&client(provider.clone()), &settings(), &acme(), None).await);
        assert!(matches!(err, AppError::Authentication(_)));
        assert_eq!(provider.calls(), 1);
    }
}
