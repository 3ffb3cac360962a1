use chrono::Utc;
use opentelemetry::KeyValue;
use uuid::Uuid;

use crate::error::AppError;
use crate::input::BusinessModelDescription;
use crate::llm::LlmClient;
use crate::telemetry::metrics::{
    REPORT_GENERATION_DURATION, REPORT_PARSE_OUTCOME, REPORT_SCENARIOS, REPORT_SECTIONS,
};

use super::GenerationSettings;
use super::analyze;
use super::format::{self, FormatParams, Report, ReportMeta};
use super::scenarios::{self, ScenarioCategory};

/// Runs one stress test end to end: optional scenario generation, the
/// analysis request, and mapping of the response onto report sections.
///
/// The description is never modified. Errors from the LLM client are
/// returned unchanged.
#[tracing::instrument(
    name = "pipeline stress_test",
    skip_all,
    fields(
        business.name = %description.name,
        pipeline.staged = staged,
        report.id,
        report.parse_outcome,
        report.duration_ms,
    )
)]
pub async fn run_stress_test(
    llm_client: &LlmClient,
    settings: &GenerationSettings,
    description: &BusinessModelDescription,
    staged: bool,
) -> Result<Report, AppError> {
    let start = std::time::Instant::now();

    // Stage 1 (staged only): scenario generation
    let scenarios: Vec<ScenarioCategory> = if staged {
        scenarios::generate_scenarios(llm_client, settings, description).await?
    } else {
        Vec::new()
    };

    // Stage 2: full analysis
    let analysis = analyze::analyze(
        llm_client,
        settings,
        description,
        staged.then_some(scenarios.as_slice()),
    )
    .await?;

    // Stage 3: section mapping
    let report = format::format_report(FormatParams {
        description,
        content: &analysis.content,
        scenarios: &scenarios,
        meta: ReportMeta {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            provider: analysis.provider,
            model: analysis.model,
            input_tokens: analysis.input_tokens,
            output_tokens: analysis.output_tokens,
        },
    });

    let duration = start.elapsed();
    let outcome = report.parse_outcome.as_str();
    REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[]);
    REPORT_SECTIONS.record(report.sections.len() as f64, &[]);
    REPORT_SCENARIOS.record(report.scenario_count() as f64, &[]);
    REPORT_PARSE_OUTCOME.add(1, &[KeyValue::new("report.parse_outcome", outcome)]);

    let span = tracing::Span::current();
    span.record("report.id", report.id.to_string());
    span.record("report.parse_outcome", outcome);
    span.record("report.duration_ms", duration.as_millis() as u64);

    tracing::info!(
        report.id = %report.id,
        report.sections = report.sections.len(),
        report.parse_outcome = outcome,
        "Stress test complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::input::fixtures::acme;
    use crate::llm::testing::{ScriptedProvider, rate_limited, unauthorized};
    use crate::llm::{ProviderError, RetryPolicy};
    use crate::pipeline::format::ParseOutcome;

    const REPORT_JSON: &str = r#"{
        "executive_summary": "Acme depends on one foundry.",
        "risk_heat_map": [{"scenario": "Chip shortage", "likelihood": "High", "impact": "High"}]
    }"#;

    fn settings() -> GenerationSettings {
        GenerationSettings {
            model: "test-model".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    fn client(provider: Arc<ScriptedProvider>, max_attempts: u32) -> LlmClient {
        LlmClient::new(
            provider,
            RetryPolicy {
                max_attempts,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn test_single_request_flow() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(REPORT_JSON.to_string())]));
        let description = acme();
        let report = assert_ok!(
            run_stress_test(&client(provider.clone(), 3), &settings(), &description, false).await
        );
        assert_eq!(provider.calls(), 1);
        assert_eq!(report.parse_outcome, ParseOutcome::Structured);
        assert_eq!(report.business_name, "Acme Robotics");
        assert_eq!(report.provider, "scripted");
        assert_eq!(report.model, "test-model");
        assert!(report.scenarios.is_empty());
        assert_eq!(description, acme());
    }

    #[tokio::test]
    async fn test_staged_flow_feeds_scenarios_into_analysis() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"Supply Chain Disruptions": ["Foundry fire halts output"]}"#.to_string()),
            Ok(REPORT_JSON.to_string()),
        ]));
        let report = assert_ok!(
            run_stress_test(&client(provider.clone(), 3), &settings(), &acme(), true).await
        );
        assert_eq!(provider.calls(), 2);
        let prompts = provider.prompts();
        assert!(prompts[0].contains("stress test scenarios"));
        assert!(prompts[1].contains("  - Foundry fire halts output"));
        assert_eq!(report.scenarios.len(), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(rate_limited()),
            Ok(REPORT_JSON.to_string()),
        ]));
        assert_ok!(run_stress_test(&client(provider.clone(), 3), &settings(), &acme(), false).await);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempts() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(rate_limited()),
            Err(ProviderError::Timeout("deadline".to_string())),
            Err(rate_limited()),
        ]));
        let err = assert_err!(
            run_stress_test(&client(provider.clone(), 3), &settings(), &acme(), false).await
        );
        assert!(matches!(err, AppError::RequestFailed { attempts: 3, .. }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(unauthorized())]));
        let err = assert_err!(
            run_stress_test(&client(provider.clone(), 3), &settings(), &acme(), true).await
        );
        assert!(matches!(err, AppError::Authentication(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unstructured_response_still_produces_report() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            "I could not format this, but the business looks fragile.".to_string(),
        )]));
        let report = assert_ok!(
            run_stress_test(&client(provider.clone(), 3), &settings(), &acme(), false).await
        );
        assert_eq!(report.parse_outcome, ParseOutcome::Raw);
        assert_eq!(report.sections.len(), 1);
    }
}
