use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;
use crate::input::BusinessModelDescription;
use crate::llm::{GenerateRequest, LlmClient};

use super::GenerationSettings;
use super::format::extract_json;
use super::prompt::{ANALYST_SYSTEM, SCENARIO_CATEGORIES, build_scenarios_prompt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioCategory {
    pub name: String,
    pub scenarios: Vec<String>,
}

#[tracing::instrument(
    name = "pipeline_stage scenarios",
    skip_all,
    fields(
        pipeline.stage = "scenarios",
        business.name = %description.name,
        scenarios.categories,
        scenarios.total,
    )
)]
pub async fn generate_scenarios(
    llm_client: &LlmClient,
    settings: &GenerationSettings,
    description: &BusinessModelDescription,
) -> Result<Vec<ScenarioCategory>, AppError> {
    let resp = llm_client
        .generate(&GenerateRequest {
            model: settings.model.clone(),
            system: ANALYST_SYSTEM.to_string(),
            prompt: build_scenarios_prompt(description),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            stage: "scenarios".to_string(),
        })
        .await?;

    let categories = parse_scenarios(&resp.content);

    let span = tracing::Span::current();
    span.record("scenarios.categories", categories.len());
    span.record(
        "scenarios.total",
        categories.iter().map(|c| c.scenarios.len()).sum::<usize>(),
    );

    if categories.is_empty() {
        tracing::warn!("Model returned no recognizable scenarios");
    }

    Ok(categories)
}

/// Reads scenarios from a JSON object keyed by category, falling back to a
/// line-oriented scan of headings and bullets.
pub fn parse_scenarios(content: &str) -> Vec<ScenarioCategory> {
    match serde_json::from_str::<serde_json::Map<String, Value>>(&extract_json(content)) {
        Ok(map) => order_categories(
            map.into_iter()
                .map(|(name, value)| ScenarioCategory {
                    name,
                    scenarios: scenario_strings(value),
                })
                .filter(|c| !c.scenarios.is_empty())
                .collect(),
        ),
        Err(_) => parse_scenarios_from_text(content),
    }
}

fn scenario_strings(value: Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::String(s) => vec![Value::String(s)],
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Object(obj) => ["scenario", "description", "name", "title"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Known categories first, in their canonical order; anything else after.
fn order_categories(mut categories: Vec<ScenarioCategory>) -> Vec<ScenarioCategory> {
    categories.sort_by_key(|c| {
        SCENARIO_CATEGORIES
            .iter()
            .position(|known| known.eq_ignore_ascii_case(c.name.trim()))
            .unwrap_or(SCENARIO_CATEGORIES.len())
    });
    categories
}

fn bullet_text(line: &str) -> Option<&str> {
    if let Some(rest) = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))
    {
        return Some(rest.trim());
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest
            .strip_prefix('.')
            .or_else(|| rest.strip_prefix(')'))
            .or_else(|| rest.strip_prefix(':'))
        {
            return Some(rest.trim());
        }
    }
    None
}

fn parse_scenarios_from_text(text: &str) -> Vec<ScenarioCategory> {
    let mut result: Vec<ScenarioCategory> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lowered = line.to_lowercase();
        if let Some(category) = SCENARIO_CATEGORIES
            .iter()
            .find(|c| lowered.contains(&c.to_lowercase()))
        {
            // A heading line such as "## 2. Competitor Moves" opens a category.
            if line.len() <= category.len() + 12 {
                match result.iter().position(|c| c.name == *category) {
                    Some(pos) => {
                        let existing = result.remove(pos);
                        result.push(existing);
                    }
                    None => result.push(ScenarioCategory {
                        name: category.to_string(),
                        scenarios: Vec::new(),
                    }),
                }
                continue;
            }
        }

        if let (Some(current), Some(scenario)) = (result.last_mut(), bullet_text(line))
            && !scenario.is_empty()
        {
            current.scenarios.push(scenario.to_string());
        }
    }

    result.retain(|c| !c.scenarios.is_empty());
    order_categories(result)
}
