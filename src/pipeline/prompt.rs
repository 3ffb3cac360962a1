use std::fmt::Write as _;

use crate::input::BusinessModelDescription;

use super::scenarios::ScenarioCategory;

pub const ANALYST_SYSTEM: &str = "You are a business analyst expert specializing in \
    stress-testing business models. Respond only with valid JSON.";

pub const SCENARIO_CATEGORIES: [&str; 6] = [
    "Market Conditions",
    "Competitor Moves",
    "Supply Chain Disruptions",
    "Regulatory Changes",
    "Technology Shifts",
    "Consumer Behavior Changes",
];

const REPORT_CONTRACT: &str = r#"Respond with a single JSON object and nothing else, using exactly this structure:
{
  "executive_summary": "3-5 sentence overview of the most important risks",
  "business_model_overview": "short assessment of how the business makes money and where it is exposed",
  "methodology": "how the scenarios were chosen and rated",
  "key_findings": [{"category": "Scenario category", "findings": ["finding"]}],
  "risk_heat_map": [{"scenario": "Short scenario name", "likelihood": "High|Medium|Low", "impact": "High|Medium|Low", "risk_score": 7, "vulnerabilities": ["weakness this scenario exposes"], "contingency_plans": ["plan if this scenario happens"]}],
  "recommendations": ["Concrete strategic recommendation"],
  "roadmap": [{"phase": "Phase name", "timeline": "e.g. 0-3 months", "actions": ["action"]}]
}
Rate likelihood and impact using only High, Medium or Low, and give risk_score as an integer from 1 to 10. List 6 to 12 scenarios in risk_heat_map."#;

/// Renders every non-empty field of the description as plain text lines.
/// Values are embedded verbatim, never escaped or truncated.
pub fn describe(description: &BusinessModelDescription) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "- Name: {}", description.name);

    for (label, value) in description.scalar_fields() {
        if !value.is_empty() {
            let _ = writeln!(out, "- {label}: {value}");
        }
    }

    for (label, items) in description.list_fields() {
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "- {label}:");
        for item in items {
            let _ = writeln!(out, "  - {item}");
        }
    }

    if let Some(financials) = &description.financials {
        let entries: Vec<_> = financials
            .entries()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();
        if !entries.is_empty() {
            let _ = writeln!(out, "- Financials:");
            for (label, value) in entries {
                let _ = writeln!(out, "  - {label}: {value}");
            }
        }
    }

    out
}

/// Single request asking the model for the full stress-test report.
pub fn build_analysis_prompt(
    description: &BusinessModelDescription,
    scenarios: Option<&[ScenarioCategory]>,
) -> String {
    let mut prompt = String::from(
        "Stress-test the following business model. Consider market conditions, \
         competitor moves, supply chain disruptions, regulatory changes, technology \
         shifts and consumer behavior changes. For each scenario, assess likelihood \
         and impact, identify the vulnerabilities it exposes, and propose contingency \
         plans.\n\n",
    );

    prompt.push_str("Business Model Details:\n");
    prompt.push_str(&describe(description));

    if let Some(categories) = scenarios.filter(|c| !c.is_empty()) {
        prompt.push_str("\nScenarios to Analyze:\n");
        for category in categories {
            let _ = writeln!(prompt, "{}:", category.name);
            for scenario in &category.scenarios {
                let _ = writeln!(prompt, "  - {scenario}");
            }
        }
    }

    prompt.push('\n');
    prompt.push_str(REPORT_CONTRACT);
    prompt
}

/// First step of the staged flow: ask only for candidate scenarios.
pub fn build_scenarios_prompt(description: &BusinessModelDescription) -> String {
    let mut prompt = String::from(
        "Based on the following business model, generate realistic stress test \
         scenarios in these categories:\n",
    );
    for (i, category) in SCENARIO_CATEGORIES.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {category}", i + 1);
    }
    prompt.push_str(
        "\nFor each category, provide 3-5 specific, realistic scenarios that could \
         impact this business.\n\nBusiness Model Details:\n",
    );
    prompt.push_str(&describe(description));
    prompt.push_str(
        "\nFormat your response as a JSON object with categories as keys and lists \
         of scenarios as values.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Financials;
    use crate::input::fixtures::acme;

    fn all_values(description: &BusinessModelDescription) -> Vec<String> {
        let mut values = vec![description.name.clone()];
        values.extend(
            description
                .scalar_fields()
                .iter()
                .map(|(_, v)| v.to_string()),
        );
        for (_, items) in description.list_fields() {
            values.extend(items.iter().cloned());
        }
        if let Some(f) = &description.financials {
            values.extend(f.entries().iter().map(|(_, v)| v.to_string()));
        }
        values.into_iter().filter(|v| !v.is_empty()).collect()
    }

    #[test]
    fn test_prompt_contains_every_field_verbatim() {
        let mut description = acme();
        description.financials = Some(Financials {
            annual_revenue: "$4.2M".to_string(),
            runway: "18 months".to_string(),
            ..Default::default()
        });
        let prompt = build_analysis_prompt(&description, None);
        for value in all_values(&description) {
            assert!(prompt.contains(&value), "prompt is missing {value:?}");
        }
    }

    #[test]
    fn test_prompt_keeps_special_characters() {
        let mut description = acme();
        description.value_proposition = r#"Robots "as a service" \ 50% cheaper {fast}"#.to_string();
        description.current_challenges = "Line one\nline two".to_string();
        let prompt = build_analysis_prompt(&description, None);
        assert!(prompt.contains(&description.value_proposition));
        assert!(prompt.contains(&description.current_challenges));
    }

    #[test]
    fn test_prompt_contains_long_values_untruncated() {
        let mut description = acme();
        description.current_challenges = "supply volatility ".repeat(500);
        let prompt = build_analysis_prompt(&description, None);
        assert!(prompt.contains(&description.current_challenges));
    }

    #[test]
    fn test_prompt_verbatim_for_random_descriptions() {
        let mut rng = fastrand::Rng::with_seed(7);
        let word = |rng: &mut fastrand::Rng| -> String {
            let len = rng.usize(1..24);
            (0..len)
                .map(|_| rng.choice(['a', 'Z', '9', ' ', '"', '{', 'é', '-', '|']).unwrap())
                .collect::<String>()
                .trim()
                .to_string()
        };
        for _ in 0..100 {
            let description = BusinessModelDescription {
                name: format!("Biz {}", word(&mut rng)),
                industry: word(&mut rng),
                target_market: word(&mut rng),
                value_proposition: word(&mut rng),
                revenue_streams: (0..rng.usize(0..4)).map(|_| word(&mut rng)).collect(),
                cost_structure: (0..rng.usize(0..4)).map(|_| word(&mut rng)).collect(),
                key_resources: (0..rng.usize(0..4)).map(|_| word(&mut rng)).collect(),
                key_partners: (0..rng.usize(0..4)).map(|_| word(&mut rng)).collect(),
                competitors: (0..rng.usize(0..4)).map(|_| word(&mut rng)).collect(),
                current_challenges: word(&mut rng),
                financials: None,
            }
            .normalized();
            let prompt = build_analysis_prompt(&description, None);
            for value in all_values(&description) {
                assert!(prompt.contains(&value), "prompt is missing {value:?}");
            }
        }
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let description = BusinessModelDescription {
            name: "Solo".to_string(),
            ..Default::default()
        };
        let details = describe(&description);
        assert_eq!(details, "- Name: Solo\n");
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let description = acme();
        assert_eq!(
            build_analysis_prompt(&description, None),
            build_analysis_prompt(&description, None)
        );
    }

    #[test]
    fn test_prompt_embeds_scenarios() {
        let scenarios = vec![ScenarioCategory {
            name: "Supply Chain Disruptions".to_string(),
            scenarios: vec!["Chip shortage lasting two quarters".to_string()],
        }];
        let prompt = build_analysis_prompt(&acme(), Some(&scenarios));
        assert!(prompt.contains("Scenarios to Analyze:"));
        assert!(prompt.contains("  - Chip shortage lasting two quarters"));
    }

    #[test]
    fn test_prompt_asks_for_vulnerabilities_and_contingency_plans() {
        let prompt = build_analysis_prompt(&acme(), None);
        for key in ["\"vulnerabilities\"", "\"contingency_plans\"", "\"risk_score\""] {
            assert!(prompt.contains(key), "prompt is missing {key}");
        }
    }

    #[test]
    fn test_scenarios_prompt_lists_categories() {
        let prompt = build_scenarios_prompt(&acme());
        for category in SCENARIO_CATEGORIES {
            assert!(prompt.contains(category));
        }
        assert!(prompt.contains("Acme Robotics"));
    }
}
