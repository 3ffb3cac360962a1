//! Deterministic rendering of a [`Report`] to markdown or JSON.
//!
//! Output depends only on the report value: identical reports render to
//! identical bytes.

use crate::config::OutputFormat;
use crate::error::AppError;

use super::format::{
    FindingGroup, ProfileRow, Report, RiskEntry, RoadmapPhase, Section, SectionBody, SectionKind,
};
use super::scenarios::ScenarioCategory;

const MISSING_SECTION: &str = "_Not covered in the model response._";
const NOT_RATED: &str = "n/a";

pub fn render_report(report: &Report, format: OutputFormat) -> Result<String, AppError> {
    match format {
        OutputFormat::Markdown => Ok(render_markdown(report)),
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(report)
                .map_err(|e| AppError::OutputWrite(format!("failed to serialize report: {e}")))?;
            out.push('\n');
            Ok(out)
        }
    }
}

pub fn render_markdown(report: &Report) -> String {
    let mut blocks = vec![
        format!("# {}", single_line(&report.title)),
        format!(
            "_Generated {} UTC with {} via {}. Report ID {}._",
            report.generated_at.format("%Y-%m-%d %H:%M"),
            report.model,
            report.provider,
            report.id,
        ),
    ];

    for section in &report.sections {
        render_section(section, &mut blocks);
        // Staged runs list the scenarios they analyzed.
        if matches!(section.kind, SectionKind::Methodology | SectionKind::Analysis)
            && !report.scenarios.is_empty()
        {
            render_scenarios(&report.scenarios, &mut blocks);
        }
    }

    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

fn render_section(section: &Section, blocks: &mut Vec<String>) {
    blocks.push(format!("## {}", section.heading));

    match &section.body {
        SectionBody::Text { text } => blocks.push(text.trim().to_string()),
        SectionBody::Overview {
            assessment,
            profile,
        } => {
            if let Some(text) = assessment {
                blocks.push(text.trim().to_string());
            }
            if !profile.is_empty() {
                blocks.push(profile_table(profile));
            }
            if assessment.is_none() && profile.is_empty() {
                blocks.push(MISSING_SECTION.to_string());
            }
        }
        SectionBody::Findings { groups } => render_findings(groups, blocks),
        SectionBody::RiskTable { entries } => {
            blocks.push(risk_table(entries));
            render_risk_details(entries, blocks);
        }
        SectionBody::Numbered { items } => blocks.push(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {}", i + 1, single_line(item)))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        SectionBody::Roadmap { phases } => render_roadmap(phases, blocks),
        SectionBody::Missing => blocks.push(MISSING_SECTION.to_string()),
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", single_line(item)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_findings(groups: &[FindingGroup], blocks: &mut Vec<String>) {
    for group in groups {
        if !group.category.is_empty() {
            blocks.push(format!("### {}", single_line(&group.category)));
        }
        blocks.push(bullets(&group.findings));
    }
}

fn render_scenarios(categories: &[ScenarioCategory], blocks: &mut Vec<String>) {
    blocks.push("### Scenarios Tested".to_string());
    for category in categories {
        blocks.push(format!("**{}**", single_line(&category.name)));
        blocks.push(bullets(&category.scenarios));
    }
}

/// Per-scenario vulnerabilities and contingency plans, in heat-map order.
fn render_risk_details(entries: &[RiskEntry], blocks: &mut Vec<String>) {
    for entry in entries.iter().filter(|e| e.has_details()) {
        blocks.push(format!("### {}", single_line(&entry.scenario)));
        if let Some(score) = entry.risk_score {
            blocks.push(format!("Risk score: {score}/10"));
        }
        if !entry.vulnerabilities.is_empty() {
            blocks.push("**Vulnerabilities**".to_string());
            blocks.push(bullets(&entry.vulnerabilities));
        }
        if !entry.contingency_plans.is_empty() {
            blocks.push("**Contingency Plans**".to_string());
            blocks.push(bullets(&entry.contingency_plans));
        }
    }
}

fn render_roadmap(phases: &[RoadmapPhase], blocks: &mut Vec<String>) {
    for (i, phase) in phases.iter().enumerate() {
        let name = if phase.phase.is_empty() {
            format!("Phase {}", i + 1)
        } else {
            single_line(&phase.phase)
        };
        if phase.timeline.is_empty() {
            blocks.push(format!("### {name}"));
        } else {
            blocks.push(format!("### {name} ({})", single_line(&phase.timeline)));
        }
        if !phase.actions.is_empty() {
            blocks.push(bullets(&phase.actions));
        }
    }
}

fn profile_table(rows: &[ProfileRow]) -> String {
    let mut lines = vec!["| Field | Details |".to_string(), "| --- | --- |".to_string()];
    for row in rows {
        lines.push(format!("| {} | {} |", cell(&row.field), cell(&row.details)));
    }
    lines.join("\n")
}

fn risk_table(entries: &[RiskEntry]) -> String {
    let mut lines = vec![
        "| Scenario | Likelihood | Impact | Risk Level |".to_string(),
        "| --- | --- | --- | --- |".to_string(),
    ];
    for entry in entries {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            cell(&entry.scenario),
            entry.likelihood.map_or(NOT_RATED, |r| r.label()),
            entry.impact.map_or(NOT_RATED, |r| r.label()),
            entry.risk_level.map_or(NOT_RATED, |l| l.label()),
        ));
    }
    lines.join("\n")
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Table cells cannot contain pipes or line breaks.
fn cell(text: &str) -> String {
    single_line(text).replace('|', "\\|")
}
