use std::cmp::Reverse;
use std::ops::Range;

use chrono::{DateTime, Utc};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::input::BusinessModelDescription;

use super::scenarios::ScenarioCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    ExecutiveSummary,
    BusinessModelOverview,
    Methodology,
    KeyFindings,
    RiskHeatMap,
    Recommendations,
    Roadmap,
    /// Raw model output that could not be mapped onto the sections above.
    Analysis,
}

impl SectionKind {
    pub const ORDERED: [SectionKind; 7] = [
        SectionKind::ExecutiveSummary,
        SectionKind::BusinessModelOverview,
        SectionKind::Methodology,
        SectionKind::KeyFindings,
        SectionKind::RiskHeatMap,
        SectionKind::Recommendations,
        SectionKind::Roadmap,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            SectionKind::ExecutiveSummary => "Executive Summary",
            SectionKind::BusinessModelOverview => "Business Model Overview",
            SectionKind::Methodology => "Methodology",
            SectionKind::KeyFindings => "Key Findings",
            SectionKind::RiskHeatMap => "Risk Heat Map",
            SectionKind::Recommendations => "Recommendations",
            SectionKind::Roadmap => "Roadmap",
            SectionKind::Analysis => "Analysis",
        }
    }

    /// Maps a free-form markdown heading onto a report section.
    pub fn classify(heading: &str) -> Option<SectionKind> {
        let h = heading.trim().to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| h.contains(n));

        if any(&["heat map", "heatmap", "risk matrix"]) {
            Some(SectionKind::RiskHeatMap)
        } else if any(&["executive summary"]) || h == "summary" {
            Some(SectionKind::ExecutiveSummary)
        } else if any(&["methodology", "approach"]) {
            Some(SectionKind::Methodology)
        } else if any(&["finding"]) {
            Some(SectionKind::KeyFindings)
        } else if any(&["recommendation"]) {
            Some(SectionKind::Recommendations)
        } else if any(&["roadmap", "implementation plan", "next steps"]) {
            Some(SectionKind::Roadmap)
        } else if any(&["overview"]) {
            Some(SectionKind::BusinessModelOverview)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Rating {
    Low,
    Medium,
    High,
}

impl Rating {
    pub fn parse(raw: &str) -> Option<Rating> {
        let s = raw.trim().to_lowercase();
        if s.starts_with("very high") || s.starts_with("critical") || s.starts_with("high") {
            Some(Rating::High)
        } else if s.starts_with("med") || s.starts_with("moderate") {
            Some(Rating::Medium)
        } else if s.starts_with("very low") || s.starts_with("low") {
            Some(Rating::Low)
        } else {
            None
        }
    }

    /// Numeric ratings are read on a 1-10 scale.
    fn from_value(value: &Value) -> Option<Rating> {
        match value {
            Value::String(s) => Rating::parse(s),
            Value::Number(n) => match n.as_f64()? {
                x if (0.0..4.0).contains(&x) => Some(Rating::Low),
                x if (4.0..7.0).contains(&x) => Some(Rating::Medium),
                x if (7.0..=10.0).contains(&x) => Some(Rating::High),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn score(&self) -> u8 {
        match self {
            Rating::Low => 1,
            Rating::Medium => 2,
            Rating::High => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rating::Low => "Low",
            Rating::Medium => "Medium",
            Rating::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Product of the two scores: 9 is critical, 6 high, 3-4 medium, 1-2 low.
    pub fn from_ratings(likelihood: Rating, impact: Rating) -> RiskLevel {
        match likelihood.score() * impact.score() {
            9 => RiskLevel::Critical,
            6 => RiskLevel::High,
            3 | 4 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskEntry {
    pub scenario: String,
    pub likelihood: Option<Rating>,
    pub impact: Option<Rating>,
    pub risk_level: Option<RiskLevel>,
    /// Model's own 1-10 score; informational, never used for ordering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contingency_plans: Vec<String>,
}

impl RiskEntry {
    pub fn new(scenario: String, likelihood: Option<Rating>, impact: Option<Rating>) -> Self {
        let risk_level = match (likelihood, impact) {
            (Some(l), Some(i)) => Some(RiskLevel::from_ratings(l, i)),
            _ => None,
        };
        Self {
            scenario,
            likelihood,
            impact,
            risk_level,
            risk_score: None,
            vulnerabilities: Vec::new(),
            contingency_plans: Vec::new(),
        }
    }

    pub fn has_details(&self) -> bool {
        self.risk_score.is_some()
            || !self.vulnerabilities.is_empty()
            || !self.contingency_plans.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingGroup {
    pub category: String,
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadmapPhase {
    pub phase: String,
    pub timeline: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRow {
    pub field: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionBody {
    Text {
        text: String,
    },
    Overview {
        assessment: Option<String>,
        profile: Vec<ProfileRow>,
    },
    Findings {
        groups: Vec<FindingGroup>,
    },
    RiskTable {
        entries: Vec<RiskEntry>,
    },
    Numbered {
        items: Vec<String>,
    },
    Roadmap {
        phases: Vec<RoadmapPhase>,
    },
    Missing,
}

impl SectionBody {
    fn text(text: Option<String>) -> SectionBody {
        match text {
            Some(text) => SectionBody::Text { text },
            None => SectionBody::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub heading: String,
    pub body: SectionBody,
}

impl Section {
    fn new(kind: SectionKind, body: SectionBody) -> Self {
        Self {
            kind,
            heading: kind.heading().to_string(),
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseOutcome {
    Structured,
    Markdown,
    Raw,
}

impl ParseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseOutcome::Structured => "structured",
            ParseOutcome::Markdown => "markdown",
            ParseOutcome::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    pub business_name: String,
    pub generated_at: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub parse_outcome: ParseOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<ScenarioCategory>,
    pub sections: Vec<Section>,
}

impl Report {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn scenario_count(&self) -> usize {
        match self.section(SectionKind::RiskHeatMap).map(|s| &s.body) {
            Some(SectionBody::RiskTable { entries }) => entries.len(),
            _ => 0,
        }
    }
}

pub struct FormatParams<'a> {
    pub description: &'a BusinessModelDescription,
    pub content: &'a str,
    pub scenarios: &'a [ScenarioCategory],
    pub meta: ReportMeta,
}

#[tracing::instrument(
    name = "pipeline_stage format",
    skip(params),
    fields(
        pipeline.stage = "format",
        report.parse_outcome,
        report.sections_count,
    )
)]
pub fn format_report(params: FormatParams<'_>) -> Report {
    let (parse_outcome, sections) = map_sections(params.description, params.content);

    let span = tracing::Span::current();
    span.record("report.parse_outcome", parse_outcome.as_str());
    span.record("report.sections_count", sections.len());

    if parse_outcome == ParseOutcome::Raw {
        tracing::warn!("Model response had no recognizable sections, embedding raw text");
    }

    Report {
        id: params.meta.id,
        title: format!("Business Model Stress Test: {}", params.description.name),
        business_name: params.description.name.clone(),
        generated_at: params.meta.generated_at,
        provider: params.meta.provider,
        model: params.meta.model,
        input_tokens: params.meta.input_tokens,
        output_tokens: params.meta.output_tokens,
        parse_outcome,
        scenarios: params.scenarios.to_vec(),
        sections,
    }
}

fn map_sections(
    description: &BusinessModelDescription,
    content: &str,
) -> (ParseOutcome, Vec<Section>) {
    if let Some(sections) = parse_structured(description, content) {
        return (ParseOutcome::Structured, sections);
    }
    if let Some(sections) = parse_markdown(description, content) {
        return (ParseOutcome::Markdown, sections);
    }
    let raw = content.trim();
    let body = if raw.is_empty() {
        SectionBody::Missing
    } else {
        SectionBody::Text {
            text: raw.to_string(),
        }
    };
    (
        ParseOutcome::Raw,
        vec![Section::new(SectionKind::Analysis, body)],
    )
}

fn profile_rows(description: &BusinessModelDescription) -> Vec<ProfileRow> {
    let mut rows: Vec<(&str, String)> = vec![
        ("Industry", description.industry.clone()),
        ("Target Market", description.target_market.clone()),
        ("Value Proposition", description.value_proposition.clone()),
    ];
    for (label, items) in description.list_fields() {
        rows.push((label, items.join(", ")));
    }
    rows.push(("Current Challenges", description.current_challenges.clone()));
    if let Some(financials) = &description.financials {
        for (label, value) in financials.entries() {
            rows.push((label, value.to_string()));
        }
    }

    rows.into_iter()
        .filter(|(_, details)| !details.is_empty())
        .map(|(field, details)| ProfileRow {
            field: field.to_string(),
            details,
        })
        .collect()
}

fn overview(description: &BusinessModelDescription, assessment: Option<String>) -> SectionBody {
    SectionBody::Overview {
        assessment,
        profile: profile_rows(description),
    }
}

// --- structured (JSON) responses ---

fn parse_structured(
    description: &BusinessModelDescription,
    content: &str,
) -> Option<Vec<Section>> {
    let map: Map<String, Value> = serde_json::from_str(&extract_json(content)).ok()?;

    let executive_summary = map.get("executive_summary").and_then(text_value);
    let assessment = map.get("business_model_overview").and_then(text_value);
    let methodology = map.get("methodology").and_then(text_value);
    let findings = map
        .get("key_findings")
        .map(finding_groups)
        .filter(|g| !g.is_empty());
    let risks = map
        .get("risk_heat_map")
        .map(risk_entries)
        .filter(|r| !r.is_empty());
    let recommendations = map
        .get("recommendations")
        .map(string_items)
        .filter(|r| !r.is_empty());
    let roadmap = map
        .get("roadmap")
        .map(roadmap_phases)
        .filter(|r| !r.is_empty());

    let found_any = executive_summary.is_some()
        || assessment.is_some()
        || methodology.is_some()
        || findings.is_some()
        || risks.is_some()
        || recommendations.is_some()
        || roadmap.is_some();
    if !found_any {
        return None;
    }

    Some(vec![
        Section::new(
            SectionKind::ExecutiveSummary,
            SectionBody::text(executive_summary),
        ),
        Section::new(
            SectionKind::BusinessModelOverview,
            overview(description, assessment),
        ),
        Section::new(SectionKind::Methodology, SectionBody::text(methodology)),
        Section::new(
            SectionKind::KeyFindings,
            findings.map_or(SectionBody::Missing, |groups| SectionBody::Findings {
                groups,
            }),
        ),
        Section::new(
            SectionKind::RiskHeatMap,
            risks.map_or(SectionBody::Missing, |entries| SectionBody::RiskTable {
                entries,
            }),
        ),
        Section::new(
            SectionKind::Recommendations,
            recommendations.map_or(SectionBody::Missing, |items| SectionBody::Numbered {
                items,
            }),
        ),
        Section::new(
            SectionKind::Roadmap,
            roadmap.map_or(SectionBody::Missing, |phases| SectionBody::Roadmap {
                phases,
            }),
        ),
    ])
}

fn clean(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_value).collect();
            (!parts.is_empty()).then(|| parts.join("\n\n"))
        }
        _ => None,
    }
}

fn field_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str).and_then(clean))
}

fn string_items(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::String(s) => return clean(s).into_iter().collect(),
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => clean(s),
            Value::Object(obj) => {
                let title = field_str(obj, &["recommendation", "title", "action", "name"]);
                let detail = field_str(obj, &["description", "details", "rationale"]);
                match (title, detail) {
                    (Some(t), Some(d)) => Some(format!("{t}: {d}")),
                    (t, d) => t.or(d),
                }
            }
            _ => None,
        })
        .collect()
}

fn finding_groups(value: &Value) -> Vec<FindingGroup> {
    match value {
        Value::Array(items) => {
            let mut groups = Vec::new();
            let mut loose = Vec::new();
            for item in items {
                match item {
                    Value::Object(obj) => {
                        let category = field_str(obj, &["category", "name", "title"])
                            .unwrap_or_default();
                        let findings = ["findings", "items", "points"]
                            .iter()
                            .find_map(|key| obj.get(*key))
                            .map(string_items)
                            .unwrap_or_default();
                        if !findings.is_empty() {
                            groups.push(FindingGroup { category, findings });
                        }
                    }
                    other => loose.extend(string_items(other)),
                }
            }
            if !loose.is_empty() {
                groups.push(FindingGroup {
                    category: String::new(),
                    findings: loose,
                });
            }
            groups
        }
        Value::Object(obj) => obj
            .iter()
            .map(|(category, findings)| FindingGroup {
                category: category.clone(),
                findings: string_items(findings),
            })
            .filter(|g| !g.findings.is_empty())
            .collect(),
        Value::String(_) => {
            let findings = string_items(value);
            if findings.is_empty() {
                Vec::new()
            } else {
                vec![FindingGroup {
                    category: String::new(),
                    findings,
                }]
            }
        }
        _ => Vec::new(),
    }
}

fn risk_entries(value: &Value) -> Vec<RiskEntry> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    let mut entries: Vec<RiskEntry> = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let scenario = field_str(obj, &["scenario", "name", "title", "description"])?;
            let rating = |key: &str| obj.get(key).and_then(Rating::from_value);
            let list = |keys: &[&str]| {
                keys.iter()
                    .find_map(|key| obj.get(*key))
                    .map(string_items)
                    .unwrap_or_default()
            };
            Some(RiskEntry {
                risk_score: obj.get("risk_score").and_then(risk_score),
                vulnerabilities: list(&["vulnerabilities", "weaknesses"]),
                contingency_plans: list(&["contingency_plans", "contingencies", "mitigations"]),
                ..RiskEntry::new(scenario, rating("likelihood"), rating("impact"))
            })
        })
        .collect();
    entries.sort_by_key(|e| Reverse(e.risk_level));
    entries
}

fn risk_score(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches("/10").trim().parse().ok()?,
        _ => return None,
    };
    (1.0..=10.0)
        .contains(&score)
        .then(|| score.round() as u8)
}

fn roadmap_phases(value: &Value) -> Vec<RoadmapPhase> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => {
                let phase = field_str(obj, &["phase", "name", "title"]).unwrap_or_default();
                let timeline = field_str(obj, &["timeline", "timeframe", "duration"])
                    .unwrap_or_default();
                let actions = ["actions", "steps", "tasks"]
                    .iter()
                    .find_map(|key| obj.get(*key))
                    .map(string_items)
                    .unwrap_or_default();
                (!phase.is_empty() || !actions.is_empty()).then_some(RoadmapPhase {
                    phase,
                    timeline,
                    actions,
                })
            }
            Value::String(s) => clean(s).map(|phase| RoadmapPhase {
                phase,
                timeline: String::new(),
                actions: Vec::new(),
            }),
            _ => None,
        })
        .collect()
}

// --- markdown responses ---

struct MarkdownHeading {
    range: Range<usize>,
    level: u8,
    text: String,
}

fn markdown_headings(content: &str) -> Vec<MarkdownHeading> {
    let mut headings = Vec::new();
    let mut current: Option<MarkdownHeading> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(MarkdownHeading {
                    range,
                    level: level as u8,
                    text: String::new(),
                })
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(heading) = current.take() {
                    headings.push(heading);
                }
            }
            _ => {}
        }
    }

    headings
}

/// Text of `span` with headings at or above `section_level` turned into bold
/// paragraphs, so they never read as report sections. With `drop_titles`,
/// headings above `section_level` are dropped instead.
fn excerpt(
    content: &str,
    span: Range<usize>,
    headings: &[MarkdownHeading],
    section_level: u8,
    drop_titles: bool,
) -> Option<String> {
    let mut parts = Vec::new();
    let mut cursor = span.start;
    for heading in headings.iter().filter(|h| {
        h.level <= section_level && h.range.start >= span.start && h.range.end <= span.end
    }) {
        parts.extend(content.get(cursor..heading.range.start).and_then(clean));
        if !(drop_titles && heading.level < section_level)
            && let Some(text) = clean(&heading.text)
        {
            parts.push(format!("**{text}**"));
        }
        cursor = heading.range.end;
    }
    parts.extend(content.get(cursor..span.end).and_then(clean));
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

fn parse_markdown(description: &BusinessModelDescription, content: &str) -> Option<Vec<Section>> {
    let headings = markdown_headings(content);
    // The first recognized heading fixes the section level; deeper headings
    // belong to the section they appear in.
    let section_level = headings
        .iter()
        .find(|h| SectionKind::classify(&h.text).is_some())?
        .level;

    let mut boundaries: Vec<(SectionKind, Range<usize>)> = Vec::new();
    for heading in headings.iter().filter(|h| h.level <= section_level) {
        if let Some(kind) = SectionKind::classify(&heading.text)
            && !boundaries.iter().any(|(seen, _)| *seen == kind)
        {
            boundaries.push((kind, heading.range.clone()));
        }
    }

    let preamble_end = boundaries.first().map_or(0, |(_, range)| range.start);
    let preamble = excerpt(content, 0..preamble_end, &headings, section_level, true);

    let body_of = |kind: SectionKind| -> Option<String> {
        let idx = boundaries.iter().position(|(k, _)| *k == kind)?;
        let start = boundaries[idx].1.end;
        let end = boundaries
            .get(idx + 1)
            .map_or(content.len(), |(_, next)| next.start);
        excerpt(content, start..end.max(start), &headings, section_level, false)
    };

    Some(
        SectionKind::ORDERED
            .iter()
            .map(|&kind| {
                let body = match kind {
                    // Text ahead of the first section opens the summary.
                    SectionKind::ExecutiveSummary => match (preamble.clone(), body_of(kind)) {
                        (Some(lead), Some(summary)) => Some(format!("{lead}\n\n{summary}")),
                        (lead, summary) => lead.or(summary),
                    },
                    _ => body_of(kind),
                };
                let body = if kind == SectionKind::BusinessModelOverview {
                    overview(description, body)
                } else {
                    SectionBody::text(body)
                };
                Section::new(kind, body)
            })
            .collect(),
    )
}

pub(crate) fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json")
        && let Some(end) = content[start + 7..].find("```")
    {
        return content[start + 7..start + 7 + end].trim().to_string();
    }
    if let Some(start) = content.find("```")
        && let Some(end) = content[start + 3..].find("```")
    {
        let inner = content[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let Some(start) = content.find('{')
        && let Some(end) = content.rfind('}')
        && start < end
    {
        return content[start..=end].to_string();
    }
    content.to_string()
}
