use std::path::Path;

use chrono::{TimeZone, Utc};
use stress_tester::config::OutputFormat;
use stress_tester::input::load_file;
use stress_tester::pipeline::format::{FormatParams, ParseOutcome, ReportMeta, format_report};
use stress_tester::pipeline::render_report;
use uuid::Uuid;

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn meta() -> ReportMeta {
    ReportMeta {
        id: Uuid::parse_str("6f1c2a3e-0b4d-4c5e-9f7a-1b2c3d4e5f60").unwrap(),
        generated_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        provider: "groq".to_string(),
        model: "gemma2-9b-it".to_string(),
        input_tokens: 1024,
        output_tokens: 2048,
    }
}

fn render_fixture(response: &str) -> (ParseOutcome, String) {
    let description = load_file(
        &Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample_description.json"),
    )
    .unwrap();
    let content = fixture(response);
    let report = format_report(FormatParams {
        description: &description,
        content: &content,
        scenarios: &[],
        meta: meta(),
    });
    let rendered = render_report(&report, OutputFormat::Markdown).unwrap();
    (report.parse_outcome, rendered)
}

#[test]
fn test_structured_response_matches_golden_report() {
    let (outcome, rendered) = render_fixture("sample_response.txt");
    assert_eq!(outcome, ParseOutcome::Structured);
    assert_eq!(rendered, fixture("expected_report.md"));
}

#[test]
fn test_markdown_response_matches_golden_report() {
    let (outcome, rendered) = render_fixture("sample_markdown_response.md");
    assert_eq!(outcome, ParseOutcome::Markdown);
    assert_eq!(rendered, fixture("expected_markdown_report.md"));
}

#[test]
fn test_rendering_twice_is_byte_identical() {
    let (_, first) = render_fixture("sample_response.txt");
    let (_, second) = render_fixture("sample_response.txt");
    assert_eq!(first, second);
}
