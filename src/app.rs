use std::path::PathBuf;

use chrono::Utc;

use crate::cli::Cli;
use crate::config::{Config, OutputFormat};
use crate::error::{AppError, AppResult};
use crate::input::{self, BusinessModelDescription};
use crate::llm::{self, LlmClient, RetryPolicy};
use crate::output;
use crate::pipeline::prompt::{build_analysis_prompt, build_scenarios_prompt};
use crate::pipeline::{GenerationSettings, render_report, run_stress_test};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Interactive,
}

impl InputSource {
    pub fn from_cli(cli: &Cli) -> Vec<InputSource> {
        if cli.inputs.is_empty() {
            vec![InputSource::Interactive]
        } else {
            cli.inputs.iter().cloned().map(InputSource::File).collect()
        }
    }

    pub async fn load(&self) -> Result<BusinessModelDescription, AppError> {
        match self {
            InputSource::File(path) => input::load_file(path),
            InputSource::Interactive => tokio::task::spawn_blocking(input::prompt_description)
                .await
                .map_err(|e| AppError::Prompt(e.to_string()))?,
        }
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::File(path) => write!(f, "{}", path.display()),
            InputSource::Interactive => f.write_str("interactive input"),
        }
    }
}

/// Where and how one report is written.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub path: Option<PathBuf>,
    pub dir: PathBuf,
    pub format: OutputFormat,
}

impl OutputTarget {
    /// An explicit path is used as given. Default paths never replace an
    /// existing report, so same-named inputs in one batch each keep theirs.
    fn resolve(&self, description: &BusinessModelDescription) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => output::first_free_path(&output::default_output_path(
                &description.name,
                self.format,
                Utc::now(),
                &self.dir,
            )),
        }
    }
}

/// Tests one already-loaded description and writes its report. Returns the
/// path written.
pub async fn stress_test_one(
    llm_client: &LlmClient,
    settings: &GenerationSettings,
    description: &BusinessModelDescription,
    staged: bool,
    target: &OutputTarget,
) -> AppResult<PathBuf> {
    println!("\nStress testing {}...", description.name);

    let report = run_stress_test(llm_client, settings, description, staged).await?;

    if !report.scenarios.is_empty() {
        println!("\nGenerated scenarios:");
        for category in &report.scenarios {
            println!("  {}:", category.name);
            for scenario in &category.scenarios {
                println!("    - {scenario}");
            }
        }
    }

    let rendered = render_report(&report, target.format)?;
    let path = target.resolve(description);
    output::write_report(&path, &rendered)?;

    println!(
        "Report for {} saved to {} ({} sections, {} response)",
        description.name,
        path.display(),
        report.sections.len(),
        report.parse_outcome.as_str()
    );
    Ok(path)
}

fn print_prompts(description: &BusinessModelDescription, staged: bool) {
    if staged {
        println!("--- scenarios prompt: {} ---", description.name);
        println!("{}\n", build_scenarios_prompt(description));
    }
    println!("--- analysis prompt: {} ---", description.name);
    println!("{}\n", build_analysis_prompt(description, None));
}

/// Processes every input in order. Every description is loaded before the
/// first LLM request. A failing input does not stop the batch; the first
/// error is returned once all inputs have been attempted.
pub async fn run(cli: &Cli, config: &Config) -> AppResult<()> {
    run_with(cli, config, || {
        Ok(LlmClient::new(
            llm::build_provider(config)?,
            RetryPolicy::with_max_attempts(config.max_attempts),
        ))
    })
    .await
}

async fn run_with<F>(cli: &Cli, config: &Config, connect: F) -> AppResult<()>
where
    F: FnOnce() -> AppResult<LlmClient>,
{
    let mut first_error: Option<AppError> = None;

    let mut loaded = Vec::new();
    for source in InputSource::from_cli(cli) {
        match source.load().await {
            Ok(description) => loaded.push((source, description)),
            Err(err) => {
                tracing::error!(input = %source, error = %err, error.type = err.kind(), "Failed to load business model");
                eprintln!("Error: {err}");
                first_error.get_or_insert(err);
            }
        }
    }

    if cli.dry_run {
        for (_, description) in &loaded {
            print_prompts(description, cli.staged);
        }
    } else if !loaded.is_empty() {
        let llm_client = connect()?;
        let settings = GenerationSettings::from_config(config);
        let target = OutputTarget {
            path: cli.output.clone(),
            dir: cli.output_dir.clone(),
            format: config.output_format,
        };

        for (source, description) in &loaded {
            let Err(err) =
                stress_test_one(&llm_client, &settings, description, cli.staged, &target).await
            else {
                continue;
            };
            tracing::error!(
                input = %source,
                business = %description.name,
                error = %err,
                error.type = err.kind(),
                "Stress test failed"
            );
            eprintln!("Error: {err}");
            // A rejected credential fails every remaining input the same way.
            if matches!(err, AppError::Authentication(_)) {
                return Err(first_error.unwrap_or(err));
            }
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
