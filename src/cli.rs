use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, OutputFormat};

/// Stress-test a business model with an LLM and write a risk report
#[derive(Debug, Parser)]
#[command(name = "stress-test")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Business model JSON file; repeat to process several. Prompts interactively when omitted
    #[arg(short, long = "input", value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Report path (single input only)
    #[arg(short, long, value_name = "FILE", conflicts_with = "output_dir")]
    pub output: Option<PathBuf>,

    /// Directory for generated report files
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Report format [default: REPORT_FORMAT or markdown]
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Override LLM_MODEL
    #[arg(long)]
    pub model: Option<String>,

    /// Override LLM_TEMPERATURE
    #[arg(long, value_parser = parse_temperature)]
    pub temperature: Option<f32>,

    /// Generate scenarios first, then analyze them in a second request
    #[arg(long)]
    pub staged: bool,

    /// Print the analysis prompt and exit without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Cross-argument checks clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.output.is_some() && self.inputs.len() > 1 {
            return Err("--output accepts a single input; use --output-dir for batches".to_string());
        }
        Ok(())
    }

    /// Command-line values take precedence over the environment.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.llm_model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
    }
}

fn parse_temperature(raw: &str) -> Result<f32, String> {
    let value: f32 = raw.parse().map_err(|_| format!("`{raw}` is not a number"))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err("temperature must be between 0.0 and 2.0".to_string())
    }
}
