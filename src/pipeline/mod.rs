pub mod analyze;
pub mod format;
pub mod orchestrator;
pub mod prompt;
pub mod render;
pub mod scenarios;

use crate::config::Config;

pub use format::{Report, SectionKind};
pub use orchestrator::run_stress_test;
pub use render::render_report;

/// Model parameters shared by every request in one stress test.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}
