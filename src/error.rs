use std::process::ExitCode;

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Input parse error: {0}")]
    InputParse(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid LLM request: {0}")]
    InvalidRequest(String),

    #[error("LLM request failed after {attempts} attempt(s): {source}")]
    RequestFailed {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Output write error: {0}")]
    OutputWrite(String),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::InputParse(_) | AppError::Prompt(_) => 2,
            AppError::Config(_) => 3,
            AppError::Authentication(_) => 4,
            AppError::InvalidRequest(_) | AppError::RequestFailed { .. } => 5,
            AppError::OutputWrite(_) => 6,
        }
    }

    /// Short label used for log fields and span attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InputParse(_) => "input_parse",
            AppError::Prompt(_) => "prompt",
            AppError::Config(_) => "config",
            AppError::Authentication(_) => "auth_error",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::RequestFailed { .. } => "request_failed",
            AppError::OutputWrite(_) => "output_write",
        }
    }
}

impl From<&AppError> for ExitCode {
    fn from(err: &AppError) -> Self {
        ExitCode::from(err.exit_code())
    }
}

impl From<dialoguer::Error> for AppError {
    fn from(err: dialoguer::Error) -> Self {
        AppError::Prompt(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
