use std::path::Path;

use super::BusinessModelDescription;
use crate::error::AppError;

/// Parses a JSON business model description.
///
/// `source` only labels error messages. Fails when the document is not a JSON
/// object, when `name` is absent, or when `name` is blank.
pub fn parse_description(text: &str, source: &str) -> Result<BusinessModelDescription, AppError> {
    let raw: BusinessModelDescription = serde_json::from_str(text)
        .map_err(|e| AppError::InputParse(format!("{source}: {e}")))?;

    let description = raw.normalized();
    if description.name.is_empty() {
        return Err(AppError::InputParse(format!(
            "{source}: field `name` must not be empty"
        )));
    }

    Ok(description)
}

#[tracing::instrument(name = "input.load_file", skip_all, fields(input.path = %path.display()))]
pub fn load_file(path: &Path) -> Result<BusinessModelDescription, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::InputParse(format!("{}: {e}", path.display())))?;

    let description = parse_description(&text, &path.display().to_string())?;

    tracing::info!(
        business = %description.name,
        competitors = description.competitors.len(),
        "Loaded business model"
    );

    Ok(description)
}
