use dialoguer::{Confirm, Input};

use super::{BusinessModelDescription, Financials, split_list};
use crate::error::AppError;

fn ask(prompt: &str) -> Result<String, AppError> {
    let answer: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    Ok(answer)
}

fn ask_list(prompt: &str) -> Result<Vec<String>, AppError> {
    Ok(split_list(&ask(&format!("{prompt} (comma separated)"))?))
}

/// Collects a business model description from the terminal, one field at a
/// time. The only validation is a non-empty business name.
pub fn prompt_description() -> Result<BusinessModelDescription, AppError> {
    println!("\n{}", "=".repeat(80));
    println!("{:^80}", "BUSINESS MODEL STRESS TESTER");
    println!("{}\n", "=".repeat(80));
    println!("Please provide details about your business model:\n");

    let name: String = Input::new()
        .with_prompt("Business Name")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("business name must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let mut description = BusinessModelDescription {
        name,
        industry: ask("Industry")?,
        target_market: ask("Target Market/Customer Segment")?,
        value_proposition: ask("Value Proposition")?,
        revenue_streams: ask_list("Revenue Streams")?,
        cost_structure: ask_list("Major Cost Components")?,
        key_resources: ask_list("Key Resources")?,
        key_partners: ask_list("Key Partners/Suppliers")?,
        competitors: ask_list("Main Competitors")?,
        current_challenges: ask("Current Business Challenges")?,
        financials: None,
    };

    let add_financials = Confirm::new()
        .with_prompt("Would you like to add financial metrics?")
        .default(false)
        .interact()?;
    if add_financials {
        description.financials = Some(Financials {
            annual_revenue: ask("Annual Revenue (USD)")?,
            profit_margin: ask("Profit Margin (%)")?,
            burn_rate: ask("Monthly Burn Rate (if applicable)")?,
            runway: ask("Runway in months (if applicable)")?,
        });
    }

    let description = description.normalized();
    tracing::debug!(business = %description.name, "Collected business model interactively");
    Ok(description)
}
