//! Business model input: the canonical record and the two ways of obtaining
//! one (a JSON file or interactive prompts).

pub mod file;
pub mod interactive;

use serde::{Deserialize, Deserializer, Serialize};

pub use file::{load_file, parse_description};
pub use interactive::prompt_description;

/// Canonical description of the business being stress-tested.
///
/// Only `name` is required; every other field defaults to empty. Values are
/// normalized once at load time and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessModelDescription {
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub target_market: String,
    #[serde(default)]
    pub value_proposition: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub revenue_streams: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub cost_structure: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub key_resources: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub key_partners: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub current_challenges: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financials: Option<Financials>,
}

/// Optional headline numbers, kept as free text ("$1.2M", "18 months").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Financials {
    #[serde(default)]
    pub annual_revenue: String,
    #[serde(default)]
    pub profit_margin: String,
    #[serde(default)]
    pub burn_rate: String,
    #[serde(default)]
    pub runway: String,
}

impl Financials {
    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, value)| value.is_empty())
    }

    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("Annual Revenue", self.annual_revenue.as_str()),
            ("Profit Margin", self.profit_margin.as_str()),
            ("Burn Rate", self.burn_rate.as_str()),
            ("Runway", self.runway.as_str()),
        ]
    }
}

impl BusinessModelDescription {
    /// Scalar fields in presentation order.
    pub fn scalar_fields(&self) -> [(&'static str, &str); 4] {
        [
            ("Industry", self.industry.as_str()),
            ("Target Market", self.target_market.as_str()),
            ("Value Proposition", self.value_proposition.as_str()),
            ("Current Challenges", self.current_challenges.as_str()),
        ]
    }

    /// List fields in presentation order.
    pub fn list_fields(&self) -> [(&'static str, &[String]); 5] {
        [
            ("Revenue Streams", self.revenue_streams.as_slice()),
            ("Cost Structure", self.cost_structure.as_slice()),
            ("Key Resources", self.key_resources.as_slice()),
            ("Key Partners", self.key_partners.as_slice()),
            ("Competitors", self.competitors.as_slice()),
        ]
    }

    /// Trims scalar values, drops blank list entries, and discards a
    /// financials block with nothing in it.
    pub fn normalized(mut self) -> Self {
        for value in [
            &mut self.name,
            &mut self.industry,
            &mut self.target_market,
            &mut self.value_proposition,
            &mut self.current_challenges,
        ] {
            trim_in_place(value);
        }
        for list in [
            &mut self.revenue_streams,
            &mut self.cost_structure,
            &mut self.key_resources,
            &mut self.key_partners,
            &mut self.competitors,
        ] {
            *list = normalize_list(std::mem::take(list));
        }
        self.financials = self.financials.take().and_then(|mut f| {
            for value in [
                &mut f.annual_revenue,
                &mut f.profit_margin,
                &mut f.burn_rate,
                &mut f.runway,
            ] {
                trim_in_place(value);
            }
            (!f.is_empty()).then_some(f)
        });
        self
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn normalize_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Accepts either a JSON array or a single comma-separated string.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::One(joined)) => split_list(&joined),
        Some(Raw::Many(items)) => items,
        None => Vec::new(),
    })
}

/// Splits a comma-separated answer into trimmed, non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    normalize_list(raw.split(',').map(str::to_string).collect())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" leases, ,maintenance ,, data "),
            vec!["leases", "maintenance", "data"]
        );
        assert!(split_list("").is_empty());
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_normalized_trims_fields() {
        let description = BusinessModelDescription {
            name: "  Acme  ".to_string(),
            revenue_streams: vec![" leases ".to_string(), "   ".to_string()],
            ..Default::default()
        }
        .normalized();
        assert_eq!(description.name, "Acme");
        assert_eq!(description.revenue_streams, vec!["leases"]);
    }

    #[test]
    fn test_normalized_drops_empty_financials() {
        let description = BusinessModelDescription {
            name: "Acme".to_string(),
            financials: Some(Financials {
                runway: "  ".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
        .normalized();
        assert!(description.financials.is_none());
    }

    #[test]
    fn test_normalized_keeps_partial_financials() {
        let description = BusinessModelDescription {
            name: "Acme".to_string(),
            financials: Some(Financials {
                annual_revenue: " $2M ".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
        .normalized();
        assert_eq!(description.financials.unwrap().annual_revenue, "$2M");
    }

    #[test]
    fn test_field_accessors_cover_record() {
        let description = fixtures::acme();
        assert_eq!(description.scalar_fields().len(), 4);
        assert_eq!(description.list_fields()[4].1, ["FANUC", "Universal Robots"]);
    }
}
