//! Output formatting helpers for CLI commands

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;

use crate::federation::{CatalogEntry, Ranking};
use crate::routing::RoutePlan;

/// View model for catalog validation output
#[derive(Debug, Clone, Serialize)]
pub struct ProviderView {
    pub provider_id: String,
    pub kind: String,
    pub base_url: String,
    pub models: Vec<String>,
    /// `present`, `missing` or `n/a`
    pub credential: String,
    pub breaker: String,
}

impl ProviderView {
    pub fn from_entry(entry: &CatalogEntry, breaker: String) -> Self {
        let credential = if !entry.auth.requires_credential() {
            "n/a"
        } else if entry.auth.credential_present() {
            "present"
        } else {
            "missing"
        };
        Self {
            provider_id: entry.provider_id.clone(),
            kind: entry.kind.as_str().to_string(),
            base_url: entry.base_url.resolve(),
            models: entry.models.iter().map(|m| m.model_id.clone()).collect(),
            credential: credential.to_string(),
            breaker,
        }
    }
}

/// Format a route plan as a table
pub fn format_plan_table(plan: &RoutePlan) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Backend", "Network"]);

    for (i, backend) in plan.candidates.iter().enumerate() {
        let name = if i == 0 {
            backend.as_str().green().bold().to_string()
        } else {
            backend.as_str().to_string()
        };
        let network = if backend.is_remote() { "yes" } else { "no" };
        table.add_row(vec![Cell::new(i + 1), Cell::new(name), Cell::new(network)]);
    }

    format!(
        "Task class: {}\nRationale:  {}\n{}",
        plan.task_class.as_str().cyan(),
        plan.rationale,
        table
    )
}

/// Format catalog providers as a table
pub fn format_providers_table(providers: &[ProviderView]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Provider", "Kind", "Base URL", "Models", "Credential", "Breaker"]);

    for p in providers {
        let credential = match p.credential.as_str() {
            "present" => p.credential.green().to_string(),
            "missing" => p.credential.red().to_string(),
            _ => p.credential.dimmed().to_string(),
        };
        table.add_row(vec![
            Cell::new(&p.provider_id),
            Cell::new(&p.kind),
            Cell::new(&p.base_url),
            Cell::new(p.models.join(", ")),
            Cell::new(credential),
            Cell::new(&p.breaker),
        ]);
    }

    table.to_string()
}

/// Format a ranking as a table followed by its explanation trail
pub fn format_ranking_table(ranking: &Ranking) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Provider", "Model", "Score", "Reasons"]);

    for (i, c) in ranking.candidates.iter().enumerate() {
        let provider = if c.escape_hatch {
            format!("{} (escape hatch)", c.provider_id).yellow().to_string()
        } else if c.is_local {
            c.provider_id.cyan().to_string()
        } else {
            c.provider_id.clone()
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(provider),
            Cell::new(&c.model_id),
            Cell::new(c.score),
            Cell::new(c.reasons.join(", ")),
        ]);
    }

    let mut out = table.to_string();
    if ranking.candidates.is_empty() {
        out.push_str(&format!("\n{}", "No candidate survived ranking".red()));
    }
    out.push_str("\n\nExplanation:");
    for line in &ranking.explanation {
        out.push_str(&format!("\n  {}", line));
    }
    out
}

/// Serialize any view as pretty JSON
pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
