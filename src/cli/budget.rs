//! Budget command handlers

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use std::io::Read;
use std::path::Path;

use crate::budget::{budget_agent_state, AgentState};
use crate::cli::output::to_json;
use crate::cli::AgentStateArgs;
use crate::config::SwitchyardConfig;

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading agent state from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

/// Handle `switchyard budget agent-state`
///
/// Plain output is the degraded state itself, with the applied actions
/// reported on stderr. `--json` wraps the state in a full report.
pub fn handle_budget_agent_state(
    args: &AgentStateArgs,
    config: &SwitchyardConfig,
) -> anyhow::Result<String> {
    let input = read_input(&args.input)?;
    let state: AgentState =
        serde_json::from_str(&input).context("parsing agent state JSON")?;

    let mut budget_config = config.agent_state.clone();
    if let Some(max_tokens) = args.max_tokens {
        budget_config.max_tokens = max_tokens;
    }

    let before = state.estimated_tokens();
    let budgeted = budget_agent_state(&state, &budget_config);
    let after = budgeted.result.estimated_tokens();

    if args.json {
        return to_json(&json!({
            "ok": budgeted.ok,
            "truncated": budgeted.truncated,
            "applied": budgeted.applied_labels(),
            "note": budgeted.note,
            "ceiling_tokens": budget_config.max_tokens,
            "tokens_before": before,
            "tokens_after": after,
            "state": budgeted.result,
        }));
    }

    let status = if budgeted.ok {
        "fits".green()
    } else {
        "over ceiling".red()
    };
    eprintln!(
        "{} tokens -> {} tokens (ceiling {}): {}",
        before, after, budget_config.max_tokens, status
    );
    for label in budgeted.applied_labels() {
        eprintln!("  - {}", label);
    }
    if let Some(note) = &budgeted.note {
        eprintln!("  {}", note);
    }
    to_json(&budgeted.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_state(value: serde_json::Value) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), value.to_string()).unwrap();
        file
    }

    fn args(input: PathBuf, max_tokens: Option<usize>) -> AgentStateArgs {
        AgentStateArgs {
            input,
            max_tokens,
            json: true,
            config: PathBuf::from("switchyard.toml"),
        }
    }

    #[test]
    fn test_small_state_is_untouched() {
        let file = write_state(json!({ "goal": "ship", "rollingSummary": "short" }));
        let output =
            handle_budget_agent_state(&args(file.path().to_path_buf(), None), &SwitchyardConfig::default())
                .unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["ok"], true);
        assert_eq!(report["truncated"], false);
        assert_eq!(report["applied"], json!([]));
        assert_eq!(report["state"]["goal"], "ship");
    }

    #[test]
    fn test_artifacts_dropped_under_tight_ceiling() {
        let file = write_state(json!({
            "goal": "ship",
            "rollingSummary": "short",
            "artifacts": [{ "name": "log", "content": "x".repeat(4_000) }],
        }));
        let output = handle_budget_agent_state(
            &args(file.path().to_path_buf(), Some(200)),
            &SwitchyardConfig::default(),
        )
        .unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["ok"], true);
        assert_eq!(
            report["applied"],
            json!(["dropped perTask scratch", "cleared scratch", "dropped artifacts"])
        );
        assert_eq!(report["state"]["artifacts"], json!([]));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{not json").unwrap();
        let err = handle_budget_agent_state(
            &args(file.path().to_path_buf(), None),
            &SwitchyardConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("parsing agent state"));
    }
}
