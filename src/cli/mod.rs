//! CLI module for Switchyard
//!
//! Command-line interface definitions and handlers. Every command is offline:
//! it inspects configuration and catalog data, never calls a provider.
//!
//! # Commands
//!
//! - `plan` - Show the route plan for a task
//! - `catalog validate` - Validate a federated provider catalog
//! - `catalog rank` - Dry-run the scoring router over a catalog
//! - `budget agent-state` - Degrade an agent state file under its token ceiling
//! - `config init` - Write an example configuration file
//!
//! # Example
//!
//! ```bash
//! switchyard plan "refactor the parser and fix its tests"
//! switchyard catalog rank --cloud --task-class NON_BASIC --json
//! switchyard budget agent-state state.json --max-tokens 500
//! ```

pub mod budget;
pub mod catalog;
pub mod config;
pub mod output;
pub mod plan;

pub use budget::handle_budget_agent_state;
pub use catalog::{handle_catalog_rank, handle_catalog_validate};
pub use config::handle_config_init;
pub use plan::handle_plan;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::SwitchyardConfig;

/// Switchyard - resilient LLM request routing
#[derive(Parser, Debug)]
#[command(
    name = "switchyard",
    version,
    about = "Route planning, fallback and quota-aware provider ranking for LLM backends"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the route plan for a task
    Plan(PlanArgs),
    /// Federated catalog utilities
    #[command(subcommand)]
    Catalog(CatalogCommands),
    /// Budgeting utilities
    #[command(subcommand)]
    Budget(BudgetCommands),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Task text used for task-class inference
    pub text: String,

    /// Explicit task class (BASIC, NON_BASIC)
    #[arg(short = 't', long)]
    pub task_class: Option<String>,

    /// The task must be served by a Claude backend
    #[arg(long)]
    pub requires_claude: bool,

    /// Disallow network access (local only)
    #[arg(long)]
    pub no_network: bool,

    /// Preferred backend (oath, api, local)
    #[arg(short, long)]
    pub prefer: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    /// Validate a catalog file and report credential status
    Validate(CatalogValidateArgs),
    /// Rank catalog candidates for a hypothetical request
    Rank(CatalogRankArgs),
}

#[derive(Args, Debug)]
pub struct CatalogValidateArgs {
    /// Catalog file (defaults to federation.catalog_path)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Fail when a provider's credential is missing from the environment
    #[arg(long)]
    pub strict: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct CatalogRankArgs {
    /// Request text, used for arousal inference and context size
    #[arg(default_value = "")]
    pub text: String,

    /// Catalog file (defaults to federation.catalog_path)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Task class (BASIC, NON_BASIC); inferred from the text when absent
    #[arg(short = 't', long)]
    pub task_class: Option<String>,

    /// Override the estimated context size in tokens
    #[arg(long)]
    pub context_tokens: Option<u64>,

    /// Latency target (low, normal, relaxed)
    #[arg(long, default_value = "normal")]
    pub latency: String,

    /// Spend ceiling per request in USD
    #[arg(long)]
    pub budget_usd: Option<f64>,

    /// Arousal tier (low, medium, high); inferred from the text when absent
    #[arg(long)]
    pub arousal: Option<String>,

    /// Enable cloud providers regardless of configuration
    #[arg(long)]
    pub cloud: bool,

    /// Treat providers with missing credentials as healthy
    #[arg(long)]
    pub assume_credentials: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum BudgetCommands {
    /// Degrade an agent state (JSON) under the token ceiling
    AgentState(AgentStateArgs),
}

#[derive(Args, Debug)]
pub struct AgentStateArgs {
    /// Agent state JSON file, or `-` for stdin
    pub input: PathBuf,

    /// Override agent_state.max_tokens
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Output the full report as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "switchyard.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Load configuration for a command.
///
/// A missing file means defaults. Environment overrides are applied and the
/// result validated.
pub fn load_config(path: &Path) -> anyhow::Result<SwitchyardConfig> {
    let config = if path.exists() {
        SwitchyardConfig::load(Some(path))
            .with_context(|| format!("loading {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        SwitchyardConfig::default()
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parse_plan_defaults() {
        let cli = Cli::try_parse_from(["switchyard", "plan", "summarize this"]).unwrap();
        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.text, "summarize this");
                assert_eq!(args.config, PathBuf::from("switchyard.toml"));
                assert!(!args.requires_claude);
                assert!(!args.no_network);
                assert!(args.prefer.is_none());
            }
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_cli_parse_plan_flags() {
        let cli = Cli::try_parse_from([
            "switchyard",
            "plan",
            "fix it",
            "--requires-claude",
            "-p",
            "api",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan(args) => {
                assert!(args.requires_claude);
                assert_eq!(args.prefer.as_deref(), Some("api"));
                assert!(args.json);
            }
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_cli_parse_catalog_validate() {
        let cli = Cli::try_parse_from([
            "switchyard",
            "catalog",
            "validate",
            "--catalog",
            "providers.toml",
            "--strict",
        ])
        .unwrap();
        match cli.command {
            Commands::Catalog(CatalogCommands::Validate(args)) => {
                assert_eq!(args.catalog, Some(PathBuf::from("providers.toml")));
                assert!(args.strict);
            }
            _ => panic!("Expected Catalog Validate command"),
        }
    }

    #[test]
    fn test_cli_parse_catalog_rank_defaults() {
        let cli = Cli::try_parse_from(["switchyard", "catalog", "rank"]).unwrap();
        match cli.command {
            Commands::Catalog(CatalogCommands::Rank(args)) => {
                assert_eq!(args.text, "");
                assert_eq!(args.latency, "normal");
                assert!(!args.cloud);
            }
            _ => panic!("Expected Catalog Rank command"),
        }
    }

    #[test]
    fn test_cli_parse_budget_agent_state() {
        let cli = Cli::try_parse_from([
            "switchyard",
            "budget",
            "agent-state",
            "state.json",
            "--max-tokens",
            "300",
        ])
        .unwrap();
        match cli.command {
            Commands::Budget(BudgetCommands::AgentState(args)) => {
                assert_eq!(args.input, PathBuf::from("state.json"));
                assert_eq!(args.max_tokens, Some(300));
            }
            _ => panic!("Expected Budget AgentState command"),
        }
    }

    #[test]
    fn test_cli_parse_config_init() {
        let cli = Cli::try_parse_from(["switchyard", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config(ConfigCommands::Init(args)) => {
                assert!(args.force);
                assert_eq!(args.output, PathBuf::from("switchyard.toml"));
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/switchyard.toml")).unwrap();
        assert!(config.routing.basic_local_first);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[cooldown]\ntimeout_strikes = 0").unwrap();
        let err = load_config(temp.path()).unwrap_err();
        assert!(err.to_string().contains("cooldown"));
    }
}
