use clap::Parser;
use std::path::Path;
use switchyard::cli::{
    handle_budget_agent_state, handle_catalog_rank, handle_catalog_validate, handle_config_init,
    handle_plan, load_config, BudgetCommands, CatalogCommands, Cli, Commands, ConfigCommands,
};
use switchyard::config::SwitchyardConfig;

fn configured(path: &Path) -> anyhow::Result<SwitchyardConfig> {
    let config = load_config(path)?;
    // A second init in the same process is harmless; ignore it.
    let _ = switchyard::logging::init_tracing(&config.logging);
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<String> {
    match cli.command {
        Commands::Plan(args) => handle_plan(&args, &configured(&args.config)?),
        Commands::Catalog(cmd) => match cmd {
            CatalogCommands::Validate(args) => {
                handle_catalog_validate(&args, &configured(&args.config)?)
            }
            CatalogCommands::Rank(args) => handle_catalog_rank(&args, &configured(&args.config)?),
        },
        Commands::Budget(cmd) => match cmd {
            BudgetCommands::AgentState(args) => {
                handle_budget_agent_state(&args, &configured(&args.config)?)
            }
        },
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Init(args) => handle_config_init(&args),
        },
    }
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
