//! Plan command handler

use anyhow::anyhow;

use crate::cli::output::{format_plan_table, to_json};
use crate::cli::PlanArgs;
use crate::config::SwitchyardConfig;
use crate::routing::{plan_route, RouteRequest};

/// Handle `switchyard plan`
pub fn handle_plan(args: &PlanArgs, config: &SwitchyardConfig) -> anyhow::Result<String> {
    let task_class = args
        .task_class
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: String| anyhow!(e))?;
    let preferred_backend = args
        .prefer
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: String| anyhow!(e))?;

    let request = RouteRequest {
        task_class,
        task_text: args.text.clone(),
        requires_claude: args.requires_claude,
        allow_network: !args.no_network,
        preferred_backend,
    };
    let plan = plan_route(&request, &config.routing);

    if args.json {
        to_json(&plan)
    } else {
        Ok(format_plan_table(&plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(text: &str) -> PlanArgs {
        PlanArgs {
            text: text.to_string(),
            task_class: None,
            requires_claude: false,
            no_network: false,
            prefer: None,
            json: true,
            config: PathBuf::from("switchyard.toml"),
        }
    }

    fn plan_json(args: &PlanArgs) -> serde_json::Value {
        let output = handle_plan(args, &SwitchyardConfig::default()).unwrap();
        serde_json::from_str(&output).unwrap()
    }

    #[test]
    fn test_plan_basic_text_goes_local() {
        let plan = plan_json(&args("summarize the meeting notes"));
        assert_eq!(plan["task_class"], "BASIC");
        assert_eq!(plan["candidates"], serde_json::json!(["local"]));
    }

    #[test]
    fn test_plan_code_work_uses_remote_chain() {
        let mut a = args("refactor the parser");
        a.prefer = Some("api".to_string());
        let plan = plan_json(&a);
        assert_eq!(plan["task_class"], "NON_BASIC");
        assert_eq!(plan["candidates"], serde_json::json!(["api", "oath", "local"]));
    }

    #[test]
    fn test_plan_no_network() {
        let mut a = args("refactor the parser");
        a.no_network = true;
        let plan = plan_json(&a);
        assert_eq!(plan["candidates"], serde_json::json!(["local"]));
    }

    #[test]
    fn test_plan_rejects_unknown_backend() {
        let mut a = args("anything");
        a.prefer = Some("mainframe".to_string());
        let err = handle_plan(&a, &SwitchyardConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid backend"));
    }
}
