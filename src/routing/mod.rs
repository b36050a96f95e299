//! Route planning for primary backends
//!
//! Decides the ordered candidate list for a single request among the two
//! primary remote backends and the always-available local backend. Planning
//! is pure: no I/O, deterministic for identical inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod intent;

pub use intent::{infer, infer_task_class, Inference};

use crate::config::RoutingConfig;

/// Coarse routing category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskClass {
    /// Cheap, simple work.
    Basic,
    /// Complex or high-stakes work.
    NonBasic,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Basic => "BASIC",
            TaskClass::NonBasic => "NON_BASIC",
        }
    }
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "BASIC" => Ok(TaskClass::Basic),
            "NON_BASIC" | "NONBASIC" => Ok(TaskClass::NonBasic),
            _ => Err(format!("Invalid task class: {}", s)),
        }
    }
}

/// Primary backend slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// Primary remote reached through the subscription (OAuth) session.
    Oath,
    /// Primary remote reached through a metered API key.
    Api,
    /// Always-available local backend.
    Local,
}

impl BackendId {
    pub const ALL: [BackendId; 3] = [BackendId::Oath, BackendId::Api, BackendId::Local];

    /// The two remote primaries, in fallback order.
    pub const REMOTES: [BackendId; 2] = [BackendId::Oath, BackendId::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Oath => "oath",
            BackendId::Api => "api",
            BackendId::Local => "local",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, BackendId::Local)
    }

    pub fn is_remote(&self) -> bool {
        !self.is_local()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oath" => Ok(BackendId::Oath),
            "api" => Ok(BackendId::Api),
            "local" => Ok(BackendId::Local),
            _ => Err(format!("Invalid backend: {}", s)),
        }
    }
}

/// Planner input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Explicit task class; inferred from `task_text` when absent.
    pub task_class: Option<TaskClass>,
    pub task_text: String,
    pub requires_claude: bool,
    pub allow_network: bool,
    pub preferred_backend: Option<BackendId>,
}

/// One request's routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub task_class: TaskClass,
    pub requires_claude: bool,
    pub allow_network: bool,
    /// First candidate after the preference hint was applied.
    pub preferred_backend: BackendId,
    /// Ordered fallback chain. Never empty.
    pub candidates: Vec<BackendId>,
    pub rationale: String,
}

impl RoutePlan {
    /// True when policy restricts this request to the local backend.
    pub fn is_local_only(&self) -> bool {
        self.candidates == [BackendId::Local]
    }
}

/// Build the route plan for a request.
pub fn plan_route(request: &RouteRequest, config: &RoutingConfig) -> RoutePlan {
    let (task_class, inference) = match request.task_class {
        Some(task_class) => (task_class, None),
        None => {
            let inference = infer(&request.task_text);
            (inference.task_class, Some(inference))
        }
    };

    let (mut candidates, mut rationale) = if !request.allow_network {
        (vec![BackendId::Local], "network disallowed: local only".to_string())
    } else if task_class == TaskClass::Basic
        && !request.requires_claude
        && config.basic_local_first
    {
        (vec![BackendId::Local], "basic task: local first".to_string())
    } else {
        (
            vec![BackendId::Oath, BackendId::Api, BackendId::Local],
            format!("{} task: remote chain", task_class),
        )
    };

    if let Some(inference) = &inference {
        rationale.push_str(&format!("; {}", inference.reason()));
    }

    if let Some(hint) = request.preferred_backend {
        let local_only = candidates == [BackendId::Local];
        match candidates.iter().position(|c| *c == hint) {
            Some(_) if local_only && hint.is_remote() => {
                tracing::debug!(hint = %hint, "Ignoring remote preference under local-only policy");
            }
            Some(0) => {}
            Some(index) => {
                let preferred = candidates.remove(index);
                candidates.insert(0, preferred);
                rationale.push_str(&format!("; preferred {} moved first", preferred));
            }
            None => {
                tracing::debug!(hint = %hint, "Preferred backend is not a valid candidate");
            }
        }
    }

    RoutePlan {
        task_class,
        requires_claude: request.requires_claude,
        allow_network: request.allow_network,
        preferred_backend: candidates[0],
        candidates,
        rationale,
    }
}
