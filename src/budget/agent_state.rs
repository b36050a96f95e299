//! Token-estimate budgeting of agent working state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::{degrade, estimate_tokens, keep_tail, Budgeted, Degradable};
use crate::config::AgentStateConfig;

/// Working state carried between agent steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentState {
    /// Goal statement; never degraded
    pub goal: String,
    pub rolling_summary: String,
    pub scratch: Scratch,
    pub artifacts: Vec<Artifact>,
}

/// Scratch space: per-task entries plus free-form notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scratch {
    pub per_task: BTreeMap<String, Value>,
    pub notes: BTreeMap<String, Value>,
}

impl Scratch {
    pub fn is_empty(&self) -> bool {
        self.per_task.is_empty() && self.notes.is_empty()
    }
}

/// A stored output such as a file body or a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub content: String,
}

impl AgentState {
    /// Estimated token size of the serialized state.
    pub fn estimated_tokens(&self) -> usize {
        let chars = serde_json::to_string(self)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        estimate_tokens(chars)
    }
}

/// Cascade steps for agent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStateAction {
    DropPerTaskScratch,
    ClearScratch,
    DropArtifacts,
    CompressRollingSummary,
}

impl fmt::Display for AgentStateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentStateAction::DropPerTaskScratch => "dropped perTask scratch",
            AgentStateAction::ClearScratch => "cleared scratch",
            AgentStateAction::DropArtifacts => "dropped artifacts",
            AgentStateAction::CompressRollingSummary => "compressed rollingSummary",
        };
        f.write_str(label)
    }
}

impl Degradable for AgentState {
    type Action = AgentStateAction;
    /// Floor for the rolling summary, in chars
    type Params = usize;

    const CASCADE: &'static [AgentStateAction] = &[
        AgentStateAction::DropPerTaskScratch,
        AgentStateAction::ClearScratch,
        AgentStateAction::DropArtifacts,
        AgentStateAction::CompressRollingSummary,
    ];

    fn cost(&self) -> usize {
        self.estimated_tokens()
    }

    fn apply(&mut self, action: AgentStateAction, _ceiling: usize, min_summary_chars: &usize) {
        match action {
            AgentStateAction::DropPerTaskScratch => self.scratch.per_task.clear(),
            AgentStateAction::ClearScratch => self.scratch = Scratch::default(),
            AgentStateAction::DropArtifacts => self.artifacts.clear(),
            AgentStateAction::CompressRollingSummary => {
                self.rolling_summary = keep_tail(&self.rolling_summary, *min_summary_chars);
            }
        }
    }
}

/// Budget `state` under `config.max_tokens`.
pub fn budget_agent_state(
    state: &AgentState,
    config: &AgentStateConfig,
) -> Budgeted<AgentState, AgentStateAction> {
    let budgeted = degrade(state, config.max_tokens, &config.min_summary_chars);
    if budgeted.truncated {
        tracing::debug!(
            applied = ?budgeted.applied_labels(),
            ok = budgeted.ok,
            tokens = budgeted.result.estimated_tokens(),
            ceiling = config.max_tokens,
            "Agent state degraded"
        );
    }
    budgeted
}
