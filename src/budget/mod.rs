//! Progressive degradation budgeting.
//!
//! One algorithm, two instances: a payload is run through an ordered cascade
//! of increasingly destructive actions, stopping as soon as it fits under the
//! ceiling. The result may still be over the ceiling; `ok` says whether it
//! fits. Already-compliant payloads come back unchanged, which makes the
//! whole thing idempotent.
//!
//! - [`continuity`]: chat-message lists under a char ceiling, for small local
//!   models.
//! - [`agent_state`]: agent working state under a token-estimate ceiling.

pub mod agent_state;
pub mod continuity;

pub use agent_state::{budget_agent_state, AgentState, AgentStateAction, Artifact, Scratch};
pub use continuity::{
    budget_prompt, prompt_chars, ContinuityPrompt, PromptAction, SUMMARY_PREFIX, TRUNCATION_NOTE,
};

use std::fmt;

/// Note attached when the cascade ran out of actions.
pub const UNRECOVERABLE_NOTE: &str = "ceiling exceeded; unable to recover";

/// A payload that can be shrunk by an ordered cascade of actions.
pub trait Degradable: Clone {
    /// One step of the cascade.
    type Action: Copy + PartialEq + fmt::Debug + fmt::Display + 'static;
    /// Instance-specific knobs the actions need.
    type Params;

    /// Actions in application order, least destructive first.
    const CASCADE: &'static [Self::Action];

    /// Current size in the ceiling's unit.
    fn cost(&self) -> usize;

    /// Apply one action in place.
    fn apply(&mut self, action: Self::Action, ceiling: usize, params: &Self::Params);
}

/// Outcome of a degradation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Budgeted<T, A> {
    /// The possibly-shrunk payload
    pub result: T,
    /// Whether the result fits under the ceiling
    pub ok: bool,
    /// Whether any action was applied
    pub truncated: bool,
    /// Actions applied, in order
    pub applied: Vec<A>,
    /// Human-readable note about dropped content or failure
    pub note: Option<String>,
}

impl<T, A: fmt::Display> Budgeted<T, A> {
    /// Applied actions rendered as their display strings.
    pub fn applied_labels(&self) -> Vec<String> {
        self.applied.iter().map(|a| a.to_string()).collect()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Budgeted<U, A> {
        Budgeted {
            result: f(self.result),
            ok: self.ok,
            truncated: self.truncated,
            applied: self.applied,
            note: self.note,
        }
    }
}

/// Run the cascade over a copy of `payload`.
pub fn degrade<T: Degradable>(
    payload: &T,
    ceiling: usize,
    params: &T::Params,
) -> Budgeted<T, T::Action> {
    let mut result = payload.clone();
    let mut applied = Vec::new();

    for &action in T::CASCADE {
        if result.cost() <= ceiling {
            break;
        }
        result.apply(action, ceiling, params);
        applied.push(action);
    }

    let ok = result.cost() <= ceiling;
    if !ok {
        tracing::warn!(
            ceiling,
            cost = result.cost(),
            steps = applied.len(),
            "{}",
            UNRECOVERABLE_NOTE
        );
    }

    Budgeted {
        truncated: !applied.is_empty(),
        note: (!ok).then(|| UNRECOVERABLE_NOTE.to_string()),
        ok,
        applied,
        result,
    }
}

/// Token estimate used for agent state: `chars / 4 × 1.1`, rounded up.
pub fn estimate_tokens(chars: usize) -> usize {
    ((chars as f64 / 4.0) * 1.1).ceil() as usize
}

/// Keep the last `keep` chars of `text`.
pub(crate) fn keep_tail(text: &str, keep: usize) -> String {
    let len = text.chars().count();
    if len <= keep {
        return text.to_string();
    }
    text.chars().skip(len - keep).collect()
}
