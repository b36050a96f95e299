//! Char-budgeted continuity prompts for small local models.
//!
//! The prompt is rebuilt as pinned system messages, an optional truncation
//! note, an optional state-summary message and a sliding window of the most
//! recent turns. The note and summary are recognised on re-entry so a
//! budgeted prompt fed back in comes out unchanged.

use std::collections::VecDeque;
use std::fmt;

use super::{degrade, keep_tail, Budgeted, Degradable};
use crate::config::ContinuityConfig;
use crate::provider::{ChatMessage, Role};

/// Fixed marker injected whenever anything was dropped or trimmed.
pub const TRUNCATION_NOTE: &str =
    "[continuity] Earlier conversation was truncated to fit the local model context.";

/// Prefix of the state-summary system message.
pub const SUMMARY_PREFIX: &str = "[state summary] ";

/// Cascade steps for chat prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    /// Drop whole window messages, oldest first
    DropOldest,
    /// Trim summary and window content from the front
    TrimHistory,
    /// Trim pinned system messages from the front
    TrimPinned,
}

impl fmt::Display for PromptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptAction::DropOldest => f.write_str("dropped oldest messages"),
            PromptAction::TrimHistory => f.write_str("trimmed history"),
            PromptAction::TrimPinned => f.write_str("trimmed pinned messages"),
        }
    }
}

/// Structured view of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityPrompt {
    pinned: Vec<ChatMessage>,
    note: bool,
    summary: Option<String>,
    window: VecDeque<ChatMessage>,
    dropped_messages: usize,
    trimmed_chars: usize,
}

impl ContinuityPrompt {
    /// Split `messages` into pinned, summary and window parts.
    ///
    /// A fresh `state_summary` replaces any summary message already present.
    /// Only the last `history_turns` non-system messages are kept.
    pub fn assemble(
        messages: &[ChatMessage],
        state_summary: Option<&str>,
        config: &ContinuityConfig,
    ) -> Self {
        let mut pinned = Vec::new();
        let mut note = false;
        let mut carried_summary = None;
        let mut history = Vec::new();

        for message in messages {
            if message.role != Role::System {
                history.push(message.clone());
            } else if message.content == TRUNCATION_NOTE {
                note = true;
            } else if let Some(body) = message.content.strip_prefix(SUMMARY_PREFIX) {
                carried_summary = Some(body.to_string());
            } else {
                pinned.push(message.clone());
            }
        }

        let summary = state_summary
            .map(|s| keep_tail(s.trim(), config.max_summary_chars))
            .or(carried_summary)
            .filter(|s| !s.is_empty());

        let skip = history.len().saturating_sub(config.history_turns);
        let window: VecDeque<ChatMessage> = history.into_iter().skip(skip).collect();

        Self {
            pinned,
            note,
            summary,
            window,
            dropped_messages: skip,
            trimmed_chars: 0,
        }
    }

    /// Flatten back into an outbound message list.
    pub fn render(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.pinned.len() + self.window.len() + 2);
        out.extend(self.pinned.iter().cloned());
        if self.note {
            out.push(ChatMessage::system(TRUNCATION_NOTE));
        }
        if let Some(summary) = &self.summary {
            out.push(ChatMessage::system(format!("{SUMMARY_PREFIX}{summary}")));
        }
        out.extend(self.window.iter().cloned());
        out
    }

    /// Messages dropped from the window, including those outside it.
    pub fn dropped_messages(&self) -> usize {
        self.dropped_messages
    }

    pub fn trimmed_chars(&self) -> usize {
        self.trimmed_chars
    }

    fn summary_cost(&self) -> usize {
        self.summary
            .as_ref()
            .map(|s| SUMMARY_PREFIX.chars().count() + s.chars().count())
            .unwrap_or(0)
    }

    fn note_cost(&self) -> usize {
        if self.note {
            TRUNCATION_NOTE.chars().count()
        } else {
            0
        }
    }

    fn excess(&self, ceiling: usize) -> usize {
        self.cost().saturating_sub(ceiling)
    }

    /// Trim `excess` chars from the front of `content`, returning how many
    /// were removed.
    fn trim_front(content: &mut String, excess: usize) -> usize {
        let len = content.chars().count();
        let cut = excess.min(len);
        *content = keep_tail(content, len - cut);
        cut
    }
}

impl Degradable for ContinuityPrompt {
    type Action = PromptAction;
    type Params = ();

    const CASCADE: &'static [PromptAction] = &[
        PromptAction::DropOldest,
        PromptAction::TrimHistory,
        PromptAction::TrimPinned,
    ];

    fn cost(&self) -> usize {
        let pinned: usize = self.pinned.iter().map(ChatMessage::char_len).sum();
        let window: usize = self.window.iter().map(ChatMessage::char_len).sum();
        pinned + self.note_cost() + self.summary_cost() + window
    }

    fn apply(&mut self, action: PromptAction, ceiling: usize, _params: &()) {
        self.note = true;

        match action {
            PromptAction::DropOldest => {
                while self.cost() > ceiling {
                    if self.window.pop_front().is_none() {
                        break;
                    }
                    self.dropped_messages += 1;
                }
            }
            PromptAction::TrimHistory => {
                let excess = self.excess(ceiling);
                if excess > 0 {
                    if let Some(summary) = self.summary.as_mut() {
                        self.trimmed_chars += Self::trim_front(summary, excess);
                    }
                    if self.summary.as_ref().is_some_and(|s| s.is_empty()) {
                        self.summary = None;
                    }
                }
                for i in 0..self.window.len() {
                    let excess = self.excess(ceiling);
                    if excess == 0 {
                        break;
                    }
                    self.trimmed_chars += Self::trim_front(&mut self.window[i].content, excess);
                }
                self.window.retain(|m| !m.content.is_empty());
            }
            PromptAction::TrimPinned => {
                for i in 0..self.pinned.len() {
                    let excess = self.excess(ceiling);
                    if excess == 0 {
                        break;
                    }
                    self.trimmed_chars += Self::trim_front(&mut self.pinned[i].content, excess);
                }
                self.pinned.retain(|m| !m.content.is_empty());
            }
        }
    }
}

/// Budget a chat prompt under `config.max_chars`.
///
/// The note on the result describes what was dropped when anything was; a
/// failure to fit replaces it with the unrecoverable note.
pub fn budget_prompt(
    messages: &[ChatMessage],
    state_summary: Option<&str>,
    config: &ContinuityConfig,
) -> Budgeted<Vec<ChatMessage>, PromptAction> {
    let prompt = ContinuityPrompt::assemble(messages, state_summary, config);
    let windowed = prompt.dropped_messages() > 0;

    let mut budgeted = degrade(&prompt, config.max_chars, &());
    let result = &budgeted.result;

    // Sliding the window is not a cascade step but still loses history.
    budgeted.truncated |= windowed;

    if budgeted.ok && budgeted.truncated {
        budgeted.note = Some(format!(
            "dropped {} message(s), trimmed {} char(s)",
            result.dropped_messages(),
            result.trimmed_chars()
        ));
        tracing::debug!(
            dropped = result.dropped_messages(),
            trimmed = result.trimmed_chars(),
            ceiling = config.max_chars,
            "Continuity prompt truncated"
        );
    }

    budgeted.map(|p| p.render())
}

/// Total content chars of a message list.
pub fn prompt_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(ChatMessage::char_len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(max_chars: usize) -> ContinuityConfig {
        ContinuityConfig {
            max_chars,
            history_turns: 4,
            max_summary_chars: 40,
        }
    }

    fn conversation(turns: usize, len: usize) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system("You are terse.")];
        for i in 0..turns {
            let body = format!("{i:02}").repeat(len / 2);
            if i % 2 == 0 {
                messages.push(ChatMessage::user(body));
            } else {
                messages.push(ChatMessage::assistant(body));
            }
        }
        messages
    }

    #[test]
    fn compliant_prompt_is_returned_unchanged() {
        let messages = conversation(3, 10);
        let out = budget_prompt(&messages, None, &config(10_000));
        assert!(out.ok);
        assert!(!out.truncated);
        assert!(out.applied.is_empty());
        assert!(out.note.is_none());
        assert_eq!(out.result, messages);
    }

    #[test]
    fn window_keeps_most_recent_turns() {
        let messages = conversation(8, 10);
        let out = budget_prompt(&messages, None, &config(10_000));
        assert!(out.ok);
        assert!(out.truncated);
        // system + 4 most recent turns, no cascade step needed
        assert_eq!(out.result.len(), 5);
        assert!(out.result[1].content.starts_with("04"));
        assert!(out.applied.is_empty());
    }

    #[test]
    fn drops_oldest_messages_first() {
        let messages = conversation(4, 100);
        let ceiling = 14 + TRUNCATION_NOTE.chars().count() + 200;
        let out = budget_prompt(&messages, None, &config(ceiling));

        assert!(out.ok);
        assert_eq!(out.applied, vec![PromptAction::DropOldest]);
        assert_eq!(out.result[0].content, "You are terse.");
        assert_eq!(out.result[1].content, TRUNCATION_NOTE);
        assert_eq!(out.result.len(), 4);
        assert!(prompt_chars(&out.result) <= ceiling);
    }

    #[test]
    fn trims_summary_from_the_front() {
        let messages = vec![ChatMessage::system("sys")];
        let summary = "a".repeat(200) + &"z".repeat(10);
        let ceiling = 3 + TRUNCATION_NOTE.chars().count() + SUMMARY_PREFIX.chars().count() + 10;
        let cfg = ContinuityConfig {
            max_summary_chars: 500,
            ..config(ceiling)
        };

        let out = budget_prompt(&messages, Some(&summary), &cfg);

        assert!(out.ok);
        assert_eq!(
            out.applied,
            vec![PromptAction::DropOldest, PromptAction::TrimHistory]
        );
        let summary_msg = out.result.last().unwrap();
        assert_eq!(summary_msg.content, format!("{SUMMARY_PREFIX}{}", "z".repeat(10)));
        assert_eq!(prompt_chars(&out.result), ceiling);
    }

    #[test]
    fn state_summary_is_clamped_to_its_tail() {
        let summary = format!("{}END", "x".repeat(100));
        let out = budget_prompt(&[], Some(&summary), &config(10_000));
        let body = out.result[0].content.strip_prefix(SUMMARY_PREFIX).unwrap();
        assert_eq!(body.chars().count(), 40);
        assert!(body.ends_with("END"));
    }

    #[test]
    fn pinned_messages_are_trimmed_last_and_note_survives() {
        let messages = vec![
            ChatMessage::system("p".repeat(200)),
            ChatMessage::user("hello"),
        ];
        let ceiling = TRUNCATION_NOTE.chars().count() + 5;
        let out = budget_prompt(&messages, None, &config(ceiling));

        assert!(out.ok);
        assert_eq!(out.applied.len(), 3);
        assert_eq!(out.result[0].content, "p".repeat(5));
        assert_eq!(out.result[1].content, TRUNCATION_NOTE);
    }

    #[test]
    fn ceiling_below_note_reports_failure() {
        let messages = conversation(2, 10);
        let out = budget_prompt(&messages, None, &config(5));
        assert!(!out.ok);
        assert_eq!(out.result, vec![ChatMessage::system(TRUNCATION_NOTE)]);
        assert_eq!(out.note.as_deref(), Some(crate::budget::UNRECOVERABLE_NOTE));
    }

    #[test]
    fn budgeted_output_is_a_fixed_point() {
        let messages = conversation(10, 60);
        let cfg = config(180);
        let first = budget_prompt(&messages, Some("state so far"), &cfg);
        let second = budget_prompt(&first.result, None, &cfg);
        assert_eq!(second.result, first.result);
        assert!(second.applied.is_empty());
    }

    fn arb_message() -> impl Strategy<Value = ChatMessage> {
        (
            prop_oneof![
                Just(Role::System),
                Just(Role::User),
                Just(Role::Assistant),
                Just(Role::Tool)
            ],
            "[a-zé ]{0,80}",
        )
            .prop_map(|(role, content)| ChatMessage::new(role, content))
    }

    proptest! {
        #[test]
        fn prop_budget_is_idempotent(
            messages in prop::collection::vec(arb_message(), 0..12),
            summary in prop::option::of("[a-z ]{0,60}"),
            max_chars in 0usize..400,
            history_turns in 1usize..8,
        ) {
            let cfg = ContinuityConfig { max_chars, history_turns, max_summary_chars: 30 };
            let first = budget_prompt(&messages, summary.as_deref(), &cfg);
            let second = budget_prompt(&first.result, None, &cfg);
            prop_assert_eq!(&second.result, &first.result);
            if first.ok {
                prop_assert!(prompt_chars(&first.result) <= max_chars);
            }
        }
    }
}
