//! Outbound prompt audit entries.
//!
//! An entry identifies the exact payload by hash and describes its shape. It
//! never carries message content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::provider::{ChatMessage, Role};
use crate::routing::BackendId;

/// Size breakdown by role, in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBreakdown {
    pub system: usize,
    pub user: usize,
    pub assistant: usize,
    pub tool: usize,
}

impl SizeBreakdown {
    pub fn total(&self) -> usize {
        self.system + self.user + self.assistant + self.tool
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptAudit {
    pub backend: BackendId,
    /// Hex SHA-256 over roles and contents
    pub sha256: String,
    pub message_count: usize,
    pub total_chars: usize,
    pub breakdown: SizeBreakdown,
    /// Prompt went through continuity budgeting
    pub budgeted: bool,
    pub timestamp: DateTime<Utc>,
}

impl PromptAudit {
    pub fn new(
        backend: BackendId,
        messages: &[ChatMessage],
        budgeted: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut breakdown = SizeBreakdown::default();
        for message in messages {
            let chars = message.char_len();
            match message.role {
                Role::System => breakdown.system += chars,
                Role::User => breakdown.user += chars,
                Role::Assistant => breakdown.assistant += chars,
                Role::Tool => breakdown.tool += chars,
            }
        }

        Self {
            backend,
            sha256: prompt_hash(messages),
            message_count: messages.len(),
            total_chars: breakdown.total(),
            breakdown,
            budgeted,
            timestamp,
        }
    }
}

/// Hash messages so that reordering or moving text between roles changes it.
pub fn prompt_hash(messages: &[ChatMessage]) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        let role = serde_json::to_string(&message.role).unwrap_or_default();
        hasher.update(role.as_bytes());
        hasher.update([0u8]);
        hasher.update(message.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
