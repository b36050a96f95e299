//! Provider contract shared by primary backends and federated catalog providers.
//!
//! Concrete HTTP clients live outside this crate. Anything that can answer a
//! health probe and a chat call can be routed to by implementing [`Provider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod normalize;

pub use error::RawFailure;
pub use normalize::{classify, ErrorCode, NormalizedError};

use crate::routing::TaskClass;

/// Unified interface for every callable backend.
///
/// # Object Safety
///
/// The trait is object-safe and used as `Arc<dyn Provider>`. Async methods go
/// through `async_trait` for that reason.
///
/// # Timeouts
///
/// Each call is expected to be time-bounded by the implementation. The
/// dispatch loop only adds a chain-wide deadline when one is configured.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Stable identifier used in logs and audit events.
    fn id(&self) -> &str;

    /// Probe backend health.
    ///
    /// Implementations should report problems through `ProviderHealth::ok`
    /// rather than `Err`, but callers normalize `Err` either way.
    async fn health(&self, context: &HealthContext) -> Result<ProviderHealth, RawFailure>;

    /// Execute a chat request.
    async fn call(&self, request: CallRequest) -> Result<ProviderResponse, RawFailure>;
}

/// Context handed to health probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthContext {
    pub task_class: TaskClass,
    pub allow_network: bool,
}

/// Result of a health probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

impl ProviderHealth {
    pub fn healthy() -> Self {
        Self {
            ok: true,
            reason: None,
            models: Vec::new(),
        }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            models: Vec::new(),
        }
    }
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Content length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Request metadata forwarded to providers alongside the messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub task_id: String,
    pub task_class: Option<TaskClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Outbound call payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub messages: Vec<ChatMessage>,
    pub metadata: CallMetadata,
    pub allow_network: bool,
}

/// Token and cost accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default)]
    pub estimated_cost_usd: f64,
}

/// Successful provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    #[serde(default)]
    pub raw: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ProviderResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: serde_json::Value::Null,
            usage: None,
        }
    }
}
