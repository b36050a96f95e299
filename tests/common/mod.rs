//! Shared test utilities for Switchyard integration tests.
//!
//! Provides a scripted provider that records every probe and call, plus
//! builders for requests and dispatchers.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard::config::SwitchyardConfig;
use switchyard::cooldown::CooldownTracker;
use switchyard::dispatch::{DispatchEvent, DispatchRequest, Dispatcher, EventType, TriggerCode};
use switchyard::provider::{
    CallRequest, ChatMessage, HealthContext, Provider, ProviderHealth, ProviderResponse,
    RawFailure, Usage,
};
use switchyard::routing::BackendId;

// =============================================================================
// Clock
// =============================================================================

/// Fixed dispatch clock so cooldown deadlines are deterministic.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
}

// =============================================================================
// Scripted Provider
// =============================================================================

/// Shared, ordered record of `health:<id>` and `call:<id>` entries.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Provider that replays scripted call results, then succeeds.
pub struct ScriptedProvider {
    id: String,
    log: CallLog,
    health: Mutex<Result<ProviderHealth, RawFailure>>,
    script: Mutex<VecDeque<Result<ProviderResponse, RawFailure>>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CallRequest>>,
}

impl ScriptedProvider {
    pub fn new(backend: BackendId, log: &CallLog) -> Self {
        Self::named(backend.as_str(), log)
    }

    /// Provider for a federated catalog id.
    pub fn named(id: &str, log: &CallLog) -> Self {
        Self {
            id: id.to_string(),
            log: log.clone(),
            health: Mutex::new(Ok(ProviderHealth::healthy())),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unhealthy(self, reason: &str) -> Self {
        *self.health.lock().unwrap() = Ok(ProviderHealth::unhealthy(reason));
        self
    }

    pub fn then_fail(self, failure: RawFailure) -> Self {
        self.script.lock().unwrap().push_back(Err(failure));
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CallRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn health(&self, _context: &HealthContext) -> Result<ProviderHealth, RawFailure> {
        self.log.lock().unwrap().push(format!("health:{}", self.id));
        self.health.lock().unwrap().clone()
    }

    async fn call(&self, request: CallRequest) -> Result<ProviderResponse, RawFailure> {
        self.log.lock().unwrap().push(format!("call:{}", self.id));
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            let mut response = ProviderResponse::text(format!("{} answered", self.id));
            response.usage = Some(Usage {
                input_tokens: 12,
                output_tokens: 8,
                total_tokens: 20,
                estimated_cost_usd: 0.0,
            });
            Ok(response)
        })
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn dispatcher(
    config: &SwitchyardConfig,
    providers: &[(BackendId, Arc<ScriptedProvider>)],
) -> Dispatcher {
    let cooldowns = Arc::new(CooldownTracker::new(config.cooldown.clone()));
    providers
        .iter()
        .fold(Dispatcher::new(config, cooldowns), |d, (backend, provider)| {
            d.with_provider(*backend, provider.clone())
        })
}

pub fn request(task_id: &str, text: &str) -> DispatchRequest {
    DispatchRequest::new(
        task_id,
        vec![
            ChatMessage::system("You are a careful assistant."),
            ChatMessage::user(text),
        ],
    )
}

/// A conversation of `turns` alternating messages of `chars` chars each.
pub fn long_conversation(turns: usize, chars: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system("You are a careful assistant.")];
    for i in 0..turns {
        let body = format!("turn {i} ").repeat(chars / 7 + 1);
        let body: String = body.chars().take(chars).collect();
        if i % 2 == 0 {
            messages.push(ChatMessage::user(body));
        } else {
            messages.push(ChatMessage::assistant(body));
        }
    }
    messages
}

// =============================================================================
// Event Assertions
// =============================================================================

/// `(event_type, trigger_code)` pairs, for order assertions.
pub fn event_kinds(events: &[DispatchEvent]) -> Vec<(EventType, TriggerCode)> {
    events.iter().map(|e| (e.event_type, e.trigger_code)).collect()
}

pub fn events_of(events: &[DispatchEvent], kind: EventType) -> Vec<&DispatchEvent> {
    events.iter().filter(|e| e.event_type == kind).collect()
}
