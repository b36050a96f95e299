//! Dispatch loop for the primary backends.
//!
//! One call plans a route, then walks the candidates strictly in order: a
//! health probe, then at most one provider call each. Provider failures are
//! normalized, audited, fed to the cooldown tracker and turned into a
//! fallback. Only local-policy violations and exhaustion end the loop with
//! an error, and both carry every event emitted on the way.

mod error;
pub mod events;
pub mod local_policy;
pub mod prompt_audit;

pub use error::DispatchError;
pub use events::{DispatchEvent, EventSink, EventType, JsonlEventLog, TriggerCode};
pub use prompt_audit::{prompt_hash, PromptAudit, SizeBreakdown};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::budget::{budget_prompt, prompt_chars};
use crate::config::{
    ContinuityConfig, DispatchConfig, LocalPolicyConfig, RoutingConfig, SwitchyardConfig,
};
use crate::cooldown::CooldownTracker;
use crate::provider::{
    classify, CallMetadata, CallRequest, ChatMessage, ErrorCode, HealthContext, NormalizedError,
    Provider, ProviderResponse, RawFailure, Role, Usage,
};
use crate::routing::{plan_route, BackendId, RoutePlan, RouteRequest, TaskClass};

/// One request for the primary backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Caller's task id; a `task-<uuid>` id is assigned when empty
    pub task_id: String,
    /// Explicit task class; inferred from the task text when absent
    pub task_class: Option<TaskClass>,
    /// Text used for task-class inference; the last user message when empty
    pub task_text: String,
    pub requires_claude: bool,
    pub allow_network: bool,
    pub preferred_backend: Option<BackendId>,
    pub intent: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Rolling state summary carried into the local continuity prompt
    pub state_summary: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub research: bool,
    pub long_context: bool,
}

impl DispatchRequest {
    pub fn new(task_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            task_id: task_id.into(),
            task_class: None,
            task_text: String::new(),
            requires_claude: false,
            allow_network: true,
            preferred_backend: None,
            intent: None,
            messages,
            state_summary: None,
            max_output_tokens: None,
            research: false,
            long_context: false,
        }
    }

    /// Prompt size before any budgeting, state summary included.
    pub fn input_chars(&self) -> usize {
        prompt_chars(&self.messages)
            + self
                .state_summary
                .as_deref()
                .map_or(0, |s| s.chars().count())
    }

    pub fn route_request(&self) -> RouteRequest {
        let task_text = if self.task_text.is_empty() {
            self.messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        } else {
            self.task_text.clone()
        };
        RouteRequest {
            task_class: self.task_class,
            task_text,
            requires_claude: self.requires_claude,
            allow_network: self.allow_network,
            preferred_backend: self.preferred_backend,
        }
    }
}

/// Successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub backend: BackendId,
    pub response: ProviderResponse,
    pub usage: Option<Usage>,
    pub events: Vec<DispatchEvent>,
    /// User-facing routing notices, e.g. a fallback to the local backend
    pub notices: Vec<String>,
    pub prompt_audits: Vec<PromptAudit>,
    pub plan: RoutePlan,
}

/// Why the loop moved past a candidate.
#[derive(Debug, Clone)]
struct Transition {
    from: BackendId,
    trigger: TriggerCode,
    provider_error_code: Option<String>,
}

impl Transition {
    fn rationale(&self, to: BackendId) -> String {
        match self.trigger {
            TriggerCode::Cooldown => {
                format!("cooldown fallback: {} cooling down, using {}", self.from, to)
            }
            TriggerCode::MissingProvider => {
                format!("missing-key fallback: {} not configured, using {}", self.from, to)
            }
            trigger => format!(
                "provider-error fallback: {} failed with {}, using {}",
                self.from, trigger, to
            ),
        }
    }
}

/// A route selection held back until the selected backend serves.
struct Selection {
    /// Position in the event list at the time of selection
    index: usize,
    from: BackendId,
    to: BackendId,
    trigger: TriggerCode,
    rationale: String,
    provider_error_code: Option<String>,
}

/// State scoped to one dispatch call.
struct CallState {
    now: DateTime<Utc>,
    task_id: String,
    task_class: TaskClass,
    events: Vec<DispatchEvent>,
    notices: Vec<String>,
    prompt_audits: Vec<PromptAudit>,
    /// Diagnostic events already emitted during this call
    emitted: HashSet<EventType>,
    pending: Option<Transition>,
    last_error: Option<NormalizedError>,
}

impl CallState {
    fn emit(&mut self, event: DispatchEvent) {
        self.events
            .push(event.with_task(&self.task_id, self.task_class));
    }

    fn notice(&mut self, notice: String) {
        tracing::info!(task_id = %self.task_id, notice = %notice, "Routing notice");
        self.notices.push(notice);
    }
}

/// How the candidate walk ended without a successful call.
enum Stop {
    Disallowed(String),
    Overflow(NormalizedError),
    Exhausted,
}

/// Optional wall-clock budget across the whole fallback chain.
struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    fn expired(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }

    /// Await `fut` within the remaining budget. `None` means it ran out.
    async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        match self.budget {
            None => Some(fut.await),
            Some(budget) => {
                let remaining = budget.saturating_sub(self.started.elapsed());
                tokio::time::timeout(remaining, fut).await.ok()
            }
        }
    }
}

/// Routes requests across the primary backends.
///
/// Cooldown state is shared: pass the same tracker to every dispatcher in the
/// process so a failure seen by one request steers concurrent ones.
pub struct Dispatcher {
    providers: HashMap<BackendId, Arc<dyn Provider>>,
    cooldowns: Arc<CooldownTracker>,
    routing: RoutingConfig,
    local: LocalPolicyConfig,
    continuity: ContinuityConfig,
    dispatch: DispatchConfig,
    sink: Option<Arc<dyn EventSink>>,
}

impl Dispatcher {
    /// Create a dispatcher with no providers.
    ///
    /// When `config.events.path` is set, events are appended to that JSONL
    /// log after every call.
    pub fn new(config: &SwitchyardConfig, cooldowns: Arc<CooldownTracker>) -> Self {
        let sink = config.events.path.as_ref().map(|path| {
            Arc::new(JsonlEventLog::new(path.clone(), config.events.max_entries))
                as Arc<dyn EventSink>
        });
        Self {
            providers: HashMap::new(),
            cooldowns,
            routing: config.routing.clone(),
            local: config.local.clone(),
            continuity: config.continuity.clone(),
            dispatch: config.dispatch.clone(),
            sink,
        }
    }

    pub fn with_provider(mut self, backend: BackendId, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(backend, provider);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub fn plan(&self, request: &DispatchRequest) -> RoutePlan {
        plan_route(&request.route_request(), &self.routing)
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        self.dispatch_at(request, Utc::now()).await
    }

    /// Dispatch with `now` as the clock for cooldowns and event timestamps.
    pub async fn dispatch_at(
        &self,
        request: DispatchRequest,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut request = request;
        if request.task_id.is_empty() {
            request.task_id = format!("task-{}", uuid::Uuid::new_v4());
        }
        let plan = self.plan(&request);
        let mut state = CallState {
            now,
            task_id: request.task_id.clone(),
            task_class: plan.task_class,
            events: Vec::new(),
            notices: Vec::new(),
            prompt_audits: Vec::new(),
            emitted: HashSet::new(),
            pending: None,
            last_error: None,
        };

        for event in self.cooldowns.clear_expired(now) {
            state.emit(event);
        }

        tracing::debug!(
            task_id = %request.task_id,
            task_class = %plan.task_class,
            candidates = ?plan.candidates,
            rationale = %plan.rationale,
            "Route planned"
        );

        let result = self.walk(&request, &plan, &mut state).await;

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(&state.events).await {
                tracing::warn!(error = %e, task_id = %request.task_id, "Failed to persist dispatch events");
            }
        }

        let CallState {
            events,
            notices,
            prompt_audits,
            last_error,
            ..
        } = state;

        match result {
            Ok((backend, response)) => {
                metrics::counter!("switchyard_dispatch_total", "outcome" => "success", "backend" => backend.as_str())
                    .increment(1);
                Ok(DispatchOutcome {
                    backend,
                    usage: response.usage,
                    response,
                    events,
                    notices,
                    prompt_audits,
                    plan,
                })
            }
            Err(stop) => {
                let error = match stop {
                    Stop::Disallowed(reason) => DispatchError::LocalFallbackDisallowed {
                        reason,
                        events,
                        notices,
                    },
                    Stop::Overflow(error) => DispatchError::ContinuityOverflow {
                        error,
                        events,
                        notices,
                    },
                    Stop::Exhausted => DispatchError::NoBackendAvailable {
                        last_error,
                        events,
                        notices,
                    },
                };
                tracing::warn!(task_id = %request.task_id, code = error.code(), "Dispatch failed");
                metrics::counter!("switchyard_dispatch_total", "outcome" => error.code())
                    .increment(1);
                Err(error)
            }
        }
    }

    async fn walk(
        &self,
        request: &DispatchRequest,
        plan: &RoutePlan,
        state: &mut CallState,
    ) -> Result<(BackendId, ProviderResponse), Stop> {
        let now = state.now;
        let deadline = Deadline::new(self.dispatch.deadline());
        let expected = request.preferred_backend.unwrap_or(plan.preferred_backend);
        let context = HealthContext {
            task_class: plan.task_class,
            allow_network: plan.allow_network,
        };

        for (index, &candidate) in plan.candidates.iter().enumerate() {
            if deadline.expired() {
                self.deadline_expired(candidate, state);
                return Err(Stop::Exhausted);
            }

            let Some(provider) = self.providers.get(&candidate) else {
                tracing::debug!(backend = %candidate, "No provider configured for backend");
                state.pending = Some(Transition {
                    from: candidate,
                    trigger: TriggerCode::MissingProvider,
                    provider_error_code: None,
                });
                continue;
            };

            if candidate.is_local() {
                let trigger = state.pending.as_ref().map(|t| t.trigger);
                let verdict = local_policy::check_request(request, &self.local).and_then(|()| {
                    local_policy::check_trigger(trigger, plan.allow_network, index == 0)
                });
                if let Err(reason) = verdict {
                    self.disallow_local(&reason, state);
                    return Err(Stop::Disallowed(reason));
                }
            } else if self.cooldowns.is_disabled(candidate, now) {
                tracing::debug!(backend = %candidate, "Skipping backend on cooldown");
                state.pending = Some(Transition {
                    from: candidate,
                    trigger: TriggerCode::Cooldown,
                    provider_error_code: None,
                });
                continue;
            }

            let Some(health) = deadline.run(provider.health(&context)).await else {
                self.deadline_expired(candidate, state);
                return Err(Stop::Exhausted);
            };
            let unhealthy = match health {
                Ok(health) if health.ok => None,
                Ok(health) => {
                    let reason = health.reason.unwrap_or_else(|| "health check failed".to_string());
                    Some(classify(candidate.as_str(), &RawFailure::message(reason)))
                }
                Err(failure) => Some(classify(candidate.as_str(), &failure)),
            };
            if let Some(error) = unhealthy {
                // An unreachable backend with no recognizable reason counts
                // as a network failure.
                let trigger = match error.code {
                    ErrorCode::Unknown | ErrorCode::None => TriggerCode::Network,
                    code => code.into(),
                };
                tracing::warn!(
                    backend = %candidate,
                    code = %error.code,
                    reason = %error.message,
                    "Backend health check failed"
                );
                state.emit(
                    DispatchEvent::new(EventType::BackendError, trigger, now)
                        .from_backend(candidate)
                        .network_used(candidate.is_remote())
                        .rationale(format!("health check failed: {}", error.message))
                        .provider_error_code(provider_error_code(&error))
                        .meta("phase", "health"),
                );
                state.pending = Some(Transition {
                    from: candidate,
                    trigger,
                    provider_error_code: provider_error_code(&error),
                });
                state.last_error = Some(error);
                continue;
            }

            let selection = self.select(candidate, expected, plan, state);

            let (messages, budgeted) = if candidate.is_local() {
                (self.continuity_prompt(request, state), true)
            } else {
                (request.messages.clone(), false)
            };

            let audit = PromptAudit::new(candidate, &messages, budgeted, now);
            tracing::debug!(
                backend = %candidate,
                sha256 = %audit.sha256,
                chars = audit.total_chars,
                messages = audit.message_count,
                "Outbound prompt"
            );
            state.prompt_audits.push(audit);

            let call = CallRequest {
                messages,
                metadata: CallMetadata {
                    task_id: request.task_id.clone(),
                    task_class: Some(plan.task_class),
                    intent: request.intent.clone(),
                    model: None,
                    max_output_tokens: request.max_output_tokens,
                },
                allow_network: plan.allow_network,
            };

            let Some(result) = deadline.run(provider.call(call)).await else {
                self.deadline_expired(candidate, state);
                return Err(Stop::Exhausted);
            };
            let failure = match result {
                Ok(response) => {
                    if let Some(selection) = selection {
                        self.commit(selection, state);
                    }
                    tracing::info!(
                        task_id = %request.task_id,
                        backend = %candidate,
                        fallbacks = state.prompt_audits.len() - 1,
                        "Request served"
                    );
                    return Ok((candidate, response));
                }
                Err(failure) => failure,
            };

            let error = classify(candidate.as_str(), &failure);
            let discarded = selection.map(|s| s.rationale);
            if candidate.is_local() && error.code == ErrorCode::Context {
                tracing::error!(
                    task_id = %request.task_id,
                    message = %error.message,
                    "Local backend rejected the budgeted prompt"
                );
                state.emit(
                    with_selection(
                        DispatchEvent::new(EventType::BackendError, TriggerCode::Context, now)
                            .from_backend(candidate)
                            .rationale("context overflow after continuity budgeting")
                            .provider_error_code(provider_error_code(&error))
                            .meta("phase", "call"),
                        discarded,
                    ),
                );
                return Err(Stop::Overflow(error));
            }

            let trigger = TriggerCode::from(error.code);
            tracing::warn!(
                backend = %candidate,
                code = %error.code,
                status = ?error.status,
                message = %error.message,
                "Backend call failed"
            );
            state.emit(
                with_selection(
                    DispatchEvent::new(EventType::BackendError, trigger, now)
                        .from_backend(candidate)
                        .network_used(candidate.is_remote())
                        .rationale(format!("call failed: {}", error.message))
                        .provider_error_code(provider_error_code(&error))
                        .meta("phase", "call"),
                    discarded,
                ),
            );
            if let Some(event) = self.cooldowns.record_error(candidate, error.code, now) {
                state.emit(event);
            }
            state.pending = Some(Transition {
                from: candidate,
                trigger,
                provider_error_code: provider_error_code(&error),
            });
            state.last_error = Some(error);
        }

        Err(Stop::Exhausted)
    }

    /// Decide whether selecting a healthy candidate needs a `ROUTE_SELECT`.
    ///
    /// The event is only recorded once the candidate serves, see
    /// [`Dispatcher::commit`].
    fn select(
        &self,
        candidate: BackendId,
        expected: BackendId,
        plan: &RoutePlan,
        state: &mut CallState,
    ) -> Option<Selection> {
        let transition = state.pending.take();
        if candidate == expected && transition.is_none() {
            return None;
        }

        let (from, trigger, rationale, provider_error_code) = match transition {
            Some(t) => (t.from, t.trigger, t.rationale(candidate), t.provider_error_code),
            None if !plan.allow_network => (
                expected,
                TriggerCode::NetworkDisabled,
                format!("network disallowed: forced {candidate}"),
                None,
            ),
            None => (
                expected,
                TriggerCode::None,
                format!("preference mismatch: preferred {expected}, selected {candidate}"),
                None,
            ),
        };
        tracing::debug!(from = %from, to = %candidate, trigger = %trigger, "Candidate selected");

        Some(Selection {
            index: state.events.len(),
            from,
            to: candidate,
            trigger,
            rationale,
            provider_error_code,
        })
    }

    /// Record the selection of the backend that served the request.
    ///
    /// The event keeps its place in the audit trail, ahead of anything
    /// emitted while the call was prepared.
    fn commit(&self, selection: Selection, state: &mut CallState) {
        let Selection {
            index,
            from,
            to,
            trigger,
            rationale,
            provider_error_code,
        } = selection;

        tracing::info!(
            from = %from,
            to = %to,
            trigger = %trigger,
            rationale = %rationale,
            "Route selected"
        );
        metrics::counter!(
            "switchyard_fallbacks_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);

        let event = DispatchEvent::new(EventType::RouteSelect, trigger, state.now)
            .from_backend(from)
            .to_backend(to)
            .rationale(rationale.clone())
            .provider_error_code(provider_error_code)
            .with_task(&state.task_id, state.task_class);
        state.events.insert(index.min(state.events.len()), event);

        if to.is_local() && from.is_remote() && trigger != TriggerCode::None {
            state.notice(format!("Falling back from {from} to the local backend: {rationale}"));
        }
    }

    fn disallow_local(&self, reason: &str, state: &mut CallState) {
        let (from, trigger, error_code) = match &state.pending {
            Some(t) => (t.from, t.trigger, t.provider_error_code.clone()),
            None => (BackendId::Local, TriggerCode::Policy, None),
        };
        tracing::warn!(reason = %reason, from = %from, "Local fallback disallowed");
        state.emit(
            DispatchEvent::new(EventType::BackendError, TriggerCode::Policy, state.now)
                .from_backend(from)
                .to_backend(BackendId::Local)
                .rationale(format!("local fallback disallowed: {reason}"))
                .provider_error_code(error_code)
                .meta("fallback_trigger", trigger.as_str()),
        );
        state.notice(format!("Local fallback disallowed: {reason}"));
    }

    fn deadline_expired(&self, candidate: BackendId, state: &mut CallState) {
        let seconds = self.dispatch.deadline_seconds.unwrap_or_default();
        tracing::warn!(backend = %candidate, deadline_seconds = seconds, "Dispatch deadline exceeded");
        let error = classify(
            candidate.as_str(),
            &RawFailure::aborted(format!("dispatch deadline of {seconds}s exceeded")),
        );
        state.emit(
            DispatchEvent::new(EventType::BackendError, TriggerCode::Timeout, state.now)
                .from_backend(candidate)
                .network_used(candidate.is_remote())
                .rationale(error.message.clone())
                .meta("deadline_exceeded", true),
        );
        state.last_error = Some(error);
    }

    /// Budget the prompt for the local model, auditing truncation once.
    fn continuity_prompt(&self, request: &DispatchRequest, state: &mut CallState) -> Vec<ChatMessage> {
        let original_chars = request.input_chars();
        let budget = budget_prompt(
            &request.messages,
            request.state_summary.as_deref(),
            &self.continuity,
        );
        if budget.truncated && state.emitted.insert(EventType::ContinuityBudget) {
            let budgeted_chars = prompt_chars(&budget.result);
            tracing::info!(
                original_chars,
                budgeted_chars,
                max_chars = self.continuity.max_chars,
                ok = budget.ok,
                "Continuity prompt budgeted"
            );
            state.emit(
                DispatchEvent::new(EventType::ContinuityBudget, TriggerCode::Budget, state.now)
                    .to_backend(BackendId::Local)
                    .rationale(budget.note.clone().unwrap_or_default())
                    .meta("original_chars", original_chars)
                    .meta("budgeted_chars", budgeted_chars)
                    .meta("max_chars", self.continuity.max_chars)
                    .meta("actions", budget.applied_labels())
                    .meta("ok", budget.ok),
            );
        }
        budget.result
    }
}

/// Note a selection whose call failed on the event reporting the failure.
fn with_selection(event: DispatchEvent, discarded: Option<String>) -> DispatchEvent {
    match discarded {
        Some(rationale) => event.meta("selection", rationale),
        None => event,
    }
}

fn provider_error_code(error: &NormalizedError) -> Option<String> {
    error
        .raw_code
        .clone()
        .or_else(|| error.status.map(|s| s.to_string()))
}
