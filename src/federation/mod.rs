//! Federated provider catalog.
//!
//! The [`ProviderRegistry`] owns one circuit breaker per eligible catalog
//! provider and the quota ledger. Each dispatch observes breaker, health and
//! quota state, ranks candidates with the scoring router and tries them in
//! order.

pub mod arousal;
pub mod breaker;
pub mod catalog;
mod error;
pub mod quota;
pub mod scoring;

pub use arousal::{infer_arousal, ArousalTier};
pub use breaker::{BreakerState, CircuitBreakerEntry, FailureKind};
pub use catalog::{
    AuthSpec, BackoffPolicy, BaseUrl, Catalog, CatalogEntry, CircuitBreakerPolicy, Constraints,
    HealthcheckSpec, ModelSpec, ProviderKind, QuotaLimits, RoutingTags,
};
pub use error::{CatalogError, FederationError};
pub use quota::{
    QuotaAuditLog, QuotaCheck, QuotaCounters, QuotaDenied, QuotaLedger, QuotaRejection,
    QuotaScope, QuotaUsageRecord,
};
pub use scoring::{
    rank_candidates, LatencyTarget, RankInputs, RankPolicy, RankRequest, Ranking, ScoredCandidate,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{FederationConfig, QuotaConfig};
use crate::provider::{
    classify, CallMetadata, CallRequest, ChatMessage, HealthContext, NormalizedError, Provider,
    ProviderResponse, Role, Usage,
};
use crate::routing::TaskClass;

/// A request routed through the federated catalog.
#[derive(Debug, Clone)]
pub struct FederatedRequest {
    pub task_id: String,
    pub task_class: TaskClass,
    pub messages: Vec<ChatMessage>,
    /// External providers are only considered when this and the cloud flag
    /// are both set
    pub allow_network: bool,
    pub latency_target: LatencyTarget,
    pub budget_ceiling_usd: Option<f64>,
    pub max_output_tokens: Option<u32>,
    /// Overrides the tier inferred from the user messages
    pub arousal: Option<ArousalTier>,
}

impl FederatedRequest {
    pub fn new(
        task_id: impl Into<String>,
        task_class: TaskClass,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_class,
            messages,
            allow_network: true,
            latency_target: LatencyTarget::default(),
            budget_ceiling_usd: None,
            max_output_tokens: None,
            arousal: None,
        }
    }

    /// Rough prompt size: four chars per token.
    pub fn estimated_tokens(&self) -> u64 {
        let chars: usize = self.messages.iter().map(ChatMessage::char_len).sum();
        chars.div_ceil(4) as u64
    }

    fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn rank_request(&self) -> RankRequest {
        RankRequest {
            task_class: self.task_class,
            context_tokens: self.estimated_tokens(),
            latency_target: self.latency_target,
            budget_ceiling_usd: self.budget_ceiling_usd,
            arousal: Some(self.arousal.unwrap_or_else(|| infer_arousal(&self.user_text()))),
        }
    }
}

/// One failed call against a ranked candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedAttempt {
    pub provider_id: String,
    pub model_id: String,
    pub failure: FailureKind,
    pub error: NormalizedError,
    /// This failure opened the provider's breaker
    pub breaker_opened: bool,
}

/// Successful federated dispatch.
#[derive(Debug, Clone)]
pub struct FederatedOutcome {
    pub provider_id: String,
    pub model_id: String,
    pub response: ProviderResponse,
    pub usage: Option<Usage>,
    /// Failed attempts before the successful one
    pub attempts: Vec<FederatedAttempt>,
    pub ranking: Ranking,
    pub quota_record: QuotaUsageRecord,
}

/// Owns federated provider lifecycle: adapters, breakers and quotas.
pub struct ProviderRegistry {
    catalog: Catalog,
    config: FederationConfig,
    policy: RankPolicy,
    adapters: HashMap<String, Arc<dyn Provider>>,
    breakers: DashMap<String, CircuitBreakerEntry>,
    quota: QuotaLedger,
    audit: Option<QuotaAuditLog>,
}

impl ProviderRegistry {
    /// Create a registry with one closed breaker per provider not disabled by
    /// policy.
    pub fn new(
        catalog: Catalog,
        config: FederationConfig,
        quota: &QuotaConfig,
    ) -> Result<Self, FederationError> {
        let policy = RankPolicy::from_config(&config)?;
        let breakers = DashMap::new();
        for entry in catalog.iter() {
            if policy.disabled.contains(&entry.provider_id) {
                continue;
            }
            let breaker_policy = entry.breaker_policy(&config.default_circuit_breaker);
            breakers.insert(
                entry.provider_id.clone(),
                CircuitBreakerEntry::new(breaker_policy),
            );
        }

        tracing::debug!(
            providers = catalog.len(),
            breakers = breakers.len(),
            cloud_enabled = config.cloud_enabled,
            "Provider registry initialized"
        );

        Ok(Self {
            catalog,
            config,
            policy,
            adapters: HashMap::new(),
            breakers,
            quota: QuotaLedger::new(quota),
            audit: quota.audit_dir.clone().map(QuotaAuditLog::new),
        })
    }

    /// Register the adapter that serves `provider_id`.
    pub fn with_adapter(
        mut self,
        provider_id: impl Into<String>,
        adapter: Arc<dyn Provider>,
    ) -> Self {
        let provider_id = provider_id.into();
        if self.catalog.get(&provider_id).is_none() {
            tracing::warn!(
                provider = %provider_id,
                "Adapter registered for unknown catalog provider"
            );
        }
        self.adapters.insert(provider_id, adapter);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    /// Snapshot of one provider's breaker.
    pub fn breaker(&self, provider_id: &str) -> Option<CircuitBreakerEntry> {
        self.breakers.get(provider_id).map(|b| b.value().clone())
    }

    /// Rank candidates for `request` as of `now`.
    ///
    /// Polling breakers may move open ones to half-open.
    pub async fn rank_at(&self, request: &FederatedRequest, now: DateTime<Utc>) -> Ranking {
        let inputs = self.observe(request, now).await;
        let mut policy = self.policy.clone();
        policy.cloud_enabled &= request.allow_network;
        rank_candidates(&self.catalog, &request.rank_request(), &inputs, &policy)
    }

    pub async fn dispatch(
        &self,
        request: FederatedRequest,
    ) -> Result<FederatedOutcome, FederationError> {
        self.dispatch_at(request, Utc::now()).await
    }

    /// Rank and try candidates in order until one succeeds.
    ///
    /// A timeout gets one more try against the same candidate; every other
    /// failure moves on to the next one. Once a provider's breaker opens, its
    /// remaining models are skipped for the rest of the call.
    pub async fn dispatch_at(
        &self,
        request: FederatedRequest,
        now: DateTime<Utc>,
    ) -> Result<FederatedOutcome, FederationError> {
        if !self.config.enabled {
            return Err(FederationError::Disabled);
        }

        let mut ranking = self.rank_at(&request, now).await;
        if ranking.candidates.is_empty() {
            tracing::warn!(
                task_id = %request.task_id,
                "No federated candidate survived ranking"
            );
            return Err(FederationError::NoCandidate {
                explanation: ranking.explanation,
            });
        }

        let mut attempts = Vec::new();
        let candidates = ranking.candidates.clone();
        for candidate in &candidates {
            if self.is_open(&candidate.provider_id) {
                tracing::debug!(
                    provider = %candidate.provider_id,
                    model = %candidate.model_id,
                    "Skipping model of provider with open breaker"
                );
                ranking.explanation.push(format!(
                    "skip {}/{}: circuit open",
                    candidate.provider_id, candidate.model_id
                ));
                continue;
            }
            let Some(adapter) = self.adapters.get(&candidate.provider_id) else {
                continue;
            };
            let call = CallRequest {
                messages: request.messages.clone(),
                metadata: CallMetadata {
                    task_id: request.task_id.clone(),
                    task_class: Some(request.task_class),
                    intent: None,
                    model: Some(candidate.model_id.clone()),
                    max_output_tokens: request.max_output_tokens,
                },
                allow_network: request.allow_network,
            };

            let mut retried = false;
            loop {
                match adapter.call(call.clone()).await {
                    Ok(response) => {
                        return Ok(self
                            .complete(&request, candidate, response, attempts, &ranking, now)
                            .await);
                    }
                    Err(failure) => {
                        let kind = FailureKind::classify(&candidate.provider_id, &failure);
                        let error = classify(&candidate.provider_id, &failure);
                        let breaker_opened = self.record_failure(&candidate.provider_id, kind, now);
                        tracing::warn!(
                            provider = %candidate.provider_id,
                            model = %candidate.model_id,
                            failure = %kind,
                            code = %error.code,
                            breaker_opened,
                            "Federated call failed"
                        );
                        attempts.push(FederatedAttempt {
                            provider_id: candidate.provider_id.clone(),
                            model_id: candidate.model_id.clone(),
                            failure: kind,
                            error,
                            breaker_opened,
                        });
                        if kind == FailureKind::Timeout && !retried && !breaker_opened {
                            retried = true;
                            continue;
                        }
                        break;
                    }
                }
            }
        }

        metrics::counter!("switchyard_federated_requests_total", "outcome" => "exhausted")
            .increment(1);
        Err(FederationError::Exhausted {
            attempts,
            explanation: ranking.explanation,
        })
    }

    async fn complete(
        &self,
        request: &FederatedRequest,
        candidate: &ScoredCandidate,
        response: ProviderResponse,
        attempts: Vec<FederatedAttempt>,
        ranking: &Ranking,
        now: DateTime<Utc>,
    ) -> FederatedOutcome {
        if let Some(mut breaker) = self.breakers.get_mut(&candidate.provider_id) {
            if breaker.state != BreakerState::Closed {
                tracing::info!(provider = %candidate.provider_id, "Circuit breaker closed");
            }
            breaker.record_success();
        }

        let usage = response.usage;
        let tokens = usage
            .map(|u| u64::from(u.total_tokens))
            .unwrap_or_else(|| request.estimated_tokens());
        let record = self.quota.record(
            &candidate.provider_id,
            Some(request.task_class),
            Some(&candidate.model_id),
            tokens,
            now,
        );
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append(&record).await {
                tracing::warn!(
                    error = %e,
                    dir = %audit.dir().display(),
                    "Failed to write quota audit"
                );
            }
        }

        metrics::counter!("switchyard_federated_requests_total", "outcome" => "success")
            .increment(1);
        tracing::info!(
            task_id = %request.task_id,
            provider = %candidate.provider_id,
            model = %candidate.model_id,
            score = candidate.score,
            failed_attempts = attempts.len(),
            "Federated request served"
        );

        FederatedOutcome {
            provider_id: candidate.provider_id.clone(),
            model_id: candidate.model_id.clone(),
            response,
            usage,
            attempts,
            ranking: ranking.clone(),
            quota_record: record,
        }
    }

    fn is_open(&self, provider_id: &str) -> bool {
        self.breakers
            .get(provider_id)
            .is_some_and(|b| b.state == BreakerState::Open)
    }

    /// Returns true when the failure opened the breaker.
    fn record_failure(&self, provider_id: &str, kind: FailureKind, now: DateTime<Utc>) -> bool {
        let opened = self
            .breakers
            .get_mut(provider_id)
            .map(|mut b| b.record_failure(kind, now))
            .unwrap_or(false);
        if opened {
            tracing::warn!(provider = provider_id, failure = %kind, "Circuit breaker opened");
            metrics::counter!(
                "switchyard_breaker_opens_total",
                "provider" => provider_id.to_string()
            )
            .increment(1);
        }
        opened
    }

    /// Observe breakers, optional health probes and quotas.
    async fn observe(&self, request: &FederatedRequest, now: DateTime<Utc>) -> RankInputs {
        let mut inputs = RankInputs {
            adapters: self.adapters.keys().cloned().collect(),
            ..Default::default()
        };
        let context = HealthContext {
            task_class: request.task_class,
            allow_network: request.allow_network,
        };

        for entry in self.catalog.iter() {
            let id = entry.provider_id.as_str();
            let was_open = self.is_open(id);
            let available = self
                .breakers
                .get_mut(id)
                .map(|mut b| b.poll(now))
                .unwrap_or(false);
            if was_open && available {
                tracing::info!(provider = id, "Circuit breaker half-open, probing");
            }

            let mut healthy = available;
            if available && self.config.probe_health {
                if let Some(adapter) = self.adapters.get(id) {
                    healthy = match adapter.health(&context).await {
                        Ok(health) => health.ok,
                        Err(failure) => {
                            let error = classify(id, &failure);
                            tracing::debug!(
                                provider = id,
                                code = %error.code,
                                "Health probe failed"
                            );
                            false
                        }
                    };
                }
            }
            inputs.health.insert(id.to_string(), healthy);
            inputs.quota.insert(
                id.to_string(),
                self.quota
                    .check(id, &entry.constraints.quota, Some(request.task_class), now),
            );
        }
        inputs
    }
}
