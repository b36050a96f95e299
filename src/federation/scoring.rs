//! Quota-aware scoring router for the federated catalog.
//!
//! [`rank_candidates`] is pure: identical inputs always give the same
//! candidates, scores and order. Every skipped provider leaves a line in the
//! explanation trail.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use super::arousal::ArousalTier;
use super::catalog::{Catalog, CatalogEntry, ModelSpec};
use super::error::FederationError;
use super::quota::QuotaCheck;
use crate::config::FederationConfig;
use crate::routing::TaskClass;

/// Base score every surviving pair starts from.
pub const BASE_SCORE: i32 = 50;
/// Score of an injected escape-hatch candidate; dominates anything organic.
pub const ESCAPE_HATCH_SCORE: i32 = 1_000;

const LOCAL_CLOUD_OFF_BONUS: i32 = 100;
const LOCAL_CLOUD_ON_PENALTY: i32 = -20;
const PAID_FALLBACK_PENALTY: i32 = -30;
const FREE_TIER_BONUS: i32 = 10;
const FREE_TIER_BUDGET_BONUS: i32 = 10;
const LOW_LATENCY_BONUS: i32 = 5;
const LOW_LATENCY_TARGET_BONUS: i32 = 15;
const PREFERS_BONUS: i32 = 10;
const AVOIDS_PENALTY: i32 = -25;
const AROUSAL_BONUS: i32 = 15;
const LARGE_CONTEXT_TOKENS: u64 = 100_000;
/// Budget ceilings below this (USD per request) count as cost-sensitive.
const TIGHT_BUDGET_USD: f64 = 0.01;

/// Latency expectation of the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyTarget {
    Low,
    #[default]
    Normal,
    Relaxed,
}

impl FromStr for LatencyTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(LatencyTarget::Low),
            "normal" => Ok(LatencyTarget::Normal),
            "relaxed" => Ok(LatencyTarget::Relaxed),
            _ => Err(format!("Invalid latency target: {}", s)),
        }
    }
}

/// What is being routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRequest {
    pub task_class: TaskClass,
    /// Estimated prompt size in tokens
    pub context_tokens: u64,
    #[serde(default)]
    pub latency_target: LatencyTarget,
    /// Spend ceiling per request, if the caller has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_ceiling_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arousal: Option<ArousalTier>,
}

/// Compiled routing policy.
#[derive(Debug, Clone)]
pub struct RankPolicy {
    pub cloud_enabled: bool,
    pub disabled: BTreeSet<String>,
    pub escape_hatch: String,
    allow: Option<GlobSet>,
    deny: Option<GlobSet>,
}

impl RankPolicy {
    pub fn from_config(config: &FederationConfig) -> Result<Self, FederationError> {
        Ok(Self {
            cloud_enabled: config.cloud_enabled,
            disabled: config.disabled.iter().cloned().collect(),
            escape_hatch: config.escape_hatch.clone(),
            allow: compile(&config.allow)?,
            deny: compile(&config.deny)?,
        })
    }

    fn allowed(&self, provider_id: &str) -> bool {
        self.allow.as_ref().is_none_or(|set| set.is_match(provider_id))
    }

    fn denied(&self, provider_id: &str) -> bool {
        self.deny.as_ref().is_some_and(|set| set.is_match(provider_id))
    }
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>, FederationError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| FederationError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| FederationError::InvalidPattern {
            pattern: patterns.join(","),
            message: e.to_string(),
        })
}

/// Runtime inputs observed right before ranking.
#[derive(Debug, Clone, Default)]
pub struct RankInputs {
    /// Providers with a callable adapter
    pub adapters: BTreeSet<String>,
    /// Health per provider; missing means unhealthy
    pub health: BTreeMap<String, bool>,
    /// Quota verdict per provider; missing means within quota
    pub quota: BTreeMap<String, QuotaCheck>,
}

/// One ranked (provider, model) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub provider_id: String,
    pub model_id: String,
    pub score: i32,
    pub is_local: bool,
    #[serde(default)]
    pub escape_hatch: bool,
    /// Score adjustments, in application order
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    pub candidates: Vec<ScoredCandidate>,
    pub explanation: Vec<String>,
}

/// Rank catalog providers for one request.
pub fn rank_candidates(
    catalog: &Catalog,
    request: &RankRequest,
    inputs: &RankInputs,
    policy: &RankPolicy,
) -> Ranking {
    let mut ranking = Ranking::default();

    for entry in catalog.iter() {
        let id = entry.provider_id.as_str();
        if let Some(reason) = gate_provider(entry, inputs, policy) {
            ranking.explanation.push(format!("skip {id}: {reason}"));
            continue;
        }

        let mut survived = 0;
        for model in &entry.models {
            if !model.serves(request.task_class) {
                ranking.explanation.push(format!(
                    "skip {id}/{}: does not serve {}",
                    model.model_id, request.task_class
                ));
                continue;
            }
            if !model.fits(request.context_tokens) {
                ranking.explanation.push(format!(
                    "skip {id}/{}: context {} exceeds window {}",
                    model.model_id,
                    request.context_tokens,
                    model.context_window_hint.unwrap_or_default()
                ));
                continue;
            }
            let candidate = score(entry, model, request, policy);
            ranking.explanation.push(format!(
                "keep {id}/{}: score {} [{}]",
                model.model_id,
                candidate.score,
                candidate.reasons.join(", ")
            ));
            ranking.candidates.push(candidate);
            survived += 1;
        }
        if survived == 0 {
            tracing::trace!(provider = id, "No model of provider survived gates");
        }
    }

    ranking.candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.provider_id.cmp(&b.provider_id))
            .then_with(|| a.model_id.cmp(&b.model_id))
    });

    if ranking.candidates.is_empty() {
        inject_escape_hatch(catalog, inputs, policy, &mut ranking);
    }
    ranking
}

/// Provider-level gates, in order. Returns the reason for the first failure.
fn gate_provider(
    entry: &CatalogEntry,
    inputs: &RankInputs,
    policy: &RankPolicy,
) -> Option<String> {
    let id = entry.provider_id.as_str();
    if policy.disabled.contains(id) {
        return Some("disabled by policy".to_string());
    }
    if !entry.is_local() && !policy.cloud_enabled {
        return Some("cloud providers disabled".to_string());
    }
    if !inputs.adapters.contains(id) {
        return Some("no adapter available".to_string());
    }
    if !policy.allowed(id) {
        return Some("not in allow list".to_string());
    }
    if policy.denied(id) {
        return Some("in deny list".to_string());
    }
    if !inputs.health.get(id).copied().unwrap_or(false) {
        return Some("unhealthy".to_string());
    }
    if let Some(Err(denied)) = inputs.quota.get(id) {
        return Some(format!("quota {}", denied));
    }
    None
}

fn score(
    entry: &CatalogEntry,
    model: &ModelSpec,
    request: &RankRequest,
    policy: &RankPolicy,
) -> ScoredCandidate {
    let mut total = BASE_SCORE;
    let mut reasons = vec![format!("base {BASE_SCORE:+}")];
    let mut adjust = |points: i32, why: &str| {
        total += points;
        reasons.push(format!("{why} {points:+}"));
    };

    if entry.is_local() {
        if policy.cloud_enabled {
            adjust(LOCAL_CLOUD_ON_PENALTY, "local fallback");
        } else {
            adjust(LOCAL_CLOUD_OFF_BONUS, "local preferred");
        }
    }

    let tags = &entry.routing_tags;
    if tags.has_label("paid_fallback") {
        adjust(PAID_FALLBACK_PENALTY, "paid fallback");
    }
    if tags.has_label("free_tier") {
        adjust(FREE_TIER_BONUS, "free tier");
        if request
            .budget_ceiling_usd
            .is_some_and(|ceiling| ceiling < TIGHT_BUDGET_USD)
        {
            adjust(FREE_TIER_BUDGET_BONUS, "free tier under tight budget");
        }
    }
    if tags.has_label("low_latency") {
        if request.latency_target == LatencyTarget::Low {
            adjust(LOW_LATENCY_TARGET_BONUS, "low latency target");
        } else {
            adjust(LOW_LATENCY_BONUS, "low latency");
        }
    }

    let class = request.task_class.as_str();
    if tags.prefers(class) {
        adjust(PREFERS_BONUS, "prefers task class");
    }
    if tags.avoids(class) {
        adjust(AVOIDS_PENALTY, "avoids task class");
    }

    match request.arousal {
        Some(ArousalTier::Low) => {
            if entry.is_local() || tags.has_label("low_latency") {
                adjust(AROUSAL_BONUS, "low arousal fast path");
            }
        }
        Some(ArousalTier::High) => {
            let large_context = model
                .context_window_hint
                .is_some_and(|hint| hint >= LARGE_CONTEXT_TOKENS);
            if large_context || model.tool_support {
                adjust(AROUSAL_BONUS, "high arousal capability");
            }
            if entry.is_local() {
                adjust(-AROUSAL_BONUS, "high arousal off local");
            }
        }
        Some(ArousalTier::Medium) | None => {}
    }

    ScoredCandidate {
        provider_id: entry.provider_id.clone(),
        model_id: model.model_id.clone(),
        score: total,
        is_local: entry.is_local(),
        escape_hatch: false,
        reasons,
    }
}

fn inject_escape_hatch(
    catalog: &Catalog,
    inputs: &RankInputs,
    policy: &RankPolicy,
    ranking: &mut Ranking,
) {
    let id = policy.escape_hatch.as_str();
    let Some(entry) = catalog.get(id).filter(|e| e.is_local()) else {
        ranking
            .explanation
            .push(format!("escape hatch {id}: not a local catalog provider"));
        return;
    };
    if policy.disabled.contains(id) {
        ranking
            .explanation
            .push(format!("escape hatch {id}: disabled by policy"));
        return;
    }
    let healthy = inputs.health.get(id).copied().unwrap_or(false);
    let quota_ok = inputs.quota.get(id).is_none_or(|q| q.is_ok());
    if !inputs.adapters.contains(id) || !healthy || !quota_ok {
        ranking.explanation.push(format!(
            "escape hatch {id}: unavailable (adapter={}, healthy={healthy}, quota_ok={quota_ok})",
            inputs.adapters.contains(id)
        ));
        return;
    }
    let Some(model) = entry.models.first() else {
        return;
    };

    ranking.explanation.push(format!(
        "inject escape hatch {id}/{}: score {ESCAPE_HATCH_SCORE}",
        model.model_id
    ));
    ranking.candidates.push(ScoredCandidate {
        provider_id: entry.provider_id.clone(),
        model_id: model.model_id.clone(),
        score: ESCAPE_HATCH_SCORE,
        is_local: true,
        escape_hatch: true,
        reasons: vec!["escape hatch".to_string()],
    });
}
