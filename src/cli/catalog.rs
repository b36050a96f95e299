//! Catalog command handlers

use anyhow::{anyhow, bail, Context};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cli::output::{format_providers_table, format_ranking_table, to_json, ProviderView};
use crate::cli::{CatalogRankArgs, CatalogValidateArgs};
use crate::config::SwitchyardConfig;
use crate::federation::{
    infer_arousal, rank_candidates, Catalog, RankInputs, RankPolicy, RankRequest,
};
use crate::routing::infer_task_class;

fn catalog_path(explicit: Option<&PathBuf>, config: &SwitchyardConfig) -> anyhow::Result<PathBuf> {
    explicit
        .or(config.federation.catalog_path.as_ref())
        .cloned()
        .ok_or_else(|| anyhow!("No catalog given: pass --catalog or set federation.catalog_path"))
}

fn load_catalog(path: &PathBuf) -> anyhow::Result<Catalog> {
    Catalog::load(path).with_context(|| format!("loading catalog {}", path.display()))
}

/// Handle `switchyard catalog validate`
pub fn handle_catalog_validate(
    args: &CatalogValidateArgs,
    config: &SwitchyardConfig,
) -> anyhow::Result<String> {
    let path = catalog_path(args.catalog.as_ref(), config)?;
    let catalog = load_catalog(&path)?;

    let views: Vec<ProviderView> = catalog
        .iter()
        .map(|entry| {
            let policy = entry.breaker_policy(&config.federation.default_circuit_breaker);
            let breaker = format!(
                "{} failures / {}s open / {}s probe",
                policy.consecutive_failures_to_open,
                policy.open_seconds,
                policy.half_open_probe_interval_seconds
            );
            ProviderView::from_entry(entry, breaker)
        })
        .collect();
    let missing: Vec<&str> = catalog
        .missing_credentials()
        .into_iter()
        .map(|e| e.provider_id.as_str())
        .collect();

    if args.strict && !missing.is_empty() {
        bail!("Missing credentials for: {}", missing.join(", "));
    }

    if args.json {
        return to_json(&json!({
            "valid": true,
            "path": path,
            "providers": views,
            "missing_credentials": missing,
        }));
    }

    let mut out = format!(
        "✓ Catalog valid: {} provider(s) in {}\n{}",
        catalog.len(),
        path.display(),
        format_providers_table(&views)
    );
    if !missing.is_empty() {
        out.push_str(&format!("\nMissing credentials: {}", missing.join(", ")));
    }
    Ok(out)
}

/// Handle `switchyard catalog rank`
///
/// Every catalog provider is assumed to have an adapter. Health is the
/// presence of the provider's credential unless `--assume-credentials` is
/// set. Quotas start empty.
pub fn handle_catalog_rank(
    args: &CatalogRankArgs,
    config: &SwitchyardConfig,
) -> anyhow::Result<String> {
    let path = catalog_path(args.catalog.as_ref(), config)?;
    let catalog = load_catalog(&path)?;

    let mut federation = config.federation.clone();
    federation.cloud_enabled |= args.cloud;
    let policy = RankPolicy::from_config(&federation)?;

    let inputs = RankInputs {
        adapters: catalog.iter().map(|e| e.provider_id.clone()).collect(),
        health: catalog
            .iter()
            .map(|e| {
                let healthy = args.assume_credentials || e.auth.credential_present();
                (e.provider_id.clone(), healthy)
            })
            .collect::<BTreeMap<_, _>>(),
        quota: BTreeMap::new(),
    };

    let task_class = match args.task_class.as_deref() {
        Some(class) => class.parse().map_err(|e: String| anyhow!(e))?,
        None => infer_task_class(&args.text),
    };
    let arousal = match args.arousal.as_deref() {
        Some(tier) => tier.parse().map_err(|e: String| anyhow!(e))?,
        None => infer_arousal(&args.text),
    };
    let request = RankRequest {
        task_class,
        context_tokens: args
            .context_tokens
            .unwrap_or_else(|| args.text.chars().count().div_ceil(4) as u64),
        latency_target: args.latency.parse().map_err(|e: String| anyhow!(e))?,
        budget_ceiling_usd: args.budget_usd,
        arousal: Some(arousal),
    };

    let ranking = rank_candidates(&catalog, &request, &inputs, &policy);

    if args.json {
        to_json(&json!({ "request": request, "ranking": ranking }))
    } else {
        Ok(format!(
            "Task class: {}, arousal: {}, context: {} tokens\n{}",
            request.task_class,
            arousal,
            request.context_tokens,
            format_ranking_table(&ranking)
        ))
    }
}
