//! Local backend eligibility.
//!
//! The local model is small: it may only take requests it can plausibly
//! serve, and only for fallback reasons that make it a sensible substitute.

use super::events::TriggerCode;
use super::DispatchRequest;
use crate::config::LocalPolicyConfig;

/// Intent that always implies the research flag.
const RESEARCH_INTENT: &str = "research";

/// Check whether the request itself may run on the local backend.
///
/// Research and long-context work is never eligible. Otherwise an
/// allowlisted intent is enough, and anything else must fit the size
/// heuristic.
pub fn check_request(request: &DispatchRequest, config: &LocalPolicyConfig) -> Result<(), String> {
    let intent = request.intent.as_deref().map(str::to_lowercase);

    if request.research || intent.as_deref() == Some(RESEARCH_INTENT) {
        return Err("research requests require a remote backend".to_string());
    }
    if request.long_context {
        return Err("long-context requests require a remote backend".to_string());
    }

    if let Some(intent) = &intent {
        if config
            .intent_allowlist
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(intent))
        {
            return Ok(());
        }
    }

    if let Some(max_output) = request.max_output_tokens {
        if max_output > config.max_output_tokens {
            return Err(format!(
                "max_output_tokens {} exceeds local limit {}",
                max_output, config.max_output_tokens
            ));
        }
    }
    let input_chars = request.input_chars();
    if input_chars > config.max_input_chars {
        return Err(format!(
            "input of {} chars exceeds local limit {}",
            input_chars, config.max_input_chars
        ));
    }
    Ok(())
}

/// Check whether the reason the loop reached the local candidate permits it.
///
/// `trigger` is the most recent pending transition, if any.
pub fn check_trigger(
    trigger: Option<TriggerCode>,
    allow_network: bool,
    planned_first: bool,
) -> Result<(), String> {
    if !allow_network || planned_first {
        return Ok(());
    }
    match trigger {
        Some(code) if code.permits_local_fallback() => Ok(()),
        Some(code) => Err(format!("{code} does not permit local fallback")),
        None => Err("no fallback trigger recorded".to_string()),
    }
}
