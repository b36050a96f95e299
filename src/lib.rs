//! Switchyard - resilient request routing for LLM backends
//!
//! This library plans routes across two primary remote backends and a local
//! one, dispatches with sequential fallback, and keeps the health memory that
//! steers later requests: per-backend cooldowns, per-provider circuit
//! breakers and quota counters for an optional federated catalog. Prompts for
//! small local models are shrunk by a progressive-degradation budgeter.
//!
//! Concrete provider clients live outside the crate; anything implementing
//! [`provider::Provider`] can be routed to.

pub mod budget;
pub mod cli;
pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod federation;
pub mod logging;
pub mod provider;
pub mod routing;
