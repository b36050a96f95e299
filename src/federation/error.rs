//! Federation error types

use std::path::PathBuf;
use thiserror::Error;

use super::FederatedAttempt;

/// Catalog loading and validation errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    #[error("Duplicate provider_id '{0}'")]
    DuplicateProvider(String),

    #[error("Invalid catalog entry '{provider}': {message}")]
    Invalid { provider: String, message: String },
}

/// Errors surfaced by the provider registry
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("Federation is disabled")]
    Disabled,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Invalid provider pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("No federated candidate survived ranking")]
    NoCandidate { explanation: Vec<String> },

    #[error("All {} federated candidates failed", attempts.len())]
    Exhausted {
        attempts: Vec<FederatedAttempt>,
        explanation: Vec<String>,
    },
}
