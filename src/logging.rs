// SPDX-License-Identifier: MPL-2.0

//! Logging setup, powered by tracing-subscriber.

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Build the filter from `RUST_LOG`, falling back to `directives`
pub fn build_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(directives)?),
    }
}

/// Install a compact fmt subscriber for the process.
/// Embedding apps that already own a subscriber should skip this.
pub fn init(directives: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(directives)?)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
