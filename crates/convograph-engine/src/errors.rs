//! Error types for the boundary traits and configuration loading.
//!
//! Node-level and executor-level errors live next to the code that raises
//! them: [`NodeError`](crate::types::NodeError) and
//! [`ExecutorError`](crate::executor::ExecutorError).

use thiserror::Error;

/// Errors from [`MemoryStore`](super::traits::MemoryStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("memory store error: {message}")]
    Store { message: String },
}

/// Errors from [`CapabilityRegistry`](super::traits::CapabilityRegistry) and
/// [`WebSearch`](super::traits::WebSearch).
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability not found: {name}")]
    NotFound { name: String },
    #[error("invalid arguments for '{name}': {message}")]
    InvalidArguments { name: String, message: String },
    #[error("capability '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Errors from [`ModelGateway`](super::gateway::ModelGateway) and
/// [`ChatModel`](super::traits::ChatModel) implementations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },
    #[error("model '{model}' invocation failed: {message}")]
    Invocation { model: String, message: String },
    #[error("structured output from '{model}' failed validation after {attempts} attempt(s): {message}")]
    StructuredOutput {
        model: String,
        attempts: u32,
        message: String,
    },
}

/// Errors from loading or validating a [`RunConfig`](super::config::RunConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for {key}: {message}")]
    Invalid { key: String, message: String },
}
