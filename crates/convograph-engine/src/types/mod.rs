//! Core data types shared by the executor and the assistant graphs.

mod knowledge;
mod llm;
mod memory;
mod message;

pub use knowledge::*;
pub use llm::*;
pub use memory::*;
pub use message::*;

use crate::errors::{GatewayError, StoreError};
use crate::executor::ExecutorError;

// ---------------------------------------------------------------------------
// NodeError
// ---------------------------------------------------------------------------

/// Errors returned by [`NodeHandler`](crate::traits::NodeHandler)
/// implementations. Any of them aborts the run.
#[derive(Debug)]
#[non_exhaustive]
pub enum NodeError {
    Fatal { message: String },
    /// A model reply could not be validated against the requested schema.
    Validation { message: String },
    /// Unknown model name or an otherwise unusable run configuration.
    Configuration { message: String },
    /// An operation was handed input it is not defined for.
    ContractViolation { message: String },
    /// A nested graph run failed.
    Subgraph {
        graph: String,
        source: Box<ExecutorError>,
    },
}

impl NodeError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// Innermost error, looking through nested graph failures.
    pub fn root_cause(&self) -> &NodeError {
        match self {
            Self::Subgraph { source, .. } => match source.node_error() {
                Some(inner) => inner.root_cause(),
                None => self,
            },
            other => other,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self.root_cause(), Self::ContractViolation { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), Self::Configuration { .. })
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal { message } => write!(f, "fatal: {message}"),
            Self::Validation { message } => write!(f, "validation: {message}"),
            Self::Configuration { message } => write!(f, "configuration: {message}"),
            Self::ContractViolation { message } => write!(f, "contract violation: {message}"),
            Self::Subgraph { graph, source } => write!(f, "sub-graph '{graph}' failed: {source}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Subgraph { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<GatewayError> for NodeError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UnsupportedModel { .. } => Self::Configuration {
                message: err.to_string(),
            },
            GatewayError::StructuredOutput { .. } => Self::Validation {
                message: err.to_string(),
            },
            GatewayError::Invocation { .. } => Self::Fatal {
                message: err.to_string(),
            },
        }
    }
}

impl From<StoreError> for NodeError {
    fn from(err: StoreError) -> Self {
        Self::Fatal {
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
