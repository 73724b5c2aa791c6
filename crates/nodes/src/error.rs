//! Node-level error types.

use thiserror::Error;

/// Errors returned by a node's `execute` (or `validate_parameters`) method.
///
/// The engine never retries on any variant; retry, if wanted, belongs
/// inside the executor itself.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A parameter is missing, null, or has the wrong shape.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// The external call failed; the message describes the cause.
    #[error("{0}")]
    Failed(String),

    /// The external call failed with an underlying error value.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    /// Shorthand for [`NodeError::InvalidParameter`].
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`NodeError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Errors raised while building a [`crate::NodeRegistry`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A second executor was registered for the same node type.
    #[error("an executor is already registered for node type '{0}'")]
    Duplicate(String),

    /// The node type key is empty.
    #[error("node type must not be empty")]
    EmptyType,
}
