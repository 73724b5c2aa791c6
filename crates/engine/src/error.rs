//! Engine-level error types.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Definition errors (nothing has executed yet) ------

    /// The definition document could not be parsed.
    #[error("invalid workflow document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle through: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    /// Every node has an incoming connection (or there are no nodes).
    #[error("workflow has no entry node")]
    NoEntryNode,

    /// No executor is registered for a node's type.
    #[error("no executor for type '{node_type}' (node '{node_id}')")]
    UnknownNodeType {
        node_id: String,
        node_type: String,
    },

    /// An executor rejected a node's raw parameters at load time.
    #[error("node '{node_id}' ({node_type}) has an invalid definition: {source}")]
    InvalidDefinition {
        node_id: String,
        node_type: String,
        #[source]
        source: nodes::NodeError,
    },

    /// A seed data key shadows a node ID.
    #[error("seed data key '{0}' collides with a node ID")]
    SeedConflict(String),

    // ------ Run errors ------

    /// A reference token named a key that is not in the execution context.
    #[error(
        "node '{node_id}': parameter '{parameter}' references '{reference}', which has no result"
    )]
    UnresolvedReference {
        node_id: String,
        parameter: String,
        reference: String,
    },

    /// The executor returned an error.
    #[error("node '{node_id}' ({node_type}) failed: {source}")]
    NodeFailed {
        node_id: String,
        node_type: String,
        #[source]
        source: nodes::NodeError,
    },

    /// The executor did not finish within its timeout.
    #[error("node '{node_id}' ({node_type}) timed out after {timeout:?}")]
    NodeTimeout {
        node_id: String,
        node_type: String,
        timeout: Duration,
    },

    /// The run was cancelled before every node completed.
    #[error("workflow run cancelled after {completed} node(s) completed")]
    Cancelled { completed: usize },

    /// A scheduler task could not be joined.
    #[error("scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Whether the error was raised before any node executed.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::DuplicateNodeId(_)
                | Self::UnknownNodeReference { .. }
                | Self::CycleDetected(_)
                | Self::NoEntryNode
                | Self::UnknownNodeType { .. }
                | Self::InvalidDefinition { .. }
                | Self::SeedConflict(_)
        )
    }

    /// The node the error is attributed to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::UnknownNodeType { node_id, .. }
            | Self::InvalidDefinition { node_id, .. }
            | Self::UnresolvedReference { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeTimeout { node_id, .. } => Some(node_id.as_str()),
            Self::DuplicateNodeId(id) => Some(id.as_str()),
            _ => None,
        }
    }
}
