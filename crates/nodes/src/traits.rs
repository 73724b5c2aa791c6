//! The `ExecutableNode` trait: the contract every node executor must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::NodeError;

/// A node's parameter mapping, after reference tokens have been resolved.
pub type Parameters = serde_json::Map<String, Value>;

/// Per-invocation context passed to every executor.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// ID of the workflow being run.
    pub workflow_id: String,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// ID of the node being executed.
    pub node_id: String,
    /// Cancelled when the run is cancelled or the node times out.
    pub cancellation: CancellationToken,
}

impl NodeContext {
    /// Whether the executor should stop as soon as it can.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// The core executor trait.
///
/// One implementation is bound to each node type string in a
/// [`crate::NodeRegistry`]. All externally observable side effects of a
/// workflow happen inside [`ExecutableNode::execute`].
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Run the node with fully resolved parameters and return its result.
    async fn execute(&self, params: Parameters, ctx: &NodeContext) -> Result<Value, NodeError>;

    /// Check the raw (unresolved) parameters when a workflow is loaded.
    ///
    /// Values may still be reference tokens at this point, so only the
    /// shape of the mapping should be checked here.
    fn validate_parameters(&self, _params: &Parameters) -> Result<(), NodeError> {
        Ok(())
    }
}
