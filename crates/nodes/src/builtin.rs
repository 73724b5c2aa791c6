//! Executors shipped with the engine itself.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::{ExecutableNode, NodeContext, NodeError, NodeRegistry, Parameters, RegistryError};

/// Node type key of [`Passthrough`].
pub const PASSTHROUGH: &str = "passthrough";

/// Returns its resolved parameters unchanged.
///
/// Handy for wiring values between nodes and for dry-running a definition
/// without touching external systems.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl ExecutableNode for Passthrough {
    async fn execute(&self, params: Parameters, ctx: &NodeContext) -> Result<Value, NodeError> {
        tracing::debug!(node_id = %ctx.node_id, keys = params.len(), "passthrough");
        Ok(Value::Object(params))
    }
}

/// A registry holding every built-in executor.
pub fn registry() -> Result<NodeRegistry, RegistryError> {
    NodeRegistry::new().with(PASSTHROUGH, Arc::new(Passthrough))
}
