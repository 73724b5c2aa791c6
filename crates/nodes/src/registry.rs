//! Lookup table from node type string to executor.
//!
//! Built once at startup, then shared (usually behind an `Arc`) with every
//! run. It is never mutated while a workflow executes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{ExecutableNode, RegistryError};

/// Maps `node_type` strings to shared `ExecutableNode` implementations.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    executors: HashMap<String, Arc<dyn ExecutableNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `executor` to `node_type`.
    ///
    /// # Errors
    /// [`RegistryError::Duplicate`] if the type already has an executor.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        executor: Arc<dyn ExecutableNode>,
    ) -> Result<(), RegistryError> {
        let node_type = node_type.into();
        if node_type.is_empty() {
            return Err(RegistryError::EmptyType);
        }
        if self.executors.contains_key(&node_type) {
            return Err(RegistryError::Duplicate(node_type));
        }
        tracing::debug!(%node_type, "registered executor");
        self.executors.insert(node_type, executor);
        Ok(())
    }

    /// Builder-style [`NodeRegistry::register`].
    pub fn with(
        mut self,
        node_type: impl Into<String>,
        executor: Arc<dyn ExecutableNode>,
    ) -> Result<Self, RegistryError> {
        self.register(node_type, executor)?;
        Ok(self)
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn ExecutableNode>> {
        self.executors.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    /// Registered node types, sorted.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}
