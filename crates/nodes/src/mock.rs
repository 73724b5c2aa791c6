//! `MockNode`, a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real executor is either
//! unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{params, ExecutableNode, NodeContext, NodeError, Parameters};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Return the resolved parameters as an object.
    EchoParameters,
    /// Fail with [`NodeError::Failed`].
    Fail(String),
}

/// A mock executor that records every parameter set it receives and returns
/// a programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions and log output.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Simulated latency before the behaviour applies.
    pub delay: Option<Duration>,
    /// Keys `validate_parameters` insists on.
    pub required_keys: Vec<String>,
    /// All resolved parameter sets seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Parameters>>>,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: None,
            required_keys: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that returns whatever parameters it was given.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::EchoParameters)
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// Sleep for `delay` before producing the result.
    ///
    /// The sleep ends early with an error if the node is cancelled.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject definitions that lack any of `keys`.
    pub fn with_required_keys(mut self, keys: &[&str]) -> Self {
        self.required_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Parameters received by the most recent call.
    pub fn last_call(&self) -> Option<Parameters> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, params: Parameters, ctx: &NodeContext) -> Result<Value, NodeError> {
        self.calls.lock().unwrap().push(params.clone());

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancellation.cancelled() => {
                    return Err(NodeError::failed(format!("{} cancelled", self.name)));
                }
            }
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::EchoParameters => Ok(Value::Object(params)),
            MockBehaviour::Fail(msg) => Err(NodeError::failed(msg.clone())),
        }
    }

    fn validate_parameters(&self, raw: &Parameters) -> Result<(), NodeError> {
        let keys: Vec<&str> = self.required_keys.iter().map(String::as_str).collect();
        params::require_keys(raw, &keys)
    }
}
