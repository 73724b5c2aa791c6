//! `engine` crate: workflow models, graph validation, parameter resolution,
//! the observability bus, and the execution engine.

pub mod config;
pub mod context;
pub mod dag;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod resolver;

pub use config::{ConfigError, ExecutorConfig};
pub use context::ExecutionContext;
pub use dag::{entry_nodes, successors, validate_dag, Dag};
pub use error::EngineError;
pub use events::{EventBus, EventKind, EventLog, NodeEvent, NodeListener};
pub use executor::{RunOutput, WorkflowExecutor};
pub use models::{Connection, NodeDefinition, Workflow};
pub use resolver::{collect_references, resolve_parameters, REFERENCE_SENTINEL};
