//! `nodes` crate: the `ExecutableNode` contract, the executor registry and
//! built-in node implementations.
//!
//! Every executor, built-in and external alike, must implement
//! [`ExecutableNode`]. The engine crate dispatches execution through this
//! trait object after looking the node type up in a [`NodeRegistry`].

pub mod builtin;
pub mod error;
pub mod mock;
pub mod params;
pub mod registry;
pub mod traits;

pub use error::{NodeError, RegistryError};
pub use registry::NodeRegistry;
pub use traits::{ExecutableNode, NodeContext, Parameters};
