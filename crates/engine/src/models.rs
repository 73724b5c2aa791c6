//! Core domain models for the workflow engine.
//!
//! These types are the in-memory form of a workflow definition and
//! deserialise directly from its JSON document:
//! `{ id, name, description, nodes: [...], connections: [...] }`.

use serde::{Deserialize, Serialize};

use nodes::Parameters;

use crate::EngineError;

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by connections
    /// and by `$id` reference tokens).
    pub id: String,
    /// Key into the executor registry, e.g. `"httpRequest"` or `"database"`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw parameters; values may be literals, nested mappings, or
    /// reference tokens.
    #[serde(default)]
    pub parameters: Parameters,
    /// Overrides the executor-wide node timeout for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl NodeDefinition {
    /// Convenience constructor for testing.
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        parameters: Parameters,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: None,
            description: None,
            parameters,
            timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Directed dependency from one node to another. Carries no data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<NodeDefinition>,
        connections: Vec<Connection>,
    ) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: String::new(),
            nodes,
            connections,
        }
    }

    /// Parse a workflow definition document.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Look a node up by id.
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_definition_document() {
        let wf = Workflow::from_json(
            r#"{
                "id": "wf-1",
                "name": "fetch and store",
                "description": "demo",
                "nodes": [
                    { "id": "fetch", "type": "httpRequest", "label": "Fetch",
                      "parameters": { "url": "https://api.example.com/x" } },
                    { "id": "store", "type": "database",
                      "parameters": { "operation": "insert", "data": "$fetch" },
                      "timeout_secs": 5 }
                ],
                "connections": [ { "from": "fetch", "to": "store" } ]
            }"#,
        )
        .unwrap();

        assert_eq!(wf.id, "wf-1");
        assert_eq!(wf.nodes[0].node_type, "httpRequest");
        assert_eq!(wf.nodes[0].label.as_deref(), Some("Fetch"));
        assert_eq!(wf.nodes[1].parameters["data"], json!("$fetch"));
        assert_eq!(wf.nodes[1].timeout_secs, Some(5));
        assert_eq!(wf.connections, vec![Connection::new("fetch", "store")]);
        assert_eq!(wf.node("store").map(|n| n.id.as_str()), Some("store"));
    }

    #[test]
    fn parameters_and_connections_default_to_empty() {
        let wf = Workflow::from_json(
            r#"{ "id": "w", "name": "n", "nodes": [ { "id": "a", "type": "passthrough" } ] }"#,
        )
        .unwrap();
        assert!(wf.nodes[0].parameters.is_empty());
        assert!(wf.connections.is_empty());
        assert!(wf.description.is_empty());
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            Workflow::from_json(r#"{ "id": "w" }"#),
            Err(EngineError::Parse(_))
        ));
    }
}
