//! Graph model: structural queries and DAG validation.
//!
//! Run [`validate_dag`] before executing a workflow. Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every connection must reference valid node IDs (both `from` and `to`).
//! 3. At least one node must have no incoming connection.
//! 4. The directed graph must be acyclic (topological sort must succeed).
//!
//! Every ordering produced here follows declaration order, so the same
//! definition always yields the same traversal.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    models::{NodeDefinition, Workflow},
    EngineError,
};

/// All nodes with no incoming connection, in node declaration order.
pub fn entry_nodes(workflow: &Workflow) -> Vec<&NodeDefinition> {
    let targets: HashSet<&str> = workflow.connections.iter().map(|c| c.to.as_str()).collect();
    workflow
        .nodes
        .iter()
        .filter(|n| !targets.contains(n.id.as_str()))
        .collect()
}

/// Every node that `node_id` connects to, in connection declaration order.
///
/// A target listed by several identical connections is returned once.
pub fn successors<'a>(workflow: &'a Workflow, node_id: &str) -> Vec<&'a NodeDefinition> {
    let mut seen = HashSet::new();
    workflow
        .connections
        .iter()
        .filter(|c| c.from == node_id && seen.insert(c.to.as_str()))
        .filter_map(|c| workflow.node(&c.to))
        .collect()
}

/// Validated adjacency index of a workflow.
#[derive(Debug, Clone)]
pub struct Dag {
    order: Vec<String>,
    entries: Vec<String>,
    successors: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
}

impl Dag {
    /// Node IDs in a topological order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Entry node IDs in declaration order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Direct successors of `node_id`, in connection declaration order.
    pub fn successors(&self, node_id: &str) -> &[String] {
        self.successors.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct predecessors of `node_id`.
    pub fn predecessors(&self, node_id: &str) -> &[String] {
        self.predecessors.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct predecessors `node_id` must wait for.
    pub fn in_degree(&self, node_id: &str) -> usize {
        self.predecessors(node_id).len()
    }

    /// Whether there is a path from `ancestor` to `node_id`.
    pub fn is_ancestor(&self, ancestor: &str, node_id: &str) -> bool {
        let mut stack: Vec<&str> = self.predecessors(node_id).iter().map(String::as_str).collect();
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.predecessors(current).iter().map(String::as_str));
            }
        }
        false
    }

    /// Whether `node_id` has no successors.
    pub fn is_terminal(&self, node_id: &str) -> bool {
        self.successors(node_id).is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Validate the workflow's DAG and build its adjacency index.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection references a missing node.
/// - [`EngineError::NoEntryNode`] if every node has an incoming connection.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(workflow: &Workflow) -> Result<Dag, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut node_set: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !node_set.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate connection endpoints
    // -----------------------------------------------------------------------
    for conn in &workflow.connections {
        if !node_set.contains(conn.from.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: conn.from.clone(),
                side: "from",
            });
        }
        if !node_set.contains(conn.to.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: conn.to.clone(),
                side: "to",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Build adjacency, collapsing repeated connections
    // -----------------------------------------------------------------------
    let mut successors: HashMap<String, Vec<String>> = HashMap::new();
    let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
    let mut seen_edges: HashSet<(&str, &str)> = HashSet::new();

    for conn in &workflow.connections {
        if !seen_edges.insert((conn.from.as_str(), conn.to.as_str())) {
            tracing::debug!(from = %conn.from, to = %conn.to, "ignoring repeated connection");
            continue;
        }
        successors.entry(conn.from.clone()).or_default().push(conn.to.clone());
        predecessors.entry(conn.to.clone()).or_default().push(conn.from.clone());
    }

    let entries: Vec<String> = workflow
        .nodes
        .iter()
        .filter(|n| !predecessors.contains_key(&n.id))
        .map(|n| n.id.clone())
        .collect();

    if entries.is_empty() {
        return Err(EngineError::NoEntryNode);
    }

    // -----------------------------------------------------------------------
    // 4. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let mut in_degree: HashMap<&str, usize> = workflow
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), predecessors.get(&n.id).map_or(0, Vec::len)))
        .collect();

    let mut queue: VecDeque<&str> = entries.iter().map(String::as_str).collect();
    let mut order: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        order.push(node_id.to_owned());

        for next in successors.get(node_id).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(next.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next.as_str());
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if order.len() != workflow.nodes.len() {
        let stuck = workflow
            .nodes
            .iter()
            .filter(|n| in_degree.get(n.id.as_str()).is_some_and(|d| *d > 0))
            .map(|n| n.id.clone())
            .collect();
        return Err(EngineError::CycleDetected(stuck));
    }

    Ok(Dag {
        order,
        entries,
        successors,
        predecessors,
    })
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Connection;

    fn make_node(id: &str) -> NodeDefinition {
        NodeDefinition::new(id, "mock", Default::default())
    }

    fn make_workflow(ids: &[&str], edges: &[(&str, &str)]) -> Workflow {
        Workflow::new(
            "test",
            ids.iter().map(|id| make_node(id)).collect(),
            edges.iter().map(|(f, t)| Connection::new(*f, *t)).collect(),
        )
    }

    fn ids(nodes: Vec<&NodeDefinition>) -> Vec<&str> {
        nodes.into_iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // A → B → C
        let workflow = make_workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);

        let dag = validate_dag(&workflow).expect("should be valid");
        assert_eq!(dag.order(), ["a", "b", "c"]);
        assert_eq!(dag.entries(), ["a"]);
        assert!(dag.is_terminal("c"));
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let workflow = make_workflow(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );

        let dag = validate_dag(&workflow).expect("should be valid");
        assert_eq!(dag.order(), ["a", "b", "c", "d"]);
        assert_eq!(dag.in_degree("d"), 2);
        assert_eq!(dag.successors("a"), ["b", "c"]);
        assert!(dag.is_ancestor("a", "d"));
        assert!(!dag.is_ancestor("b", "c"));
        assert!(!dag.is_ancestor("d", "a"));
    }

    #[test]
    fn entry_nodes_follow_declaration_order() {
        let workflow = make_workflow(&["z", "b", "y", "a"], &[("z", "a"), ("y", "a")]);
        assert_eq!(ids(entry_nodes(&workflow)), vec!["z", "b", "y"]);
    }

    #[test]
    fn entry_nodes_is_empty_when_every_node_has_a_predecessor() {
        let workflow = make_workflow(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert!(entry_nodes(&workflow).is_empty());
    }

    #[test]
    fn successors_follow_connection_order() {
        let workflow = make_workflow(
            &["a", "b", "c", "d"],
            &[("a", "d"), ("b", "c"), ("a", "b"), ("a", "d")],
        );
        assert_eq!(ids(successors(&workflow, "a")), vec!["d", "b"]);
        assert!(successors(&workflow, "c").is_empty());
    }

    #[test]
    fn repeated_connections_count_once() {
        let workflow = make_workflow(&["a", "b"], &[("a", "b"), ("a", "b")]);
        let dag = validate_dag(&workflow).unwrap();
        assert_eq!(dag.in_degree("b"), 1);
        assert_eq!(dag.order(), ["a", "b"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(&["a", "a"], &[]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn connection_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(&["a"], &[("a", "ghost")]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, side: "to" }) if node_id == "ghost"
        ));

        let workflow = make_workflow(&["a"], &[("ghost", "a")]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { side: "from", .. })
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // root → A → B → C → A  (cycle behind an entry node)
        let workflow = make_workflow(
            &["root", "a", "b", "c"],
            &[("root", "a"), ("a", "b"), ("b", "c"), ("c", "a")],
        );
        match validate_dag(&workflow) {
            Err(EngineError::CycleDetected(nodes)) => assert_eq!(nodes, vec!["a", "b", "c"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let workflow = make_workflow(&["root", "a"], &[("root", "a"), ("a", "a")]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::CycleDetected(_))));
    }

    #[test]
    fn fully_cyclic_graph_has_no_entry() {
        let workflow = make_workflow(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::NoEntryNode)));
    }

    #[test]
    fn empty_workflow_has_no_entry() {
        let workflow = make_workflow(&[], &[]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::NoEntryNode)));
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let workflow = make_workflow(&["solo"], &[]);
        let dag = validate_dag(&workflow).expect("single node should be valid");
        assert_eq!(dag.order(), ["solo"]);
        assert_eq!(dag.len(), 1);
    }
}
