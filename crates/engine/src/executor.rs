//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the definition (graph shape, node types, parameter shapes)
//!    before anything runs.
//! 2. Seeds a fresh execution context and queues every entry node.
//! 3. For each ready node: emits `NodeStarted`, resolves its parameters
//!    against the context and spawns the bound executor with a timeout.
//! 4. When a node completes, stores its result, emits `NodeCompleted` and
//!    decrements the pending-predecessor count of each successor; a
//!    successor becomes ready once that count reaches zero, so a node with
//!    several predecessors runs exactly once, after all of them.
//! 5. A failed node emits `NodeFailed`; its successors never become ready.
//!    The first failure is what the run returns.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

use nodes::{ExecutableNode, NodeContext, NodeError, NodeRegistry, Parameters};

use crate::context::ExecutionContext;
use crate::dag::{validate_dag, Dag};
use crate::events::{EventBus, NodeEvent};
use crate::models::{NodeDefinition, Workflow};
use crate::resolver::{collect_references, resolve_parameters};
use crate::{EngineError, ExecutorConfig};

// ---------------------------------------------------------------------------
// Output of a completed execution
// ---------------------------------------------------------------------------

/// The result of running a full workflow.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// Unique per run; also carried by every event of the run.
    pub execution_id: Uuid,
    pub workflow_id: String,
    /// Result of every node, keyed by node id. Seed entries are excluded.
    pub results: BTreeMap<String, Value>,
    /// Entry node ids in declaration order.
    pub entry_nodes: Vec<String>,
    /// Ids of nodes without successors, in topological order.
    pub terminal_nodes: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutput {
    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.results.get(node_id)
    }

    /// The result of each entry node's branch root.
    pub fn entry_results(&self) -> Vec<(&str, &Value)> {
        self.pick(&self.entry_nodes)
    }

    /// Results of the nodes where branches end.
    pub fn terminal_results(&self) -> Vec<(&str, &Value)> {
        self.pick(&self.terminal_nodes)
    }

    fn pick<'a>(&'a self, ids: &'a [String]) -> Vec<(&'a str, &'a Value)> {
        ids.iter()
            .filter_map(|id| self.results.get(id).map(|v| (id.as_str(), v)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator; one instance can serve any number of runs.
///
/// Construct one per process with the registry built at startup and call
/// [`WorkflowExecutor::run`] with the workflow and its seed data.
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    config: ExecutorConfig,
    events: Arc<EventBus>,
}

impl WorkflowExecutor {
    /// Create a new executor with its own, initially empty, event bus.
    pub fn new(registry: Arc<NodeRegistry>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            config,
            events: Arc::new(EventBus::new()),
        }
    }

    /// Publish lifecycle events on a shared bus instead.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Check everything that can be checked without running anything.
    ///
    /// # Errors
    /// Any graph error from [`validate_dag`], plus
    /// [`EngineError::UnknownNodeType`] and [`EngineError::InvalidDefinition`].
    pub fn validate(&self, workflow: &Workflow) -> Result<Dag, EngineError> {
        let dag = validate_dag(workflow)?;
        self.bind(workflow)?;
        Ok(dag)
    }

    /// Resolve and check the executor of every node.
    fn bind<'w>(
        &self,
        workflow: &'w Workflow,
    ) -> Result<HashMap<&'w str, Bound<'w>>, EngineError> {
        let mut bound = HashMap::with_capacity(workflow.nodes.len());

        for node in &workflow.nodes {
            let executor =
                self.registry
                    .get(&node.node_type)
                    .ok_or_else(|| EngineError::UnknownNodeType {
                        node_id: node.id.clone(),
                        node_type: node.node_type.clone(),
                    })?;

            let checked = if node.timeout_secs == Some(0) {
                Err(NodeError::invalid("timeout_secs", "must be greater than zero"))
            } else {
                executor.validate_parameters(&node.parameters)
            };
            checked.map_err(|source| EngineError::InvalidDefinition {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                source,
            })?;

            bound.insert(node.id.as_str(), Bound { node, executor });
        }

        Ok(bound)
    }

    /// Run the workflow to completion.
    ///
    /// # Errors
    /// Definition errors (nothing executed), or the first node failure.
    pub async fn run(
        &self,
        workflow: &Workflow,
        seed: HashMap<String, Value>,
    ) -> Result<RunOutput, EngineError> {
        self.run_with_cancel(workflow, seed, CancellationToken::new())
            .await
    }

    /// Run the workflow until it finishes or `cancel` fires.
    ///
    /// After cancellation no further node is started. Nodes already running
    /// see their [`NodeContext::cancellation`] fire and are awaited, not
    /// aborted.
    #[instrument(
        skip_all,
        fields(workflow_id = %workflow.id, execution_id = tracing::field::Empty)
    )]
    pub async fn run_with_cancel(
        &self,
        workflow: &Workflow,
        seed: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, EngineError> {
        let dag = validate_dag(workflow)?;
        let bound = self.bind(workflow)?;
        let context =
            ExecutionContext::seeded(seed, workflow.nodes.iter().map(|n| n.id.as_str()))?;

        let execution_id = Uuid::new_v4();
        Span::current().record("execution_id", tracing::field::display(execution_id));
        info!(nodes = dag.len(), entries = ?dag.entries(), "workflow run started");

        warn_on_unordered_references(workflow, &dag, &context);

        let started_at = Utc::now();
        let run = RunState::new(self, workflow, &dag, bound, execution_id, context, cancel);
        let context = run.drive().await?;

        let mut values = context.into_values();
        let results: BTreeMap<String, Value> = workflow
            .nodes
            .iter()
            .filter_map(|n| values.remove_entry(&n.id))
            .collect();

        info!(completed = results.len(), "workflow run succeeded");

        Ok(RunOutput {
            execution_id,
            workflow_id: workflow.id.clone(),
            results,
            entry_nodes: dag.entries().to_vec(),
            terminal_nodes: dag
                .order()
                .iter()
                .filter(|id| dag.is_terminal(id))
                .cloned()
                .collect(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Log references whose target is not guaranteed to exist when the node runs.
fn warn_on_unordered_references(workflow: &Workflow, dag: &Dag, context: &ExecutionContext) {
    for node in &workflow.nodes {
        for (parameter, target) in collect_references(&node.parameters) {
            if workflow.node(&target).is_some() {
                if !dag.is_ancestor(&target, &node.id) {
                    warn!(
                        node_id = %node.id, %parameter, %target,
                        "reference to a node that is not upstream; result depends on timing"
                    );
                }
            } else if !context.contains(&target) {
                warn!(
                    node_id = %node.id, %parameter, %target,
                    "reference to neither a node nor a seed entry; it will not resolve"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-run scheduling state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A node paired with the executor its type is bound to.
#[derive(Clone)]
struct Bound<'a> {
    node: &'a NodeDefinition,
    executor: Arc<dyn ExecutableNode>,
}

struct RunState<'a> {
    executor: &'a WorkflowExecutor,
    workflow: &'a Workflow,
    dag: &'a Dag,
    execution_id: Uuid,
    nodes: HashMap<&'a str, Bound<'a>>,
    states: HashMap<&'a str, NodeState>,
    /// Predecessors each node is still waiting on.
    waiting: HashMap<&'a str, usize>,
    ready: VecDeque<Bound<'a>>,
    tasks: JoinSet<Result<Value, EngineError>>,
    /// Node behind each in-flight task.
    running: HashMap<Id, &'a str>,
    context: ExecutionContext,
    cancel: CancellationToken,
    first_failure: Option<EngineError>,
}

impl<'a> RunState<'a> {
    fn new(
        executor: &'a WorkflowExecutor,
        workflow: &'a Workflow,
        dag: &'a Dag,
        nodes: HashMap<&'a str, Bound<'a>>,
        execution_id: Uuid,
        context: ExecutionContext,
        cancel: CancellationToken,
    ) -> Self {
        let states = nodes.keys().map(|id| (*id, NodeState::Pending)).collect();
        let waiting = nodes.keys().map(|id| (*id, dag.in_degree(id))).collect();
        let ready = dag
            .entries()
            .iter()
            .filter_map(|id| nodes.get(id.as_str()).cloned())
            .collect();

        Self {
            executor,
            workflow,
            dag,
            execution_id,
            nodes,
            states,
            waiting,
            ready,
            tasks: JoinSet::new(),
            running: HashMap::new(),
            context,
            cancel,
            first_failure: None,
        }
    }

    /// Schedule until nothing is ready and nothing is in flight.
    async fn drive(mut self) -> Result<ExecutionContext, EngineError> {
        loop {
            self.dispatch_ready();

            let (task, outcome) = match self.tasks.join_next_with_id().await {
                None => break,
                Some(Ok((task, outcome))) => (task, outcome),
                Some(Err(e)) => {
                    error!("scheduler task could not be joined: {e}");
                    (e.id(), Err(EngineError::Join(e)))
                }
            };
            match self.running.remove(&task) {
                Some(node_id) => self.finish(node_id, outcome),
                None => warn!(%task, "joined a task that is not tracked"),
            }
        }

        let unfinished = self
            .states
            .values()
            .filter(|s| **s != NodeState::Completed)
            .count();

        // A cancelled run reports the cancellation even if in-flight nodes
        // failed while winding down.
        if self.cancel.is_cancelled() && unfinished > 0 {
            let completed = self.context.completed();
            warn!(completed, unfinished, "workflow run cancelled");
            return Err(EngineError::Cancelled { completed });
        }

        if let Some(err) = self.first_failure {
            return Err(err);
        }

        Ok(self.context)
    }

    fn halted(&self) -> bool {
        self.cancel.is_cancelled()
            || (self.executor.config.fail_fast && self.first_failure.is_some())
    }

    fn has_capacity(&self) -> bool {
        self.executor
            .config
            .max_concurrent_nodes
            .map_or(true, |max| self.tasks.len() < max)
    }

    fn dispatch_ready(&mut self) {
        while !self.halted() && self.has_capacity() {
            let Some(node) = self.ready.pop_front() else {
                break;
            };
            self.start(node);
        }
    }

    fn start(&mut self, bound: Bound<'a>) {
        let Bound { node, executor } = bound;
        let id = node.id.as_str();
        if self.states.get(id) != Some(&NodeState::Pending) {
            debug!(node_id = id, "node already started; skipping");
            return;
        }
        self.states.insert(id, NodeState::Running);
        self.publish(NodeEvent::NodeStarted {
            execution_id: self.execution_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            at: Utc::now(),
        });

        let params = match resolve_parameters(node, &self.context) {
            Ok(params) => params,
            Err(e) => return self.fail(node, e),
        };

        let timeout = node
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.executor.config.node_timeout());
        let ctx = NodeContext {
            workflow_id: self.workflow.id.clone(),
            execution_id: self.execution_id,
            node_id: node.id.clone(),
            cancellation: self.cancel.child_token(),
        };
        let node_type = node.node_type.clone();

        debug!(node_id = id, %node_type, ?timeout, "dispatching node");
        let task = self
            .tasks
            .spawn(invoke(executor, params, ctx, node_type, timeout));
        self.running.insert(task.id(), id);
    }

    fn finish(&mut self, node_id: &str, outcome: Result<Value, EngineError>) {
        let Some(node) = self.nodes.get(node_id).map(|b| b.node) else {
            warn!(node_id, "result for a node that is not part of this workflow");
            return;
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => return self.fail(node, e),
        };

        if !self.context.record(&node.id, result.clone()) {
            warn!(node_id, "result already recorded; keeping the first one");
        }
        self.states.insert(node.id.as_str(), NodeState::Completed);
        debug!(node_id, "node completed");
        self.publish(NodeEvent::NodeCompleted {
            execution_id: self.execution_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            result,
            at: Utc::now(),
        });

        let dag = self.dag;
        for next in dag.successors(&node.id) {
            let Some(remaining) = self.waiting.get_mut(next.as_str()) else {
                continue;
            };
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                if let Some(next_node) = self.nodes.get(next.as_str()).cloned() {
                    self.ready.push_back(next_node);
                }
            }
        }
    }

    fn fail(&mut self, node: &'a NodeDefinition, err: EngineError) {
        self.states.insert(node.id.as_str(), NodeState::Failed);
        error!(node_id = %node.id, node_type = %node.node_type, "node failed: {err}");
        self.publish(NodeEvent::NodeFailed {
            execution_id: self.execution_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            error: err.to_string(),
            at: Utc::now(),
        });

        if self.first_failure.is_none() {
            self.first_failure = Some(err);
        }
    }

    fn publish(&self, event: NodeEvent) {
        self.executor.events.publish(&event);
    }
}

/// Call one executor under a timeout, isolating panics.
async fn invoke(
    executor: Arc<dyn ExecutableNode>,
    params: Parameters,
    ctx: NodeContext,
    node_type: String,
    timeout: Duration,
) -> Result<Value, EngineError> {
    let node_id = ctx.node_id.clone();
    let cancellation = ctx.cancellation.clone();
    let mut handle = tokio::spawn(async move { executor.execute(params, &ctx).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(source))) => Err(EngineError::NodeFailed {
            node_id,
            node_type,
            source,
        }),
        Ok(Err(join_err)) => {
            let reason = if join_err.is_panic() {
                "executor panicked"
            } else {
                "executor task was cancelled"
            };
            Err(EngineError::NodeFailed {
                node_id,
                node_type,
                source: NodeError::failed(reason),
            })
        }
        Err(_) => {
            cancellation.cancel();
            handle.abort();
            Err(EngineError::NodeTimeout {
                node_id,
                node_type,
                timeout,
            })
        }
    }
}
