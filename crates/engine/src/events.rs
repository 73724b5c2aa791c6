//! Observability bus: node lifecycle events for external consumers.
//!
//! The scheduler publishes one [`NodeEvent`] per lifecycle step. Listeners
//! run synchronously, in registration order, on the scheduler's own task.
//! A listener that returns an error or panics is logged and skipped; it can
//! never fail the run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Events emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeEvent {
    /// The node was reached and is about to resolve and execute.
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        execution_id: Uuid,
        node_id: String,
        node_type: String,
        at: DateTime<Utc>,
    },

    /// The node's result was stored in the execution context.
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: Uuid,
        node_id: String,
        node_type: String,
        result: Value,
        at: DateTime<Utc>,
    },

    /// Resolution, execution, or the timeout failed for this node.
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        execution_id: Uuid,
        node_id: String,
        node_type: String,
        error: String,
        at: DateTime<Utc>,
    },
}

impl NodeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeStarted { .. } => EventKind::NodeStarted,
            Self::NodeCompleted { .. } => EventKind::NodeCompleted,
            Self::NodeFailed { .. } => EventKind::NodeFailed,
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. } => node_id,
        }
    }
}

/// Discriminant of [`NodeEvent`], used to subscribe to one kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NodeStarted,
    NodeCompleted,
    NodeFailed,
}

/// Receives node events.
///
/// Implemented for any `Fn(&NodeEvent) -> anyhow::Result<()>` closure.
pub trait NodeListener: Send + Sync {
    fn on_event(&self, event: &NodeEvent) -> anyhow::Result<()>;
}

impl<F> NodeListener for F
where
    F: Fn(&NodeEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &NodeEvent) -> anyhow::Result<()> {
        self(event)
    }
}

struct Subscription {
    kind: Option<EventKind>,
    listener: Arc<dyn NodeListener>,
}

/// Publish/subscribe channel between the scheduler and its observers.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for one kind of event, or every kind if `None`.
    pub fn subscribe(&self, kind: Option<EventKind>, listener: Arc<dyn NodeListener>) {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { kind, listener });
    }

    pub fn on_node_start<F>(&self, f: F)
    where
        F: Fn(&NodeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Some(EventKind::NodeStarted), Arc::new(f));
    }

    pub fn on_node_complete<F>(&self, f: F)
    where
        F: Fn(&NodeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Some(EventKind::NodeCompleted), Arc::new(f));
    }

    pub fn on_node_error<F>(&self, f: F)
    where
        F: Fn(&NodeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Some(EventKind::NodeFailed), Arc::new(f));
    }

    /// Forward every event into a broadcast channel for async consumers.
    ///
    /// Events are dropped while no receiver is alive; slow receivers see
    /// `RecvError::Lagged` once `capacity` is exceeded.
    pub fn subscribe_channel(&self, capacity: usize) -> broadcast::Receiver<NodeEvent> {
        let (tx, rx) = broadcast::channel(capacity);
        self.subscribe(
            None,
            Arc::new(move |event: &NodeEvent| -> anyhow::Result<()> {
                // No receivers is not an error.
                let _ = tx.send(event.clone());
                Ok(())
            }),
        );
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every matching listener, in registration order.
    pub fn publish(&self, event: &NodeEvent) {
        let kind = event.kind();
        let listeners: Vec<Arc<dyn NodeListener>> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| Arc::clone(&s.listener))
            .collect();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(node_id = %event.node_id(), ?kind, "event listener failed: {e:#}")
                }
                Err(_) => warn!(node_id = %event.node_id(), ?kind, "event listener panicked"),
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// A listener that records every event it receives.
///
/// Useful for testing, and for printing a run's history afterwards.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<NodeEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log and subscribe it to every kind of event on `bus`.
    pub fn attach(bus: &EventBus) -> Arc<Self> {
        let log = Arc::new(Self::new());
        bus.subscribe(None, log.clone());
        log
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(kind, node id)` pairs in arrival order.
    pub fn trace(&self) -> Vec<(EventKind, String)> {
        self.events()
            .iter()
            .map(|e| (e.kind(), e.node_id().to_owned()))
            .collect()
    }

    /// Position of the first `kind` event for `node_id`.
    pub fn position(&self, kind: EventKind, node_id: &str) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| e.kind() == kind && e.node_id() == node_id)
    }

    /// Number of `kind` events for `node_id`.
    pub fn count(&self, kind: EventKind, node_id: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.kind() == kind && e.node_id() == node_id)
            .count()
    }
}

impl NodeListener for EventLog {
    fn on_event(&self, event: &NodeEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started(node_id: &str) -> NodeEvent {
        NodeEvent::NodeStarted {
            execution_id: Uuid::nil(),
            node_id: node_id.into(),
            node_type: "mock".into(),
            at: Utc::now(),
        }
    }

    fn failed(node_id: &str) -> NodeEvent {
        NodeEvent::NodeFailed {
            execution_id: Uuid::nil(),
            node_id: node_id.into(),
            node_type: "mock".into(),
            error: "boom".into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.on_node_start(move |_| {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        bus.publish(&started("a"));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn kind_filter_is_respected() {
        let bus = EventBus::new();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        bus.on_node_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let log = EventLog::attach(&bus);

        bus.publish(&started("a"));
        bus.publish(&failed("a"));

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            log.trace(),
            vec![
                (EventKind::NodeStarted, "a".to_string()),
                (EventKind::NodeFailed, "a".to_string()),
            ]
        );
    }

    #[test]
    fn failing_and_panicking_listeners_are_isolated() {
        let bus = EventBus::new();
        bus.on_node_start(|_| Err(anyhow::anyhow!("listener broke")));
        bus.on_node_start(|_| panic!("listener panicked"));
        let log = EventLog::attach(&bus);

        bus.publish(&started("a"));
        bus.publish(&started("b"));

        assert_eq!(log.events().len(), 2);
        assert_eq!(bus.listener_count(), 3);
    }

    #[tokio::test]
    async fn channel_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_channel(8);

        bus.publish(&started("a"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.node_id(), "a");
        assert_eq!(event.kind(), EventKind::NodeStarted);
    }

    #[test]
    fn events_serialise_with_type_tag() {
        let event = NodeEvent::NodeCompleted {
            execution_id: Uuid::nil(),
            node_id: "fetch".into(),
            node_type: "httpRequest".into(),
            result: json!({ "id": 1 }),
            at: Utc::now(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "nodeCompleted");
        assert_eq!(v["nodeId"], "fetch");
        assert_eq!(v["result"], json!({ "id": 1 }));
    }
}
