//! Per-run execution context: node id → produced result.
//!
//! Created fresh for every run and owned exclusively by the scheduler loop,
//! so no locking is needed. Each key is written at most once.

use std::collections::HashMap;

use serde_json::Value;

use crate::EngineError;

#[derive(Debug, Default, Clone)]
pub struct ExecutionContext {
    values: HashMap<String, Value>,
    seeded: usize,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a context from caller-supplied seed data.
    ///
    /// # Errors
    /// [`EngineError::SeedConflict`] if a seed key equals one of `node_ids`.
    pub fn seeded<'a>(
        seed: HashMap<String, Value>,
        node_ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, EngineError> {
        for id in node_ids {
            if seed.contains_key(id) {
                return Err(EngineError::SeedConflict(id.to_owned()));
            }
        }
        let seeded = seed.len();
        Ok(Self {
            values: seed,
            seeded,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Store a node's result. Returns `false` (and keeps the first value)
    /// if the key already holds a result.
    pub fn record(&mut self, node_id: &str, result: Value) -> bool {
        if self.values.contains_key(node_id) {
            return false;
        }
        self.values.insert(node_id.to_owned(), result);
        true
    }

    /// Number of node results stored, excluding seed entries.
    pub fn completed(&self) -> usize {
        self.values.len() - self.seeded
    }

    pub fn into_values(self) -> HashMap<String, Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seed_entries_are_visible() {
        let seed = HashMap::from([("user".to_string(), json!({ "name": "ada" }))]);
        let ctx = ExecutionContext::seeded(seed, ["a", "b"]).unwrap();
        assert_eq!(ctx.get("user"), Some(&json!({ "name": "ada" })));
        assert_eq!(ctx.completed(), 0);
    }

    #[test]
    fn seed_may_not_shadow_a_node() {
        let seed = HashMap::from([("a".to_string(), json!(1))]);
        assert!(matches!(
            ExecutionContext::seeded(seed, ["a"]),
            Err(EngineError::SeedConflict(key)) if key == "a"
        ));
    }

    #[test]
    fn results_are_written_once() {
        let mut ctx = ExecutionContext::new();
        assert!(ctx.record("a", json!(1)));
        assert!(!ctx.record("a", json!(2)));
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.completed(), 1);
    }
}
