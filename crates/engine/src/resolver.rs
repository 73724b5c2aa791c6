//! Parameter resolution.
//!
//! Rewrites a node's raw parameters into the mapping handed to its executor.
//! A string value of the form `"$<id>"` is a reference token and is replaced
//! by the context entry stored under `<id>`; objects and arrays are walked
//! depth-first; every other value passes through unchanged. `"$$..."`
//! yields the literal string with the first `$` removed.
//!
//! Resolution never touches the node definition: each call builds a new
//! mapping from whatever the context holds at that moment.

use serde_json::Value;

use nodes::Parameters;

use crate::{context::ExecutionContext, models::NodeDefinition, EngineError};

/// Prefix marking a reference token.
pub const REFERENCE_SENTINEL: char = '$';

/// How a single string value is interpreted.
#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Reference(&'a str),
    Escaped(&'a str),
    Literal,
}

fn classify(s: &str) -> Token<'_> {
    match s.strip_prefix(REFERENCE_SENTINEL) {
        Some(rest) if rest.starts_with(REFERENCE_SENTINEL) => Token::Escaped(rest),
        Some(rest) if !rest.is_empty() => Token::Reference(rest),
        _ => Token::Literal,
    }
}

/// The node id a value refers to, if it is a reference token.
pub fn reference_target(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => match classify(s) {
            Token::Reference(id) => Some(id),
            _ => None,
        },
        _ => None,
    }
}

/// Every reference token in `params` as `(parameter path, referenced id)`.
///
/// Paths use `.` for object keys and `[i]` for array indices.
pub fn collect_references(params: &Parameters) -> Vec<(String, String)> {
    let mut found = Vec::new();
    for (key, value) in params {
        walk_references(key.clone(), value, &mut found);
    }
    found
}

fn walk_references(path: String, value: &Value, found: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                walk_references(format!("{path}.{key}"), v, found);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                walk_references(format!("{path}[{i}]"), v, found);
            }
        }
        other => {
            if let Some(id) = reference_target(other) {
                found.push((path, id.to_owned()));
            }
        }
    }
}

/// Resolve `node`'s parameters against `context`.
///
/// # Errors
/// [`EngineError::UnresolvedReference`] for the first reference (in
/// depth-first order) whose target has no entry in the context.
pub fn resolve_parameters(
    node: &NodeDefinition,
    context: &ExecutionContext,
) -> Result<Parameters, EngineError> {
    let mut resolved = Parameters::new();
    for (key, value) in &node.parameters {
        let v = resolve_value(&node.id, key, value, context)?;
        resolved.insert(key.clone(), v);
    }
    Ok(resolved)
}

fn resolve_value(
    node_id: &str,
    path: &str,
    value: &Value,
    context: &ExecutionContext,
) -> Result<Value, EngineError> {
    match value {
        Value::String(s) => match classify(s) {
            Token::Reference(target) => context.get(target).cloned().ok_or_else(|| {
                EngineError::UnresolvedReference {
                    node_id: node_id.to_owned(),
                    parameter: path.to_owned(),
                    reference: target.to_owned(),
                }
            }),
            Token::Escaped(literal) => Ok(Value::String(literal.to_owned())),
            Token::Literal => Ok(value.clone()),
        },
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                let child = format!("{path}.{key}");
                out.insert(key.clone(), resolve_value(node_id, &child, v, context)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| resolve_value(node_id, &format!("{path}[{i}]"), v, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(params: Value) -> NodeDefinition {
        NodeDefinition::new("store", "database", params.as_object().cloned().unwrap())
    }

    fn context(entries: &[(&str, Value)]) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        for (k, v) in entries {
            ctx.record(k, v.clone());
        }
        ctx
    }

    #[test]
    fn reference_is_replaced_by_stored_result() {
        let n = node(json!({ "operation": "insert", "data": "$fetch" }));
        let ctx = context(&[("fetch", json!({ "id": 1 }))]);

        let resolved = resolve_parameters(&n, &ctx).unwrap();
        assert_eq!(Value::Object(resolved), json!({ "operation": "insert", "data": { "id": 1 } }));
    }

    #[test]
    fn nested_mappings_and_arrays_are_resolved() {
        let n = node(json!({
            "body": { "user": "$user", "meta": { "source": "$fetch", "n": 3 } },
            "recipients": ["$user", "ops@example.com"]
        }));
        let ctx = context(&[("user", json!("ada")), ("fetch", json!([1, 2]))]);

        let resolved = resolve_parameters(&n, &ctx).unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({
                "body": { "user": "ada", "meta": { "source": [1, 2], "n": 3 } },
                "recipients": ["ada", "ops@example.com"]
            })
        );
    }

    #[test]
    fn missing_reference_fails_the_same_way_every_time() {
        let n = node(json!({ "payload": { "data": "$fetch" } }));
        let ctx = context(&[]);

        for _ in 0..2 {
            match resolve_parameters(&n, &ctx) {
                Err(EngineError::UnresolvedReference { node_id, parameter, reference }) => {
                    assert_eq!(node_id, "store");
                    assert_eq!(parameter, "payload.data");
                    assert_eq!(reference, "fetch");
                }
                other => panic!("expected unresolved reference, got {other:?}"),
            }
        }
    }

    #[test]
    fn literals_pass_through() {
        let n = node(json!({ "a": 1, "b": null, "c": "plain", "d": "$", "e": "$$100", "f": true }));
        let resolved = resolve_parameters(&n, &context(&[])).unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({ "a": 1, "b": null, "c": "plain", "d": "$", "e": "$100", "f": true })
        );
    }

    #[test]
    fn resolution_does_not_mutate_the_definition() {
        let n = node(json!({ "data": "$fetch" }));
        let before = n.clone();

        let first = resolve_parameters(&n, &context(&[("fetch", json!(1))])).unwrap();
        let second = resolve_parameters(&n, &context(&[("fetch", json!(2))])).unwrap();

        assert_eq!(n, before);
        assert_eq!(first["data"], json!(1));
        assert_eq!(second["data"], json!(2));
    }

    #[test]
    fn collects_reference_paths() {
        let n = node(json!({ "data": "$fetch", "x": { "y": ["lit", "$user"] }, "z": "$$no" }));
        let mut refs = collect_references(&n.parameters);
        refs.sort();
        assert_eq!(
            refs,
            vec![
                ("data".to_string(), "fetch".to_string()),
                ("x.y[1]".to_string(), "user".to_string()),
            ]
        );
    }
}
