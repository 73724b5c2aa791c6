//! Helpers for reading resolved parameters inside executors.
//!
//! Executors usually decode the whole mapping into their own typed config
//! struct with [`decode`], so a wrong shape is reported as
//! [`NodeError::InvalidParameter`] instead of surfacing deep inside the call.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{NodeError, Parameters};

/// Deserialize the parameter mapping into `T`.
pub fn decode<T: DeserializeOwned>(params: &Parameters) -> Result<T, NodeError> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| NodeError::invalid("parameters", e.to_string()))
}

/// Fetch a parameter that must be present and non-null.
pub fn required<'a>(params: &'a Parameters, name: &str) -> Result<&'a Value, NodeError> {
    match params.get(name) {
        None => Err(NodeError::invalid(name, "missing")),
        Some(Value::Null) => Err(NodeError::invalid(name, "null")),
        Some(v) => Ok(v),
    }
}

/// Fetch a required string parameter.
pub fn required_str<'a>(params: &'a Parameters, name: &str) -> Result<&'a str, NodeError> {
    required(params, name)?
        .as_str()
        .ok_or_else(|| NodeError::invalid(name, "expected a string"))
}

/// Ensure every name in `names` is a key of the raw mapping.
///
/// Intended for [`crate::ExecutableNode::validate_parameters`], where
/// values may still be unresolved reference tokens.
pub fn require_keys(params: &Parameters, names: &[&str]) -> Result<(), NodeError> {
    for name in names {
        if !params.contains_key(*name) {
            return Err(NodeError::invalid(*name, "missing"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn params(v: Value) -> Parameters {
        v.as_object().cloned().unwrap()
    }

    #[derive(Debug, Deserialize)]
    struct Insert {
        operation: String,
        data: Value,
    }

    #[test]
    fn decode_reads_typed_config() {
        let p = params(json!({ "operation": "insert", "data": { "id": 1 } }));
        let cfg: Insert = decode(&p).unwrap();
        assert_eq!(cfg.operation, "insert");
        assert_eq!(cfg.data, json!({ "id": 1 }));
    }

    #[test]
    fn decode_reports_shape_errors_as_invalid_parameter() {
        let p = params(json!({ "operation": 5 }));
        let err = decode::<Insert>(&p).unwrap_err();
        assert!(matches!(err, NodeError::InvalidParameter { .. }));
    }

    #[test]
    fn null_counts_as_missing_for_required() {
        let p = params(json!({ "data": null }));
        assert!(matches!(
            required(&p, "data"),
            Err(NodeError::InvalidParameter { reason, .. }) if reason == "null"
        ));
        assert!(required(&p, "other").is_err());
    }

    #[test]
    fn required_str_rejects_non_strings() {
        let p = params(json!({ "url": 1 }));
        assert!(required_str(&p, "url").is_err());
        let p = params(json!({ "url": "https://api.example.com/x" }));
        assert_eq!(required_str(&p, "url").unwrap(), "https://api.example.com/x");
    }

    #[test]
    fn require_keys_accepts_reference_tokens() {
        let p = params(json!({ "data": "$fetch" }));
        assert!(require_keys(&p, &["data"]).is_ok());
        assert!(require_keys(&p, &["data", "operation"]).is_err());
    }
}
