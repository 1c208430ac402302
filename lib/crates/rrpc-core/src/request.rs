//! Wire-level JSON-RPC request parsing and validation.

use rrpc_common::RpcError;
use serde::Deserialize;
use serde_json::{Map, Value};

/// A single parsed JSON-RPC request.
///
/// Construction is deliberately split into a strict path (`RpcRequest::parse`,
/// used for top-level payloads) and a lenient path (`RpcRequest::parse_lenient`,
/// used for batch elements) — an individual batch entry that fails validation
/// becomes a per-entry error response rather than aborting the whole batch.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    pub params: RpcParams,
    pub raw: Value,
}

/// The `params` member of a request: either positional (array) or named
/// (object), or absent entirely.
#[derive(Debug, Clone, Default)]
pub enum RpcParams {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default = "default_id")]
    id: Value,
    jsonrpc: Option<String>,
    method: Option<Value>,
    params: Option<Value>,
}

fn default_id() -> Value {
    Value::Null
}

impl RpcRequest {
    /// Parses and validates a single request object already decoded from JSON.
    ///
    /// Returns an `InvalidRequest` error carrying the offending `id` (when one
    /// could be salvaged) if `jsonrpc`/`method` are missing or malformed.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let raw: RawRequest = serde_json::from_value(value.clone())
            .map_err(|e| RpcError::invalid_request(format!("malformed request: {e}")))?;

        if raw.jsonrpc.as_deref() != Some("2.0") {
            return Err(RpcError::invalid_request("jsonrpc must be \"2.0\""));
        }

        let method = match raw.method {
            Some(Value::String(m)) if !m.is_empty() => m,
            _ => return Err(RpcError::invalid_request("method must be a non-empty string")),
        };

        let params = match raw.params {
            None | Some(Value::Null) => RpcParams::None,
            Some(Value::Array(items)) => RpcParams::Positional(items),
            Some(Value::Object(map)) => RpcParams::Named(map),
            Some(_) => return Err(RpcError::invalid_request("params must be an array or object")),
        };

        Ok(Self {
            id,
            method,
            params,
            raw,
        })
    }

    /// Method path split on `.`, e.g. `"redis_0.hset"` -> `["redis_0", "hset"]`.
    #[must_use]
    pub fn method_path(&self) -> Vec<&str> {
        self.method.split('.').collect()
    }
}

/// A parsed batch of requests. Each element is validated independently: a
/// malformed element does not invalidate the batch, it is carried forward as
/// an `Err` so the dispatcher can still respond to every `id` in the batch.
#[derive(Debug)]
pub struct RpcBatchRequest {
    pub items: Vec<Result<RpcRequest, (Value, RpcError)>>,
}

impl RpcBatchRequest {
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let Value::Array(items) = value else {
            return Err(RpcError::invalid_request("batch request must be an array"));
        };
        if items.is_empty() {
            return Err(RpcError::invalid_request("batch request must not be empty"));
        }
        let items = items
            .into_iter()
            .map(|item| {
                let id = item.get("id").cloned().unwrap_or(Value::Null);
                RpcRequest::from_value(item).map_err(|e| (id, e))
            })
            .collect();
        Ok(Self { items })
    }
}

/// Parses a raw HTTP body into either a single request or a batch, mirroring
/// the dispatch-by-payload-shape behaviour of the original gateway.
pub enum ParsedPayload {
    Single(Box<Result<RpcRequest, RpcError>>),
    Batch(RpcBatchRequest),
}

pub fn parse_payload(body: &[u8]) -> Result<ParsedPayload, RpcError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RpcError::parse_error(Value::String(e.to_string())))?;
    match value {
        Value::Array(_) => Ok(ParsedPayload::Batch(RpcBatchRequest::from_value(value)?)),
        other => Ok(ParsedPayload::Single(Box::new(RpcRequest::from_value(other)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_request_with_named_params() {
        let v = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "redis_0.get", "params": {"key": "x"}});
        let req = RpcRequest::from_value(v).expect("should parse");
        assert_eq!(req.method, "redis_0.get");
        assert_eq!(req.method_path(), vec!["redis_0", "get"]);
        assert!(matches!(req.params, RpcParams::Named(_)));
    }

    #[test]
    fn rejects_missing_jsonrpc_version() {
        let v = serde_json::json!({"id": 1, "method": "redis_0.get", "params": {}});
        let err = RpcRequest::from_value(v).unwrap_err();
        assert_eq!(err.code.code(), -32600);
    }

    #[test]
    fn rejects_missing_method() {
        let v = serde_json::json!({"jsonrpc": "2.0", "id": 1});
        let err = RpcRequest::from_value(v).unwrap_err();
        assert_eq!(err.code.code(), -32600);
    }

    #[test]
    fn defaults_id_to_null_when_absent() {
        let v = serde_json::json!({"jsonrpc": "2.0", "method": "redis_0.ping"});
        let req = RpcRequest::from_value(v).expect("should parse");
        assert_eq!(req.id, Value::Null);
    }

    #[test]
    fn batch_keeps_valid_entries_alongside_invalid_ones() {
        let v = serde_json::json!([
            {"jsonrpc": "2.0", "id": 1, "method": "redis_0.ping"},
            {"id": 2, "method": "redis_0.ping"},
        ]);
        let batch = RpcBatchRequest::from_value(v).expect("batch should parse");
        assert_eq!(batch.items.len(), 2);
        assert!(batch.items[0].is_ok());
        assert!(batch.items[1].is_err());
    }

    #[test]
    fn empty_batch_is_invalid_request() {
        let err = RpcBatchRequest::from_value(Value::Array(vec![])).unwrap_err();
        assert_eq!(err.code.code(), -32600);
    }

    #[test]
    fn parse_payload_detects_batch_shape() {
        let body = br#"[{"jsonrpc":"2.0","id":1,"method":"redis_0.ping"}]"#;
        let parsed = parse_payload(body).expect("should parse");
        assert!(matches!(parsed, ParsedPayload::Batch(_)));
    }

    #[test]
    fn parse_payload_reports_parse_error_on_bad_json() {
        let err = parse_payload(b"{not json").unwrap_err();
        assert_eq!(err.code.code(), -32700);
    }
}
