//! JSON-RPC 2.0 error taxonomy and response envelopes.
//!
//! Mirrors the standard JSON-RPC error codes plus one gateway-specific
//! catch-all (`Generic`, `-32000`) used to wrap arbitrary command-execution
//! failures inside a batch.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// The JSON-RPC protocol version this gateway speaks.
pub const JSON_RPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes, plus the gateway's generic wrapper code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Generic,
}

impl RpcErrorCode {
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Generic => -32000,
        }
    }

    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Invalid JSON was received",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal Error",
            Self::Generic => "Generic",
        }
    }
}

/// A JSON-RPC error, carrying enough context to render both the wire
/// response and (for the scan engine) an HTTP status.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn parse_error(data: Value) -> Self {
        Self::new(RpcErrorCode::ParseError, RpcErrorCode::ParseError.default_message()).with_data(data)
    }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, message)
    }

    #[must_use]
    pub fn method_not_found(message: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::MethodNotFound, message).with_data(Value::String(method.into()))
    }

    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    #[must_use]
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Generic, message)
    }

    /// Renders this error as the `error` object of a JSON-RPC response.
    #[must_use]
    pub fn as_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code.code(),
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }

    /// Wraps this error into a full response envelope for the given request id.
    #[must_use]
    pub fn into_response(self, id: Value) -> RpcResponse {
        RpcResponse::Error {
            id,
            jsonrpc: JSON_RPC_VERSION,
            error: self.as_error_body(),
        }
    }
}

/// The `error` object inside an error response.
#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A full JSON-RPC response envelope — either a success or an error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Success {
        id: Value,
        jsonrpc: &'static str,
        result: Value,
    },
    Error {
        id: Value,
        jsonrpc: &'static str,
        error: RpcErrorBody,
    },
}

impl RpcResponse {
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self::Success {
            id,
            jsonrpc: JSON_RPC_VERSION,
            result,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Builds an arbitrary shallow JSON `Value` — enough variety to exercise
    /// `data`/`result` round-tripping without proptest having to explore the
    /// full recursive `Value` grammar.
    fn arb_json() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            ".*".prop_map(Value::String),
            proptest::collection::vec(any::<i64>(), 0..5)
                .prop_map(|v| Value::Array(v.into_iter().map(Value::from).collect())),
        ]
    }

    proptest! {
        /// Any error built with arbitrary message/data survives a
        /// serialize round-trip with its code and message intact, and the
        /// `data` field is only present when it was actually set.
        #[test]
        fn error_response_round_trips_message_and_data(
            message in ".*",
            data in proptest::option::of(arb_json()),
            id in arb_json(),
        ) {
            let mut err = RpcError::invalid_params(message.clone());
            if let Some(ref d) = data {
                err = err.with_data(d.clone());
            }
            let resp = err.into_response(id.clone());
            let json = serde_json::to_value(&resp).expect("serialize");

            prop_assert_eq!(&json["id"], &id);
            prop_assert_eq!(json["jsonrpc"], "2.0");
            prop_assert_eq!(json["error"]["code"].as_i64(), Some(RpcErrorCode::InvalidParams.code()));
            prop_assert_eq!(json["error"]["message"].as_str(), Some(message.as_str()));
            match data {
                Some(d) => prop_assert_eq!(&json["error"]["data"], &d),
                None => prop_assert!(json["error"].get("data").is_none()),
            }
        }

        /// A success response never carries an `error` field and always
        /// echoes `id`/`result` verbatim, regardless of their shape.
        #[test]
        fn success_response_never_carries_an_error_field(id in arb_json(), result in arb_json()) {
            let resp = RpcResponse::success(id.clone(), result.clone());
            let json = serde_json::to_value(&resp).expect("serialize");
            prop_assert_eq!(&json["id"], &id);
            prop_assert_eq!(&json["result"], &result);
            prop_assert!(json.get("error").is_none());
        }
    }
}
