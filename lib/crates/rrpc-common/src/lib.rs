pub mod error;

pub use error::{RpcError, RpcErrorBody, RpcErrorCode, RpcResponse};
