pub mod binder;
pub mod request;
pub mod resolver;

pub use binder::{bind_named, bind_positional, BoundArgs, CommandSignature, ParamKind, ParamSpec};
pub use request::{parse_payload, ParsedPayload, RpcBatchRequest, RpcParams, RpcRequest};
pub use resolver::{resolve, CommandRegistry};
