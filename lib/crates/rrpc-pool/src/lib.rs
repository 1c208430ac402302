pub mod commands;
pub mod config;
pub mod dispatch;
pub mod registry;

pub use commands::{redis_value_to_json, CommandSpec, CommandTable, RedisCommand};
pub use config::{read_pools_from_env, ConfigError, PoolConfig};
pub use dispatch::RpcDispatcher;
pub use registry::{PoolRegistry, SharedRegistry};
