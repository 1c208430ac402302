//! The command table: an explicit, statically-typed replacement for the
//! original gateway's `getattr`-based reflection over a redis client object.
//!
//! Each entry pairs a dotted command name with a [`CommandSignature`]
//! describing its parameters (so [`rrpc_core::bind_named`] can bind a
//! `params` object against it) and a [`RedisCommand`] tag that `execute`
//! dispatches on to make the actual `fred` call.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fred::interfaces::{
    ClientLike, HashesInterface, KeysInterface, ListInterface, ServerInterface, SetsInterface,
    SortedSetsInterface, StringsInterface,
};
use fred::prelude::*;
use fred::types::{Map as RedisMap, Value as RedisValue};
use rrpc_common::RpcError;
use rrpc_core::{BoundArgs, CommandRegistry, CommandSignature, ParamSpec};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Which parameters of a command are consumed client-side (never forwarded
/// to Redis). Currently only `get`'s `encoding` parameter, which controls
/// how the binary reply is rendered as JSON.
pub struct CommandSpec {
    pub signature: CommandSignature,
    pub command: RedisCommand,
    pub client_side_params: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub enum RedisCommand {
    Ping,
    Get,
    Set,
    SetNx,
    Del,
    Exists,
    Mget,
    Expire,
    Persist,
    Ttl,
    Incr,
    IncrBy,
    Append,
    StrLen,
    Rename,
    Type,
    HSet,
    HGet,
    HGetAll,
    HDel,
    LRange,
    RPush,
    LPush,
    LLen,
    ZAdd,
    ZRange,
    ZScore,
    SAdd,
    SMembers,
    SCard,
}

static COMMAND_TABLE: LazyLock<HashMap<&'static str, CommandSpec>> = LazyLock::new(build_command_table);

fn build_command_table() -> HashMap<&'static str, CommandSpec> {
    let mut table = HashMap::new();

    macro_rules! cmd {
        ($name:literal, $command:expr, [$($param:expr),* $(,)?]) => {
            table.insert(
                $name,
                CommandSpec {
                    signature: CommandSignature::new(vec![$($param),*]),
                    command: $command,
                    client_side_params: &[],
                },
            );
        };
    }

    cmd!("ping", RedisCommand::Ping, []);
    table.insert(
        "get",
        CommandSpec {
            signature: CommandSignature::new(vec![
                ParamSpec::positional_or_keyword("key"),
                ParamSpec::keyword_only("encoding", Value::Null),
            ]),
            command: RedisCommand::Get,
            client_side_params: &["encoding"],
        },
    );
    cmd!(
        "set",
        RedisCommand::Set,
        [
            ParamSpec::positional_or_keyword("key"),
            ParamSpec::positional_or_keyword("value"),
            ParamSpec::keyword_only("ex", Value::Null),
        ]
    );
    cmd!(
        "setnx",
        RedisCommand::SetNx,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::positional_or_keyword("value")]
    );
    cmd!("del", RedisCommand::Del, [ParamSpec::var_positional("keys")]);
    cmd!("exists", RedisCommand::Exists, [ParamSpec::var_positional("keys")]);
    cmd!("mget", RedisCommand::Mget, [ParamSpec::var_positional("keys")]);
    cmd!(
        "expire",
        RedisCommand::Expire,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::positional_or_keyword("seconds")]
    );
    cmd!("persist", RedisCommand::Persist, [ParamSpec::positional_or_keyword("key")]);
    cmd!("ttl", RedisCommand::Ttl, [ParamSpec::positional_or_keyword("key")]);
    cmd!("incr", RedisCommand::Incr, [ParamSpec::positional_or_keyword("key")]);
    cmd!(
        "incrby",
        RedisCommand::IncrBy,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::positional_or_keyword("amount")]
    );
    cmd!(
        "append",
        RedisCommand::Append,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::positional_or_keyword("value")]
    );
    cmd!("strlen", RedisCommand::StrLen, [ParamSpec::positional_or_keyword("key")]);
    cmd!(
        "rename",
        RedisCommand::Rename,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::positional_or_keyword("new_key")]
    );
    cmd!("type", RedisCommand::Type, [ParamSpec::positional_or_keyword("key")]);
    cmd!(
        "hset",
        RedisCommand::HSet,
        [
            ParamSpec::positional_or_keyword("key"),
            ParamSpec::positional_or_keyword("field"),
            ParamSpec::positional_or_keyword("value"),
        ]
    );
    cmd!(
        "hget",
        RedisCommand::HGet,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::positional_or_keyword("field")]
    );
    cmd!("hgetall", RedisCommand::HGetAll, [ParamSpec::positional_or_keyword("key")]);
    cmd!(
        "hdel",
        RedisCommand::HDel,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::var_positional("fields")]
    );
    cmd!(
        "lrange",
        RedisCommand::LRange,
        [
            ParamSpec::positional_or_keyword("key"),
            ParamSpec::positional_or_keyword("start"),
            ParamSpec::positional_or_keyword("stop"),
        ]
    );
    cmd!(
        "rpush",
        RedisCommand::RPush,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::var_positional("values")]
    );
    cmd!(
        "lpush",
        RedisCommand::LPush,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::var_positional("values")]
    );
    cmd!("llen", RedisCommand::LLen, [ParamSpec::positional_or_keyword("key")]);
    cmd!(
        "zadd",
        RedisCommand::ZAdd,
        [
            ParamSpec::positional_or_keyword("key"),
            ParamSpec::positional_or_keyword("score"),
            ParamSpec::positional_or_keyword("member"),
        ]
    );
    cmd!(
        "zrange",
        RedisCommand::ZRange,
        [
            ParamSpec::positional_or_keyword("key"),
            ParamSpec::positional_or_keyword("start"),
            ParamSpec::positional_or_keyword("stop"),
            ParamSpec::keyword_only("withscores", Value::Bool(false)),
        ]
    );
    cmd!(
        "zscore",
        RedisCommand::ZScore,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::positional_or_keyword("member")]
    );
    cmd!(
        "sadd",
        RedisCommand::SAdd,
        [ParamSpec::positional_or_keyword("key"), ParamSpec::var_positional("members")]
    );
    cmd!("smembers", RedisCommand::SMembers, [ParamSpec::positional_or_keyword("key")]);
    cmd!("scard", RedisCommand::SCard, [ParamSpec::positional_or_keyword("key")]);

    table
}

/// Wraps the static command table so it can serve as an
/// [`rrpc_core::CommandRegistry`]: method paths are `[pool_name, command]`,
/// but signature lookup ignores the pool segment since the signature is the
/// same for every pool.
pub struct CommandTable;

impl CommandRegistry for CommandTable {
    fn signature(&self, path: &[&str]) -> Option<&CommandSignature> {
        let name = path.last()?;
        COMMAND_TABLE.get(name).map(|spec| &spec.signature)
    }
}

#[must_use]
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.get(name)
}

/// Describes every command's parameter signature as JSON, for the `/inspect`
/// endpoint — a static stand-in for the original gateway's runtime
/// `inspect.Signature` reflection over a live client object.
#[must_use]
pub fn describe_all() -> Value {
    let mut commands = Map::new();
    for (name, spec) in COMMAND_TABLE.iter() {
        let params: Vec<Value> = spec
            .signature
            .params
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "kind": format!("{:?}", p.kind),
                    "default": p.default.clone().unwrap_or(Value::Null),
                })
            })
            .collect();
        commands.insert((*name).to_string(), Value::Array(params));
    }
    Value::Object(commands)
}

/// Executes a bound call against `client`, converting the Redis reply (and
/// any client-side parameters, such as `get`'s `encoding`) into JSON.
///
/// Generic over `C` so the same dispatch logic drives a plain [`Client`], a
/// [`fred::clients::Pipeline`] (for batched, non-atomic execution), or a
/// [`fred::clients::Transaction`] (for `multi_exec`) — all three implement
/// the same per-data-type command traits.
pub async fn execute<C>(client: &C, spec: &CommandSpec, bound: &BoundArgs) -> Result<Value, RpcError>
where
    C: ClientLike
        + KeysInterface
        + StringsInterface
        + HashesInterface
        + ListInterface
        + SetsInterface
        + SortedSetsInterface
        + ServerInterface,
{
    let args = &bound.positional;
    let kw = &bound.keyword;

    match spec.command {
        RedisCommand::Ping => {
            let reply: String = client.ping(None).await.map_err(internal)?;
            Ok(Value::String(reply))
        }
        RedisCommand::Get => {
            let key = require_str(args, 0, "key")?;
            let reply: RedisValue = client.get(key).await.map_err(internal)?;
            let encoding = kw.get("encoding").and_then(Value::as_str);
            redis_value_to_json_encoded(reply, encoding)
        }
        RedisCommand::Set => {
            let key = require_str(args, 0, "key")?;
            let value = require_str(args, 1, "value")?;
            let ex = kw.get("ex").and_then(Value::as_i64).map(Expiration::EX);
            let _: () = client.set(key, value, ex, None, false).await.map_err(internal)?;
            Ok(Value::Bool(true))
        }
        RedisCommand::SetNx => {
            let key = require_str(args, 0, "key")?;
            let value = require_str(args, 1, "value")?;
            let reply: bool = client.setnx(key, value).await.map_err(internal)?;
            Ok(Value::Bool(reply))
        }
        RedisCommand::Del => {
            let keys = require_str_vec(args)?;
            let reply: i64 = client.del(keys).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::Exists => {
            let keys = require_str_vec(args)?;
            let reply: i64 = client.exists(keys).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::Mget => {
            let keys = require_str_vec(args)?;
            let reply: Vec<RedisValue> = client.mget(keys).await.map_err(internal)?;
            let values = reply
                .into_iter()
                .map(|v| redis_value_to_json(v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }
        RedisCommand::Expire => {
            let key = require_str(args, 0, "key")?;
            let seconds = require_i64(args, 1, "seconds")?;
            let reply: bool = client.expire(key, seconds, None).await.map_err(internal)?;
            Ok(Value::Bool(reply))
        }
        RedisCommand::Persist => {
            let key = require_str(args, 0, "key")?;
            let reply: bool = client.persist(key).await.map_err(internal)?;
            Ok(Value::Bool(reply))
        }
        RedisCommand::Ttl => {
            let key = require_str(args, 0, "key")?;
            let reply: i64 = client.ttl(key).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::Incr => {
            let key = require_str(args, 0, "key")?;
            let reply: i64 = client.incr(key).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::IncrBy => {
            let key = require_str(args, 0, "key")?;
            let amount = require_i64(args, 1, "amount")?;
            let reply: i64 = client.incrby(key, amount).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::Append => {
            let key = require_str(args, 0, "key")?;
            let value = require_str(args, 1, "value")?;
            let reply: i64 = client.append(key, value).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::StrLen => {
            let key = require_str(args, 0, "key")?;
            let reply: i64 = client.strlen(key).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::Rename => {
            let key = require_str(args, 0, "key")?;
            let new_key = require_str(args, 1, "new_key")?;
            let _: () = client.rename(key, new_key).await.map_err(internal)?;
            Ok(Value::Bool(true))
        }
        RedisCommand::Type => {
            let key = require_str(args, 0, "key")?;
            let reply: String = client.key_type(key).await.map_err(internal)?.to_string();
            Ok(Value::String(reply))
        }
        RedisCommand::HSet => {
            let key = require_str(args, 0, "key")?;
            let field = require_str(args, 1, "field")?;
            let value = require_str(args, 2, "value")?;
            let reply: i64 = client.hset(key, (field, value)).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::HGet => {
            let key = require_str(args, 0, "key")?;
            let field = require_str(args, 1, "field")?;
            let reply: RedisValue = client.hget(key, field).await.map_err(internal)?;
            redis_value_to_json(reply)
        }
        RedisCommand::HGetAll => {
            let key = require_str(args, 0, "key")?;
            let reply: RedisMap = client.hgetall(key).await.map_err(internal)?;
            redis_map_to_json(reply)
        }
        RedisCommand::HDel => {
            let key = require_str(args, 0, "key")?;
            let fields = require_str_vec(&args[1..])?;
            let reply: i64 = client.hdel(key, fields).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::LRange => {
            let key = require_str(args, 0, "key")?;
            let start = require_i64(args, 1, "start")?;
            let stop = require_i64(args, 2, "stop")?;
            let reply: Vec<RedisValue> = client.lrange(key, start, stop).await.map_err(internal)?;
            Ok(Value::Array(
                reply.into_iter().map(redis_value_to_json).collect::<Result<_, _>>()?,
            ))
        }
        RedisCommand::RPush => {
            let key = require_str(args, 0, "key")?;
            let values = require_str_vec(&args[1..])?;
            let reply: i64 = client.rpush(key, values).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::LPush => {
            let key = require_str(args, 0, "key")?;
            let values = require_str_vec(&args[1..])?;
            let reply: i64 = client.lpush(key, values).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::LLen => {
            let key = require_str(args, 0, "key")?;
            let reply: i64 = client.llen(key).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::ZAdd => {
            let key = require_str(args, 0, "key")?;
            let score = require_f64(args, 1, "score")?;
            let member = require_str(args, 2, "member")?;
            let reply: i64 = client
                .zadd(key, None, None, false, false, (score, member))
                .await
                .map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::ZRange => {
            let key = require_str(args, 0, "key")?;
            let start = require_i64(args, 1, "start")?;
            let stop = require_i64(args, 2, "stop")?;
            let withscores = kw.get("withscores").and_then(Value::as_bool).unwrap_or(false);
            let reply: Vec<RedisValue> = client
                .zrange(key, start, stop, None, false, None, withscores)
                .await
                .map_err(internal)?;
            Ok(Value::Array(
                reply.into_iter().map(redis_value_to_json).collect::<Result<_, _>>()?,
            ))
        }
        RedisCommand::ZScore => {
            let key = require_str(args, 0, "key")?;
            let member = require_str(args, 1, "member")?;
            let reply: RedisValue = client.zscore(key, member).await.map_err(internal)?;
            redis_value_to_json(reply)
        }
        RedisCommand::SAdd => {
            let key = require_str(args, 0, "key")?;
            let members = require_str_vec(&args[1..])?;
            let reply: i64 = client.sadd(key, members).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
        RedisCommand::SMembers => {
            let key = require_str(args, 0, "key")?;
            let reply: Vec<RedisValue> = client.smembers(key).await.map_err(internal)?;
            Ok(Value::Array(
                reply.into_iter().map(redis_value_to_json).collect::<Result<_, _>>()?,
            ))
        }
        RedisCommand::SCard => {
            let key = require_str(args, 0, "key")?;
            let reply: i64 = client.scard(key).await.map_err(internal)?;
            Ok(Value::from(reply))
        }
    }
}

fn internal(e: fred::error::Error) -> RpcError {
    RpcError::internal(e.to_string())
}

fn require_str<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a str, RpcError> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("argument '{name}' must be a string")))
}

fn require_i64(args: &[Value], idx: usize, name: &str) -> Result<i64, RpcError> {
    args.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::invalid_params(format!("argument '{name}' must be an integer")))
}

fn require_f64(args: &[Value], idx: usize, name: &str) -> Result<f64, RpcError> {
    args.get(idx)
        .and_then(Value::as_f64)
        .ok_or_else(|| RpcError::invalid_params(format!("argument '{name}' must be a number")))
}

fn require_str_vec(args: &[Value]) -> Result<Vec<&str>, RpcError> {
    args.iter()
        .map(|v| v.as_str().ok_or_else(|| RpcError::invalid_params("expected an array of strings")))
        .collect()
}

/// Converts a raw Redis reply to JSON, base64-encoding binary strings so the
/// wire format stays valid UTF-8 regardless of what the value actually held.
pub fn redis_value_to_json(value: RedisValue) -> Result<Value, RpcError> {
    redis_value_to_json_encoded(value, None)
}

fn redis_value_to_json_encoded(value: RedisValue, encoding: Option<&str>) -> Result<Value, RpcError> {
    match value {
        RedisValue::Null => Ok(Value::Null),
        RedisValue::Boolean(b) => Ok(Value::Bool(b)),
        RedisValue::Integer(i) => Ok(Value::from(i)),
        RedisValue::Double(d) => Ok(serde_json::Number::from_f64(d).map_or(Value::Null, Value::Number)),
        RedisValue::String(s) => encode_bytes(s.as_bytes(), encoding),
        RedisValue::Bytes(b) => encode_bytes(&b, encoding),
        RedisValue::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|v| redis_value_to_json_encoded(v, encoding))
                .collect::<Result<_, _>>()?,
        )),
        RedisValue::Map(map) => redis_map_to_json(map),
        other => Ok(Value::String(other.to_string().unwrap_or_default())),
    }
}

fn redis_map_to_json(map: RedisMap) -> Result<Value, RpcError> {
    let mut out = Map::new();
    for (k, v) in map.into_iter() {
        let key = k
            .as_string()
            .ok_or_else(|| RpcError::internal("non-string hash field in Redis reply"))?;
        out.insert(key, redis_value_to_json(v)?);
    }
    Ok(Value::Object(out))
}

fn encode_bytes(bytes: &[u8], encoding: Option<&str>) -> Result<Value, RpcError> {
    match encoding {
        None => Ok(Value::String(BASE64.encode(bytes))),
        Some("utf8") => String::from_utf8(bytes.to_vec())
            .map(Value::String)
            .map_err(|e| RpcError::internal(format!("value is not valid utf8: {e}"))),
        Some(other) => Err(RpcError::invalid_params(format!("unsupported encoding `{other}`"))),
    }
}

/// Runs every task against a non-atomic pipeline: commands are all sent
/// without waiting on each individual reply, then flushed together. A
/// failure in one command never stops the others.
pub async fn execute_pipeline(
    client: &Client,
    tasks: &[(&'static CommandSpec, BoundArgs)],
) -> Vec<Result<Value, RpcError>> {
    let pipeline = client.pipeline();
    let mut futures = Vec::with_capacity(tasks.len());
    for (spec, bound) in tasks {
        futures.push(execute(&pipeline, spec, bound));
    }
    // Driving `.all()` flushes the queued commands over the wire; the
    // per-command futures above then resolve against their own reply.
    let _: Result<Vec<RedisValue>, _> = pipeline.all().await;
    futures::future::join_all(futures).await
}

/// Runs every task inside a Redis `MULTI`/`EXEC` transaction. Redis itself
/// guarantees the whole batch is applied atomically; callers are expected to
/// have validated every task's arguments before queuing, since a malformed
/// command aborts the entire transaction before any of it runs.
pub async fn execute_transaction(
    client: &Client,
    tasks: &[(&'static CommandSpec, BoundArgs)],
) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
    let transaction = client.multi();
    let mut futures = Vec::with_capacity(tasks.len());
    for (spec, bound) in tasks {
        futures.push(execute(&transaction, spec, bound));
    }
    transaction.exec(true).await.map_err(internal)?;
    Ok(futures::future::join_all(futures).await)
}
