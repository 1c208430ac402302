//! Method-path resolution against a command registry.

use crate::binder::{bind_named, bind_positional, BoundArgs, CommandSignature};
use crate::request::RpcParams;
use rrpc_common::RpcError;

/// Anything that can resolve a dotted method path to a command signature and
/// execute a bound call. Implemented by the pool registry for real Redis
/// dispatch, and by a small in-memory table in tests.
pub trait CommandRegistry {
    /// Looks up the signature for a fully-qualified method path
    /// (e.g. `["redis_0", "hset"]` or `["nested", "add_many"]`).
    fn signature(&self, path: &[&str]) -> Option<&CommandSignature>;
}

/// Resolves `path` against `registry` and binds `params` against the found
/// signature, producing positional/keyword arguments ready for execution.
pub fn resolve(
    registry: &impl CommandRegistry,
    method: &str,
    path: &[&str],
    params: RpcParams,
) -> Result<BoundArgs, RpcError> {
    let sig = registry
        .signature(path)
        .ok_or_else(|| RpcError::method_not_found("Method not found", method.to_string()))?;

    match params {
        RpcParams::None => bind_named(sig, serde_json::Map::new()),
        RpcParams::Named(map) => bind_named(sig, map),
        RpcParams::Positional(args) => bind_positional(sig, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::ParamSpec;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    struct FixtureRegistry(HashMap<Vec<&'static str>, CommandSignature>);

    impl FixtureRegistry {
        fn new() -> Self {
            let mut map = HashMap::new();
            map.insert(
                vec!["sample", "add"],
                CommandSignature::new(vec![
                    ParamSpec::positional_or_keyword("a"),
                    ParamSpec::positional_or_keyword("b"),
                    ParamSpec::keyword_only("make_negative", Value::Bool(true)),
                ]),
            );
            map.insert(
                vec!["sample", "add_many"],
                CommandSignature::new(vec![
                    ParamSpec::positional_or_keyword("a"),
                    ParamSpec::positional_or_keyword("b"),
                    ParamSpec::var_positional("args"),
                    ParamSpec::var_keyword("kwargs"),
                ]),
            );
            map.insert(
                vec!["nested", "add_many"],
                CommandSignature::new(vec![
                    ParamSpec::positional_or_keyword("a"),
                    ParamSpec::positional_or_keyword("b"),
                    ParamSpec::var_positional("args"),
                    ParamSpec::var_keyword("kwargs"),
                ]),
            );
            Self(map)
        }
    }

    impl CommandRegistry for FixtureRegistry {
        fn signature(&self, path: &[&str]) -> Option<&CommandSignature> {
            self.0.get(path)
        }
    }

    #[test]
    fn resolves_nested_method_path() {
        let registry = FixtureRegistry::new();
        let params = RpcParams::Named(
            json!({"a": 1, "b": 2, "args": [3, 4], "kwargs": {"x": 1}})
                .as_object()
                .unwrap()
                .clone(),
        );
        let bound = resolve(&registry, "nested.add_many", &["nested", "add_many"], params)
            .expect("should resolve");
        assert_eq!(bound.positional, vec![json!(1), json!(2), json!(3), json!(4)]);
        assert_eq!(bound.keyword.get("x"), Some(&json!(1)));
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let registry = FixtureRegistry::new();
        let err = resolve(&registry, "sample.nope", &["sample", "nope"], RpcParams::None).unwrap_err();
        assert_eq!(err.code.code(), -32601);
    }

    #[test]
    fn applies_default_for_missing_keyword_only_param() {
        let registry = FixtureRegistry::new();
        let params = RpcParams::Named(json!({"a": 1, "b": 2}).as_object().unwrap().clone());
        let bound = resolve(&registry, "sample.add", &["sample", "add"], params).expect("resolve");
        assert_eq!(bound.keyword.get("make_negative"), Some(&Value::Bool(true)));
    }
}
