//! Parameter-kind aware argument binding.
//!
//! Replaces Python's `inspect.Signature.bind()` + `apply_defaults()` with an
//! explicit two-phase algorithm driven by a command table (see the
//! `CommandRegistry` trait), as command handlers here are plain data
//! descriptors rather than introspectable functions.

use rrpc_common::RpcError;
use serde_json::{Map, Value};

/// Mirrors Python's five `inspect.Parameter` kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

/// Describes a single parameter of a command signature.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl ParamSpec {
    #[must_use]
    pub const fn positional(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::PositionalOnly,
            default: None,
        }
    }

    #[must_use]
    pub const fn positional_or_keyword(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::PositionalOrKeyword,
            default: None,
        }
    }

    #[must_use]
    pub const fn var_positional(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::VarPositional,
            default: None,
        }
    }

    #[must_use]
    pub const fn keyword_only(name: &'static str, default: Value) -> Self {
        Self {
            name,
            kind: ParamKind::KeywordOnly,
            default: Some(default),
        }
    }

    #[must_use]
    pub const fn var_keyword(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::VarKeyword,
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// The ordered parameter list of a single command.
#[derive(Debug, Clone, Default)]
pub struct CommandSignature {
    pub params: Vec<ParamSpec>,
}

impl CommandSignature {
    #[must_use]
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }
}

/// The bound arguments of a call: positional values in call order, plus a
/// flat map of keyword values (covering both explicit keyword-only params
/// and anything swept up by a `**kwargs`-style catch-all).
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    pub positional: Vec<Value>,
    pub keyword: Map<String, Value>,
}

/// Binds a named (object-shaped) `params` payload against a signature.
///
/// Traversal phase: walks the signature in order, pulling matching entries
/// out of `input` into positional slots (for `PositionalOnly`,
/// `PositionalOrKeyword` and `VarPositional` params) or merging them into the
/// keyword map (for the `VarKeyword` param, if named and present). Any
/// `KeywordOnly` parameter is left untouched in `input` — it is not
/// positional, so it falls out naturally into the keyword sweep below.
///
/// Finalize phase: remaining, unconsumed entries of `input` — including every
/// `KeywordOnly` parameter's value, if supplied — are merged into the keyword
/// map, then missing parameters with defaults (`KeywordOnly` or trailing
/// `PositionalOrKeyword`) are filled in.
pub fn bind_named(sig: &CommandSignature, mut input: Map<String, Value>) -> Result<BoundArgs, RpcError> {
    let mut positional = Vec::new();
    let mut keyword = Map::new();

    for param in &sig.params {
        match param.kind {
            ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => {
                if let Some(value) = input.remove(param.name) {
                    positional.push(value);
                } else if let Some(default) = &param.default {
                    positional.push(default.clone());
                } else {
                    return Err(RpcError::invalid_params(format!(
                        "missing required argument: '{}'",
                        param.name
                    )));
                }
            }
            ParamKind::VarPositional => {
                if let Some(value) = input.remove(param.name) {
                    match value {
                        Value::Array(items) => positional.extend(items),
                        other => {
                            return Err(RpcError::invalid_params(format!(
                                "argument '{}' must be an array",
                                param.name
                            ))
                            .with_data(other));
                        }
                    }
                }
            }
            ParamKind::KeywordOnly => {
                // Left in `input`; swept into `keyword` below (with its
                // default applied afterwards if it was never supplied).
            }
            ParamKind::VarKeyword => {
                if let Some(value) = input.remove(param.name) {
                    match value {
                        Value::Object(map) => keyword.extend(map),
                        _ => {
                            return Err(RpcError::invalid_params(format!(
                                "argument '{}' must be an object",
                                param.name
                            )));
                        }
                    }
                }
            }
        }
    }

    // Remaining entries: unconsumed keyword-only values and any extra keys
    // the caller supplied beyond the declared signature.
    keyword.extend(input);

    // Apply defaults for keyword-only params that were never supplied.
    for param in &sig.params {
        if param.kind == ParamKind::KeywordOnly && !keyword.contains_key(param.name) {
            if let Some(default) = &param.default {
                keyword.insert(param.name.to_string(), default.clone());
            }
        }
    }

    Ok(BoundArgs { positional, keyword })
}

/// Binds a positional (array-shaped) `params` payload against a signature.
///
/// `VarPositional`, if present, absorbs every argument beyond the declared
/// positional parameters; `KeywordOnly`/`VarKeyword` params can only receive
/// their defaults in this calling style, since there is no name to attach
/// extra values to.
pub fn bind_positional(sig: &CommandSignature, args: Vec<Value>) -> Result<BoundArgs, RpcError> {
    let mut iter = args.into_iter().peekable();
    let mut positional = Vec::new();
    let mut keyword = Map::new();
    let has_var_positional = sig
        .params
        .iter()
        .any(|p| p.kind == ParamKind::VarPositional);

    for param in &sig.params {
        match param.kind {
            ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => {
                if let Some(value) = iter.next() {
                    positional.push(value);
                } else if let Some(default) = &param.default {
                    positional.push(default.clone());
                } else {
                    return Err(RpcError::invalid_params(format!(
                        "missing required argument: '{}'",
                        param.name
                    )));
                }
            }
            ParamKind::VarPositional => {
                positional.extend(iter.by_ref());
            }
            ParamKind::KeywordOnly => {
                if let Some(default) = &param.default {
                    keyword.insert(param.name.to_string(), default.clone());
                }
            }
            ParamKind::VarKeyword => {}
        }
    }

    if iter.peek().is_some() && !has_var_positional {
        return Err(RpcError::invalid_params("too many positional arguments"));
    }

    Ok(BoundArgs { positional, keyword })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_signature() -> CommandSignature {
        CommandSignature::new(vec![
            ParamSpec::positional_or_keyword("key"),
            ParamSpec::var_positional("get_patterns"),
            ParamSpec::keyword_only("by", Value::Null),
            ParamSpec::var_keyword("kwargs"),
        ])
    }

    #[test]
    fn binds_the_canonical_mixed_signature_example() {
        let sig = sample_signature();
        let input = json!({
            "key": "lol",
            "get_patterns": [1, 2, 3],
            "by": "qwe",
            "additional_kw": 2,
            "kwargs": {"trash": 1},
        });
        let Value::Object(map) = input else { unreachable!() };
        let bound = bind_named(&sig, map).expect("should bind");

        assert_eq!(bound.positional, vec![json!("lol"), json!(1), json!(2), json!(3)]);
        assert_eq!(bound.keyword.get("by"), Some(&json!("qwe")));
        assert_eq!(bound.keyword.get("additional_kw"), Some(&json!(2)));
        assert_eq!(bound.keyword.get("trash"), Some(&json!(1)));
        assert_eq!(bound.keyword.len(), 3);
    }

    #[test]
    fn applies_keyword_only_default_when_absent() {
        let sig = sample_signature();
        let input = json!({"key": "a", "get_patterns": []});
        let Value::Object(map) = input else { unreachable!() };
        let bound = bind_named(&sig, map).expect("should bind");
        assert_eq!(bound.positional, vec![json!("a")]);
        assert_eq!(bound.keyword.get("by"), Some(&Value::Null));
    }

    #[test]
    fn missing_required_argument_is_invalid_params() {
        let sig = CommandSignature::new(vec![ParamSpec::positional_or_keyword("key")]);
        let err = bind_named(&sig, Map::new()).unwrap_err();
        assert_eq!(err.code.code(), -32602);
    }

    #[test]
    fn var_positional_must_be_an_array() {
        let sig = sample_signature();
        let input = json!({"key": "a", "get_patterns": "not-an-array"});
        let Value::Object(map) = input else { unreachable!() };
        let err = bind_named(&sig, map).unwrap_err();
        assert_eq!(err.code.code(), -32602);
    }

    #[test]
    fn binds_positional_call_with_var_positional_tail() {
        let sig = CommandSignature::new(vec![
            ParamSpec::positional_or_keyword("a"),
            ParamSpec::positional_or_keyword("b"),
            ParamSpec::var_positional("args"),
        ]);
        let bound = bind_positional(&sig, vec![json!(1), json!(2), json!(3), json!(4)]).expect("bind");
        assert_eq!(bound.positional, vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn positional_call_rejects_extra_args_without_var_positional() {
        let sig = CommandSignature::new(vec![ParamSpec::positional_or_keyword("a")]);
        let err = bind_positional(&sig, vec![json!(1), json!(2)]).unwrap_err();
        assert_eq!(err.code.code(), -32602);
    }
}
