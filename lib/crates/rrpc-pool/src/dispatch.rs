//! Dispatches parsed JSON-RPC requests to Redis pools.
//!
//! A single request's method path is `<pool>.<command>` — the first segment
//! selects the pool, the rest resolves against the command table. A batch
//! request is additionally grouped by pool: consecutive requests against the
//! same pool that open with a `multi_exec` or `pipeline` marker run as a
//! Redis transaction or pipeline instead of independent calls.

use crate::commands::{self, execute_pipeline, execute_transaction, CommandSpec, CommandTable};
use crate::registry::PoolRegistry;
use rrpc_common::RpcError;
use rrpc_core::{resolve, BoundArgs, RpcBatchRequest, RpcParams, RpcRequest};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaKind {
    Pipeline,
    MultiExec,
}

enum Classified {
    Meta(MetaKind),
    Command(&'static CommandSpec, BoundArgs),
    BindError(RpcError),
}

pub struct RpcDispatcher {
    registry: Arc<PoolRegistry>,
}

impl RpcDispatcher {
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    /// Executes a single request and renders its response envelope.
    pub async fn handle_single(&self, req: RpcRequest) -> rrpc_common::RpcResponse {
        let id = req.id.clone();
        match self.execute_single(&req).await {
            Ok(value) => rrpc_common::RpcResponse::success(id, value),
            Err(e) => e.into_response(id),
        }
    }

    async fn execute_single(&self, req: &RpcRequest) -> Result<Value, RpcError> {
        let path = req.method_path();
        if path.len() < 2 {
            return Err(RpcError::invalid_params(
                "method must be of the form `<pool>.<command>`",
            ));
        }
        let pool_name = path[0];
        let command_path = &path[1..];
        if meta_kind(command_path).is_some() {
            return Err(RpcError::invalid_request(
                "multi_exec/pipeline markers are only meaningful inside a batch request",
            ));
        }

        let (spec, bound) = resolve_command(command_path, req.params.clone())?;
        let client = self.registry.get(pool_name).await?;
        commands::execute(&client, spec, &bound).await
    }

    /// Executes a batch request, grouping same-pool requests so a leading
    /// `multi_exec`/`pipeline` marker governs how the rest of that pool's
    /// requests are folded together.
    pub async fn handle_batch(&self, batch: RpcBatchRequest) -> Vec<rrpc_common::RpcResponse> {
        let n = batch.items.len();
        let mut responses: Vec<Option<rrpc_common::RpcResponse>> = vec![None; n];
        let mut pool_order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, item) in batch.items.iter().enumerate() {
            match item {
                Err((id, err)) => {
                    responses[idx] = Some(err.clone().into_response(id.clone()));
                }
                Ok(req) => {
                    let path = req.method_path();
                    if path.len() < 2 {
                        responses[idx] = Some(
                            RpcError::invalid_params("method must be of the form `<pool>.<command>`")
                                .into_response(req.id.clone()),
                        );
                        continue;
                    }
                    let pool = path[0].to_string();
                    groups
                        .entry(pool.clone())
                        .or_insert_with(|| {
                            pool_order.push(pool.clone());
                            Vec::new()
                        })
                        .push(idx);
                }
            }
        }

        for pool in pool_order {
            let indices = groups.remove(&pool).unwrap_or_default();
            let requests: Vec<&RpcRequest> = indices
                .iter()
                .map(|&idx| batch.items[idx].as_ref().expect("grouped indices are always Ok"))
                .collect();
            let group_responses = self.process_pool_group(&pool, &requests).await;
            for (idx, resp) in indices.into_iter().zip(group_responses) {
                responses[idx] = resp;
            }
        }

        responses.into_iter().flatten().collect()
    }

    /// Returns one slot per request in `requests`, in order — `None` for the
    /// pool-local `multi_exec`/`pipeline` marker itself, which is dropped
    /// from the batch's response list rather than echoed back. The two
    /// early-return (validation/pool-lookup failure) paths decline every
    /// request including the marker, matching the original's behavior of
    /// only stripping the marker on the successful-dispatch path.
    async fn process_pool_group(
        &self,
        pool_name: &str,
        requests: &[&RpcRequest],
    ) -> Vec<Option<rrpc_common::RpcResponse>> {
        let command_paths: Vec<Vec<&str>> = requests.iter().map(|r| r.method_path()).collect();
        let classified: Vec<Classified> = requests
            .iter()
            .zip(&command_paths)
            .map(|(req, path)| classify(&path[1..], req.params.clone()))
            .collect();

        let meta_positions: Vec<usize> = classified
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Classified::Meta(_)))
            .map(|(i, _)| i)
            .collect();

        if let Some(err) = validate_group(&classified, &meta_positions) {
            return requests.iter().map(|r| Some(err.clone().into_response(r.id.clone()))).collect();
        }

        let meta = meta_positions.first().map(|&i| match &classified[i] {
            Classified::Meta(kind) => *kind,
            _ => unreachable!(),
        });

        let client = match self.registry.get(pool_name).await {
            Ok(c) => c,
            Err(e) => return requests.iter().map(|r| Some(e.clone().into_response(r.id.clone()))).collect(),
        };

        // Indices (within the group) of bind-ok commands, in order, paired
        // with their spec/bound args. Everything else (the meta marker
        // itself, and bind failures) is resolved without touching Redis.
        let command_indices: Vec<usize> = classified
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Classified::Command(..)))
            .map(|(i, _)| i)
            .collect();

        let tasks: Vec<(&'static CommandSpec, BoundArgs)> = command_indices
            .iter()
            .map(|&i| match &classified[i] {
                Classified::Command(spec, bound) => (*spec, bound.clone()),
                _ => unreachable!(),
            })
            .collect();

        let exec_results: Vec<Result<Value, RpcError>> = match meta {
            Some(MetaKind::MultiExec) => match execute_transaction(&client, &tasks).await {
                Ok(results) => results,
                Err(e) => command_indices.iter().map(|_| Err(e.clone())).collect(),
            },
            _ => execute_pipeline(&client, &tasks).await,
        };

        let mut exec_by_index: HashMap<usize, Result<Value, RpcError>> =
            command_indices.into_iter().zip(exec_results).collect();

        classified
            .into_iter()
            .zip(requests.iter())
            .enumerate()
            .map(|(idx, (c, req))| {
                let id = req.id.clone();
                match c {
                    Classified::Meta(_) => None,
                    Classified::BindError(e) => Some(e.into_response(id)),
                    Classified::Command(..) => {
                        match exec_by_index.remove(&idx).expect("every command has a result") {
                            Ok(v) => Some(rrpc_common::RpcResponse::success(id, v)),
                            Err(e) => Some(e.into_response(id)),
                        }
                    }
                }
            })
            .collect()
    }
}

/// Checks pool-level batching invariants: a `multi_exec`/`pipeline` marker
/// may appear at most once, must be the first request in the group, and
/// `multi_exec` additionally requires every other request in the group to
/// have bound successfully (a malformed command would abort the whole
/// transaction before Redis ever saw it).
fn validate_group(classified: &[Classified], meta_positions: &[usize]) -> Option<RpcError> {
    if meta_positions.len() > 1 {
        return Some(RpcError::invalid_request(
            "at most one multi_exec/pipeline marker is allowed per pool in a batch",
        ));
    }
    if let Some(&pos) = meta_positions.first() {
        if pos != 0 {
            return Some(RpcError::invalid_request(
                "multi_exec/pipeline marker must be the first request for its pool in the batch",
            ));
        }
        if matches!(classified[pos], Classified::Meta(MetaKind::MultiExec)) {
            let has_bind_error = classified.iter().any(|c| matches!(c, Classified::BindError(_)));
            if has_bind_error {
                return Some(RpcError::invalid_request(
                    "multi_exec batch contains a request with invalid arguments",
                ));
            }
        }
    }
    None
}

fn classify(command_path: &[&str], params: RpcParams) -> Classified {
    if let Some(kind) = meta_kind(command_path) {
        return Classified::Meta(kind);
    }
    match resolve_command(command_path, params) {
        Ok((spec, bound)) => Classified::Command(spec, bound),
        Err(e) => Classified::BindError(e),
    }
}

fn meta_kind(command_path: &[&str]) -> Option<MetaKind> {
    match command_path {
        ["pipeline"] => Some(MetaKind::Pipeline),
        ["multi_exec"] => Some(MetaKind::MultiExec),
        _ => None,
    }
}

/// Binds `params` against the command named by `command_path` via
/// [`rrpc_core::resolve`] and pairs the result with the static
/// [`CommandSpec`] dispatch needs to actually run the command. The table
/// is consulted twice — once through [`CommandTable`]'s [`rrpc_core::CommandRegistry`]
/// impl for binding, once through [`commands::lookup`] for the execution
/// handle — because a signature alone doesn't carry the Redis command tag.
fn resolve_command(
    command_path: &[&str],
    params: RpcParams,
) -> Result<(&'static CommandSpec, BoundArgs), RpcError> {
    let name = command_path
        .last()
        .ok_or_else(|| RpcError::invalid_params("empty method path"))?;
    let spec = commands::lookup(name)
        .ok_or_else(|| RpcError::method_not_found("Method not found", command_path.join(".")))?;
    let bound = resolve(&CommandTable, &command_path.join("."), command_path, params)?;
    Ok((spec, bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_kind_recognizes_only_exact_single_segment_markers() {
        assert_eq!(meta_kind(&["pipeline"]), Some(MetaKind::Pipeline));
        assert_eq!(meta_kind(&["multi_exec"]), Some(MetaKind::MultiExec));
        assert_eq!(meta_kind(&["get"]), None);
        assert_eq!(meta_kind(&["pipeline", "get"]), None);
    }

    #[test]
    fn classify_resolves_a_known_command() {
        let c = classify(&["ping"], RpcParams::None);
        assert!(matches!(c, Classified::Command(..)));
    }

    #[test]
    fn classify_reports_bind_error_for_unknown_command() {
        let c = classify(&["nope"], RpcParams::None);
        assert!(matches!(c, Classified::BindError(_)));
    }

    #[test]
    fn classify_reports_bind_error_for_missing_required_argument() {
        let c = classify(&["get"], RpcParams::Named(serde_json::Map::new()));
        assert!(matches!(c, Classified::BindError(_)));
    }

    #[test]
    fn classify_recognizes_meta_markers_before_command_lookup() {
        assert!(matches!(classify(&["pipeline"], RpcParams::None), Classified::Meta(MetaKind::Pipeline)));
        assert!(matches!(
            classify(&["multi_exec"], RpcParams::None),
            Classified::Meta(MetaKind::MultiExec)
        ));
    }

    fn bound(spec: &'static str) -> Classified {
        let s = commands::lookup(spec).expect("known command");
        Classified::Command(s, BoundArgs::default())
    }

    #[test]
    fn validate_group_allows_no_meta_marker() {
        let classified = vec![bound("ping"), bound("ping")];
        assert!(validate_group(&classified, &[]).is_none());
    }

    #[test]
    fn validate_group_rejects_more_than_one_meta_marker() {
        let classified = vec![Classified::Meta(MetaKind::Pipeline), Classified::Meta(MetaKind::Pipeline)];
        let err = validate_group(&classified, &[0, 1]).expect("should reject");
        assert_eq!(err.code, rrpc_common::RpcErrorCode::InvalidRequest);
    }

    #[test]
    fn validate_group_rejects_non_leading_meta_marker() {
        let classified = vec![bound("ping"), Classified::Meta(MetaKind::Pipeline)];
        let err = validate_group(&classified, &[1]).expect("should reject");
        assert_eq!(err.code, rrpc_common::RpcErrorCode::InvalidRequest);
    }

    #[test]
    fn validate_group_rejects_multi_exec_with_a_bind_error_in_the_group() {
        let classified = vec![
            Classified::Meta(MetaKind::MultiExec),
            Classified::BindError(RpcError::invalid_params("bad")),
        ];
        let err = validate_group(&classified, &[0]).expect("should reject");
        assert_eq!(err.code, rrpc_common::RpcErrorCode::InvalidRequest);
    }

    #[test]
    fn validate_group_allows_pipeline_with_a_bind_error_in_the_group() {
        let classified = vec![Classified::Meta(MetaKind::Pipeline), Classified::BindError(RpcError::invalid_params("bad"))];
        assert!(validate_group(&classified, &[0]).is_none());
    }

    #[test]
    fn validate_group_allows_leading_multi_exec_when_everything_else_binds() {
        let classified = vec![Classified::Meta(MetaKind::MultiExec), bound("ping")];
        assert!(validate_group(&classified, &[0]).is_none());
    }

    /// Grouping-by-pool preserves first-seen pool order and per-pool input
    /// order, independent of pool dispatch itself (§8 item 6).
    #[test]
    fn batch_grouping_preserves_first_seen_pool_order_and_within_pool_order() {
        let methods = ["r0.ping", "r1.ping", "r0.ping", "r1.ping"];
        let mut pool_order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, m) in methods.iter().enumerate() {
            let pool = m.split('.').next().expect("has a pool segment").to_string();
            groups
                .entry(pool.clone())
                .or_insert_with(|| {
                    pool_order.push(pool.clone());
                    Vec::new()
                })
                .push(idx);
        }
        assert_eq!(pool_order, vec!["r0".to_string(), "r1".to_string()]);
        assert_eq!(groups["r0"], vec![0, 2]);
        assert_eq!(groups["r1"], vec![1, 3]);
    }

    #[test]
    fn json_params_reject_does_not_panic_on_empty_path() {
        let err = resolve_command(&[], RpcParams::None).expect_err("empty path is invalid");
        assert_eq!(err.code, rrpc_common::RpcErrorCode::InvalidParams);
    }

    #[test]
    fn resolve_command_binds_positional_params() {
        let (_, bound) = resolve_command(&["set"], RpcParams::Positional(vec![json!("k"), json!("v")]))
            .expect("should bind");
        assert_eq!(bound.positional, vec![json!("k"), json!("v")]);
    }
}
