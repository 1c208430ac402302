//! HTTP route handlers: JSON-RPC dispatch, pool status, command
//! introspection, and key-search pagination.

use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use rrpc_common::RpcResponse;
use rrpc_core::{parse_payload, ParsedPayload};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// `POST /` — single or batched JSON-RPC dispatch.
pub async fn rpc(State(state): State<Arc<AppState>>, body: axum::body::Bytes) -> impl IntoResponse {
    match parse_payload(&body) {
        Ok(ParsedPayload::Single(result)) => {
            let response = match *result {
                Ok(req) => state.dispatcher.handle_single(req).await,
                Err(e) => e.into_response(Value::Null),
            };
            Json(serde_json::to_value(response).unwrap_or(Value::Null)).into_response()
        }
        Ok(ParsedPayload::Batch(batch)) => {
            let responses = state.dispatcher.handle_batch(batch).await;
            Json(serde_json::to_value(responses).unwrap_or(Value::Array(vec![]))).into_response()
        }
        Err(e) => {
            let response: RpcResponse = e.into_response(Value::Null);
            Json(serde_json::to_value(response).unwrap_or(Value::Null)).into_response()
        }
    }
}

/// `GET /status` — lists the configured pools and whether each has been
/// connected yet.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pools: Vec<Value> = state
        .registry
        .pool_names()
        .into_iter()
        .map(|name| json!({"name": name}))
        .collect();
    Json(json!({"pools": pools}))
}

/// `GET /inspect` — lists every command name and its parameter signature,
/// replacing the original gateway's runtime reflection over a live client.
pub async fn inspect() -> impl IntoResponse {
    Json(rrpc_pool::commands::describe_all())
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_true")]
    pub sort_keys: bool,
    pub ttl_seconds: Option<i64>,
}

fn default_pattern() -> String {
    "*".to_string()
}

fn default_true() -> bool {
    true
}

/// `POST /keys/paginate/{redis_name}` — starts a new key search.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(redis_name): Path<String>,
    body: Option<Json<SearchRequest>>,
) -> impl IntoResponse {
    let Json(req) = body.unwrap_or(Json(SearchRequest {
        pattern: default_pattern(),
        sort_keys: true,
        ttl_seconds: None,
    }));

    let engine = match state.key_scan_engine(&redis_name).await {
        Ok(e) => e,
        Err(e) => return error_response(&e.to_string(), 500),
    };

    match engine.search(&req.pattern, req.sort_keys, req.ttl_seconds).await {
        Ok(info) => Json(json!({
            "id": info.id,
            "cursor": info.cursor,
            "sorted": info.sorted,
            "pattern": info.pattern,
            "ttl_seconds": info.ttl_seconds,
            "results_key": info.results_key,
            "timestamp": info.timestamp,
            "count": info.count,
        }))
        .into_response(),
        Err(e) => error_response(&e.to_string(), e.http_status()),
    }
}

/// `POST /keys/paginate/refresh-ttl/{search_id}`.
pub async fn refresh_ttl(State(state): State<Arc<AppState>>, Path(search_id): Path<String>) -> impl IntoResponse {
    let engine = match state.key_scan_engine_service_only().await {
        Ok(e) => e,
        Err(e) => return error_response(&e.to_string(), 500),
    };
    match engine.refresh_ttl(&search_id, None).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => error_response(&e.to_string(), e.http_status()),
    }
}

/// `GET /keys/paginate/info/{search_id}`.
pub async fn search_info(State(state): State<Arc<AppState>>, Path(search_id): Path<String>) -> impl IntoResponse {
    let engine = match state.key_scan_engine_service_only().await {
        Ok(e) => e,
        Err(e) => return error_response(&e.to_string(), 500),
    };
    match engine.get_search_info(&search_id).await {
        Ok(info) => Json(json!({
            "id": info.id,
            "cursor": info.cursor,
            "sorted": info.sorted,
            "pattern": info.pattern,
            "ttl_seconds": info.ttl_seconds,
            "results_key": info.results_key,
            "timestamp": info.timestamp,
            "count": info.count,
        }))
        .into_response(),
        Err(e) => error_response(&e.to_string(), e.http_status()),
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_per_page")]
    per_page: i64,
    /// Which pool to resume scanning against for an unsorted search whose
    /// stored results don't yet cover this page. The original gateway never
    /// threaded a pool name through to this endpoint, which meant an
    /// unsorted search's results could never grow past whatever `search()`
    /// had already materialized. Accepting it here as optional keeps that
    /// default behavior (omit it, nothing grows) while letting a caller who
    /// knows which pool the search came from actually page past it.
    redis_name: Option<String>,
}

fn default_per_page() -> i64 {
    1000
}

/// `GET /keys/paginate/{search_id}/page/{page_num}`.
pub async fn get_page(
    State(state): State<Arc<AppState>>,
    Path((search_id, page_number)): Path<(String, i64)>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let engine = match &query.redis_name {
        Some(name) => state.key_scan_engine(name).await,
        None => state.key_scan_engine_service_only().await,
    };
    let engine = match engine {
        Ok(e) => e,
        Err(e) => return error_response(&e.to_string(), 500),
    };
    match engine.get_page(&search_id, page_number, query.per_page).await {
        Ok(keys) => Json(json!({"keys": keys})).into_response(),
        Err(e) => error_response(&e.to_string(), e.http_status()),
    }
}

fn error_response(message: &str, status: u16) -> axum::response::Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": message}))).into_response()
}
