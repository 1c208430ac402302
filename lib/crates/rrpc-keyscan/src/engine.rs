//! Key-scan pagination: a search's cursor state lives in a "service" Redis
//! hash + list rather than in gateway process memory, so it survives across
//! gateway restarts and load-balanced instances.

use crate::error::KeyScanError;
use chrono::Utc;
use fred::interfaces::{HashesInterface, KeysInterface, ListInterface};
use fred::prelude::*;
use fred::types::scan::Scanner;
use futures::stream::TryStreamExt;
use rrpc_common::RpcError;
use std::collections::BTreeSet;
use uuid::Uuid;

const DEFAULT_SCAN_COUNT: u32 = 5000;
const DEFAULT_TTL_SECONDS: i64 = 5 * 60;
const SERVICE_KEY_PREFIX: &str = "rrpc-keyscan";

/// The persisted state of one in-progress or completed key search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchInfo {
    pub id: String,
    pub cursor: i64,
    pub sorted: bool,
    pub pattern: String,
    pub ttl_seconds: i64,
    pub results_key: String,
    pub timestamp: String,
    pub count: i64,
}

/// Drives key searches against one Redis pool, persisting cursor/page state
/// into a separate "service" pool so pagination survives across requests.
pub struct KeyScanEngine {
    redis: Option<Client>,
    service_redis: Client,
    scan_count: u32,
}

impl KeyScanEngine {
    #[must_use]
    pub fn new(redis: Client, service_redis: Client) -> Self {
        Self {
            redis: Some(redis),
            service_redis,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Builds an engine with no real scan target — pages can still be read
    /// back for a search already fully materialized (a sorted search, or an
    /// unsorted one that already covers the requested range), but pagination
    /// never grows past what's already stored.
    #[must_use]
    pub fn new_service_only(service_redis: Client) -> Self {
        Self {
            redis: None,
            service_redis,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    #[must_use]
    pub fn with_scan_count(mut self, scan_count: u32) -> Self {
        self.scan_count = scan_count;
        self
    }

    /// Returns the pool this engine scans against, or an error if it was
    /// built without one.
    fn target(&self) -> Result<&Client, KeyScanError> {
        self.redis
            .as_ref()
            .ok_or_else(|| KeyScanError::Redis(RpcError::internal("no redis pool configured for this search")))
    }

    /// Starts a new search. Sorted searches fully materialize every match up
    /// front (their cursor is immediately `-1`, meaning "done"); unsorted
    /// searches start empty and grow lazily as pages are requested.
    pub async fn search(&self, pattern: &str, sort_keys: bool, ttl_seconds: Option<i64>) -> Result<SearchInfo, KeyScanError> {
        let ttl_seconds = ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
        let search_id = Uuid::new_v4().simple().to_string();
        let search_key = search_key(&search_id);
        let results_key = results_key(&search_id);

        let (results, cursor, count) = if sort_keys {
            let sorted = self.scan_all_sorted(pattern).await?;
            let count = sorted.len() as i64;
            (sorted.into_iter().collect::<Vec<_>>(), -1i64, count)
        } else {
            let count = self.scan_count_matches(pattern).await?;
            (Vec::new(), 0i64, count)
        };

        let info = SearchInfo {
            id: search_id,
            cursor,
            sorted: sort_keys,
            pattern: pattern.to_string(),
            ttl_seconds,
            results_key: results_key.clone(),
            timestamp: Utc::now().to_rfc3339(),
            count,
        };

        let transaction = self.service_redis.multi();
        let _ = transaction.hset::<(), _, _>(&search_key, search_bundle_fields(&info));
        let _ = transaction.expire::<(), _>(&search_key, ttl_seconds, None);
        for chunk in results.chunks(self.scan_count.max(1) as usize) {
            let _ = transaction.rpush::<(), _, _>(&results_key, chunk.to_vec());
        }
        let _ = transaction.expire::<(), _>(&results_key, ttl_seconds, None);
        transaction.exec(true).await.map_err(internal)?;

        Ok(info)
    }

    /// Returns one page of results, growing an unsorted search's stored
    /// results as needed to cover the requested range.
    pub async fn get_page(&self, search_id: &str, page_number: i64, per_page: i64) -> Result<Vec<String>, KeyScanError> {
        if per_page <= 0 {
            return Err(KeyScanError::WrongPageSize(per_page));
        }
        if page_number < 1 {
            return Err(KeyScanError::WrongNumber(page_number));
        }

        let (info, _) = tokio::join!(self.get_search_info(search_id), self.refresh_ttl(search_id, None));
        let info = info?;

        if info.count <= 0 {
            return Ok(Vec::new());
        }

        let start = (page_number - 1) * per_page;
        let mut finish = start + per_page - 1;

        if start > info.count {
            return Err(KeyScanError::PageNotFound {
                search_id: search_id.to_string(),
                count: info.count,
                start,
            });
        }
        if finish > info.count {
            finish = info.count - 1;
        }

        if !info.sorted && self.redis.is_some() {
            self.load_more(search_id, &info.pattern, info.cursor, finish + 1).await?;
        }

        let values: Vec<String> = self
            .service_redis
            .lrange(&info.results_key, start, finish)
            .await
            .map_err(internal)?;
        Ok(values)
    }

    /// Pushes the search's TTL forward, called on every page fetch so an
    /// actively-paged-through search doesn't expire mid-browse.
    pub async fn refresh_ttl(&self, search_id: &str, ttl_seconds: Option<i64>) -> Result<(), KeyScanError> {
        let ttl_seconds = ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
        let pipeline = self.service_redis.pipeline();
        let _ = pipeline.expire::<(), _>(&search_key(search_id), ttl_seconds, None);
        let _ = pipeline.expire::<(), _>(&results_key(search_id), ttl_seconds, None);
        let _: Vec<fred::types::Value> = pipeline.all().await.map_err(internal)?;
        Ok(())
    }

    pub async fn get_search_info(&self, search_id: &str) -> Result<SearchInfo, KeyScanError> {
        let map: std::collections::HashMap<String, String> = self
            .service_redis
            .hgetall(&search_key(search_id))
            .await
            .map_err(internal)?;

        if map.is_empty() {
            return Err(KeyScanError::SearchIdNotFound(search_id.to_string()));
        }

        let get_int = |k: &str| -> Result<i64, KeyScanError> {
            map.get(k)
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or_else(|| KeyScanError::Redis(RpcError::internal(format!("malformed `{k}` in search state"))))
        };

        Ok(SearchInfo {
            id: map.get("id").cloned().unwrap_or_default(),
            cursor: get_int("cursor")?,
            sorted: get_int("sorted")? != 0,
            pattern: map.get("pattern").cloned().unwrap_or_default(),
            ttl_seconds: get_int("ttl_seconds")?,
            results_key: map.get("results_key").cloned().unwrap_or_else(|| results_key(search_id)),
            timestamp: map.get("timestamp").cloned().unwrap_or_default(),
            count: get_int("count")?,
        })
    }

    /// Grows an unsorted search's materialized results until either
    /// `target_len` entries are available or the source keyspace has been
    /// fully scanned.
    ///
    /// `cursor` here counts how many source keys have been scanned so far
    /// rather than carrying a raw Redis `SCAN` cursor: resuming a `SCAN` from
    /// an arbitrary saved cursor token needs a lower-level handle than the
    /// streaming scan helper exposes, so each call re-scans from the start
    /// and skips past keys already materialized. The stored `results` list
    /// is still append-only and idempotent from the caller's perspective.
    async fn load_more(&self, search_id: &str, pattern: &str, cursor: i64, target_len: i64) -> Result<(), KeyScanError> {
        let results_key = results_key(search_id);
        let search_key = search_key(search_id);

        let llen: i64 = self.service_redis.llen(&results_key).await.map_err(internal)?;
        if llen > 0 && cursor == 0 {
            return Ok(());
        }

        let keys_to_load = target_len - llen;
        if keys_to_load <= 0 {
            return Ok(());
        }

        let mut stream = self.target()?.scan(pattern, Some(self.scan_count), None);
        let mut scanned = 0i64;
        let mut new_keys = Vec::new();
        let mut exhausted = true;

        while let Some(mut page) = stream.try_next().await.map_err(internal)? {
            if let Some(results) = page.take_results() {
                for key in results {
                    scanned += 1;
                    if scanned <= cursor {
                        continue;
                    }
                    new_keys.push(key.as_str_lossy().to_string());
                    if new_keys.len() as i64 >= keys_to_load {
                        exhausted = false;
                        break;
                    }
                }
            }
            if new_keys.len() as i64 >= keys_to_load {
                break;
            }
        }

        let new_cursor = if exhausted { 0 } else { cursor + new_keys.len() as i64 };

        let transaction = self.service_redis.multi();
        for chunk in new_keys.chunks(self.scan_count.max(1) as usize) {
            let _ = transaction.rpush::<(), _, _>(&results_key, chunk.to_vec());
        }
        let _ = transaction.hset::<(), _, _>(&search_key, vec![("cursor".to_string(), new_cursor.to_string())]);
        transaction.exec(true).await.map_err(internal)?;

        Ok(())
    }

    async fn scan_all_sorted(&self, pattern: &str) -> Result<BTreeSet<String>, KeyScanError> {
        let mut container = BTreeSet::new();
        let mut stream = self.target()?.scan(pattern, Some(self.scan_count), None);
        while let Some(mut page) = stream.try_next().await.map_err(internal)? {
            if let Some(results) = page.take_results() {
                for key in results {
                    container.insert(key.as_str_lossy().to_string());
                }
            }
        }
        Ok(container)
    }

    async fn scan_count_matches(&self, pattern: &str) -> Result<i64, KeyScanError> {
        let mut count = 0i64;
        let mut stream = self.target()?.scan(pattern, Some(self.scan_count), None);
        while let Some(mut page) = stream.try_next().await.map_err(internal)? {
            if let Some(results) = page.take_results() {
                count += results.len() as i64;
            }
        }
        Ok(count)
    }
}

fn search_bundle_fields(info: &SearchInfo) -> Vec<(String, String)> {
    vec![
        ("id".to_string(), info.id.clone()),
        ("cursor".to_string(), info.cursor.to_string()),
        ("sorted".to_string(), i64::from(info.sorted).to_string()),
        ("pattern".to_string(), info.pattern.clone()),
        ("ttl_seconds".to_string(), info.ttl_seconds.to_string()),
        ("results_key".to_string(), info.results_key.clone()),
        ("timestamp".to_string(), info.timestamp.clone()),
        ("count".to_string(), info.count.to_string()),
    ]
}

fn search_key(search_id: &str) -> String {
    format!("{SERVICE_KEY_PREFIX}:{search_id}")
}

fn results_key(search_id: &str) -> String {
    format!("{SERVICE_KEY_PREFIX}:{search_id}:results")
}

fn internal(e: fred::error::Error) -> KeyScanError {
    KeyScanError::Redis(RpcError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_and_results_keys_share_a_namespace_prefix() {
        assert_eq!(search_key("abc123"), "rrpc-keyscan:abc123");
        assert_eq!(results_key("abc123"), "rrpc-keyscan:abc123:results");
    }

    #[test]
    fn search_bundle_fields_round_trip_through_string_encoding() {
        let info = SearchInfo {
            id: "abc123".to_string(),
            cursor: -1,
            sorted: true,
            pattern: "user:*".to_string(),
            ttl_seconds: 300,
            results_key: results_key("abc123"),
            timestamp: "2026-07-27T00:00:00+00:00".to_string(),
            count: 42,
        };
        let fields: std::collections::HashMap<String, String> =
            search_bundle_fields(&info).into_iter().collect();
        assert_eq!(fields.get("cursor").map(String::as_str), Some("-1"));
        assert_eq!(fields.get("sorted").map(String::as_str), Some("1"));
        assert_eq!(fields.get("count").map(String::as_str), Some("42"));
        assert_eq!(fields.get("pattern").map(String::as_str), Some("user:*"));
    }

    #[test]
    fn search_bundle_fields_encode_unsorted_as_zero() {
        let info = SearchInfo {
            id: "x".to_string(),
            cursor: 0,
            sorted: false,
            pattern: "*".to_string(),
            ttl_seconds: 60,
            results_key: results_key("x"),
            timestamp: String::new(),
            count: 0,
        };
        let fields: std::collections::HashMap<String, String> =
            search_bundle_fields(&info).into_iter().collect();
        assert_eq!(fields.get("sorted").map(String::as_str), Some("0"));
    }

    #[test]
    fn default_scan_count_and_ttl_match_documented_defaults() {
        assert_eq!(DEFAULT_SCAN_COUNT, 5000);
        assert_eq!(DEFAULT_TTL_SECONDS, 300);
    }

    /// Page-math boundary behavior mirrored from `get_page`, exercised here
    /// without a live Redis connection.
    #[test]
    fn page_math_start_finish_and_page_not_found_boundary() {
        fn page_bounds(page_number: i64, per_page: i64, count: i64) -> Result<(i64, i64), KeyScanError> {
            let start = (page_number - 1) * per_page;
            let mut finish = start + per_page - 1;
            if start > count {
                return Err(KeyScanError::PageNotFound {
                    search_id: "s".to_string(),
                    count,
                    start,
                });
            }
            if finish > count {
                finish = count - 1;
            }
            Ok((start, finish))
        }

        assert_eq!(page_bounds(1, 10, 25).unwrap(), (0, 9));
        assert_eq!(page_bounds(3, 10, 25).unwrap(), (20, 24));
        assert!(page_bounds(100, 10, 25).is_err());
    }
}
