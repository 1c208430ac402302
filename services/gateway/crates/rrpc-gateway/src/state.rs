//! Shared application state: the pool registry, the dispatcher built on top
//! of it, and the name of the pool backing key-search cursor state.

use rrpc_keyscan::KeyScanEngine;
use rrpc_pool::{PoolRegistry, RpcDispatcher};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PoolRegistry>,
    pub dispatcher: Arc<RpcDispatcher>,
    pub service_pool: String,
}

impl AppState {
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>, service_pool: String) -> Self {
        let dispatcher = Arc::new(RpcDispatcher::new(registry.clone()));
        Self {
            registry,
            dispatcher,
            service_pool,
        }
    }

    /// Builds a scan engine targeting `redis_name`, persisting cursor state
    /// in the configured service pool.
    pub async fn key_scan_engine(&self, redis_name: &str) -> anyhow::Result<KeyScanEngine> {
        let target = self.registry.get(redis_name).await?;
        let service = self.registry.get(&self.service_pool).await?;
        Ok(KeyScanEngine::new(target, service))
    }

    /// Builds a scan engine for service-only operations (TTL refresh, info
    /// lookups) that never touch the searched pool itself.
    pub async fn key_scan_engine_service_only(&self) -> anyhow::Result<KeyScanEngine> {
        let service = self.registry.get(&self.service_pool).await?;
        Ok(KeyScanEngine::new_service_only(service))
    }
}
