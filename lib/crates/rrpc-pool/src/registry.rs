//! Lazily-connected Redis client pools, keyed by logical pool name.

use crate::config::PoolConfig;
use dashmap::DashMap;
use fred::prelude::*;
use rrpc_common::RpcError;
use std::sync::Arc;
use std::time::Duration;

/// Holds one lazily-initialized `fred` client per configured pool name.
///
/// `fred::clients::Client` is cheap to clone (it shares the underlying
/// connection state), so `get` hands back an owned clone rather than a
/// reference, keeping callers free of lifetime ties to the registry.
pub struct PoolRegistry {
    configs: Vec<PoolConfig>,
    clients: DashMap<String, Client>,
}

impl PoolRegistry {
    #[must_use]
    pub fn new(configs: Vec<PoolConfig>) -> Self {
        Self {
            configs,
            clients: DashMap::new(),
        }
    }

    /// Every configured pool name, in declaration order.
    #[must_use]
    pub fn pool_names(&self) -> Vec<&str> {
        self.configs.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.configs.iter().any(|c| c.name == name)
    }

    /// Returns the (possibly freshly connected) client for `name`.
    pub async fn get(&self, name: &str) -> Result<Client, RpcError> {
        if let Some(client) = self.clients.get(name) {
            return Ok(client.clone());
        }

        let config = self
            .configs
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RpcError::method_not_found(format!("unknown pool `{name}`"), name))?;

        let client = connect(&config.dsn).await?;
        self.clients.insert(name.to_string(), client.clone());
        Ok(client)
    }

    /// Closes every connected client, used on graceful shutdown.
    pub async fn close_all(&self) {
        for entry in self.clients.iter() {
            let _ = entry.value().quit().await;
        }
    }
}

async fn connect(dsn: &str) -> Result<Client, RpcError> {
    let config = Config::from_url(dsn)
        .map_err(|e| RpcError::internal(format!("invalid Redis DSN: {e}")))?;

    let client = Builder::from_config(config)
        .with_connection_config(|conn_config| {
            conn_config.connection_timeout = Duration::from_secs(5);
            conn_config.internal_command_timeout = Duration::from_secs(10);
        })
        .set_policy(ReconnectPolicy::new_exponential(0, 100, 5000, 5))
        .build()
        .map_err(|e| RpcError::internal(format!("failed to build Redis client: {e}")))?;

    client
        .init()
        .await
        .map_err(|e| RpcError::internal(format!("failed to connect to Redis: {e}")))?;

    Ok(client)
}

/// A thread-safe, cloneable handle to the registry, shared across Axum
/// request handlers via `Arc`.
pub type SharedRegistry = Arc<PoolRegistry>;
