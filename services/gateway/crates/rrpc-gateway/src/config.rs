//! Gateway server configuration loaded from `GATEWAY_*` environment
//! variables. Redis pool configuration is read separately, straight off
//! `REDIS_*` variables, by [`rrpc_pool::read_pools_from_env`].

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Name of the pool used to store key-search cursor state. Defaults to
    /// whichever pool is configured first (ordinal `0`).
    pub service_pool: Option<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listen_addr_matches_documented_default() {
        assert_eq!(default_listen_addr(), "0.0.0.0:8080");
    }
}
