//! Discovers Redis pool configuration from `REDIS_*` environment variables.

use std::collections::HashMap;
use url::Url;

const ENV_REDIS_PREFIX: &str = "REDIS_";
const DEFAULT_REDIS_DSN: &str = "redis://localhost:6379";

/// A single configured Redis pool, derived from one `REDIS_*` environment
/// variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Ordinal position among all discovered `REDIS_*` variables, in
    /// natural-sorted order of their variable names.
    pub id: usize,
    /// The environment variable this pool was read from, e.g. `"REDIS_0"`.
    pub env_variable: String,
    /// The logical name used in method paths (`"redis_0"` unless overridden
    /// via a `?name=` query parameter on the DSN).
    pub name: String,
    pub dsn: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid Redis DSN in `{env_variable}`: {source}")]
    InvalidDsn {
        env_variable: String,
        #[source]
        source: url::ParseError,
    },
    #[error("duplicate pool name `{name}` (from `{env_variable}`, already used by another REDIS_* variable)")]
    DuplicateName { name: String, env_variable: String },
}

/// Reads every `REDIS_*` variable out of `env`, ordering them naturally by
/// variable name (so `REDIS_2` sorts before `REDIS_10`), and assigns each an
/// ordinal id and a logical pool name.
///
/// If no `REDIS_*` variable is present at all, a single default pool
/// (`REDIS_0 = redis://localhost:6379`) is injected, mirroring the original
/// gateway's zero-config default.
pub fn read_pools_from_env(
    env: impl IntoIterator<Item = (String, String)>,
) -> Result<Vec<PoolConfig>, ConfigError> {
    let mut vars: HashMap<String, String> = env
        .into_iter()
        .filter(|(k, _)| k.starts_with(ENV_REDIS_PREFIX))
        .collect();

    if vars.is_empty() {
        vars.insert(format!("{ENV_REDIS_PREFIX}0"), DEFAULT_REDIS_DSN.to_string());
    }

    let mut keys: Vec<String> = vars.keys().cloned().collect();
    keys.sort_by(|a, b| natural_cmp(a, b));

    let mut pools = Vec::with_capacity(keys.len());
    let mut seen_names = HashMap::new();

    for (id, env_variable) in keys.into_iter().enumerate() {
        let dsn = vars.remove(&env_variable).expect("key came from this map");
        let url = Url::parse(&dsn).map_err(|source| ConfigError::InvalidDsn {
            env_variable: env_variable.clone(),
            source,
        })?;

        let name = url
            .query_pairs()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("redis_{id}"));

        if let Some(prev) = seen_names.insert(name.clone(), env_variable.clone()) {
            return Err(ConfigError::DuplicateName {
                name,
                env_variable: format!("{env_variable} (previously used by {prev})"),
            });
        }

        pools.push(PoolConfig {
            id,
            env_variable,
            name,
            dsn,
        });
    }

    Ok(pools)
}

/// Compares two strings the way `natsort` does: runs of digits compare
/// numerically, everything else compares lexically. Good enough to order
/// `REDIS_0 .. REDIS_9 .. REDIS_10` correctly without pulling in a crate
/// solely for this.
fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek(), bi.peek()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(ac), Some(bc)) if ac.is_ascii_digit() && bc.is_ascii_digit() => {
                let a_num: String = std::iter::from_fn(|| ai.next_if(char::is_ascii_digit)).collect();
                let b_num: String = std::iter::from_fn(|| bi.next_if(char::is_ascii_digit)).collect();
                let a_val: u64 = a_num.parse().unwrap_or(0);
                let b_val: u64 = b_num.parse().unwrap_or(0);
                match a_val.cmp(&b_val) {
                    std::cmp::Ordering::Equal => continue,
                    other => return other,
                }
            }
            (Some(ac), Some(bc)) => match ac.cmp(bc) {
                std::cmp::Ordering::Equal => {
                    ai.next();
                    bi.next();
                    continue;
                }
                other => return other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_default_pool_when_env_is_empty() {
        let pools = read_pools_from_env(std::iter::empty()).expect("should succeed");
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].name, "redis_0");
        assert_eq!(pools[0].dsn, DEFAULT_REDIS_DSN);
    }

    #[test]
    fn orders_numerically_not_lexically() {
        let env = vec![
            ("REDIS_10".to_string(), "redis://host10:6379".to_string()),
            ("REDIS_2".to_string(), "redis://host2:6379".to_string()),
            ("REDIS_0".to_string(), "redis://host0:6379".to_string()),
        ];
        let pools = read_pools_from_env(env).expect("should succeed");
        let names: Vec<&str> = pools.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["redis_0", "redis_1", "redis_2"]);
        assert_eq!(pools[2].env_variable, "REDIS_10");
    }

    #[test]
    fn honors_explicit_name_query_param() {
        let env = vec![("REDIS_0".to_string(), "redis://localhost:6379?name=cache".to_string())];
        let pools = read_pools_from_env(env).expect("should succeed");
        assert_eq!(pools[0].name, "cache");
    }

    #[test]
    fn rejects_duplicate_names() {
        let env = vec![
            ("REDIS_0".to_string(), "redis://localhost:6379?name=cache".to_string()),
            ("REDIS_1".to_string(), "redis://localhost:6380?name=cache".to_string()),
        ];
        let err = read_pools_from_env(env).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }

    #[test]
    fn ignores_non_redis_env_vars() {
        let env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("REDIS_0".to_string(), "redis://localhost:6379".to_string()),
        ];
        let pools = read_pools_from_env(env).expect("should succeed");
        assert_eq!(pools.len(), 1);
    }
}
