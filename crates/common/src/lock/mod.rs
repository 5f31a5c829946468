//! Distributed mutual exclusion for cluster-wide coalescing
//!
//! Provides:
//! - The `DistributedLock` interface consumed by the coalescer
//! - A Redis implementation (`SET NX PX` acquire, token-checked release)

use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, Client, Script};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Cluster-wide try-lock keyed by string
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take the lock without waiting; `Ok(false)` when another holder has it
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Release a lock previously acquired by this process
    async fn release(&self, key: &str) -> Result<()>;
}

/// Redis lock configuration
#[derive(Debug, Clone)]
pub struct RedisLockConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for RedisLockConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "fusegate".to_string(),
        }
    }
}

// Delete only if the stored token is still ours.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed distributed lock
pub struct RedisLock {
    connection: MultiplexedConnection,
    config: RedisLockConfig,
    tokens: Mutex<HashMap<String, String>>,
    release_script: Script,
}

impl RedisLock {
    /// Connect to Redis
    pub async fn connect(config: RedisLockConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| PipelineError::LockError {
                message: format!("Failed to create Redis client: {}", e)
            })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PipelineError::LockError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection,
            config,
            tokens: Mutex::new(HashMap::new()),
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        lock_key(&self.config.key_prefix, key)
    }
}

/// Namespaced lock key
pub fn lock_key(prefix: &str, key: &str) -> String {
    format!("{}:lock:{}", prefix, key)
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let full_key = self.key(key);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.connection.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&full_key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        let acquired = reply.is_some();
        if acquired {
            self.tokens.lock().await.insert(full_key.clone(), token);
        }

        debug!(key = %full_key, acquired, "Lock try-acquire");
        Ok(acquired)
    }

    async fn release(&self, key: &str) -> Result<()> {
        let full_key = self.key(key);
        let Some(token) = self.tokens.lock().await.remove(&full_key) else {
            return Ok(());
        };

        let mut conn = self.connection.clone();
        let deleted: i32 = self
            .release_script
            .key(&full_key)
            .arg(&token)
            .invoke_async(&mut conn)
            .await?;

        debug!(key = %full_key, released = deleted > 0, "Lock release");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_namespacing() {
        assert_eq!(lock_key("fusegate", "web|8|rust"), "fusegate:lock:web|8|rust");
    }

    #[test]
    fn test_default_config() {
        let config = RedisLockConfig::default();
        assert_eq!(config.key_prefix, "fusegate");
        assert!(config.url.starts_with("redis://"));
    }
}
