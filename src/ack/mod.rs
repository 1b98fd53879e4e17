//! Pending-delivery bookkeeping for the ACK protocol.
//!
//! # Backends
//!
//! - `MemoryAckStore`: DashMap in this process (default)
//! - `RedisAckStore`: one Redis hash visible to every node
//!
//! Use `create_ack_store()` to build the backend selected by configuration.

mod backend;
mod key;
mod memory_backend;
mod redis_backend;

use std::sync::Arc;

use crate::config::AckSettingsConfig;
use crate::redis::RedisPool;

pub use backend::{AckBackendType, AckEntry, AckStore, AckStoreError};
pub use key::{AckKey, AckKeyError, ACK_KEY_SEPARATOR};
pub use memory_backend::MemoryAckStore;
pub use redis_backend::RedisAckStore;

/// Create an ACK store based on configuration.
///
/// - `"redis"`: a `RedisAckStore` if a Redis pool is provided
/// - `"memory"` (default): a `MemoryAckStore`
pub fn create_ack_store(
    settings: &AckSettingsConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn AckStore> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    hash_key = %settings.redis_key,
                    "Creating Redis ACK store"
                );
                Arc::new(RedisAckStore::new(pool, settings.redis_key.clone()))
            } else {
                tracing::warn!(
                    "Redis ACK store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryAckStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory ACK store");
            Arc::new(MemoryAckStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_factory_defaults_to_memory() {
        let store = create_ack_store(&AckSettingsConfig::default(), None);
        assert_eq!(store.backend_type(), AckBackendType::Memory);
    }

    #[test]
    fn test_factory_falls_back_without_pool() {
        let settings = AckSettingsConfig {
            backend: "redis".to_string(),
            ..Default::default()
        };
        let store = create_ack_store(&settings, None);
        assert_eq!(store.backend_type(), AckBackendType::Memory);
    }

    #[test]
    fn test_factory_builds_redis_store() {
        let settings = AckSettingsConfig {
            backend: "redis".to_string(),
            ..Default::default()
        };
        let pool = RedisPool::new(RedisConfig {
            url: "redis://localhost:6379".to_string(),
        })
        .unwrap();

        let store = create_ack_store(&settings, Some(Arc::new(pool)));
        assert_eq!(store.backend_type(), AckBackendType::Redis);
    }
}
