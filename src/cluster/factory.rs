//! Factory function for creating the cluster bus

use std::sync::Arc;

use crate::config::ClusterSettingsConfig;
use crate::redis::RedisPool;

use super::local::LocalClusterBus;
use super::redis_bus::RedisClusterBus;
use super::traits::ClusterBus;

/// Create a cluster bus based on configuration
pub fn create_cluster_bus(
    config: &ClusterSettingsConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn ClusterBus> {
    if config.enabled {
        if let Some(pool) = redis_pool {
            tracing::info!(
                node_id = %config.node_id,
                topic = %config.topic,
                "Creating Redis cluster bus"
            );
            Arc::new(RedisClusterBus::new(
                pool,
                config.node_id.clone(),
                config.topic.clone(),
            ))
        } else {
            tracing::warn!(
                "Cluster mode enabled but Redis pool not available, falling back to local bus"
            );
            Arc::new(LocalClusterBus::new(config.node_id.clone()))
        }
    } else {
        tracing::info!("Cluster mode disabled, using local cluster bus");
        Arc::new(LocalClusterBus::new(config.node_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterBusBackend;
    use crate::config::RedisConfig;

    #[test]
    fn test_create_local_bus() {
        let config = ClusterSettingsConfig {
            enabled: false,
            ..Default::default()
        };

        let bus = create_cluster_bus(&config, None);
        assert_eq!(bus.backend_type(), ClusterBusBackend::Local);
        assert_eq!(bus.node_id(), config.node_id);
    }

    #[test]
    fn test_enabled_without_pool_falls_back() {
        let config = ClusterSettingsConfig {
            enabled: true,
            ..Default::default()
        };

        let bus = create_cluster_bus(&config, None);
        assert_eq!(bus.backend_type(), ClusterBusBackend::Local);
    }

    #[test]
    fn test_create_redis_bus() {
        let config = ClusterSettingsConfig {
            enabled: true,
            ..Default::default()
        };
        let pool = Arc::new(RedisPool::new(RedisConfig::default()).unwrap());

        let bus = create_cluster_bus(&config, Some(pool));
        assert_eq!(bus.backend_type(), ClusterBusBackend::Redis);
    }
}
