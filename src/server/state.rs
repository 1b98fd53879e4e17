use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::ack::{create_ack_store, AckStore};
use crate::cluster::{create_cluster_bus, ClusterBus};
use crate::config::{RedisConfig, Settings};
use crate::connection_manager::ConnectionManager;
use crate::notification::{DeliveryDispatcher, MemoryMessageLog, MessageLog};
use crate::redis::RedisPool;
use crate::tasks::{RetryConfig, RetryScheduler};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connection_manager: Arc<ConnectionManager>,
    pub ack_store: Arc<dyn AckStore>,
    pub cluster_bus: Arc<dyn ClusterBus>,
    pub message_log: Arc<dyn MessageLog>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub retry_scheduler: Arc<RetryScheduler>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub start_time: Instant,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let needs_redis = settings.ack.backend == "redis" || settings.cluster.enabled;
        let redis_pool = if needs_redis {
            create_redis_pool(&settings.redis)
        } else {
            None
        };

        let ack_store = create_ack_store(&settings.ack, redis_pool.clone());
        let cluster_bus = create_cluster_bus(&settings.cluster, redis_pool.clone());

        Self::with_components(settings, ack_store, cluster_bus, redis_pool)
    }

    /// Build state around an existing store and bus (several in-process
    /// nodes can share one `LocalClusterBus` this way).
    pub fn with_components(
        settings: Settings,
        ack_store: Arc<dyn AckStore>,
        cluster_bus: Arc<dyn ClusterBus>,
        redis_pool: Option<Arc<RedisPool>>,
    ) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let message_log: Arc<dyn MessageLog> = Arc::new(MemoryMessageLog::new());

        let dispatcher = Arc::new(DeliveryDispatcher::new(
            connection_manager.clone(),
            connection_manager.clone(),
            ack_store.clone(),
            cluster_bus.clone(),
            message_log.clone(),
        ));

        let retry_scheduler = Arc::new(RetryScheduler::new(
            RetryConfig::from(&settings.ack),
            ack_store.clone(),
            connection_manager.clone(),
            connection_manager.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        tracing::info!(
            node_id = %cluster_bus.node_id(),
            ack_backend = ack_store.backend_type().as_str(),
            cluster_backend = ?cluster_bus.backend_type(),
            "Application state initialized"
        );

        Self {
            settings: Arc::new(settings),
            connection_manager,
            ack_store,
            cluster_bus,
            message_log,
            dispatcher,
            retry_scheduler,
            redis_pool,
            start_time: Instant::now(),
            shutdown_tx,
        }
    }

    /// Spawn the retry sweep and the cluster subscription. Both stop when
    /// `shutdown_tx` fires.
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        handles.push(
            self.retry_scheduler
                .clone()
                .spawn(self.shutdown_tx.subscribe()),
        );

        match self
            .cluster_bus
            .subscribe(self.dispatcher.clone(), self.shutdown_tx.subscribe())
        {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start cluster subscription");
            }
        }

        handles
    }

    /// Signal every background task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn create_redis_pool(config: &RedisConfig) -> Option<Arc<RedisPool>> {
    match RedisPool::new(config.clone()) {
        Ok(pool) => {
            tracing::info!(url = %config.url, "Redis pool created");
            Some(Arc::new(pool))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Redis pool");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckBackendType;
    use crate::cluster::ClusterBusBackend;

    #[test]
    fn test_default_state_is_in_process() {
        let state = AppState::new(Settings::default());
        assert!(state.redis_pool.is_none());
        assert_eq!(state.ack_store.backend_type(), AckBackendType::Memory);
        assert_eq!(state.cluster_bus.backend_type(), ClusterBusBackend::Local);
    }

    #[tokio::test]
    async fn test_background_tasks_stop_on_shutdown() {
        let state = AppState::new(Settings::default());
        let handles = state.start_background_tasks();
        assert_eq!(handles.len(), 2);

        state.shutdown();
        for handle in handles {
            tokio::time::timeout(std::time::Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
