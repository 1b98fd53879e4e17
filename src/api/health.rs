//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::ack::AckBackendType;
use crate::cluster::ClusterBusBackend;
use crate::notification::DispatcherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub node_id: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisHealthResponse>,
    pub connections: ConnectionHealthResponse,
    pub ack: AckHealthResponse,
    pub cluster: ClusterHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub status: String,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub unique_users: usize,
}

#[derive(Debug, Serialize)]
pub struct AckHealthResponse {
    pub backend: AckBackendType,
}

#[derive(Debug, Serialize)]
pub struct ClusterHealthResponse {
    pub enabled: bool,
    pub backend: ClusterBusBackend,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub node_id: String,
    pub connections: ConnectionHealthResponse,
    pub notifications: DispatcherStatsSnapshot,
    pub ack: AckStats,
}

#[derive(Debug, Serialize)]
pub struct AckStats {
    pub backend: AckBackendType,
    /// `None` when the store could not be read
    pub pending_count: Option<usize>,
    pub max_retry: u32,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let conn_stats = state.connection_manager.stats();

    let redis = match state.redis_pool {
        Some(ref pool) => {
            let connected = match pool.ping().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Redis health check failed");
                    false
                }
            };
            Some(RedisHealthResponse {
                status: (if connected { "connected" } else { "disconnected" }).to_string(),
                connected,
            })
        }
        None => None,
    };

    let degraded = redis.as_ref().map(|r| !r.connected).unwrap_or(false);
    let status = if degraded { "degraded" } else { "healthy" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        node_id: state.dispatcher.node_id().to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        redis,
        connections: ConnectionHealthResponse {
            total: conn_stats.total_connections,
            unique_users: conn_stats.unique_users,
        },
        ack: AckHealthResponse {
            backend: state.ack_store.backend_type(),
        },
        cluster: ClusterHealthResponse {
            enabled: state.settings.cluster.enabled,
            backend: state.cluster_bus.backend_type(),
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let conn_stats = state.connection_manager.stats();

    let pending_count = match state.ack_store.len().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read pending ACK count");
            None
        }
    };

    Json(StatsResponse {
        node_id: state.dispatcher.node_id().to_string(),
        connections: ConnectionHealthResponse {
            total: conn_stats.total_connections,
            unique_users: conn_stats.unique_users,
        },
        notifications: state.dispatcher.stats(),
        ack: AckStats {
            backend: state.ack_store.backend_type(),
            pending_count,
            max_retry: state.retry_scheduler.config().max_retry,
        },
    })
}
