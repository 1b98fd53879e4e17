//! Prometheus metrics endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::metrics::{self, ConnectionMetrics};
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state).await;

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Refresh gauges that are sampled rather than counted
async fn update_metrics_from_state(state: &AppState) {
    let conn_stats = state.connection_manager.stats();
    ConnectionMetrics::set_counts(conn_stats.total_connections, conn_stats.unique_users);

    match state.ack_store.len().await {
        Ok(pending) => metrics::ACK_PENDING.set(pending as i64),
        Err(e) => tracing::warn!(error = %e, "Failed to read pending ACK count"),
    }
}
