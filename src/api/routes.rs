use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::notification::{
    acknowledge, broadcast_notification, publish_notification, track_notification,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Notification endpoints
        .nest(
            "/api/v1",
            Router::new()
                // Persist, assign an id, then deliver
                .route("/notifications", post(track_notification))
                // Caller-assigned id
                .route("/notifications/publish", post(publish_notification))
                .route("/notifications/broadcast", post(broadcast_notification))
                .route("/notifications/ack", post(acknowledge)),
        )
}
