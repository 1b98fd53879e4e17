//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod notification;
mod routes;

pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use notification::{
    acknowledge, broadcast_notification, publish_notification, track_notification, AckRequest,
    AckResponse, BroadcastRequest, NotificationRequest,
};
pub use routes::api_routes;
