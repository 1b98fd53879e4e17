//! Cluster relay for multi-node deployments
//!
//! A node that originates a publish for a user it does not hold relays the
//! event once over the bus. Every other node repeats the local delivery
//! check and never relays again.

mod factory;
mod local;
mod redis_bus;
mod traits;
mod types;

pub use factory::create_cluster_bus;
pub use local::LocalClusterBus;
pub use redis_bus::RedisClusterBus;
pub use traits::{ClusterBus, ClusterEventHandler};
pub use types::{ClusterBusBackend, ClusterBusError, EventOrigin, NotificationPublished};
