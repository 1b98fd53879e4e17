//! Redis connectivity shared by the distributed ACK store and the cluster bus.

pub mod pool;

pub use pool::{PoolError, RedisPool};
