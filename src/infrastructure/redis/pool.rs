//! Redis connection pool for the shared ACK store and the cluster bus.
//!
//! Holds one multiplexed connection that is shared by every task and
//! re-established lazily after an I/O failure.

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult, Script};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

/// Error type for Redis pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Connection not available
    #[error("Connection not available: {0}")]
    ConnectionUnavailable(String),
}

/// Redis connection pool for command traffic.
///
/// Pub/sub subscriptions need a dedicated connection and open their own
/// client from [`RedisPool::url`].
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
}

impl RedisPool {
    /// Create a new Redis pool. No connection is opened until first use.
    pub fn new(config: RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            config,
        })
    }

    /// Get the shared connection, establishing it if needed.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Double-check in case another task connected while we waited
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                tracing::info!("Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Map a command result, discarding a dropped connection so the next
    /// call reconnects.
    async fn finish<T>(&self, result: RedisResult<T>) -> Result<T, PoolError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    let mut conn_guard = self.connection.write().await;
                    *conn_guard = None;
                }
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Get the Redis URL (used to open pub/sub connections).
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Ping Redis to check connectivity.
    pub async fn ping(&self) -> Result<(), PoolError> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        self.finish(result).await.map(|_| ())
    }

    /// HSETNX: set a hash field only if it does not exist yet.
    pub async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, PoolError> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<bool> = conn.hset_nx(key, field, value).await;
        self.finish(result).await
    }

    /// HGET a single hash field.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, PoolError> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<Option<String>> = conn.hget(key, field).await;
        self.finish(result).await
    }

    /// HLEN of a hash.
    pub async fn hlen(&self, key: &str) -> Result<usize, PoolError> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<usize> = conn.hlen(key).await;
        self.finish(result).await
    }

    /// HDEL one field. Returns whether it existed.
    pub async fn hdel(&self, key: &str, field: &str) -> Result<bool, PoolError> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<usize> = conn.hdel(key, field).await;
        self.finish(result).await.map(|removed| removed > 0)
    }

    /// One HSCAN page: returns the next cursor and the field/value pairs.
    pub async fn hscan_page(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<(String, String)>), PoolError> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<(u64, Vec<(String, String)>)> = redis::cmd("HSCAN")
            .arg(key)
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await;
        self.finish(result).await
    }

    /// Evaluate a Lua script with one key and string arguments.
    pub async fn eval_script<T>(
        &self,
        script: &Script,
        key: &str,
        args: &[&str],
    ) -> Result<T, PoolError>
    where
        T: redis::FromRedisValue,
    {
        let mut conn = self.get_connection().await?;
        let mut invocation = script.key(key);
        for arg in args {
            invocation.arg(*arg);
        }
        let result: RedisResult<T> = invocation.invoke_async(&mut conn).await;
        self.finish(result).await
    }

    /// PUBLISH a payload on a channel, returning the receiver count.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<usize, PoolError> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<usize> = conn.publish(channel, payload).await;
        self.finish(result).await
    }
}
