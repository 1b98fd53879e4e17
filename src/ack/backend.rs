//! Backend trait for pending ACK storage.
//!
//! This module defines the abstraction layer for ACK store backends,
//! allowing the process-local map and the shared Redis hash to be used
//! interchangeably by the dispatcher and the retry sweep.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use super::key::AckKey;
use crate::notification::NotificationMessage;
use crate::redis::PoolError;

/// Errors that can occur during ACK store operations.
#[derive(Debug, Error)]
pub enum AckStoreError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored record cannot be decoded; `field` is its raw key
    #[error("Corrupt ack record {field}: {reason}")]
    Corrupt { field: String, reason: String },

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for AckStoreError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => AckStoreError::Redis(e),
            PoolError::ConnectionUnavailable(msg) => AckStoreError::Unavailable(msg),
        }
    }
}

/// Which backend an [`AckStore`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckBackendType {
    Memory,
    Redis,
}

impl AckBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckBackendType::Memory => "memory",
            AckBackendType::Redis => "redis",
        }
    }
}

/// One entry yielded by [`AckStore::scan_all`].
pub type AckEntry = (AckKey, NotificationMessage);

/// Store of pending (unacknowledged) deliveries.
///
/// Every operation is individually atomic. Timestamps and retry counters on
/// the stored message are set by the caller, never by the store.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared by
/// the publish path, the ACK path and the retry sweep.
#[async_trait]
pub trait AckStore: Send + Sync {
    /// Insert a record. Returns `false` and leaves the existing record
    /// untouched if the key is already present.
    async fn put(&self, key: &AckKey, message: &NotificationMessage) -> Result<bool, AckStoreError>;

    async fn get(&self, key: &AckKey) -> Result<Option<NotificationMessage>, AckStoreError>;

    /// Remove a record unconditionally, returning it if it was present.
    async fn remove(&self, key: &AckKey) -> Result<Option<NotificationMessage>, AckStoreError>;

    /// Remove the record only if its receiver equals `claimed_receiver`.
    ///
    /// Returns `false` when the key is absent or the receiver differs. This is
    /// the only path by which an ACK is honored.
    async fn remove_if_receiver_matches(
        &self,
        key: &AckKey,
        claimed_receiver: &str,
    ) -> Result<bool, AckStoreError>;

    /// Overwrite a record only if the key is still present.
    async fn replace(&self, key: &AckKey, message: &NotificationMessage) -> Result<bool, AckStoreError>;

    /// Drop a record by its raw stored key, even one that no longer decodes.
    /// Returns `false` if nothing was stored under that key.
    async fn discard(&self, raw_key: &str) -> Result<bool, AckStoreError>;

    /// Lazily iterate every record.
    ///
    /// A record that cannot be decoded is yielded as
    /// [`AckStoreError::Corrupt`] so the caller can [`discard`](Self::discard) it.
    ///
    /// Records added or removed while the scan runs may be seen or missed,
    /// but a key is never yielded twice within one scan.
    fn scan_all(&self) -> BoxStream<'_, Result<AckEntry, AckStoreError>>;

    /// Number of pending records.
    async fn len(&self) -> Result<usize, AckStoreError>;

    fn backend_type(&self) -> AckBackendType;
}
