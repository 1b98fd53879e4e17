//! Redis-backed ACK store shared by every node in the cluster.
//!
//! All pending records live in one hash:
//! - key: `ack.redis_key` (default `ara:ack:pending`)
//! - field: the ACK key wire form `{message_id}::{session_id}`
//! - value: the JSON-encoded `NotificationMessage`
//!
//! Check-and-mutate operations run as Lua scripts so they stay atomic
//! across nodes. State survives a node restart.

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use lazy_static::lazy_static;
use redis::Script;

use super::backend::{AckBackendType, AckEntry, AckStore, AckStoreError};
use super::key::AckKey;
use crate::notification::NotificationMessage;
use crate::redis::RedisPool;

/// Fields requested per HSCAN round trip.
const SCAN_BATCH: usize = 200;

lazy_static! {
    /// Returns the removed value, or nil.
    static ref REMOVE_SCRIPT: Script = Script::new(
        r#"
        local value = redis.call('HGET', KEYS[1], ARGV[1])
        if value then
            redis.call('HDEL', KEYS[1], ARGV[1])
        end
        return value
        "#,
    );

    /// Returns 1 if the record existed and its receiver matched ARGV[2].
    static ref REMOVE_IF_RECEIVER_SCRIPT: Script = Script::new(
        r#"
        local value = redis.call('HGET', KEYS[1], ARGV[1])
        if not value then
            return 0
        end
        local ok, decoded = pcall(cjson.decode, value)
        if not ok or decoded['receiver'] ~= ARGV[2] then
            return 0
        end
        redis.call('HDEL', KEYS[1], ARGV[1])
        return 1
        "#,
    );

    /// Returns 1 if the field existed and was overwritten.
    static ref REPLACE_SCRIPT: Script = Script::new(
        r#"
        if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
            redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
            return 1
        end
        return 0
        "#,
    );
}

/// Redis hash ACK store.
pub struct RedisAckStore {
    pool: Arc<RedisPool>,
    hash_key: String,
}

impl RedisAckStore {
    pub fn new(pool: Arc<RedisPool>, hash_key: impl Into<String>) -> Self {
        Self {
            pool,
            hash_key: hash_key.into(),
        }
    }

    /// Name of the hash holding the pending records.
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    fn encode(message: &NotificationMessage) -> Result<String, AckStoreError> {
        Ok(serde_json::to_string(message)?)
    }

    fn decode(value: &str) -> Result<NotificationMessage, AckStoreError> {
        Ok(serde_json::from_str(value)?)
    }

    /// Decode one hash field. Any failure is reported as `Corrupt` carrying
    /// the raw field so the record can still be deleted.
    fn decode_entry(field: &str, value: &str) -> Result<AckEntry, AckStoreError> {
        let corrupt = |reason: String| AckStoreError::Corrupt {
            field: field.to_string(),
            reason,
        };
        let key = AckKey::parse(field).map_err(|e| corrupt(e.to_string()))?;
        let message = Self::decode(value).map_err(|e| corrupt(e.to_string()))?;
        Ok((key, message))
    }
}

#[async_trait]
impl AckStore for RedisAckStore {
    async fn put(&self, key: &AckKey, message: &NotificationMessage) -> Result<bool, AckStoreError> {
        let value = Self::encode(message)?;
        let field = key.to_string();
        Ok(self.pool.hset_nx(&self.hash_key, &field, &value).await?)
    }

    async fn get(&self, key: &AckKey) -> Result<Option<NotificationMessage>, AckStoreError> {
        let field = key.to_string();
        match self.pool.hget(&self.hash_key, &field).await? {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &AckKey) -> Result<Option<NotificationMessage>, AckStoreError> {
        let field = key.to_string();
        let removed: Option<String> = self
            .pool
            .eval_script(&REMOVE_SCRIPT, &self.hash_key, &[field.as_str()])
            .await?;

        match removed {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn remove_if_receiver_matches(
        &self,
        key: &AckKey,
        claimed_receiver: &str,
    ) -> Result<bool, AckStoreError> {
        let field = key.to_string();
        let removed: i64 = self
            .pool
            .eval_script(
                &REMOVE_IF_RECEIVER_SCRIPT,
                &self.hash_key,
                &[field.as_str(), claimed_receiver],
            )
            .await?;
        Ok(removed == 1)
    }

    async fn replace(&self, key: &AckKey, message: &NotificationMessage) -> Result<bool, AckStoreError> {
        let field = key.to_string();
        let value = Self::encode(message)?;
        let replaced: i64 = self
            .pool
            .eval_script(&REPLACE_SCRIPT, &self.hash_key, &[field.as_str(), value.as_str()])
            .await?;
        Ok(replaced == 1)
    }

    async fn discard(&self, raw_key: &str) -> Result<bool, AckStoreError> {
        Ok(self.pool.hdel(&self.hash_key, raw_key).await?)
    }

    fn scan_all(&self) -> BoxStream<'_, Result<AckEntry, AckStoreError>> {
        let entries = stream! {
            // HSCAN may return a field more than once while the hash rehashes
            let mut seen: HashSet<String> = HashSet::new();
            let mut cursor: u64 = 0;

            loop {
                let page: Result<(u64, Vec<(String, String)>), AckStoreError> = self
                    .pool
                    .hscan_page(&self.hash_key, cursor, SCAN_BATCH)
                    .await
                    .map_err(AckStoreError::from);

                let (next, fields) = match page {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                for (field, value) in fields {
                    if !seen.insert(field.clone()) {
                        continue;
                    }
                    let entry: Result<AckEntry, AckStoreError> = Self::decode_entry(&field, &value);
                    yield entry;
                }

                if next == 0 {
                    break;
                }
                cursor = next;
            }
        };

        Box::pin(entries)
    }

    async fn len(&self) -> Result<usize, AckStoreError> {
        Ok(self.pool.hlen(&self.hash_key).await?)
    }

    fn backend_type(&self) -> AckBackendType {
        AckBackendType::Redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    fn store() -> RedisAckStore {
        let pool = RedisPool::new(RedisConfig {
            url: "redis://localhost:6379".to_string(),
        })
        .unwrap();
        RedisAckStore::new(Arc::new(pool), "ara:ack:pending")
    }

    #[test]
    fn test_backend_type_and_key() {
        let store = store();
        assert_eq!(store.backend_type(), AckBackendType::Redis);
        assert_eq!(store.hash_key(), "ara:ack:pending");
    }

    #[test]
    fn test_decode_entry() {
        let message = NotificationMessage::text("m1", "u1", "hi");
        let value = RedisAckStore::encode(&message).unwrap();

        let (key, decoded) = RedisAckStore::decode_entry("m1::s1", &value).unwrap();
        assert_eq!(key, AckKey::new("m1", "s1"));
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_undecodable_field_is_reported_with_raw_key() {
        let value = RedisAckStore::encode(&NotificationMessage::text("m1", "u1", "hi")).unwrap();
        assert!(matches!(
            RedisAckStore::decode_entry("no-separator", &value),
            Err(AckStoreError::Corrupt { field, .. }) if field == "no-separator"
        ));
        assert!(matches!(
            RedisAckStore::decode_entry("m1::s1", "{not json"),
            Err(AckStoreError::Corrupt { field, .. }) if field == "m1::s1"
        ));
    }

    #[test]
    fn test_stored_value_exposes_receiver_for_lua() {
        // The receiver check script reads the top-level `receiver` field
        let value = RedisAckStore::encode(&NotificationMessage::text("m1", "u1", "hi")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(json["receiver"], "u1");
    }
}
