//! In-memory ACK store using DashMap.
//!
//! State lives in this process only and is lost on restart.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};

use super::backend::{AckBackendType, AckEntry, AckStore, AckStoreError};
use super::key::AckKey;
use crate::notification::NotificationMessage;

/// Process-local ACK store.
#[derive(Debug, Default)]
pub struct MemoryAckStore {
    pending: DashMap<AckKey, NotificationMessage>,
}

impl MemoryAckStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AckStore for MemoryAckStore {
    async fn put(&self, key: &AckKey, message: &NotificationMessage) -> Result<bool, AckStoreError> {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &AckKey) -> Result<Option<NotificationMessage>, AckStoreError> {
        Ok(self.pending.get(key).map(|r| r.value().clone()))
    }

    async fn remove(&self, key: &AckKey) -> Result<Option<NotificationMessage>, AckStoreError> {
        Ok(self.pending.remove(key).map(|(_, message)| message))
    }

    async fn remove_if_receiver_matches(
        &self,
        key: &AckKey,
        claimed_receiver: &str,
    ) -> Result<bool, AckStoreError> {
        Ok(self
            .pending
            .remove_if(key, |_, message| message.receiver == claimed_receiver)
            .is_some())
    }

    async fn replace(&self, key: &AckKey, message: &NotificationMessage) -> Result<bool, AckStoreError> {
        match self.pending.get_mut(key) {
            Some(mut existing) => {
                *existing = message.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn discard(&self, raw_key: &str) -> Result<bool, AckStoreError> {
        // Records here are typed, so only a well-formed key can match
        match AckKey::parse(raw_key) {
            Ok(key) => Ok(self.pending.remove(&key).is_some()),
            Err(_) => Ok(false),
        }
    }

    fn scan_all(&self) -> BoxStream<'_, Result<AckEntry, AckStoreError>> {
        // Snapshot so no shard lock is held across the caller's awaits
        let snapshot: Vec<AckEntry> = self
            .pending
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }

    async fn len(&self) -> Result<usize, AckStoreError> {
        Ok(self.pending.len())
    }

    fn backend_type(&self) -> AckBackendType {
        AckBackendType::Memory
    }
}
