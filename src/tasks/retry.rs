use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::ack::{AckKey, AckStore, AckStoreError};
use crate::config::AckSettingsConfig;
use crate::connection_manager::{SessionRegistry, Transport};
use crate::metrics::{AckMetrics, MessageMetrics};
use crate::notification::{now_millis, NotificationMessage};

/// Timing rules for the retry sweep
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Grace period after `created` before the first retry
    pub check_wait: Duration,
    /// Sweep period
    pub retry_interval: Duration,
    /// Hard deadline measured from `created`
    pub ttl: Duration,
    /// Re-sends allowed before a record is abandoned
    pub max_retry: u32,
}

impl From<&AckSettingsConfig> for RetryConfig {
    fn from(settings: &AckSettingsConfig) -> Self {
        Self {
            check_wait: Duration::from_millis(settings.check_wait_ms),
            retry_interval: Duration::from_millis(settings.retry_interval_ms),
            ttl: Duration::from_millis(settings.ttl_ms),
            max_retry: settings.max_retry(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&AckSettingsConfig::default())
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub scanned: usize,
    /// Still inside the grace period
    pub skipped: usize,
    pub retried: usize,
    pub expired: usize,
    /// No matching live session on this node, or the re-send failed
    pub not_online: usize,
    /// Undecodable records removed from the store
    pub discarded: usize,
    /// Store errors while scanning or writing back
    pub errors: usize,
}

impl SweepSummary {
    /// Records still pending after this sweep
    pub fn pending(&self) -> usize {
        self.scanned.saturating_sub(self.expired)
    }
}

/// Outcome for one pending record
enum EntryAction {
    Skipped,
    Retried,
    Expired,
    NotOnline,
    Error,
}

/// Periodic sweep that re-sends unacknowledged deliveries and expires stale ones
pub struct RetryScheduler {
    config: RetryConfig,
    ack_store: Arc<dyn AckStore>,
    registry: Arc<dyn SessionRegistry>,
    transport: Arc<dyn Transport>,
}

impl RetryScheduler {
    pub fn new(
        config: RetryConfig,
        ack_store: Arc<dyn AckStore>,
        registry: Arc<dyn SessionRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            ack_store,
            registry,
            transport,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Spawn the periodic sweep; it stops when `shutdown` fires.
    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Run the sweep loop until shutdown
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut sweep_timer = tokio::time::interval(self.config.retry_interval);

        // Skip immediate first tick
        sweep_timer.tick().await;

        tracing::info!(
            retry_interval_ms = self.config.retry_interval.as_millis() as u64,
            check_wait_ms = self.config.check_wait.as_millis() as u64,
            ttl_ms = self.config.ttl.as_millis() as u64,
            max_retry = self.config.max_retry,
            backend = self.ack_store.backend_type().as_str(),
            "Retry scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Retry scheduler received shutdown signal");
                    break;
                }
                _ = sweep_timer.tick() => {
                    self.sweep().await;
                }
            }
        }

        tracing::info!("Retry scheduler stopped");
    }

    /// One sweep at the current time
    pub async fn sweep(&self) -> SweepSummary {
        self.sweep_at(now_millis()).await
    }

    /// One sweep over every pending record, judged at `now_ms`.
    ///
    /// A failure on one record is logged and counted; it never stops the sweep.
    pub async fn sweep_at(&self, now_ms: i64) -> SweepSummary {
        let start = Instant::now();
        let mut summary = SweepSummary::default();
        let mut entries = self.ack_store.scan_all();

        while let Some(entry) = entries.next().await {
            let (key, message) = match entry {
                Ok(entry) => entry,
                Err(AckStoreError::Corrupt { field, reason }) => {
                    // Can never be ACKed or retried
                    match self.ack_store.discard(&field).await {
                        Ok(_) => {
                            summary.discarded += 1;
                            tracing::warn!(ack_key = %field, reason = %reason, "Discarded undecodable ACK record");
                        }
                        Err(e) => {
                            summary.errors += 1;
                            tracing::warn!(ack_key = %field, error = %e, "Failed to discard undecodable ACK record");
                        }
                    }
                    continue;
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(error = %e, "Failed to read pending ACK record");
                    continue;
                }
            };

            summary.scanned += 1;
            match self.process_entry(&key, message, now_ms).await {
                EntryAction::Skipped => summary.skipped += 1,
                EntryAction::Retried => summary.retried += 1,
                EntryAction::Expired => summary.expired += 1,
                EntryAction::NotOnline => summary.not_online += 1,
                EntryAction::Error => summary.errors += 1,
            }
        }
        drop(entries);

        let elapsed = start.elapsed();
        AckMetrics::record_sweep(summary.pending(), summary.retried, summary.expired, elapsed);

        if summary.scanned > 0 || summary.errors > 0 || summary.discarded > 0 {
            tracing::info!(
                scanned = summary.scanned,
                retried = summary.retried,
                expired = summary.expired,
                not_online = summary.not_online,
                skipped = summary.skipped,
                discarded = summary.discarded,
                errors = summary.errors,
                elapsed_ms = elapsed.as_millis() as u64,
                "ACK retry sweep completed"
            );
        }

        summary
    }

    async fn process_entry(
        &self,
        key: &AckKey,
        mut message: NotificationMessage,
        now_ms: i64,
    ) -> EntryAction {
        let age_ms = message.age_ms(now_ms);

        if age_ms < self.config.check_wait.as_millis() as i64 {
            return EntryAction::Skipped;
        }

        if message.ack_retry_count >= self.config.max_retry
            || age_ms > self.config.ttl.as_millis() as i64
        {
            return match self.ack_store.remove(key).await {
                Ok(Some(_)) => {
                    tracing::debug!(
                        ack_key = %key,
                        retry_count = message.ack_retry_count,
                        age_ms = age_ms,
                        "Pending delivery expired"
                    );
                    EntryAction::Expired
                }
                // Acknowledged between scan and removal
                Ok(None) => EntryAction::Skipped,
                Err(e) => {
                    tracing::warn!(ack_key = %key, error = %e, "Failed to expire ACK record");
                    EntryAction::Error
                }
            };
        }

        if !self
            .registry
            .has_exact_session(&message.receiver, key.session_id())
        {
            return EntryAction::NotOnline;
        }

        if let Err(e) = self
            .transport
            .send(&message.receiver, Some(key.session_id()), &message)
            .await
        {
            tracing::warn!(ack_key = %key, error = %e, "Retry send failed");
            return EntryAction::NotOnline;
        }

        MessageMetrics::record_retry_sent();
        message.record_retry(now_ms);

        match self.ack_store.replace(key, &message).await {
            Ok(_) => {
                tracing::debug!(
                    ack_key = %key,
                    retry_count = message.ack_retry_count,
                    "Re-sent unacknowledged notification"
                );
                EntryAction::Retried
            }
            Err(e) => {
                tracing::warn!(ack_key = %key, error = %e, "Failed to write back ACK record");
                EntryAction::Error
            }
        }
    }
}
