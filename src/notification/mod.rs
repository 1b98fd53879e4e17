//! Notification data model, publish validation, and the delivery dispatcher.
//!
//! The dispatcher ties the session registry, the ACK store and the cluster
//! bus together:
//!
//! - receiver online here: send to every session and track one ACK record
//!   per `(message_id, session_id)`
//! - receiver absent and the event originated here: relay once over the bus
//! - receiver absent on a relayed event: nothing to do on this node

mod dispatcher;
mod persistence;
mod types;

pub use dispatcher::{
    DeliveryDispatcher, DeliveryResult, DispatchOutcome, DispatcherStatsSnapshot, PublishReceipt,
};
pub use persistence::{MemoryMessageLog, MessageLog, PersistenceError, PublishError};
pub use types::{now_millis, NotificationMessage, NotifyType, NotifyUpdatePayload, ValidationError};
