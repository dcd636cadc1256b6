//! # Storage backends
//!
//! The payment status cache itself never touches storage. The traits here describe the durable side of the system
//! that feeds it: the log of payment gateway callbacks.
//!
//! * [`WebhookEventStore`] records gateway callbacks idempotently and answers "what did the gateway last say about
//!   this order?" when the cache has nothing.
mod data_objects;
mod webhook_event_store;

pub use data_objects::InsertEventResult;
pub use webhook_event_store::{WebhookEventStore, WebhookStoreError};
