//! Shop Payment Engine
//!
//! The Shop Payment Engine tracks the status of storefront payments made through an external payment gateway, and
//! pushes status changes to clients that are waiting on them (typically a checkout page holding a server-sent event
//! stream open).
//!
//! The library is divided into these sections:
//! 1. The status cache ([`mod@status_cache`]). An in-memory, per-order record of the latest payment status, with a
//!    fixed time-to-live and per-order subscriptions. Expired entries are dropped lazily on read and by a periodic
//!    sweeper.
//! 2. Status streams ([`mod@status_stream`]). One dispatcher per client connection. It replays the cached status,
//!    forwards live changes, sends keepalives, and closes once the payment reaches a terminal status.
//! 3. The webhook log ([`mod@traits`] and the SQLite backend). Every gateway callback is stored exactly once, keyed on
//!    the gateway's reference, so that retried callbacks are harmless and statuses can be recovered after a restart.
//! 4. The public API: [`PaymentNotifier`] owns the cache and hands out streams, and [`WebhookApi`] turns gateway
//!    callbacks into status changes.
pub mod db_types;
pub mod status_cache;
pub mod status_stream;
pub mod traits;

mod spe_api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use spe_api::{
    errors::WebhookApiError,
    notifier_api::PaymentNotifier,
    webhook_api::{WebhookApi, WebhookOutcome},
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use status_stream::{StatusEvent, StatusStream, StreamMessage, StreamOptions};
pub use traits::{InsertEventResult, WebhookEventStore, WebhookStoreError};
