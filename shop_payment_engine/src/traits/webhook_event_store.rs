use thiserror::Error;

use crate::{
    db_types::{GatewayNotification, OrderCode, WebhookEvent},
    traits::InsertEventResult,
};

#[derive(Debug, Clone, Error)]
pub enum WebhookStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Stored webhook event is corrupt: {0}")]
    CorruptEvent(String),
}

impl From<sqlx::Error> for WebhookStoreError {
    fn from(e: sqlx::Error) -> Self {
        WebhookStoreError::DatabaseError(e.to_string())
    }
}

/// The durable log of payment gateway callbacks.
///
/// The gateway delivers webhooks at least once, so the log is what turns retries into no-ops: every callback carries a
/// unique `reference`, and inserting the same reference twice must not create a second record.
#[allow(async_fn_in_trait)]
pub trait WebhookEventStore: Clone {
    /// Stores the notification, unless an event with the same reference already exists. This call is idempotent.
    async fn insert_event(&self, notification: &GatewayNotification) -> Result<InsertEventResult, WebhookStoreError>;

    /// The most recently received event for the order, if any.
    async fn latest_event_for_order(&self, order_code: &OrderCode) -> Result<Option<WebhookEvent>, WebhookStoreError>;

    /// Every event received for the order, oldest first.
    async fn events_for_order(&self, order_code: &OrderCode) -> Result<Vec<WebhookEvent>, WebhookStoreError>;
}
