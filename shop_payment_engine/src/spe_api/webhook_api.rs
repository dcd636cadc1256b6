use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{GatewayNotification, OrderCode, PaymentStatus, WebhookEvent},
    spe_api::{errors::WebhookApiError, notifier_api::PaymentNotifier},
    status_stream::StatusEvent,
    traits::{InsertEventResult, WebhookEventStore},
};

/// What happened to a gateway callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookOutcome {
    pub order_code: OrderCode,
    pub status: PaymentStatus,
    /// True when the gateway retried a callback that had already been stored.
    pub duplicate: bool,
}

/// `WebhookApi` is the ingestion side of the payment status flow. It persists gateway callbacks, and only then
/// hands the resulting status to the [`PaymentNotifier`].
pub struct WebhookApi<B> {
    db: B,
    notifier: PaymentNotifier,
}

impl<B> Debug for WebhookApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookApi")
    }
}

impl<B> WebhookApi<B> {
    pub fn new(db: B, notifier: PaymentNotifier) -> Self {
        Self { db, notifier }
    }

    pub fn notifier(&self) -> &PaymentNotifier {
        &self.notifier
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> WebhookApi<B>
where B: WebhookEventStore
{
    /// Stores a gateway callback and, if it is new, publishes its status.
    ///
    /// The status comes from the gateway's own status field and nothing else. Retries of a callback that was already
    /// stored are acknowledged without notifying anyone again, unless the cache has lost the order's status (after a
    /// restart, say), in which case it is restored from the log.
    pub async fn process_notification(
        &self,
        notification: GatewayNotification,
    ) -> Result<WebhookOutcome, WebhookApiError> {
        check_order_code(&notification.order_code)?;
        let order_code = notification.order_code.clone();
        let result = self.db.insert_event(&notification).await?;
        let status = result.event().payment_status();
        match result {
            InsertEventResult::Inserted(event) => {
                info!("🔄️💰️ Gateway reports {} for {order_code} [{}]", event.gateway_status, event.reference);
                self.notifier.notify_payment(&order_code, status, event.amount);
                Ok(WebhookOutcome { order_code, status, duplicate: false })
            },
            InsertEventResult::AlreadyExists(event) => {
                debug!("🔄️💰️ Duplicate gateway callback [{}] for {order_code} ignored", event.reference);
                if self.notifier.current_status(&order_code).is_none() {
                    self.warm_from_log(&order_code).await?;
                }
                Ok(WebhookOutcome { order_code, status, duplicate: true })
            },
        }
    }

    /// Records a speculative `pending` status when a payment link is generated for the order, so that streams opened
    /// before the first callback have something to replay.
    pub fn register_payment_link(
        &self,
        order_code: &OrderCode,
        amount: Option<i64>,
    ) -> Result<StatusEvent, WebhookApiError> {
        check_order_code(order_code)?;
        debug!("🔄️ Payment link created for {order_code}");
        self.notifier.notify_payment(order_code, PaymentStatus::Pending, amount);
        Ok(StatusEvent { status: PaymentStatus::Pending, amount, cached: None })
    }

    /// The current status of the order. Served from the cache if possible, and otherwise from the most recent
    /// gateway callback in the log, which is then put back into the cache.
    pub async fn current_status(&self, order_code: &OrderCode) -> Result<Option<StatusEvent>, WebhookApiError> {
        check_order_code(order_code)?;
        if let Some(status) = self.notifier.current_status(order_code) {
            return Ok(Some(status));
        }
        self.warm_from_log(order_code).await
    }

    /// Every gateway callback stored for the order, oldest first.
    pub async fn payment_history(&self, order_code: &OrderCode) -> Result<Vec<WebhookEvent>, WebhookApiError> {
        check_order_code(order_code)?;
        let events = self.db.events_for_order(order_code).await?;
        Ok(events)
    }

    async fn warm_from_log(&self, order_code: &OrderCode) -> Result<Option<StatusEvent>, WebhookApiError> {
        let latest = self.db.latest_event_for_order(order_code).await?;
        let Some(event) = latest else {
            trace!("🔄️ No status known for {order_code}");
            return Ok(None);
        };
        let status = event.payment_status();
        match self.notifier.restore_payment(order_code, status, event.amount) {
            Some(current) => {
                debug!("🔄️ {order_code} changed to {} while reading the log. Keeping it", current.status);
                Ok(Some(current))
            },
            None => {
                debug!("🔄️ Restored {status} for {order_code} from gateway callback [{}]", event.reference);
                Ok(Some(StatusEvent { status, amount: event.amount, cached: Some(false) }))
            },
        }
    }
}

fn check_order_code(order_code: &OrderCode) -> Result<(), WebhookApiError> {
    if order_code.is_valid() {
        Ok(())
    } else {
        Err(WebhookApiError::InvalidOrderCode(order_code.as_str().to_string()))
    }
}
