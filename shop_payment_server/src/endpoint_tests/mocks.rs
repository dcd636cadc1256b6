use mockall::mock;
use shop_payment_engine::{
    db_types::{GatewayNotification, OrderCode, WebhookEvent},
    InsertEventResult,
    WebhookEventStore,
    WebhookStoreError,
};

mock! {
    pub EventStore {}
    impl Clone for EventStore {
        fn clone(&self) -> Self;
    }
    impl WebhookEventStore for EventStore {
        async fn insert_event(&self, notification: &GatewayNotification) -> Result<InsertEventResult, WebhookStoreError>;
        async fn latest_event_for_order(&self, order_code: &OrderCode) -> Result<Option<WebhookEvent>, WebhookStoreError>;
        async fn events_for_order(&self, order_code: &OrderCode) -> Result<Vec<WebhookEvent>, WebhookStoreError>;
    }
}
