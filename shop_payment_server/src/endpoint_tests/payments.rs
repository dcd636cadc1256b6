use actix_web::{http::StatusCode, web, web::ServiceConfig};
use shop_payment_engine::{
    db_types::{GatewayPaymentStatus, OrderCode, PaymentStatus},
    PaymentNotifier,
    WebhookApi,
};

use super::{
    helpers::{get_request, new_notifier, post_request, webhook_event},
    mocks::MockEventStore,
};
use crate::routes::{PaymentHistoryRoute, PaymentLinkRoute, PaymentStatusRoute};

fn configure(store: MockEventStore, notifier: PaymentNotifier) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = WebhookApi::new(store, notifier);
        cfg.service(PaymentStatusRoute::<MockEventStore>::new())
            .service(PaymentHistoryRoute::<MockEventStore>::new())
            .service(PaymentLinkRoute::<MockEventStore>::new())
            .app_data(web::Data::new(api));
    }
}

#[actix_web::test]
async fn status_from_cache() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_latest_event_for_order().never();
    let notifier = new_notifier();
    notifier.notify_payment(&OrderCode::from("B1"), PaymentStatus::Done, Some(5000));
    let (status, body) = get_request("/payment/B1/status", configure(store, notifier)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"done","amount":5000,"cached":true}"#);
}

#[actix_web::test]
async fn status_falls_back_to_the_webhook_log() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store
        .expect_latest_event_for_order()
        .times(1)
        .returning(|_| Ok(Some(webhook_event(9, "B2", GatewayPaymentStatus::Cancelled, None))));
    let notifier = new_notifier();
    let (status, body) = get_request("/payment/B2/status", configure(store, notifier.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"failed","cached":false}"#);
    assert_eq!(notifier.current_status(&OrderCode::from("B2")).map(|s| s.status), Some(PaymentStatus::Failed));
}

#[actix_web::test]
async fn unknown_order_is_not_found() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_latest_event_for_order().returning(|_| Ok(None));
    let (status, body) = get_request("/payment/B3/status", configure(store, new_notifier())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. No payment status for #B3"}"#);
}

#[actix_web::test]
async fn history_lists_stored_events() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_events_for_order().returning(|code| {
        assert_eq!(code.as_str(), "B4");
        Ok(vec![
            webhook_event(1, "B4", GatewayPaymentStatus::Pending, Some(300)),
            webhook_event(2, "B4", GatewayPaymentStatus::Paid, Some(300)),
        ])
    });
    let (status, body) = get_request("/payment/B4/history", configure(store, new_notifier())).await;
    assert_eq!(status, StatusCode::OK);
    let events: serde_json::Value = serde_json::from_str(&body).unwrap();
    let statuses = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["gateway_status"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(statuses, vec!["PENDING", "PAID"]);
}

#[actix_web::test]
async fn payment_link_records_pending() {
    let _ = env_logger::try_init().ok();
    let notifier = new_notifier();
    let (status, body) =
        post_request("/payment/B5/link", r#"{"amount":120}"#, configure(MockEventStore::new(), notifier.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"pending","amount":120}"#);
    let cached = notifier.current_status(&OrderCode::from("B5")).unwrap();
    assert_eq!(cached.status, PaymentStatus::Pending);
    assert_eq!(cached.amount, Some(120));
}
