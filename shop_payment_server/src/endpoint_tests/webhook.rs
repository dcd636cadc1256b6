use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use actix_web::{http::StatusCode, web, web::ServiceConfig};
use shop_payment_engine::{
    db_types::{GatewayPaymentStatus, OrderCode, PaymentStatus},
    InsertEventResult,
    PaymentNotifier,
    WebhookApi,
    WebhookStoreError,
};

use super::{
    helpers::{event_from_notification, new_notifier, post_request, webhook_event},
    mocks::MockEventStore,
};
use crate::routes::PaymentWebhookRoute;

fn configure(store: MockEventStore, notifier: PaymentNotifier) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = WebhookApi::new(store, notifier);
        cfg.service(PaymentWebhookRoute::<MockEventStore>::new()).app_data(web::Data::new(api));
    }
}

#[actix_web::test]
async fn new_payment_is_published() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_insert_event().times(1).returning(|n| Ok(InsertEventResult::Inserted(event_from_notification(1, n))));
    let notifier = new_notifier();
    let body = r#"{"orderCode":"A1","status":"PAID","amount":5000,"reference":"FT-1"}"#;
    let (status, body) = post_request("/payment", body, configure(store, notifier.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Payment for #A1 is done"}"#);
    let cached = notifier.current_status(&OrderCode::from("A1")).unwrap();
    assert_eq!(cached.status, PaymentStatus::Done);
    assert_eq!(cached.amount, Some(5000));
}

#[actix_web::test]
async fn cancelled_payment_is_failed() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_insert_event().returning(|n| Ok(InsertEventResult::Inserted(event_from_notification(2, n))));
    let notifier = new_notifier();
    let body = r#"{"orderCode":"A2","status":"CANCELLED","reference":"FT-2"}"#;
    let (status, body) = post_request("/payment", body, configure(store, notifier.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Payment for #A2 is failed"}"#);
    assert_eq!(notifier.current_status(&OrderCode::from("A2")).map(|s| s.status), Some(PaymentStatus::Failed));
}

#[actix_web::test]
async fn duplicate_is_acknowledged_without_notifying() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store
        .expect_insert_event()
        .returning(|n| Ok(InsertEventResult::AlreadyExists(event_from_notification(3, n))));
    store.expect_latest_event_for_order().never();
    let notifier = new_notifier();
    let code = OrderCode::from("A3");
    notifier.notify_payment(&code, PaymentStatus::Done, Some(10));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _sub = notifier.cache().subscribe(&code, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let body = r#"{"orderCode":"A3","status":"PAID","amount":10,"reference":"FT-3"}"#;
    let (status, body) = post_request("/payment", body, configure(store, notifier.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Duplicate notification for #A3 acknowledged"}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn duplicate_restores_an_empty_cache() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store
        .expect_insert_event()
        .returning(|n| Ok(InsertEventResult::AlreadyExists(event_from_notification(4, n))));
    store
        .expect_latest_event_for_order()
        .times(1)
        .returning(|_| Ok(Some(webhook_event(4, "A4", GatewayPaymentStatus::Success, Some(75)))));
    let notifier = new_notifier();
    let body = r#"{"orderCode":"A4","status":"SUCCESS","amount":75,"reference":"FT-4"}"#;
    let (status, _) = post_request("/payment", body, configure(store, notifier.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notifier.current_status(&OrderCode::from("A4")).map(|s| s.status), Some(PaymentStatus::Done));
}

#[actix_web::test]
async fn malformed_body_is_rejected() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_insert_event().never();
    let body = r#"{"orderCode":"A5","status":"MAYBE","reference":"FT-5"}"#;
    let (status, body) = post_request("/payment", body, configure(store, new_notifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with(r#"{"error":"Could not read request body: "#), "{body}");
}

#[actix_web::test]
async fn blank_order_code_is_rejected() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_insert_event().never();
    let body = r#"{"orderCode":"  ","status":"PAID","reference":"FT-6"}"#;
    let (status, body) = post_request("/payment", body, configure(store, new_notifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid order code: '  '"}"#);
}

#[actix_web::test]
async fn storage_failures_ask_for_a_retry() {
    let _ = env_logger::try_init().ok();
    let mut store = MockEventStore::new();
    store.expect_insert_event().returning(|_| Err(WebhookStoreError::DatabaseError("disk full".into())));
    let notifier = new_notifier();
    let body = r#"{"orderCode":"A7","status":"PAID","reference":"FT-7"}"#;
    let (status, body) = post_request("/payment", body, configure(store, notifier.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, r#"{"error":"An error occurred on the backend of the server. Database error: disk full"}"#);
    assert!(notifier.current_status(&OrderCode::from("A7")).is_none());
}
