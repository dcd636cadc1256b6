use std::time::Duration;

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use shop_payment_engine::{
    db_types::{OrderCode, PaymentStatus},
    status_cache::StatusCache,
    PaymentNotifier,
    StreamOptions,
};

use super::helpers::{get_request, new_notifier};
use crate::routes::payment_events;

#[actix_web::test]
async fn terminal_order_gets_exactly_one_frame() {
    let _ = env_logger::try_init().ok();
    let notifier = new_notifier();
    let code = OrderCode::from("C1");
    notifier.notify_payment(&code, PaymentStatus::Done, Some(5000));
    let app = App::new().app_data(web::Data::new(notifier.clone())).service(payment_events);
    let service = test::init_service(app).await;
    let req = TestRequest::get().uri("/payment/C1/events").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("content-type").unwrap(), "text/event-stream");
    assert_eq!(res.headers().get("cache-control").unwrap(), "no-cache");
    let body = test::read_body(res).await;
    assert_eq!(body, "data: {\"status\":\"done\",\"amount\":5000,\"cached\":true}\n\n");
    assert_eq!(notifier.cache().subscriber_count(&code), 0);
}

#[actix_web::test]
async fn pending_order_streams_until_terminal() {
    let _ = env_logger::try_init().ok();
    let notifier = new_notifier();
    let code = OrderCode::from("C2");
    notifier.notify_payment(&code, PaymentStatus::Pending, None);
    let app = App::new().app_data(web::Data::new(notifier.clone())).service(payment_events);
    let service = test::init_service(app).await;
    let req = TestRequest::get().uri("/payment/C2/events").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(notifier.cache().subscriber_count(&code), 1);
    notifier.notify_payment(&code, PaymentStatus::Done, Some(42));
    let body = test::read_body(res).await;
    assert_eq!(
        body,
        "data: {\"status\":\"pending\",\"cached\":true}\n\ndata: {\"status\":\"done\",\"amount\":42}\n\n"
    );
    assert_eq!(notifier.cache().subscriber_count(&code), 0);
}

#[actix_web::test]
async fn idle_streams_send_keepalives_then_close() {
    let _ = env_logger::try_init().ok();
    let options = StreamOptions {
        keepalive_interval: Duration::from_millis(20),
        idle_timeout: Some(Duration::from_millis(110)),
    };
    let notifier = PaymentNotifier::new(StatusCache::new(), options);
    let code = OrderCode::from("C3");
    let app = App::new().app_data(web::Data::new(notifier.clone())).service(payment_events);
    let service = test::init_service(app).await;
    let req = TestRequest::get().uri("/payment/C3/events").to_request();
    let body = test::read_body(test::call_service(&service, req).await).await;
    let body = String::from_utf8_lossy(&body);
    assert!(!body.contains("data:"), "{body}");
    assert!(body.starts_with(": keepalive\n\n"), "{body}");
    assert!(body.matches(": keepalive\n\n").count() >= 2, "{body}");
    assert_eq!(notifier.cache().subscriber_count(&code), 0);
}

#[actix_web::test]
async fn dropped_connections_release_their_subscription() {
    let _ = env_logger::try_init().ok();
    let notifier = new_notifier();
    let code = OrderCode::from("C4");
    notifier.notify_payment(&code, PaymentStatus::Pending, None);
    let app = App::new().app_data(web::Data::new(notifier.clone())).service(payment_events);
    let service = test::init_service(app).await;
    let req = TestRequest::get().uri("/payment/C4/events").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(notifier.cache().subscriber_count(&code), 1);
    drop(res);
    for _ in 0..50 {
        if notifier.cache().subscriber_count(&code) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(notifier.cache().subscriber_count(&code), 0);
}

#[actix_web::test]
async fn blank_order_code_is_rejected() {
    let _ = env_logger::try_init().ok();
    let notifier = new_notifier();
    let (status, body) = get_request("/payment/%20/events", move |cfg| {
        cfg.app_data(web::Data::new(notifier)).service(payment_events);
    })
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid order code: ' '"}"#);
}
