use actix_web::{
    http::{header::ContentType, StatusCode},
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::Utc;
use log::debug;
use shop_payment_engine::{
    db_types::{GatewayNotification, GatewayPaymentStatus, OrderCode, WebhookEvent},
    status_cache::StatusCache,
    PaymentNotifier,
    StreamOptions,
};

use crate::server::json_error_handler;

pub fn new_notifier() -> PaymentNotifier {
    PaymentNotifier::new(StatusCache::new(), StreamOptions::default())
}

pub fn webhook_event(id: i64, order_code: &str, status: GatewayPaymentStatus, amount: Option<i64>) -> WebhookEvent {
    WebhookEvent {
        id,
        order_code: OrderCode::from(order_code),
        reference: format!("FT-{id}"),
        gateway_status: status,
        amount,
        description: None,
        received_at: Utc::now(),
    }
}

pub fn event_from_notification(id: i64, n: &GatewayNotification) -> WebhookEvent {
    WebhookEvent {
        id,
        order_code: n.order_code.clone(),
        reference: n.reference.clone(),
        gateway_status: n.status,
        amount: n.amount,
        description: n.description.clone(),
        received_at: Utc::now(),
    }
}

pub async fn get_request(path: &str, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let req = TestRequest::get().uri(path).to_request();
    call(req, configure).await
}

pub async fn post_request(path: &str, body: &str, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let req =
        TestRequest::post().uri(path).insert_header(ContentType::json()).set_payload(body.to_string()).to_request();
    call(req, configure).await
}

async fn call(req: actix_http::Request, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let app = App::new().app_data(web::JsonConfig::default().error_handler(json_error_handler)).configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}
