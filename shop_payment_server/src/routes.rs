//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Database access and stream dispatch are all async, and event
//! streams run in their own tasks, so a long-lived `/events` connection does not tie up a worker.
use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder};
use log::*;
use shop_payment_engine::{
    db_types::{GatewayNotification, OrderCode},
    PaymentNotifier,
    WebhookApi,
    WebhookEventStore,
};

use crate::{
    data_objects::{JsonResponse, PaymentLinkRequest},
    errors::ServerError,
    sse::event_stream,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(payment_webhook => Post "/payment" impl WebhookEventStore);
/// Route handler for payment gateway callbacks.
///
/// The callback is stored before anything else happens. Retries of a callback that was already stored get the same
/// 200 response as the original, so the gateway stops retrying. Storage failures return a 500, so that it does retry.
pub async fn payment_webhook<B: WebhookEventStore>(
    req: HttpRequest,
    body: web::Json<GatewayNotification>,
    api: web::Data<WebhookApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received payment webhook: {}", req.uri());
    let notification = body.into_inner();
    let outcome = api.process_notification(notification).await.map_err(|e| {
        warn!("💻️ Could not process payment webhook. {e}");
        ServerError::from(e)
    })?;
    let message = if outcome.duplicate {
        format!("Duplicate notification for {} acknowledged", outcome.order_code)
    } else {
        format!("Payment for {} is {}", outcome.order_code, outcome.status)
    };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(payment_link => Post "/payment/{order_code}/link" impl WebhookEventStore);
/// Records a speculative `pending` status for the order when the storefront generates a payment link for it.
pub async fn payment_link<B: WebhookEventStore>(
    path: web::Path<String>,
    body: web::Json<PaymentLinkRequest>,
    api: web::Data<WebhookApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_code = OrderCode::from(path.into_inner());
    debug!("💻️ POST payment_link for {order_code}");
    let event = api.register_payment_link(&order_code, body.amount)?;
    Ok(HttpResponse::Ok().json(event))
}

route!(payment_status => Get "/payment/{order_code}/status" impl WebhookEventStore);
pub async fn payment_status<B: WebhookEventStore>(
    path: web::Path<String>,
    api: web::Data<WebhookApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_code = OrderCode::from(path.into_inner());
    debug!("💻️ GET payment_status for {order_code}");
    match api.current_status(&order_code).await? {
        Some(status) => Ok(HttpResponse::Ok().json(status)),
        None => Err(ServerError::NoRecordFound(format!("No payment status for {order_code}"))),
    }
}

route!(payment_history => Get "/payment/{order_code}/history" impl WebhookEventStore);
pub async fn payment_history<B: WebhookEventStore>(
    path: web::Path<String>,
    api: web::Data<WebhookApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_code = OrderCode::from(path.into_inner());
    debug!("💻️ GET payment_history for {order_code}");
    let events = api.payment_history(&order_code).await?;
    Ok(HttpResponse::Ok().json(events))
}

/// Route handler for payment status event streams.
///
/// Responds with a `text/event-stream` that starts with the currently cached status (if any) and carries every change
/// after that. The stream ends once the payment is done or has failed. If the client hangs up first, the stream's
/// subscription is released as soon as the response body is dropped.
#[get("/payment/{order_code}/events")]
pub async fn payment_events(
    path: web::Path<String>,
    notifier: web::Data<PaymentNotifier>,
) -> Result<HttpResponse, ServerError> {
    let order_code = OrderCode::from(path.into_inner());
    if !order_code.is_valid() {
        return Err(ServerError::InvalidOrderCode(order_code.as_str().to_string()));
    }
    debug!("💻️ GET payment_events for {order_code}");
    let stream = notifier.open_stream(order_code);
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(event_stream(stream)))
}
