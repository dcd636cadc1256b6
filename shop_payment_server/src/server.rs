use std::time::Duration;

use actix_web::{
    dev::{Server, Service},
    error::JsonPayloadError,
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    Error,
    HttpRequest,
    HttpServer,
};
use futures::future::{ok, Either};
use log::*;
use shop_payment_engine::{PaymentNotifier, SqliteDatabase, WebhookApi};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    helpers::{get_remote_ip, is_whitelisted},
    routes::{
        health,
        payment_events,
        PaymentHistoryRoute,
        PaymentLinkRoute,
        PaymentStatusRoute,
        PaymentWebhookRoute,
    },
};

/// Runs the server until it is stopped. The status notifier is created here, so that every worker shares the same
/// cache, and is shut down once the server exits.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let notifier = PaymentNotifier::init(config.stream_options());
    let srv = create_server_instance(config, db.clone(), notifier.clone())?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    notifier.shutdown();
    db.close().await;
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    notifier: PaymentNotifier,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let webhook_api = WebhookApi::new(db.clone(), notifier.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sps::access_log"))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::Data::new(webhook_api))
            .app_data(web::Data::new(notifier.clone()));
        let api_scope = web::scope("/api")
            .service(PaymentLinkRoute::<SqliteDatabase>::new())
            .service(PaymentStatusRoute::<SqliteDatabase>::new())
            .service(PaymentHistoryRoute::<SqliteDatabase>::new())
            .service(payment_events);
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let gateway_whitelist = config.gateway_whitelist.clone();
        let webhook_scope = web::scope("/webhook")
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                if is_whitelisted(peer_ip, gateway_whitelist.as_deref()) {
                    Either::Left(srv.call(req))
                } else {
                    Either::Right(ok(req.error_response(ServerError::ForbiddenPeer)))
                }
            })
            .service(PaymentWebhookRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Malformed JSON bodies get the same `{"error": ...}` shape as every other failure.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    debug!("💻️ Rejecting request body. {err}");
    ServerError::InvalidRequestBody(err.to_string()).into()
}
