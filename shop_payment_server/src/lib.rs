//! # Shop payment server
//! This crate hosts the HTTP server in front of the payment engine. It is responsible for:
//! Receiving payment webhooks from the payment gateway and storing them.
//! Serving the current payment status of an order.
//! Holding server-sent event streams open for checkout pages that wait on a payment.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/payment`: Gateway payment callbacks. Optionally restricted to a whitelist of gateway IP addresses.
//! * `/api/payment/{order_code}/link`: Records a pending status when a payment link is generated.
//! * `/api/payment/{order_code}/status`: The current status of a payment.
//! * `/api/payment/{order_code}/history`: Every gateway callback stored for the order.
//! * `/api/payment/{order_code}/events`: A `text/event-stream` of status changes, ending once the payment is done or
//!   has failed.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod routes;
pub mod server;
pub mod sse;

#[cfg(test)]
mod endpoint_tests;
