pub mod errors;
pub mod notifier_api;
pub mod webhook_api;
