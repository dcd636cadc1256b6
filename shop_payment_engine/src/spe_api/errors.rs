use thiserror::Error;

use crate::traits::WebhookStoreError;

#[derive(Debug, Clone, Error)]
pub enum WebhookApiError {
    #[error("Invalid order code: '{0}'")]
    InvalidOrderCode(String),
    #[error("Webhook log error: {0}")]
    StoreError(#[from] WebhookStoreError),
}
