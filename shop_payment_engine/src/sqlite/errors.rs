use thiserror::Error;

use crate::traits::WebhookStoreError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Webhook reference {0} violates uniqueness but cannot be found")]
    MissingDuplicate(String),
}

impl From<SqliteDatabaseError> for WebhookStoreError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::DriverError(e) => WebhookStoreError::DatabaseError(e.to_string()),
            SqliteDatabaseError::MissingDuplicate(_) => WebhookStoreError::CorruptEvent(e.to_string()),
        }
    }
}
