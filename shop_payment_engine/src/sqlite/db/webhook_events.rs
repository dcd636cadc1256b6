use sqlx::SqliteConnection;

use crate::{
    db_types::{GatewayNotification, OrderCode, WebhookEvent},
    sqlite::errors::SqliteDatabaseError,
    traits::InsertEventResult,
};

/// Inserts the gateway callback, or returns the existing record if a callback with the same reference was stored
/// before.
pub async fn idempotent_insert(
    notification: &GatewayNotification,
    conn: &mut SqliteConnection,
) -> Result<InsertEventResult, SqliteDatabaseError> {
    let result = sqlx::query_as(
        r#"
            INSERT INTO webhook_events (order_code, reference, gateway_status, amount, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(notification.order_code.as_str())
    .bind(notification.reference.as_str())
    .bind(notification.status.to_string())
    .bind(notification.amount)
    .bind(notification.description.as_deref())
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(event) => Ok(InsertEventResult::Inserted(event)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            let existing = fetch_event_by_reference(&notification.reference, conn)
                .await?
                .ok_or_else(|| SqliteDatabaseError::MissingDuplicate(notification.reference.clone()))?;
            Ok(InsertEventResult::AlreadyExists(existing))
        },
        Err(e) => Err(SqliteDatabaseError::from(e)),
    }
}

pub async fn fetch_event_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, SqliteDatabaseError> {
    let event = sqlx::query_as("SELECT * FROM webhook_events WHERE reference = $1")
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

pub async fn fetch_latest_event_for_order(
    order_code: &OrderCode,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, SqliteDatabaseError> {
    let event = sqlx::query_as(
        r#"SELECT * FROM webhook_events WHERE order_code = $1 ORDER BY received_at DESC, id DESC LIMIT 1"#,
    )
    .bind(order_code.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(event)
}

pub async fn fetch_events_for_order(
    order_code: &OrderCode,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEvent>, SqliteDatabaseError> {
    let events = sqlx::query_as(r#"SELECT * FROM webhook_events WHERE order_code = $1 ORDER BY received_at, id"#)
        .bind(order_code.as_str())
        .fetch_all(conn)
        .await?;
    Ok(events)
}
