//! `SqliteDatabase` is the SQLite implementation of [`WebhookEventStore`].
use std::fmt::Debug;

use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{db_url, new_pool, webhook_events};
use crate::{
    db_types::{GatewayNotification, OrderCode, WebhookEvent},
    traits::{InsertEventResult, WebhookEventStore, WebhookStoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl WebhookEventStore for SqliteDatabase {
    async fn insert_event(&self, notification: &GatewayNotification) -> Result<InsertEventResult, WebhookStoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = webhook_events::idempotent_insert(notification, &mut conn).await?;
        match &result {
            InsertEventResult::Inserted(e) => {
                debug!("🗃️ Webhook event [{}] for {} stored with id {}", e.reference, e.order_code, e.id)
            },
            InsertEventResult::AlreadyExists(e) => {
                debug!("🗃️ Webhook event [{}] for {} was already stored", e.reference, e.order_code)
            },
        }
        Ok(result)
    }

    async fn latest_event_for_order(&self, order_code: &OrderCode) -> Result<Option<WebhookEvent>, WebhookStoreError> {
        let mut conn = self.pool.acquire().await?;
        let event = webhook_events::fetch_latest_event_for_order(order_code, &mut conn).await?;
        Ok(event)
    }

    async fn events_for_order(&self, order_code: &OrderCode) -> Result<Vec<WebhookEvent>, WebhookStoreError> {
        let mut conn = self.pool.acquire().await?;
        let events = webhook_events::fetch_events_for_order(order_code, &mut conn).await?;
        Ok(events)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `SPS_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
