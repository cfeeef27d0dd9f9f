/// Due-order reader
///
/// Selects pending service orders whose retry time has come. Selection
/// does not lock anything: each dispatch locks its own order row with
/// `FOR UPDATE SKIP LOCKED`, so an order picked by two dispatchers is
/// offered at most once and the loser sees `Busy`.
///
/// Ordering: rush orders first, then oldest first.

use chrono::{DateTime, Utc};
use makrx_shared::models::service_order::ServicePriority;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A pending order due for a dispatch attempt
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DueOrder {
    pub id: Uuid,
    pub priority: ServicePriority,
    pub dispatch_attempts: i32,
    pub created_at: DateTime<Utc>,
}

pub struct DispatchQueue {
    db: PgPool,
    max_attempts: i32,
}

impl DispatchQueue {
    /// Orders with `max_attempts` or more failed attempts are never returned
    pub fn new(db: PgPool, max_attempts: i32) -> Self {
        DispatchQueue { db, max_attempts }
    }

    /// Up to `limit` orders due at `now`
    pub async fn due_orders(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<DueOrder>, QueueError> {
        let orders = sqlx::query_as::<_, DueOrder>(
            r#"
            SELECT id, priority, dispatch_attempts, created_at
            FROM service_orders
            WHERE status = 'pending'
              AND next_dispatch_at <= $1
              AND dispatch_attempts < $2
            ORDER BY (priority = 'rush') DESC, created_at ASC
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(self.max_attempts)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }

    /// Pending orders that ran out of attempts and wait for an admin
    pub async fn count_stranded(&self) -> Result<i64, QueueError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM service_orders WHERE status = 'pending' AND dispatch_attempts >= $1",
        )
        .bind(self.max_attempts)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }
}
