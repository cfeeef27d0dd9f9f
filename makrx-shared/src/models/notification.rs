/// User notifications
///
/// Rows are written by business operations (low stock, reservations, order
/// updates) and by platform admins. Users only ever see their own rows;
/// lookups for another user's notification behave as not found.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::notifications::{NotificationKind, TemplateError};
use crate::pagination::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    pub data: JsonValue,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A rendered notification ready to insert
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    pub data: JsonValue,
}

impl NewNotification {
    /// Renders `kind`'s templates with `vars`
    ///
    /// The variables are also stored in `data` so clients can deep-link.
    pub fn from_template(
        user_id: impl Into<String>,
        kind: NotificationKind,
        vars: &HashMap<String, String>,
    ) -> Result<Self, TemplateError> {
        let rendered = kind.render(vars)?;
        Ok(Self {
            user_id: user_id.into(),
            kind,
            title: rendered.title,
            body: rendered.body,
            priority: kind.default_priority(),
            data: serde_json::json!(vars),
        })
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, priority, data, read_at, created_at";

impl Notification {
    pub async fn create<'e, E: PgExecutor<'e>>(executor: E, data: &NewNotification) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (user_id, kind, title, body, priority, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(&data.user_id)
        .bind(data.kind.as_str())
        .bind(&data.title)
        .bind(&data.body)
        .bind(data.priority)
        .bind(&data.data)
        .fetch_one(executor)
        .await
    }

    /// Renders and stores a notification, logging instead of failing
    ///
    /// Used by business operations whose outcome must not depend on
    /// notification delivery.
    pub async fn notify(pool: &PgPool, user_id: &str, kind: NotificationKind, vars: HashMap<String, String>) {
        let new = match NewNotification::from_template(user_id, kind, &vars) {
            Ok(new) => new,
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), error = %e, "Notification template failed");
                return;
            }
        };

        if let Err(e) = Self::create(pool, &new).await {
            tracing::warn!(kind = kind.as_str(), user_id = %user_id, error = %e, "Failed to store notification");
        }
    }

    /// Lists a user's notifications, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: &str,
        unread_only: bool,
        pagination: Pagination,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let items = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR read_at IS NULL)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND ($2 = FALSE OR read_at IS NULL)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(pool)
        .await?;

        Ok((items, total))
    }

    pub async fn unread_count(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Marks one notification read; `None` if it isn't the user's
    ///
    /// Already-read notifications keep their original `read_at`.
    pub async fn mark_read(pool: &PgPool, id: Uuid, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Returns the number of notifications marked
    pub async fn mark_all_read(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(pool: &PgPool, id: Uuid, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_template() {
        let mut vars = HashMap::new();
        vars.insert("order_number".to_string(), "MX-20250301-ABCDEF12".to_string());
        vars.insert("status".to_string(), "shipped".to_string());

        let n = NewNotification::from_template("user-1", NotificationKind::OrderStatus, &vars).unwrap();
        assert_eq!(n.title, "Order MX-20250301-ABCDEF12 shipped");
        assert_eq!(n.priority, NotificationPriority::Normal);
        assert_eq!(n.data["status"], "shipped");

        let n = n.with_priority(NotificationPriority::Urgent);
        assert_eq!(n.priority, NotificationPriority::Urgent);
    }

    #[test]
    fn test_from_template_missing_variable() {
        let result = NewNotification::from_template("user-1", NotificationKind::OrderStatus, &HashMap::new());
        assert!(matches!(result, Err(TemplateError::MissingVariable(_))));
    }
}
