/// Service orders, their event log and job assignments
///
/// # State Machine
///
/// ```text
/// pending → assigned → accepted → in_progress → completed
/// pending | assigned | accepted → cancelled
/// assigned → pending            (declined or offer expired)
/// ```
///
/// Every transition appends a `service_order_events` row in the same
/// transaction as the status change.
///
/// # Example
///
/// ```no_run
/// use makrx_shared::models::service_order::{ServiceOrder, ServiceOrderStatus};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, order_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tx = pool.begin().await?;
/// let order = ServiceOrder::transition(
///     &mut tx, order_id, ServiceOrderStatus::Cancelled, Some("customer-1"), Some("changed my mind"),
/// ).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::pagination::Pagination;

/// Fabrication service offered by providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "service_type")]
pub enum ServiceType {
    #[sqlx(rename = "printing_3d")]
    #[serde(rename = "printing_3d")]
    Printing3d,

    #[sqlx(rename = "laser_cutting")]
    #[serde(rename = "laser_cutting")]
    LaserCutting,

    #[sqlx(rename = "cnc_machining")]
    #[serde(rename = "cnc_machining")]
    CncMachining,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Printing3d => "printing_3d",
            ServiceType::LaserCutting => "laser_cutting",
            ServiceType::CncMachining => "cnc_machining",
        }
    }

    /// Feature flag gating quotes and orders of this type
    pub fn feature_key(&self) -> &'static str {
        match self {
            ServiceType::Printing3d => "services.printing_3d",
            ServiceType::LaserCutting => "services.laser_cutting",
            ServiceType::CncMachining => "services.cnc_machining",
        }
    }
}

impl PgHasArrayType for ServiceType {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_service_type")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "service_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServicePriority {
    #[default]
    Normal,
    Rush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "service_order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceOrderStatus {
    Pending,
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceOrderStatus::Pending => "pending",
            ServiceOrderStatus::Assigned => "assigned",
            ServiceOrderStatus::Accepted => "accepted",
            ServiceOrderStatus::InProgress => "in_progress",
            ServiceOrderStatus::Completed => "completed",
            ServiceOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceOrderStatus::Completed | ServiceOrderStatus::Cancelled)
    }

    /// Provider capacity is held while the order is in one of these states
    pub fn holds_capacity(&self) -> bool {
        matches!(
            self,
            ServiceOrderStatus::Assigned | ServiceOrderStatus::Accepted | ServiceOrderStatus::InProgress
        )
    }

    pub fn can_transition_to(&self, target: ServiceOrderStatus) -> bool {
        use ServiceOrderStatus::*;

        matches!(
            (self, target),
            (Pending, Assigned)
                | (Assigned, Accepted)
                | (Assigned, Pending)
                | (Accepted, InProgress)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (Assigned, Cancelled)
                | (Accepted, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Offered,
    Accepted,
    Declined,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceOrder {
    pub id: Uuid,
    pub customer_id: String,
    pub service_type: ServiceType,
    pub material: String,
    pub quantity: i32,
    pub priority: ServicePriority,
    pub specifications: JsonValue,
    pub quoted_total_cents: i64,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub status: ServiceOrderStatus,
    pub provider_id: Option<Uuid>,
    pub store_order_id: Option<Uuid>,
    pub excluded_provider_ids: Vec<Uuid>,
    pub dispatch_attempts: i32,
    pub next_dispatch_at: DateTime<Utc>,
    pub last_dispatch_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceOrder {
    pub fn delivery_location(&self) -> Option<(f64, f64)> {
        self.delivery_latitude.zip(self.delivery_longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceOrder {
    pub service_type: ServiceType,
    pub material: String,
    pub quantity: i32,
    pub priority: ServicePriority,
    pub specifications: JsonValue,
    pub quoted_total_cents: i64,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub store_order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceOrderEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_status: Option<ServiceOrderStatus>,
    pub to_status: ServiceOrderStatus,
    pub actor_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobAssignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_id: Uuid,
    pub score: f64,
    pub breakdown: JsonValue,
    pub status: AssignmentStatus,
    pub offered_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Service order not found")]
    NotFound,

    #[error("Cannot move service order from {from:?} to {to:?}")]
    InvalidTransition {
        from: ServiceOrderStatus,
        to: ServiceOrderStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) const ORDER_COLUMNS: &str = "id, customer_id, service_type, material, quantity, priority, \
     specifications, quoted_total_cents, delivery_latitude, delivery_longitude, status, provider_id, \
     store_order_id, excluded_provider_ids, dispatch_attempts, next_dispatch_at, last_dispatch_error, \
     created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str = "id, order_id, provider_id, score, breakdown, status, offered_at, responded_at";

impl ServiceOrder {
    /// Creates a pending order, due for dispatch immediately
    pub async fn create(pool: &PgPool, customer_id: &str, data: CreateServiceOrder) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let order = sqlx::query_as::<_, ServiceOrder>(&format!(
            r#"
            INSERT INTO service_orders
                (customer_id, service_type, material, quantity, priority, specifications,
                 quoted_total_cents, delivery_latitude, delivery_longitude, store_order_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(customer_id)
        .bind(data.service_type)
        .bind(&data.material)
        .bind(data.quantity)
        .bind(data.priority)
        .bind(&data.specifications)
        .bind(data.quoted_total_cents)
        .bind(data.delivery_latitude)
        .bind(data.delivery_longitude)
        .bind(data.store_order_id)
        .fetch_one(&mut *tx)
        .await?;

        ServiceOrderEvent::append(&mut tx, order.id, None, ServiceOrderStatus::Pending, Some(customer_id), None)
            .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            service_type = order.service_type.as_str(),
            "Service order created"
        );
        Ok(order)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrder>(&format!("SELECT {ORDER_COLUMNS} FROM service_orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Locks the order row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM service_orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Like [`ServiceOrder::lock`], but `None` when another transaction
    /// already holds the row
    pub async fn try_lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM service_orders WHERE id = $1 FOR UPDATE SKIP LOCKED"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    pub async fn list_for_customer(
        pool: &PgPool,
        customer_id: &str,
        pagination: Pagination,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let orders = sqlx::query_as::<_, ServiceOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM service_orders
            WHERE customer_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(customer_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM service_orders WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_one(pool)
            .await?;

        Ok((orders, total))
    }

    /// Orders currently or previously held by a provider, newest first
    pub async fn list_for_provider(
        pool: &PgPool,
        provider_id: Uuid,
        status: Option<ServiceOrderStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM service_orders
            WHERE provider_id = $1
              AND ($2::service_order_status IS NULL OR status = $2)
            ORDER BY updated_at DESC, id
            "#
        ))
        .bind(provider_id)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Moves an order to `to`, validating the transition under a row lock
    ///
    /// Returning to `pending` clears the provider. The event row is written
    /// on the same connection; the caller owns the transaction.
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        to: ServiceOrderStatus,
        actor_id: Option<&str>,
        note: Option<&str>,
    ) -> Result<Self, TransitionError> {
        let current = Self::lock(&mut *conn, id).await?.ok_or(TransitionError::NotFound)?;

        if !current.status.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let order = sqlx::query_as::<_, ServiceOrder>(&format!(
            r#"
            UPDATE service_orders
            SET status = $2,
                provider_id = CASE WHEN $2 = 'pending'::service_order_status THEN NULL ELSE provider_id END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(to)
        .fetch_one(&mut *conn)
        .await?;

        ServiceOrderEvent::append(conn, id, Some(current.status), to, actor_id, note).await?;

        Ok(order)
    }

    /// Marks the order assigned to `provider_id`
    pub async fn assign(conn: &mut PgConnection, id: Uuid, provider_id: Uuid) -> Result<Self, TransitionError> {
        Self::transition(&mut *conn, id, ServiceOrderStatus::Assigned, None, Some("offered to provider")).await?;

        let order = sqlx::query_as::<_, ServiceOrder>(&format!(
            r#"
            UPDATE service_orders
            SET provider_id = $2, last_dispatch_error = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(provider_id)
        .fetch_one(conn)
        .await?;

        Ok(order)
    }

    /// Records a failed dispatch attempt and when to try again
    pub async fn record_dispatch_failure(
        conn: &mut PgConnection,
        id: Uuid,
        error: &str,
        next_dispatch_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrder>(&format!(
            r#"
            UPDATE service_orders
            SET dispatch_attempts = dispatch_attempts + 1,
                last_dispatch_error = $2,
                next_dispatch_at = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error)
        .bind(next_dispatch_at)
        .fetch_one(conn)
        .await
    }

    /// Excludes a provider from re-dispatch and makes the order due now
    pub async fn exclude_provider(conn: &mut PgConnection, id: Uuid, provider_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE service_orders
            SET excluded_provider_ids = array_append(excluded_provider_ids, $2),
                next_dispatch_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(excluded_provider_ids))
            "#,
        )
        .bind(id)
        .bind(provider_id)
        .execute(conn)
        .await?;

        Ok(())
    }
}

impl ServiceOrderEvent {
    pub async fn append(
        conn: &mut PgConnection,
        order_id: Uuid,
        from_status: Option<ServiceOrderStatus>,
        to_status: ServiceOrderStatus,
        actor_id: Option<&str>,
        note: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrderEvent>(
            r#"
            INSERT INTO service_order_events (order_id, from_status, to_status, actor_id, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, from_status, to_status, actor_id, note, created_at
            "#,
        )
        .bind(order_id)
        .bind(from_status)
        .bind(to_status)
        .bind(actor_id)
        .bind(note)
        .fetch_one(conn)
        .await
    }

    pub async fn list(pool: &PgPool, order_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrderEvent>(
            r#"
            SELECT id, order_id, from_status, to_status, actor_id, note, created_at
            FROM service_order_events
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
    }
}

impl JobAssignment {
    pub async fn create_offer(
        conn: &mut PgConnection,
        order_id: Uuid,
        provider_id: Uuid,
        score: f64,
        breakdown: JsonValue,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, JobAssignment>(&format!(
            r#"
            INSERT INTO job_assignments (order_id, provider_id, score, breakdown)
            VALUES ($1, $2, $3, $4)
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(provider_id)
        .bind(score)
        .bind(breakdown)
        .fetch_one(conn)
        .await
    }

    /// The open offer for an order, if any
    pub async fn find_open(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, JobAssignment>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM job_assignments
            WHERE order_id = $1 AND status = 'offered'
            ORDER BY offered_at DESC
            LIMIT 1
            "#
        ))
        .bind(order_id)
        .fetch_optional(conn)
        .await
    }

    /// Closes an open offer with its final status
    pub async fn resolve(
        conn: &mut PgConnection,
        id: Uuid,
        status: AssignmentStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, JobAssignment>(&format!(
            r#"
            UPDATE job_assignments
            SET status = $2, responded_at = NOW()
            WHERE id = $1 AND status = 'offered'
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(conn)
        .await
    }

    /// Open offers older than `cutoff`
    pub async fn list_stale(pool: &PgPool, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, JobAssignment>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM job_assignments
            WHERE status = 'offered' AND offered_at < $1
            ORDER BY offered_at
            LIMIT $2
            "#
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_order(pool: &PgPool, order_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, JobAssignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM job_assignments WHERE order_id = $1 ORDER BY offered_at"
        ))
        .bind(order_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServiceOrderStatus::*;

    #[test]
    fn test_valid_transitions() {
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(Accepted));
        assert!(Assigned.can_transition_to(Pending));
        assert!(Accepted.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Assigned.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Cancelled));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!Pending.can_transition_to(Accepted));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Pending));
        for status in [Pending, Assigned, Accepted, InProgress, Completed, Cancelled] {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_and_capacity() {
        assert!(Completed.is_terminal() && Cancelled.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(Assigned.holds_capacity() && Accepted.holds_capacity() && InProgress.holds_capacity());
        assert!(!Pending.holds_capacity() && !Completed.holds_capacity());
    }

    #[test]
    fn test_service_type_names() {
        assert_eq!(serde_json::to_string(&ServiceType::Printing3d).unwrap(), "\"printing_3d\"");
        let t: ServiceType = serde_json::from_str("\"cnc_machining\"").unwrap();
        assert_eq!(t, ServiceType::CncMachining);
        assert_eq!(ServiceType::LaserCutting.feature_key(), "services.laser_cutting");
        assert_eq!(ServiceType::Printing3d.as_str(), "printing_3d");
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(InProgress.as_str(), "in_progress");
        assert_eq!(ServicePriority::default(), ServicePriority::Normal);
    }
}
