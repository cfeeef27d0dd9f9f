/// Makerspace inventory and usage log
///
/// Quantities are adjusted with a single conditional `UPDATE` so concurrent
/// subtractions can never drive stock below zero. Every adjustment appends
/// an `inventory_usage_logs` row in the same transaction.
///
/// # Example
///
/// ```no_run
/// use makrx_shared::models::inventory::{AdjustAction, InventoryItem};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, makerspace_id: Uuid, item_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let outcome = InventoryItem::adjust(
///     &pool, makerspace_id, item_id, AdjustAction::Subtract, 3, Some("Workshop"), "user-1",
/// ).await?;
///
/// if outcome.crossed_threshold {
///     println!("{} is running low", outcome.item.name);
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::pagination::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inventory_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
    Active,
    Discontinued,
}

/// Quantity adjustment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustAction {
    Add,
    Subtract,
    Set,
}

impl AdjustAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustAction::Add => "add",
            AdjustAction::Subtract => "subtract",
            AdjustAction::Set => "set",
        }
    }

    /// New quantity, or `None` when the result would be negative or overflow
    pub fn apply(&self, current: i32, amount: i32) -> Option<i32> {
        let next = match self {
            AdjustAction::Add => current.checked_add(amount)?,
            AdjustAction::Subtract => current.checked_sub(amount)?,
            AdjustAction::Set => amount,
        };
        (next >= 0).then_some(next)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryItem {
    pub id: Uuid,
    pub makerspace_id: Uuid,
    pub name: String,
    pub category: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit: String,
    pub min_threshold: i32,
    pub location: Option<String>,
    pub supplier: Option<String>,
    pub unit_cost_cents: Option<i64>,
    pub status: InventoryStatus,
    pub attributes: JsonValue,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_threshold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInventoryItem {
    pub name: String,
    pub category: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit: Option<String>,
    pub min_threshold: i32,
    pub location: Option<String>,
    pub supplier: Option<String>,
    pub unit_cost_cents: Option<i64>,
    pub attributes: Option<JsonValue>,
}

/// Partial update; quantity changes go through [`InventoryItem::adjust`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInventoryItem {
    pub name: Option<String>,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub unit: Option<String>,
    pub min_threshold: Option<i32>,
    pub location: Option<String>,
    pub supplier: Option<String>,
    pub unit_cost_cents: Option<i64>,
    pub status: Option<InventoryStatus>,
    pub attributes: Option<JsonValue>,
}

/// List filters
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    pub category: Option<String>,
    pub status: Option<InventoryStatus>,
    /// Case-insensitive match on name or SKU
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryUsageLog {
    pub id: Uuid,
    pub item_id: Uuid,
    pub makerspace_id: Uuid,
    pub user_id: String,
    pub action: String,
    pub delta: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful adjustment
#[derive(Debug, Clone, Serialize)]
pub struct AdjustOutcome {
    pub item: InventoryItem,
    pub log: InventoryUsageLog,
    /// Moved from above the threshold to at/below it
    pub crossed_threshold: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AdjustError {
    #[error("Inventory item not found")]
    NotFound,

    #[error("Insufficient quantity: {available} available, {requested} requested")]
    InsufficientQuantity { available: i32, requested: i32 },

    #[error("Quantity must not be negative")]
    NegativeQuantity,

    #[error("Adding {requested} to {available} exceeds the maximum quantity")]
    QuantityOverflow { available: i32, requested: i32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const ITEM_COLUMNS: &str = "id, makerspace_id, name, category, sku, quantity, unit, min_threshold, \
     location, supplier, unit_cost_cents, status, attributes, created_by, created_at, updated_at";

impl InventoryItem {
    pub async fn create(
        pool: &PgPool,
        makerspace_id: Uuid,
        data: CreateInventoryItem,
        created_by: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(&format!(
            r#"
            INSERT INTO inventory_items
                (makerspace_id, name, category, sku, quantity, unit, min_threshold,
                 location, supplier, unit_cost_cents, attributes, created_by)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'pcs'), $7, $8, $9, $10, COALESCE($11, '{{}}'::jsonb), $12)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(makerspace_id)
        .bind(&data.name)
        .bind(&data.category)
        .bind(&data.sku)
        .bind(data.quantity)
        .bind(&data.unit)
        .bind(data.min_threshold)
        .bind(&data.location)
        .bind(&data.supplier)
        .bind(data.unit_cost_cents)
        .bind(&data.attributes)
        .bind(created_by)
        .fetch_one(pool)
        .await
    }

    /// Finds an item scoped to its makerspace
    pub async fn find(pool: &PgPool, makerspace_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = $1 AND makerspace_id = $2"
        ))
        .bind(id)
        .bind(makerspace_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists items by name with filters; returns the page and total count
    pub async fn list(
        pool: &PgPool,
        makerspace_id: Uuid,
        filter: &InventoryFilter,
        pagination: Pagination,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        const WHERE: &str = r#"
            WHERE makerspace_id = $1
              AND ($2::text IS NULL OR category = $2)
              AND ($3::inventory_status IS NULL OR status = $3)
              AND ($4::text IS NULL OR name ILIKE '%' || $4 || '%' OR sku ILIKE '%' || $4 || '%')
        "#;

        let items = sqlx::query_as::<_, InventoryItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items {WHERE} ORDER BY name ASC, id ASC LIMIT $5 OFFSET $6"
        ))
        .bind(makerspace_id)
        .bind(&filter.category)
        .bind(filter.status)
        .bind(&filter.q)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM inventory_items {WHERE}"))
            .bind(makerspace_id)
            .bind(&filter.category)
            .bind(filter.status)
            .bind(&filter.q)
            .fetch_one(pool)
            .await?;

        Ok((items, total))
    }

    /// Active items at or below their threshold
    pub async fn list_low_stock(pool: &PgPool, makerspace_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM inventory_items
            WHERE makerspace_id = $1 AND status = 'active' AND quantity <= min_threshold
            ORDER BY quantity ASC, name ASC
            "#
        ))
        .bind(makerspace_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        makerspace_id: Uuid,
        id: Uuid,
        data: UpdateInventoryItem,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(&format!(
            r#"
            UPDATE inventory_items
            SET name = COALESCE($3, name),
                category = COALESCE($4, category),
                sku = COALESCE($5, sku),
                unit = COALESCE($6, unit),
                min_threshold = COALESCE($7, min_threshold),
                location = COALESCE($8, location),
                supplier = COALESCE($9, supplier),
                unit_cost_cents = COALESCE($10, unit_cost_cents),
                status = COALESCE($11, status),
                attributes = COALESCE($12, attributes),
                updated_at = NOW()
            WHERE id = $1 AND makerspace_id = $2
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(makerspace_id)
        .bind(data.name)
        .bind(data.category)
        .bind(data.sku)
        .bind(data.unit)
        .bind(data.min_threshold)
        .bind(data.location)
        .bind(data.supplier)
        .bind(data.unit_cost_cents)
        .bind(data.status)
        .bind(data.attributes)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, makerspace_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM inventory_items WHERE id = $1 AND makerspace_id = $2")
            .bind(id)
            .bind(makerspace_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Adjusts the quantity and records a usage log entry
    ///
    /// The update only matches when the resulting quantity stays within
    /// `0..=i32::MAX`, so a losing concurrent subtraction fails with
    /// `InsufficientQuantity` instead of overdrawing and an oversized
    /// addition fails with `QuantityOverflow`.
    pub async fn adjust(
        pool: &PgPool,
        makerspace_id: Uuid,
        id: Uuid,
        action: AdjustAction,
        amount: i32,
        reason: Option<&str>,
        user_id: &str,
    ) -> Result<AdjustOutcome, AdjustError> {
        if amount < 0 {
            return Err(AdjustError::NegativeQuantity);
        }

        let mut tx = pool.begin().await?;

        let updated: Option<(i32, i32)> = sqlx::query_as(
            r#"
            WITH prev AS (
                SELECT id, quantity FROM inventory_items
                WHERE id = $1 AND makerspace_id = $2
                FOR UPDATE
            )
            UPDATE inventory_items i
            SET quantity = CASE $3
                    WHEN 'add' THEN prev.quantity + $4
                    WHEN 'subtract' THEN prev.quantity - $4
                    ELSE $4
                END,
                updated_at = NOW()
            FROM prev
            WHERE i.id = prev.id
              AND ($3 <> 'subtract' OR prev.quantity >= $4)
              AND ($3 <> 'add' OR prev.quantity::bigint + $4 <= 2147483647)
            RETURNING prev.quantity, i.quantity
            "#,
        )
        .bind(id)
        .bind(makerspace_id)
        .bind(action.as_str())
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((previous, new_quantity)) = updated else {
            let current: Option<(i32,)> =
                sqlx::query_as("SELECT quantity FROM inventory_items WHERE id = $1 AND makerspace_id = $2")
                    .bind(id)
                    .bind(makerspace_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match current {
                Some((available,)) => rejection(action, available, amount),
                None => AdjustError::NotFound,
            });
        };

        let log = sqlx::query_as::<_, InventoryUsageLog>(
            r#"
            INSERT INTO inventory_usage_logs
                (item_id, makerspace_id, user_id, action, delta, previous_quantity, new_quantity, reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, item_id, makerspace_id, user_id, action, delta,
                      previous_quantity, new_quantity, reason, created_at
            "#,
        )
        .bind(id)
        .bind(makerspace_id)
        .bind(user_id)
        .bind(action.as_str())
        .bind(new_quantity - previous)
        .bind(previous)
        .bind(new_quantity)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        let item = sqlx::query_as::<_, InventoryItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let crossed_threshold = crosses_threshold(previous, new_quantity, item.min_threshold);
        tracing::debug!(
            item_id = %id,
            action = action.as_str(),
            previous,
            new_quantity,
            crossed_threshold,
            "Inventory adjusted"
        );

        Ok(AdjustOutcome {
            item,
            log,
            crossed_threshold,
        })
    }
}

impl InventoryUsageLog {
    /// Usage history for one item, newest first
    pub async fn list_for_item(
        pool: &PgPool,
        makerspace_id: Uuid,
        item_id: Uuid,
        pagination: Pagination,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let logs = sqlx::query_as::<_, InventoryUsageLog>(
            r#"
            SELECT id, item_id, makerspace_id, user_id, action, delta,
                   previous_quantity, new_quantity, reason, created_at
            FROM inventory_usage_logs
            WHERE item_id = $1 AND makerspace_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(item_id)
        .bind(makerspace_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM inventory_usage_logs WHERE item_id = $1 AND makerspace_id = $2",
        )
        .bind(item_id)
        .bind(makerspace_id)
        .fetch_one(pool)
        .await?;

        Ok((logs, total))
    }
}

/// Why a conditional adjustment matched no row
fn rejection(action: AdjustAction, available: i32, requested: i32) -> AdjustError {
    match (action, action.apply(available, requested)) {
        (AdjustAction::Add, None) => AdjustError::QuantityOverflow { available, requested },
        _ => AdjustError::InsufficientQuantity { available, requested },
    }
}

/// True when a change moves stock from above `threshold` to at/below it
pub fn crosses_threshold(previous: i32, new_quantity: i32, threshold: i32) -> bool {
    previous > threshold && new_quantity <= threshold
}
