/// Store orders, checkout and status tracking
///
/// # State Machine
///
/// ```text
/// pending → confirmed → processing → shipped → delivered
/// pending | confirmed → cancelled   (restocks every item)
/// ```
///
/// # Checkout
///
/// Checkout runs in one transaction: the cart's products are locked in id
/// order, stock is verified and decremented, the order and item snapshots
/// are written and the cart is emptied.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::pagination::Pagination;
use crate::pricing::{CartTotals, PricingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "store_order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StoreOrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl StoreOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOrderStatus::Pending => "pending",
            StoreOrderStatus::Confirmed => "confirmed",
            StoreOrderStatus::Processing => "processing",
            StoreOrderStatus::Shipped => "shipped",
            StoreOrderStatus::Delivered => "delivered",
            StoreOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, target: StoreOrderStatus) -> bool {
        use StoreOrderStatus::*;

        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoreOrder {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: String,
    pub status: StoreOrderStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub shipping_address: JsonValue,
    pub notes: Option<String>,
    pub service_order_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoreOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: StoreOrderStatus,
    pub note: Option<String>,
    pub changed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order with items and history
#[derive(Debug, Clone, Serialize)]
pub struct StoreOrderDetail {
    #[serde(flatten)]
    pub order: StoreOrder,
    pub items: Vec<StoreOrderItem>,
    pub history: Vec<OrderStatusHistory>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("{0} is no longer available")]
    ProductUnavailable(String),

    #[error("Only {available} of {name} in stock, {requested} requested")]
    InsufficientStock {
        name: String,
        available: i32,
        requested: i32,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found")]
    NotFound,

    #[error("Cannot move order from {from:?} to {to:?}")]
    InvalidTransition {
        from: StoreOrderStatus,
        to: StoreOrderStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// `MX-YYYYMMDD-XXXXXXXX` with eight random uppercase hex digits
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!("MX-{}-{}", now.format("%Y%m%d"), hex::encode_upper(suffix))
}

#[derive(sqlx::FromRow)]
struct LockedLine {
    product_id: Uuid,
    sku: String,
    name: String,
    price_cents: i64,
    currency: String,
    stock_quantity: i32,
    is_active: bool,
    quantity: i32,
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, subtotal_cents, tax_cents, shipping_cents, \
     total_cents, currency, shipping_address, notes, service_order_status, created_at, updated_at";

impl StoreOrder {
    /// Converts the user's cart into an order
    pub async fn checkout(
        pool: &PgPool,
        user_id: &str,
        shipping_address: JsonValue,
        notes: Option<String>,
        pricing: &PricingConfig,
    ) -> Result<StoreOrderDetail, CheckoutError> {
        let mut tx = pool.begin().await?;

        let lines = sqlx::query_as::<_, LockedLine>(
            r#"
            SELECT p.id AS product_id, p.sku, p.name, p.price_cents, p.currency,
                   p.stock_quantity, p.is_active, ci.quantity
            FROM carts c
            JOIN cart_items ci ON ci.cart_id = c.id
            JOIN products p ON p.id = ci.product_id
            WHERE c.user_id = $1
            ORDER BY p.id
            FOR UPDATE OF p
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        for line in &lines {
            if !line.is_active {
                return Err(CheckoutError::ProductUnavailable(line.name.clone()));
            }
            if line.quantity > line.stock_quantity {
                return Err(CheckoutError::InsufficientStock {
                    name: line.name.clone(),
                    available: line.stock_quantity,
                    requested: line.quantity,
                });
            }
        }

        let totals = CartTotals::from_lines(lines.iter().map(|l| (l.price_cents, l.quantity)), pricing);
        let currency = lines[0].currency.clone();

        for line in &lines {
            sqlx::query("UPDATE products SET stock_quantity = stock_quantity - $2, updated_at = NOW() WHERE id = $1")
                .bind(line.product_id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await?;
        }

        let order = sqlx::query_as::<_, StoreOrder>(&format!(
            r#"
            INSERT INTO store_orders
                (order_number, user_id, subtotal_cents, tax_cents, shipping_cents, total_cents,
                 currency, shipping_address, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(generate_order_number(Utc::now()))
        .bind(user_id)
        .bind(totals.subtotal_cents)
        .bind(totals.tax_cents)
        .bind(totals.shipping_cents)
        .bind(totals.total_cents)
        .bind(&currency)
        .bind(&shipping_address)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = sqlx::query_as::<_, StoreOrderItem>(
                r#"
                INSERT INTO store_order_items
                    (order_id, product_id, sku, name, unit_price_cents, quantity, line_total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, order_id, product_id, sku, name, unit_price_cents, quantity, line_total_cents
                "#,
            )
            .bind(order.id)
            .bind(line.product_id)
            .bind(&line.sku)
            .bind(&line.name)
            .bind(line.price_cents)
            .bind(line.quantity)
            .bind(line.price_cents * i64::from(line.quantity))
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        let history = OrderStatusHistory::append(
            &mut tx,
            order.id,
            StoreOrderStatus::Pending,
            Some("order placed"),
            Some(user_id),
        )
        .await?;

        sqlx::query("DELETE FROM cart_items ci USING carts c WHERE ci.cart_id = c.id AND c.user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total_cents = order.total_cents,
            "Order placed"
        );

        Ok(StoreOrderDetail {
            order,
            items,
            history: vec![history],
        })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, StoreOrder>(&format!("SELECT {ORDER_COLUMNS} FROM store_orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn detail(pool: &PgPool, id: Uuid) -> Result<Option<StoreOrderDetail>, sqlx::Error> {
        let Some(order) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, StoreOrderItem>(
            r#"
            SELECT id, order_id, product_id, sku, name, unit_price_cents, quantity, line_total_cents
            FROM store_order_items
            WHERE order_id = $1
            ORDER BY name
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        let history = sqlx::query_as::<_, OrderStatusHistory>(
            r#"
            SELECT id, order_id, status, note, changed_by, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(Some(StoreOrderDetail { order, items, history }))
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: &str,
        pagination: Pagination,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let orders = sqlx::query_as::<_, StoreOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM store_orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM store_orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

        Ok((orders, total))
    }

    /// Changes status, recording history and restocking on cancellation
    ///
    /// When `owner_id` is given the order must belong to that user;
    /// otherwise it is reported as not found.
    pub async fn transition(
        pool: &PgPool,
        id: Uuid,
        to: StoreOrderStatus,
        owner_id: Option<&str>,
        changed_by: &str,
        note: Option<&str>,
    ) -> Result<Self, OrderError> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, StoreOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM store_orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .filter(|o| owner_id.map_or(true, |owner| o.user_id == owner))
        .ok_or(OrderError::NotFound)?;

        if !current.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let order = sqlx::query_as::<_, StoreOrder>(&format!(
            r#"
            UPDATE store_orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(to)
        .fetch_one(&mut *tx)
        .await?;

        if to == StoreOrderStatus::Cancelled {
            restock(&mut tx, id).await?;
        }

        OrderStatusHistory::append(&mut tx, id, to, note, Some(changed_by)).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %id,
            from = current.status.as_str(),
            to = to.as_str(),
            "Order status changed"
        );
        Ok(order)
    }

    /// Records the fabrication status pushed by the services backend
    pub async fn set_service_status(
        pool: &PgPool,
        id: Uuid,
        service_order_id: Uuid,
        status: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let order = sqlx::query_as::<_, StoreOrder>(&format!(
            r#"
            UPDATE store_orders
            SET service_order_status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let note = format!("service order {service_order_id} is {status}");
        OrderStatusHistory::append(&mut tx, id, order.status, Some(&note), None).await?;

        tx.commit().await?;
        Ok(Some(order))
    }
}

async fn restock(conn: &mut PgConnection, order_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE products p
        SET stock_quantity = p.stock_quantity + i.quantity, updated_at = NOW()
        FROM store_order_items i
        WHERE i.order_id = $1 AND i.product_id = p.id
        "#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;

    Ok(())
}

impl OrderStatusHistory {
    pub async fn append(
        conn: &mut PgConnection,
        order_id: Uuid,
        status: StoreOrderStatus,
        note: Option<&str>,
        changed_by: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, OrderStatusHistory>(
            r#"
            INSERT INTO order_status_history (order_id, status, note, changed_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, status, note, changed_by, created_at
            "#,
        )
        .bind(order_id)
        .bind(status)
        .bind(note)
        .bind(changed_by)
        .fetch_one(conn)
        .await
    }
}
