/// Shopping carts
///
/// Each user has at most one cart (`carts.user_id` is unique); it is created
/// lazily on first use. Lines are keyed by product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::pricing::{CartTotals, PricingConfig};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cart line joined with the current product snapshot
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLine {
    pub product_id: Uuid,
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub currency: String,
    pub quantity: i32,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub line_total_cents: i64,
}

/// Cart with lines and computed totals
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartLine>,
    #[serde(flatten)]
    pub totals: CartTotals,
}

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Product {0} is not available")]
    ProductInactive(String),

    #[error("Only {available} of {name} in stock, {requested} requested")]
    InsufficientStock {
        name: String,
        available: i32,
        requested: i32,
    },

    #[error("Item not in cart")]
    ItemNotFound,

    #[error("Quantity must not be negative")]
    InvalidQuantity,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Cart {
    pub async fn get_or_create(pool: &PgPool, user_id: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Cart>(
            r#"
            INSERT INTO carts (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING id, user_id, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn lines(pool: &PgPool, cart_id: Uuid) -> Result<Vec<CartLine>, sqlx::Error> {
        sqlx::query_as::<_, CartLine>(
            r#"
            SELECT p.id AS product_id, p.sku, p.slug, p.name,
                   p.price_cents AS unit_price_cents, p.currency, ci.quantity,
                   p.stock_quantity, p.is_active,
                   p.price_cents * ci.quantity AS line_total_cents
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.added_at, p.id
            "#,
        )
        .bind(cart_id)
        .fetch_all(pool)
        .await
    }

    /// The user's cart with totals
    pub async fn view(pool: &PgPool, user_id: &str, pricing: &PricingConfig) -> Result<CartView, sqlx::Error> {
        let cart = Self::get_or_create(pool, user_id).await?;
        let items = Self::lines(pool, cart.id).await?;
        let totals = CartTotals::from_lines(items.iter().map(|l| (l.unit_price_cents, l.quantity)), pricing);

        Ok(CartView {
            id: cart.id,
            items,
            totals,
        })
    }

    /// Adds `quantity` units, merging with an existing line
    pub async fn add_item(pool: &PgPool, user_id: &str, product_id: Uuid, quantity: i32) -> Result<(), CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }

        let cart = Self::get_or_create(pool, user_id).await?;
        let product = super::product::Product::find_by_id(pool, product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;

        if !product.is_active {
            return Err(CartError::ProductInactive(product.name));
        }

        if quantity > product.stock_quantity {
            return Err(CartError::InsufficientStock {
                name: product.name,
                available: product.stock_quantity,
                requested: quantity,
            });
        }

        // Merge and stock check in one statement
        let merged: Option<(i32,)> = sqlx::query_as(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity)
            SELECT $1, p.id, $3
            FROM products p
            WHERE p.id = $2 AND p.is_active AND $3 <= p.stock_quantity
            ON CONFLICT (cart_id, product_id) DO UPDATE
                SET quantity = cart_items.quantity + EXCLUDED.quantity
                WHERE cart_items.quantity::bigint + EXCLUDED.quantity
                    <= (SELECT stock_quantity FROM products WHERE id = EXCLUDED.product_id)
            RETURNING quantity
            "#,
        )
        .bind(cart.id)
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(pool)
        .await?;

        if merged.is_some() {
            return Ok(());
        }

        let (existing,): (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(quantity), 0) FROM cart_items WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart.id)
        .bind(product_id)
        .fetch_one(pool)
        .await?;

        let current = super::product::Product::find_by_id(pool, product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;
        if !current.is_active {
            return Err(CartError::ProductInactive(current.name));
        }

        Err(CartError::InsufficientStock {
            name: current.name,
            available: current.stock_quantity,
            requested: existing.saturating_add(quantity),
        })
    }

    /// Sets a line's quantity; zero removes the line
    pub async fn set_quantity(pool: &PgPool, user_id: &str, product_id: Uuid, quantity: i32) -> Result<(), CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity);
        }
        if quantity == 0 {
            return Self::remove_item(pool, user_id, product_id).await;
        }

        let cart = Self::get_or_create(pool, user_id).await?;
        let product = super::product::Product::find_by_id(pool, product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;

        if quantity > product.stock_quantity {
            return Err(CartError::InsufficientStock {
                name: product.name,
                available: product.stock_quantity,
                requested: quantity,
            });
        }

        let result = sqlx::query("UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2")
            .bind(cart.id)
            .bind(product_id)
            .bind(quantity)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CartError::ItemNotFound);
        }
        Ok(())
    }

    pub async fn remove_item(pool: &PgPool, user_id: &str, product_id: Uuid) -> Result<(), CartError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cart_items ci
            USING carts c
            WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.product_id = $2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CartError::ItemNotFound);
        }
        Ok(())
    }
}
