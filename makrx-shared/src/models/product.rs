/// Store catalog products

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::pagination::Pagination;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price_cents: i64,
    pub currency: String,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub attributes: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProduct {
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price_cents: i64,
    pub currency: Option<String>,
    pub stock_quantity: i32,
    pub is_active: Option<bool>,
    pub attributes: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_cents: Option<i64>,
    pub stock_quantity: Option<i32>,
    pub is_active: Option<bool>,
    pub attributes: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    fn order_by(&self) -> &'static str {
        match self {
            ProductSort::Newest => "created_at DESC, id",
            ProductSort::PriceAsc => "price_cents ASC, id",
            ProductSort::PriceDesc => "price_cents DESC, id",
            ProductSort::Name => "name ASC, id",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub q: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub sort: ProductSort,
}

const PRODUCT_COLUMNS: &str = "id, sku, slug, name, description, category, price_cents, currency, \
     stock_quantity, is_active, attributes, created_at, updated_at";

const CATALOG_WHERE: &str = r#"
    WHERE is_active
      AND ($1::text IS NULL OR category = $1)
      AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR description ILIKE '%' || $2 || '%')
      AND ($3::bigint IS NULL OR price_cents >= $3)
      AND ($4::bigint IS NULL OR price_cents <= $4)
      AND ($5::bool IS NULL OR (stock_quantity > 0) = $5)
"#;

impl Product {
    /// Active products matching the filter
    pub async fn list_active(
        pool: &PgPool,
        filter: &ProductFilter,
        pagination: Pagination,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products {CATALOG_WHERE} ORDER BY {} LIMIT $6 OFFSET $7",
            filter.sort.order_by()
        ))
        .bind(&filter.category)
        .bind(&filter.q)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.in_stock)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products {CATALOG_WHERE}"))
            .bind(&filter.category)
            .bind(&filter.q)
            .bind(filter.min_price)
            .bind(filter.max_price)
            .bind(filter.in_stock)
            .fetch_one(pool)
            .await?;

        Ok((products, total))
    }

    /// Active product by slug
    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1 AND is_active"
        ))
        .bind(slug)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &PgPool, data: CreateProduct) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products
                (sku, slug, name, description, category, price_cents, currency,
                 stock_quantity, is_active, attributes)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'INR'), $8, COALESCE($9, TRUE), COALESCE($10, '{{}}'::jsonb))
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&data.sku)
        .bind(&data.slug)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.category)
        .bind(data.price_cents)
        .bind(&data.currency)
        .bind(data.stock_quantity)
        .bind(data.is_active)
        .bind(&data.attributes)
        .fetch_one(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateProduct) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                category = COALESCE($4, category),
                price_cents = COALESCE($5, price_cents),
                stock_quantity = COALESCE($6, stock_quantity),
                is_active = COALESCE($7, is_active),
                attributes = COALESCE($8, attributes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.category)
        .bind(data.price_cents)
        .bind(data.stock_quantity)
        .bind(data.is_active)
        .bind(data.attributes)
        .fetch_optional(pool)
        .await
    }
}
