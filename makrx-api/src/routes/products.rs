/// Store catalog endpoints
///
/// # Endpoints
///
/// - `GET /api/v1/products` - Active products, filtered and sorted
/// - `GET /api/v1/products/:slug` - One active product
/// - `POST /api/v1/admin/products` - Create (realm admin)
/// - `PUT /api/v1/admin/products/:id` - Update (realm admin)
///
/// # Query parameters
///
/// ```text
/// ?page=1&per_page=20&category=filament&q=pla&min_price=500&max_price=5000
///  &in_stock=true&sort=newest|price_asc|price_desc|name
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use makrx_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::product::{CreateProduct, Product, ProductFilter, ProductSort, UpdateProduct},
    pagination::{Page, PageParams},
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl From<CatalogQuery> for ProductFilter {
    fn from(query: CatalogQuery) -> Self {
        Self {
            category: query.category,
            q: query.q.filter(|q| !q.trim().is_empty()),
            min_price: query.min_price,
            max_price: query.max_price,
            in_stock: query.in_stock,
            sort: query.sort,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 64, message = "SKU must be 1-64 characters"))]
    pub sku: String,

    #[validate(length(min = 1, max = 200, message = "Slug must be 1-200 characters"))]
    pub slug: String,

    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Category must be 1-100 characters"))]
    pub category: String,

    #[validate(range(min = 0, message = "Price must not be negative"))]
    pub price_cents: i64,

    /// Defaults to `INR`
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,

    #[validate(range(min = 0, message = "Stock must not be negative"))]
    #[serde(default)]
    pub stock_quantity: i32,

    pub is_active: Option<bool>,
    pub attributes: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[validate(range(min = 0, message = "Price must not be negative"))]
    pub price_cents: Option<i64>,
    #[validate(range(min = 0, message = "Stock must not be negative"))]
    pub stock_quantity: Option<i32>,
    pub is_active: Option<bool>,
    pub attributes: Option<JsonValue>,
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Page<Product>>> {
    let pagination = page.validate()?;

    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(ApiError::invalid("min_price", "min_price must not exceed max_price"));
        }
    }

    let (products, total) = Product::list_active(&state.db, &query.into(), pagination).await?;
    Ok(Json(Page::new(products, pagination, total)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Product>> {
    let product = Product::find_by_slug(&state.db, &slug)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::not_found("Product"))?;

    Ok(Json(product))
}

/// Create a product (realm admin); duplicate SKU or slug is a 409
pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    require_admin(&auth)?;
    req.validate()?;

    let product = Product::create(
        &state.db,
        CreateProduct {
            sku: req.sku,
            slug: req.slug,
            name: req.name,
            description: req.description,
            category: req.category,
            price_cents: req.price_cents,
            currency: req.currency.map(|c| c.to_ascii_uppercase()),
            stock_quantity: req.stock_quantity,
            is_active: req.is_active,
            attributes: req.attributes,
        },
    )
    .await?;

    tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<Product>> {
    require_admin(&auth)?;
    req.validate()?;

    let product = Product::update(
        &state.db,
        id,
        UpdateProduct {
            name: req.name,
            description: req.description,
            category: req.category,
            price_cents: req.price_cents,
            stock_quantity: req.stock_quantity,
            is_active: req.is_active,
            attributes: req.attributes,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Product"))?;

    Ok(Json(product))
}
