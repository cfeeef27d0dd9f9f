/// Integration tests for stock-sensitive operations: inventory
/// adjustments, cart checkout and store order cancellation
///
/// These tests require a running PostgreSQL database.
/// Run with: cargo test --test commerce_tests -- --ignored

mod common;

use makrx_shared::models::cart::{Cart, CartError};
use makrx_shared::models::inventory::{AdjustAction, AdjustError, CreateInventoryItem, InventoryItem};
use makrx_shared::models::makerspace::{CreateMakerspace, Makerspace, MakerspaceMember, MemberRole};
use makrx_shared::models::product::{CreateProduct, Product};
use makrx_shared::models::store_order::{CheckoutError, StoreOrder, StoreOrderStatus};
use makrx_shared::pricing::PricingConfig;
use sqlx::PgPool;

async fn product(pool: &PgPool, price_cents: i64, stock: i32) -> Product {
    let sku = common::unique("SKU");
    Product::create(
        pool,
        CreateProduct {
            slug: sku.to_lowercase(),
            sku,
            name: common::unique("Filament"),
            description: None,
            category: "filament".to_string(),
            price_cents,
            currency: None,
            stock_quantity: stock,
            is_active: None,
            attributes: None,
        },
    )
    .await
    .expect("Failed to create product")
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_inventory_adjust_never_goes_negative() {
    let pool = common::setup().await;
    let owner = common::unique("owner");
    let space = Makerspace::create(
        &pool,
        CreateMakerspace {
            slug: common::unique("space"),
            name: "Test Space".to_string(),
            description: None,
            location: None,
            timezone: None,
        },
        &owner,
    )
    .await
    .unwrap();

    assert_eq!(
        MakerspaceMember::get_role(&pool, space.id, &owner).await.unwrap(),
        Some(MemberRole::Owner)
    );

    let item = InventoryItem::create(
        &pool,
        space.id,
        CreateInventoryItem {
            name: "M3 screws".to_string(),
            category: "hardware".to_string(),
            sku: None,
            quantity: 10,
            unit: None,
            min_threshold: 4,
            location: None,
            supplier: None,
            unit_cost_cents: None,
            attributes: None,
        },
        &owner,
    )
    .await
    .unwrap();

    let outcome = InventoryItem::adjust(&pool, space.id, item.id, AdjustAction::Subtract, 6, Some("build"), &owner)
        .await
        .unwrap();
    assert_eq!(outcome.item.quantity, 4);
    assert!(outcome.crossed_threshold);
    assert_eq!(outcome.log.previous_quantity, 10);

    let result = InventoryItem::adjust(&pool, space.id, item.id, AdjustAction::Subtract, 5, None, &owner).await;
    assert!(matches!(
        result,
        Err(AdjustError::InsufficientQuantity {
            available: 4,
            requested: 5
        })
    ));

    let (a, b) = tokio::join!(
        InventoryItem::adjust(&pool, space.id, item.id, AdjustAction::Subtract, 3, None, &owner),
        InventoryItem::adjust(&pool, space.id, item.id, AdjustAction::Subtract, 3, None, &owner),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

    let reloaded = InventoryItem::find(&pool, space.id, item.id).await.unwrap().unwrap();
    assert_eq!(reloaded.quantity, 1);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_checkout_and_cancel_restock() {
    let pool = common::setup().await;
    let pricing = PricingConfig::default();
    let user = common::unique("shopper");
    let spool = product(&pool, 1_500, 5).await;

    Cart::add_item(&pool, &user, spool.id, 2).await.unwrap();
    Cart::add_item(&pool, &user, spool.id, 1).await.unwrap();
    assert!(matches!(
        Cart::add_item(&pool, &user, spool.id, 3).await,
        Err(CartError::InsufficientStock { .. })
    ));

    let cart = Cart::view(&pool, &user, &pricing).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.totals.subtotal_cents, 4_500);
    assert_eq!(cart.totals.tax_cents, 810);
    assert_eq!(cart.totals.shipping_cents, 4_900);

    let detail = StoreOrder::checkout(&pool, &user, serde_json::json!({"city": "Bengaluru"}), None, &pricing)
        .await
        .unwrap();
    assert_eq!(detail.order.status, StoreOrderStatus::Pending);
    assert_eq!(detail.order.total_cents, 4_500 + 810 + 4_900);
    assert!(detail.order.order_number.starts_with("MX-"));
    assert_eq!(detail.items[0].quantity, 3);

    assert_eq!(Product::find_by_id(&pool, spool.id).await.unwrap().unwrap().stock_quantity, 2);
    assert!(Cart::view(&pool, &user, &pricing).await.unwrap().items.is_empty());
    assert!(matches!(
        StoreOrder::checkout(&pool, &user, serde_json::json!({}), None, &pricing).await,
        Err(CheckoutError::EmptyCart)
    ));

    let cancelled = StoreOrder::transition(
        &pool,
        detail.order.id,
        StoreOrderStatus::Cancelled,
        Some(&user),
        &user,
        Some("changed my mind"),
    )
    .await
    .unwrap();
    assert_eq!(cancelled.status, StoreOrderStatus::Cancelled);
    assert_eq!(Product::find_by_id(&pool, spool.id).await.unwrap().unwrap().stock_quantity, 5);

    let history = StoreOrder::detail(&pool, detail.order.id).await.unwrap().unwrap().history;
    assert_eq!(history.len(), 2);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_inventory_add_rejects_int4_overflow() {
    let pool = common::setup().await;
    let owner = common::unique("owner");
    let space = Makerspace::create(
        &pool,
        CreateMakerspace {
            slug: common::unique("space"),
            name: "Bulk Space".to_string(),
            description: None,
            location: None,
            timezone: None,
        },
        &owner,
    )
    .await
    .unwrap();

    let item = InventoryItem::create(
        &pool,
        space.id,
        CreateInventoryItem {
            name: "Zip ties".to_string(),
            category: "hardware".to_string(),
            sku: None,
            quantity: 2_147_483_600,
            unit: None,
            min_threshold: 0,
            location: None,
            supplier: None,
            unit_cost_cents: None,
            attributes: None,
        },
        &owner,
    )
    .await
    .unwrap();

    let result = InventoryItem::adjust(&pool, space.id, item.id, AdjustAction::Add, 100, None, &owner).await;
    assert!(matches!(
        result,
        Err(AdjustError::QuantityOverflow {
            available: 2_147_483_600,
            requested: 100
        })
    ));

    let outcome = InventoryItem::adjust(&pool, space.id, item.id, AdjustAction::Add, 47, None, &owner)
        .await
        .unwrap();
    assert_eq!(outcome.item.quantity, i32::MAX);

    let reloaded = InventoryItem::find(&pool, space.id, item.id).await.unwrap().unwrap();
    assert_eq!(reloaded.quantity, i32::MAX);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_concurrent_cart_adds_accumulate() {
    let pool = common::setup().await;
    let pricing = PricingConfig::default();
    let user = common::unique("shopper");
    let resin = product(&pool, 2_000, 10).await;

    let (a, b) = tokio::join!(
        Cart::add_item(&pool, &user, resin.id, 3),
        Cart::add_item(&pool, &user, resin.id, 4),
    );
    a.unwrap();
    b.unwrap();

    let cart = Cart::view(&pool, &user, &pricing).await.unwrap();
    assert_eq!(cart.items[0].quantity, 7);

    // Only one of these fits in the remaining stock of 3
    let (a, b) = tokio::join!(
        Cart::add_item(&pool, &user, resin.id, 2),
        Cart::add_item(&pool, &user, resin.id, 2),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(
        a.err().or(b.err()),
        Some(CartError::InsufficientStock {
            available: 10,
            requested: 11,
            ..
        })
    ));

    let cart = Cart::view(&pool, &user, &pricing).await.unwrap();
    assert_eq!(cart.items[0].quantity, 9);
}
