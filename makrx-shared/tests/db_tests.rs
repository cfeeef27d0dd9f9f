/// Integration tests for the pool and migrations
///
/// These tests require a running PostgreSQL database.
/// Run with: cargo test --test db_tests -- --ignored

mod common;

use makrx_shared::db::migrations::{get_migration_status, run_migrations};
use makrx_shared::db::pool::{close_pool, get_pool_stats, health_check};

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_migrations_apply_and_are_idempotent() {
    let pool = common::setup().await;

    let first = get_migration_status(&pool).await.expect("Failed to get status");
    assert!(first.applied_migrations > 0, "No migrations were applied");

    run_migrations(&pool).await.expect("Second migration run failed");
    let second = get_migration_status(&pool).await.expect("Failed to get status");
    assert_eq!(first.applied_migrations, second.applied_migrations);
    assert!(second.is_up_to_date);

    close_pool(pool).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_health_check() {
    let pool = common::setup().await;

    assert!(health_check(&pool).await.is_ok());
    let stats = get_pool_stats(&pool);
    assert!(stats.total_connections >= 1);

    close_pool(pool).await;
}
