/// Integration tests for service-order dispatch
///
/// These tests require a running PostgreSQL database.
/// Run with: cargo test --test dispatch_tests -- --ignored
///
/// Each test uses its own material name so only its own providers are
/// eligible, which keeps tests independent when run in parallel.

mod common;

use chrono::{Duration, Utc};
use makrx_shared::dispatch::{DispatchError, DispatchService, Requester, RetryPolicy};
use makrx_shared::integration::NoopStoreSync;
use makrx_shared::models::provider::{CreateProvider, Provider};
use makrx_shared::models::service_order::{
    AssignmentStatus, CreateServiceOrder, JobAssignment, ServiceOrder, ServiceOrderEvent, ServiceOrderStatus,
    ServicePriority, ServiceType,
};
use sqlx::PgPool;
use std::sync::Arc;

const BENGALURU: (f64, f64) = (12.9716, 77.5946);
const YELAHANKA: (f64, f64) = (13.1007, 77.5963);

fn service(pool: &PgPool) -> DispatchService {
    DispatchService::new(pool.clone(), Arc::new(NoopStoreSync))
}

async fn provider(pool: &PgPool, material: &str, at: (f64, f64), max_jobs: i32) -> Provider {
    Provider::create(
        pool,
        &common::unique("provider-user"),
        CreateProvider {
            business_name: common::unique("Fab Lab"),
            services: vec![ServiceType::Printing3d],
            materials: vec![material.to_string()],
            latitude: Some(at.0),
            longitude: Some(at.1),
            service_radius_km: Some(50.0),
            max_concurrent_jobs: Some(max_jobs),
        },
    )
    .await
    .expect("Failed to create provider")
}

async fn order(pool: &PgPool, customer_id: &str, material: &str) -> ServiceOrder {
    ServiceOrder::create(
        pool,
        customer_id,
        CreateServiceOrder {
            service_type: ServiceType::Printing3d,
            material: material.to_string(),
            quantity: 1,
            priority: ServicePriority::Normal,
            specifications: serde_json::json!({"volume_cm3": 12.5}),
            quoted_total_cents: 2_000,
            delivery_latitude: Some(BENGALURU.0),
            delivery_longitude: Some(BENGALURU.1),
            store_order_id: None,
        },
    )
    .await
    .expect("Failed to create order")
}

async fn reload_provider(pool: &PgPool, id: uuid::Uuid) -> Provider {
    Provider::find_by_id(pool, id).await.unwrap().unwrap()
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_full_lifecycle_with_decline() {
    let pool = common::setup().await;
    let material = common::unique("pla");
    let near = provider(&pool, &material, BENGALURU, 3).await;
    let far = provider(&pool, &material, YELAHANKA, 3).await;
    let customer = common::unique("customer");
    let created = order(&pool, &customer, &material).await;
    let dispatch = service(&pool);

    // Closest provider wins while everything else is equal
    let outcome = dispatch.dispatch_order(created.id).await.unwrap();
    assert_eq!(outcome.matched.provider_id, near.id);
    assert_eq!(outcome.order.status, ServiceOrderStatus::Assigned);
    assert_eq!(outcome.order.provider_id, Some(near.id));
    assert_eq!(outcome.assignment.status, AssignmentStatus::Offered);
    assert_eq!(reload_provider(&pool, near.id).await.current_jobs, 1);

    // A second dispatch of the same order is refused
    assert!(matches!(
        dispatch.dispatch_order(created.id).await,
        Err(DispatchError::NotPending(ServiceOrderStatus::Assigned))
    ));

    // Someone else's job looks like it doesn't exist
    assert!(matches!(
        dispatch.accept(created.id, &far).await,
        Err(DispatchError::NotFound)
    ));

    let declined = dispatch.decline(created.id, &near).await.unwrap();
    assert_eq!(declined.status, ServiceOrderStatus::Pending);
    assert_eq!(declined.provider_id, None);
    assert_eq!(reload_provider(&pool, near.id).await.current_jobs, 0);

    let reloaded = ServiceOrder::find_by_id(&pool, created.id).await.unwrap().unwrap();
    assert!(reloaded.excluded_provider_ids.contains(&near.id));

    let outcome = dispatch.dispatch_order(created.id).await.unwrap();
    assert_eq!(outcome.matched.provider_id, far.id);

    dispatch.accept(created.id, &far).await.unwrap();
    let far_after_accept = reload_provider(&pool, far.id).await;
    assert_eq!(far_after_accept.response_samples, 1);
    assert!(far_after_accept.avg_response_minutes.is_some());

    dispatch.start(created.id, &far).await.unwrap();
    let completed = dispatch.complete(created.id, &far).await.unwrap();
    assert_eq!(completed.status, ServiceOrderStatus::Completed);

    let far_after = reload_provider(&pool, far.id).await;
    assert_eq!(far_after.current_jobs, 0);
    assert_eq!(far_after.completed_jobs, 1);

    let statuses: Vec<_> = ServiceOrderEvent::list(&pool, created.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.to_status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ServiceOrderStatus::Pending,
            ServiceOrderStatus::Assigned,
            ServiceOrderStatus::Pending,
            ServiceOrderStatus::Assigned,
            ServiceOrderStatus::Accepted,
            ServiceOrderStatus::InProgress,
            ServiceOrderStatus::Completed,
        ]
    );

    let offers = JobAssignment::list_for_order(&pool, created.id).await.unwrap();
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0].status, AssignmentStatus::Declined);
    assert_eq!(offers[1].status, AssignmentStatus::Accepted);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_no_eligible_provider_schedules_retry() {
    let pool = common::setup().await;
    let material = common::unique("unobtainium");
    let created = order(&pool, &common::unique("customer"), &material).await;
    let before = Utc::now();

    let result = service(&pool).dispatch_order(created.id).await;
    let next_attempt_at = match result {
        Err(DispatchError::NoEligibleProvider { next_attempt_at, .. }) => next_attempt_at,
        other => panic!("expected NoEligibleProvider, got {:?}", other.map(|o| o.order.id)),
    };
    assert!(next_attempt_at >= before + RetryPolicy::default().delay_for(0));

    let reloaded = ServiceOrder::find_by_id(&pool, created.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, ServiceOrderStatus::Pending);
    assert_eq!(reloaded.dispatch_attempts, 1);
    assert!(reloaded.last_dispatch_error.is_some());
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_capacity_is_never_exceeded() {
    let pool = common::setup().await;
    let material = common::unique("petg");
    let only = provider(&pool, &material, BENGALURU, 1).await;
    let first = order(&pool, &common::unique("customer"), &material).await;
    let second = order(&pool, &common::unique("customer"), &material).await;
    let dispatch = service(&pool);

    let (a, b) = tokio::join!(dispatch.dispatch_order(first.id), dispatch.dispatch_order(second.id));
    let assigned = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(assigned, 1);
    assert_eq!(reload_provider(&pool, only.id).await.current_jobs, 1);

    let failed = if a.is_err() { a } else { b };
    match failed {
        Err(DispatchError::NoEligibleProvider { reason, .. }) => {
            assert!(reason.contains("at_capacity") || reason.contains("capacity"), "{reason}");
        }
        other => panic!("expected NoEligibleProvider, got {:?}", other.map(|o| o.order.id)),
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_stale_offer_expires() {
    let pool = common::setup().await;
    let material = common::unique("resin");
    let slow = provider(&pool, &material, BENGALURU, 2).await;
    let created = order(&pool, &common::unique("customer"), &material).await;
    let dispatch = service(&pool);

    let outcome = dispatch.dispatch_order(created.id).await.unwrap();
    sqlx::query("UPDATE job_assignments SET offered_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(outcome.assignment.id)
        .execute(&pool)
        .await
        .unwrap();

    let expired = dispatch.expire_offers(Duration::minutes(30), 100).await.unwrap();
    assert!(expired >= 1);

    let reloaded = ServiceOrder::find_by_id(&pool, created.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, ServiceOrderStatus::Pending);
    assert!(reloaded.excluded_provider_ids.contains(&slow.id));
    assert!(reloaded.next_dispatch_at <= Utc::now());
    assert_eq!(reload_provider(&pool, slow.id).await.current_jobs, 0);

    let offers = JobAssignment::list_for_order(&pool, created.id).await.unwrap();
    assert_eq!(offers[0].status, AssignmentStatus::Expired);

    // The only provider is now excluded
    assert!(matches!(
        dispatch.dispatch_order(created.id).await,
        Err(DispatchError::NoEligibleProvider { .. })
    ));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_customer_cancel_releases_capacity() {
    let pool = common::setup().await;
    let material = common::unique("tpu");
    let maker = provider(&pool, &material, BENGALURU, 2).await;
    let customer = common::unique("customer");
    let created = order(&pool, &customer, &material).await;
    let dispatch = service(&pool);

    dispatch.dispatch_order(created.id).await.unwrap();
    assert_eq!(reload_provider(&pool, maker.id).await.current_jobs, 1);

    let stranger = Requester {
        user_id: "someone-else",
        is_admin: false,
    };
    assert!(matches!(
        dispatch.cancel(created.id, stranger).await,
        Err(DispatchError::NotFound)
    ));

    let owner = Requester {
        user_id: &customer,
        is_admin: false,
    };
    let cancelled = dispatch.cancel(created.id, owner).await.unwrap();
    assert_eq!(cancelled.status, ServiceOrderStatus::Cancelled);
    assert_eq!(reload_provider(&pool, maker.id).await.current_jobs, 0);

    let offers = JobAssignment::list_for_order(&pool, created.id).await.unwrap();
    assert_eq!(offers[0].status, AssignmentStatus::Cancelled);

    // Terminal orders can't be cancelled twice
    assert!(matches!(
        dispatch.cancel(created.id, owner).await,
        Err(DispatchError::Transition(_))
    ));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_preview_has_no_side_effects() {
    let pool = common::setup().await;
    let material = common::unique("abs");
    let maker = provider(&pool, &material, BENGALURU, 2).await;
    let created = order(&pool, &common::unique("customer"), &material).await;

    let preview = service(&pool).preview(created.id).await.unwrap();
    assert_eq!(preview.best().map(|m| m.provider_id), Some(maker.id));

    let reloaded = ServiceOrder::find_by_id(&pool, created.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, ServiceOrderStatus::Pending);
    assert_eq!(reload_provider(&pool, maker.id).await.current_jobs, 0);
}
