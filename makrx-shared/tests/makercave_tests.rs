/// Integration tests for makerspace membership and equipment reservations
///
/// These tests require a running PostgreSQL database.
/// Run with: cargo test --test makercave_tests -- --ignored

mod common;

use chrono::{Duration, DurationRound, Utc};
use makrx_shared::models::equipment::{
    CreateEquipment, CreateReservation, Equipment, EquipmentStatus, Reservation, ReservationError,
};
use makrx_shared::models::makerspace::{
    CreateMakerspace, Makerspace, MakerspaceMember, MemberRole, MembershipError,
};
use sqlx::PgPool;

async fn makerspace(pool: &PgPool, owner: &str) -> Makerspace {
    Makerspace::create(
        pool,
        CreateMakerspace {
            slug: common::unique("space"),
            name: "Workshop".to_string(),
            description: None,
            location: None,
            timezone: None,
        },
        owner,
    )
    .await
    .expect("Failed to create makerspace")
}

async fn laser(pool: &PgPool, space: &Makerspace, status: Option<EquipmentStatus>) -> Equipment {
    Equipment::create(
        pool,
        space.id,
        CreateEquipment {
            name: "Laser cutter".to_string(),
            equipment_type: "laser_cutter".to_string(),
            status,
            location: None,
            hourly_rate_cents: 600,
            requires_certification: false,
            specifications: None,
        },
    )
    .await
    .expect("Failed to create equipment")
}

fn window(start_hours: i64, end_hours: i64) -> CreateReservation {
    let base = Utc::now().duration_trunc(Duration::hours(1)).unwrap() + Duration::days(1);
    CreateReservation {
        starts_at: base + Duration::hours(start_hours),
        ends_at: base + Duration::hours(end_hours),
        purpose: None,
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_reservation_overlap_conflicts() {
    let pool = common::setup().await;
    let owner = common::unique("owner");
    let space = makerspace(&pool, &owner).await;
    let cutter = laser(&pool, &space, None).await;

    let (first, _) = Reservation::create(&pool, space.id, cutter.id, &owner, window(0, 2))
        .await
        .unwrap();
    assert_eq!(first.cost_cents, 1_200);

    let overlap = Reservation::create(&pool, space.id, cutter.id, &owner, window(1, 3)).await;
    assert!(matches!(overlap, Err(ReservationError::Overlap(id)) if id == first.id));

    // Back-to-back is fine
    Reservation::create(&pool, space.id, cutter.id, &owner, window(2, 3))
        .await
        .unwrap();

    Reservation::cancel(&pool, space.id, first.id).await.unwrap();
    Reservation::create(&pool, space.id, cutter.id, &owner, window(1, 2))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_concurrent_reservations_one_wins() {
    let pool = common::setup().await;
    let owner = common::unique("owner");
    let space = makerspace(&pool, &owner).await;
    let cutter = laser(&pool, &space, None).await;

    let (a, b) = tokio::join!(
        Reservation::create(&pool, space.id, cutter.id, "maker-a", window(4, 6)),
        Reservation::create(&pool, space.id, cutter.id, "maker-b", window(5, 7)),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_unavailable_equipment_cannot_be_reserved() {
    let pool = common::setup().await;
    let owner = common::unique("owner");
    let space = makerspace(&pool, &owner).await;

    for status in [EquipmentStatus::Maintenance, EquipmentStatus::Offline] {
        let machine = laser(&pool, &space, Some(status)).await;
        let result = Reservation::create(&pool, space.id, machine.id, &owner, window(0, 1)).await;
        assert!(matches!(result, Err(ReservationError::EquipmentUnavailable(s)) if s == status));
    }

    let busy = laser(&pool, &space, Some(EquipmentStatus::InUse)).await;
    Reservation::create(&pool, space.id, busy.id, &owner, window(0, 1))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_last_owner_is_protected() {
    let pool = common::setup().await;
    let owner = common::unique("owner");
    let space = makerspace(&pool, &owner).await;

    assert!(matches!(
        MakerspaceMember::update_role(&pool, space.id, &owner, MemberRole::Admin).await,
        Err(MembershipError::LastOwner)
    ));
    assert!(matches!(
        MakerspaceMember::remove(&pool, space.id, &owner).await,
        Err(MembershipError::LastOwner)
    ));
    assert!(matches!(
        MakerspaceMember::remove(&pool, space.id, "nobody").await,
        Err(MembershipError::NotFound)
    ));

    let second = common::unique("owner");
    MakerspaceMember::add(&pool, space.id, &second, MemberRole::Owner).await.unwrap();
    let demoted = MakerspaceMember::update_role(&pool, space.id, &owner, MemberRole::Admin)
        .await
        .unwrap();
    assert_eq!(demoted.role, MemberRole::Admin);

    assert!(matches!(
        MakerspaceMember::remove(&pool, space.id, &second).await,
        Err(MembershipError::LastOwner)
    ));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_concurrent_owner_removals_keep_one_owner() {
    let pool = common::setup().await;
    let first = common::unique("owner");
    let space = makerspace(&pool, &first).await;
    let second = common::unique("owner");
    MakerspaceMember::add(&pool, space.id, &second, MemberRole::Owner).await.unwrap();

    let (a, b) = tokio::join!(
        MakerspaceMember::remove(&pool, space.id, &first),
        MakerspaceMember::update_role(&pool, space.id, &second, MemberRole::Member),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

    assert_eq!(MakerspaceMember::count_owners(&pool, space.id).await.unwrap(), 1);
}
