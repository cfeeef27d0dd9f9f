/// Integration tests for event registration, teams and slug namespaces
///
/// These tests require a running PostgreSQL database.
/// Run with: cargo test --test events_tests -- --ignored

mod common;

use chrono::{Duration, Utc};
use makrx_shared::models::event::{
    CreateEvent, CreateMicrosite, Event, EventError, Microsite, Registration, Team,
};
use sqlx::PgPool;
use uuid::Uuid;

fn event_input(slug: Option<String>, starts_in: Duration) -> CreateEvent {
    let starts_at = Utc::now() + starts_in;
    CreateEvent {
        slug,
        title: "Robotics Jam".to_string(),
        description: None,
        location: Some("Bengaluru".to_string()),
        starts_at,
        ends_at: starts_at + Duration::hours(6),
        capacity: None,
        max_team_size: None,
        registration_fee_cents: 0,
    }
}

async fn published(pool: &PgPool, capacity: Option<i32>, max_team_size: Option<i32>) -> Event {
    let organizer = common::unique("organizer");
    let mut input = event_input(Some(common::unique("jam")), Duration::days(7));
    input.capacity = capacity;
    input.max_team_size = max_team_size;

    let draft = Event::create(pool, &organizer, None, input).await.unwrap();
    Event::publish(pool, draft.id).await.unwrap()
}

fn unique_violation(result: Result<Event, EventError>) -> Option<String> {
    match result {
        Err(EventError::Database(sqlx::Error::Database(e))) if e.code().as_deref() == Some("23505") => {
            e.constraint().map(str::to_string)
        }
        _ => None,
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_registration_rules() {
    let pool = common::setup().await;
    let event = published(&pool, Some(2), None).await;

    let first = common::unique("maker");
    let (registration, _) = Registration::register(&pool, event.id, &first).await.unwrap();
    assert_eq!(registration.user_id, first);

    assert!(matches!(
        Registration::register(&pool, event.id, &first).await,
        Err(EventError::AlreadyRegistered)
    ));

    Registration::register(&pool, event.id, &common::unique("maker")).await.unwrap();
    assert!(matches!(
        Registration::register(&pool, event.id, &common::unique("maker")).await,
        Err(EventError::Full)
    ));

    // Leaving frees a seat
    assert!(Registration::unregister(&pool, event.id, &first).await.unwrap());
    Registration::register(&pool, event.id, &common::unique("maker")).await.unwrap();

    assert!(matches!(
        Registration::register(&pool, Uuid::new_v4(), &first).await,
        Err(EventError::NotFound)
    ));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_registration_requires_open_event() {
    let pool = common::setup().await;
    let organizer = common::unique("organizer");

    let draft = Event::create(&pool, &organizer, None, event_input(Some(common::unique("draft")), Duration::days(3)))
        .await
        .unwrap();
    assert!(matches!(
        Registration::register(&pool, draft.id, "maker").await,
        Err(EventError::NotPublished)
    ));

    let started = Event::create(&pool, &organizer, None, event_input(Some(common::unique("live")), -Duration::hours(1)))
        .await
        .unwrap();
    Event::publish(&pool, started.id).await.unwrap();
    assert!(matches!(
        Registration::register(&pool, started.id, "maker").await,
        Err(EventError::AlreadyStarted)
    ));

    let cancelled = published(&pool, None, None).await;
    Event::cancel(&pool, cancelled.id).await.unwrap();
    assert!(matches!(
        Registration::register(&pool, cancelled.id, "maker").await,
        Err(EventError::NotPublished)
    ));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_concurrent_registrations_respect_capacity() {
    let pool = common::setup().await;
    let event = published(&pool, Some(1), None).await;

    let (a, b) = tokio::join!(
        Registration::register(&pool, event.id, "maker-a"),
        Registration::register(&pool, event.id, "maker-b"),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(Registration::list(&pool, event.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_team_size_and_single_team_per_event() {
    let pool = common::setup().await;
    let event = published(&pool, None, Some(2)).await;
    let [captain, mate, late, rival] = ["captain", "mate", "late", "rival"].map(common::unique);
    for user in [&captain, &mate, &late, &rival] {
        Registration::register(&pool, event.id, user).await.unwrap();
    }

    assert!(matches!(
        Team::create(&pool, event.id, "outsider", "Ghosts").await,
        Err(EventError::NotRegistered)
    ));

    let team = Team::create(&pool, event.id, &captain, "Servo Squad").await.unwrap();
    Team::join(&pool, &event, team.id, &mate).await.unwrap();
    assert!(matches!(
        Team::join(&pool, &event, team.id, &late).await,
        Err(EventError::TeamFull)
    ));

    // Already on Servo Squad
    assert!(matches!(
        Team::create(&pool, event.id, &mate, "Breakaway").await,
        Err(EventError::AlreadyInTeam)
    ));

    let other = Team::create(&pool, event.id, &rival, "Gearheads").await.unwrap();
    assert!(matches!(
        Team::join(&pool, &event, other.id, &captain).await,
        Err(EventError::AlreadyInTeam)
    ));
    assert!(matches!(
        Team::join(&pool, &event, Uuid::new_v4(), &late).await,
        Err(EventError::TeamNotFound)
    ));

    let teams = Team::list(&pool, event.id).await.unwrap();
    let counts: Vec<(String, i64)> = teams.into_iter().map(|t| (t.name, t.member_count)).collect();
    assert_eq!(
        counts,
        vec![("Gearheads".to_string(), 1), ("Servo Squad".to_string(), 2)]
    );
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_slug_uniqueness_is_scoped() {
    let pool = common::setup().await;
    let organizer = common::unique("organizer");
    let slug = common::unique("hack");

    Event::create(&pool, &organizer, None, event_input(Some(slug.clone()), Duration::days(5)))
        .await
        .unwrap();
    assert_eq!(
        unique_violation(Event::create(&pool, &organizer, None, event_input(Some(slug.clone()), Duration::days(6))).await)
            .as_deref(),
        Some("events_slug_key")
    );

    let fest = Microsite::create(
        &pool,
        &organizer,
        CreateMicrosite {
            slug: common::unique("fest"),
            title: "Maker Fest".to_string(),
            description: None,
        },
    )
    .await
    .unwrap();
    let expo = Microsite::create(
        &pool,
        &organizer,
        CreateMicrosite {
            slug: common::unique("expo"),
            title: "Maker Expo".to_string(),
            description: None,
        },
    )
    .await
    .unwrap();

    // The global slug is free inside each microsite
    for site in [&fest, &expo] {
        Event::create(&pool, &organizer, Some(site.id), event_input(Some(slug.clone()), Duration::days(5)))
            .await
            .unwrap();
    }
    assert_eq!(
        unique_violation(
            Event::create(&pool, &organizer, Some(fest.id), event_input(Some(slug.clone()), Duration::days(8))).await
        )
        .as_deref(),
        Some("events_microsite_slug_key")
    );

    assert!(matches!(
        Event::create(&pool, &organizer, None, event_input(Some("Not A Slug".to_string()), Duration::days(5))).await,
        Err(EventError::InvalidSlug(_))
    ));
}
