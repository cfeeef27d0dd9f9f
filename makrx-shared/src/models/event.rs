/// Events, microsites, registrations, teams, tournaments and sponsors
///
/// # Slugs
///
/// Top-level events share one global slug namespace; events attached to a
/// microsite are unique only within that microsite. Both are enforced by
/// partial unique indexes (`events_slug_key`, `events_microsite_slug_key`).
///
/// # Capacity
///
/// Registration locks the event row (`FOR UPDATE`) before counting existing
/// registrations, so concurrent sign-ups cannot exceed `capacity`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::pagination::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tournament_format", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    SingleElimination,
    DoubleElimination,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sponsor_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SponsorTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    Community,
}

impl SponsorTier {
    /// Display order, platinum first
    pub fn rank(&self) -> u8 {
        match self {
            SponsorTier::Platinum => 0,
            SponsorTier::Gold => 1,
            SponsorTier::Silver => 2,
            SponsorTier::Bronze => 3,
            SponsorTier::Community => 4,
        }
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// True when `slug` is already in [`slugify`] normal form
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event not found")]
    NotFound,

    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    #[error("ends_at must be after starts_at")]
    InvalidSchedule,

    #[error("Event is not open for registration")]
    NotPublished,

    #[error("Event has already started")]
    AlreadyStarted,

    #[error("Event is full")]
    Full,

    #[error("Already registered for this event")]
    AlreadyRegistered,

    #[error("Registration required")]
    NotRegistered,

    #[error("Team not found")]
    TeamNotFound,

    #[error("Team is full")]
    TeamFull,

    #[error("Already in a team for this event")]
    AlreadyInTeam,

    #[error("Cannot change event from {from:?} to {to:?}")]
    InvalidTransition { from: EventStatus, to: EventStatus },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Microsite {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMicrosite {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub microsite_id: Option<Uuid>,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub capacity: Option<i32>,
    pub max_team_size: i32,
    pub registration_fee_cents: i64,
    pub status: EventStatus,
    pub organizer_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvent {
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub capacity: Option<i32>,
    pub max_team_size: Option<i32>,
    #[serde(default)]
    pub registration_fee_cents: i64,
}

impl CreateEvent {
    /// Supplied slug (validated) or one derived from the title
    pub fn resolve_slug(&self) -> Result<String, EventError> {
        match &self.slug {
            Some(slug) if is_valid_slug(slug) => Ok(slug.clone()),
            Some(slug) => Err(EventError::InvalidSlug(slug.clone())),
            None => {
                let derived = slugify(&self.title);
                if derived.is_empty() {
                    return Err(EventError::InvalidSlug(self.title.clone()));
                }
                Ok(derived)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub max_team_size: Option<i32>,
    pub registration_fee_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub captain_id: String,
    pub created_at: DateTime<Utc>,
}

/// Team with its current head count
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamSummary {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub captain_id: String,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tournament {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub format: TournamentFormat,
    pub max_teams: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTournament {
    pub name: String,
    pub format: TournamentFormat,
    pub max_teams: i32,
    pub starts_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sponsor {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub tier: SponsorTier,
    pub website_url: Option<String>,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSponsor {
    pub name: String,
    pub tier: SponsorTier,
    pub website_url: Option<String>,
    pub logo_url: Option<String>,
}

const EVENT_COLUMNS: &str = "id, microsite_id, slug, title, description, location, starts_at, ends_at, \
     capacity, max_team_size, registration_fee_cents, status, organizer_id, created_at, updated_at";

impl Microsite {
    pub async fn create(pool: &PgPool, owner_id: &str, data: CreateMicrosite) -> Result<Self, EventError> {
        if !is_valid_slug(&data.slug) {
            return Err(EventError::InvalidSlug(data.slug));
        }

        let microsite = sqlx::query_as::<_, Microsite>(
            r#"
            INSERT INTO microsites (slug, title, description, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, slug, title, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(&data.slug)
        .bind(&data.title)
        .bind(&data.description)
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

        Ok(microsite)
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Microsite>(
            "SELECT id, slug, title, description, owner_id, created_at, updated_at FROM microsites WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(pool)
        .await
    }
}

impl Event {
    /// Creates a draft event, top-level or under a microsite
    pub async fn create(
        pool: &PgPool,
        organizer_id: &str,
        microsite_id: Option<Uuid>,
        data: CreateEvent,
    ) -> Result<Self, EventError> {
        if data.ends_at <= data.starts_at {
            return Err(EventError::InvalidSchedule);
        }
        let slug = data.resolve_slug()?;

        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events
                (microsite_id, slug, title, description, location, starts_at, ends_at,
                 capacity, max_team_size, registration_fee_cents, organizer_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 4), $10, $11)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(microsite_id)
        .bind(&slug)
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.location)
        .bind(data.starts_at)
        .bind(data.ends_at)
        .bind(data.capacity)
        .bind(data.max_team_size)
        .bind(data.registration_fee_cents)
        .bind(organizer_id)
        .fetch_one(pool)
        .await?;

        tracing::info!(event_id = %event.id, slug = %event.slug, "Event created");
        Ok(event)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Published top-level events, or everything organized by `organizer`
    pub async fn list(
        pool: &PgPool,
        organizer: Option<&str>,
        pagination: Pagination,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE CASE
                WHEN $1::text IS NULL THEN status = 'published' AND microsite_id IS NULL
                ELSE organizer_id = $1
            END
            ORDER BY starts_at ASC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(organizer)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await
    }

    /// Sub-events of a microsite; drafts only when `include_drafts`
    pub async fn list_for_microsite(
        pool: &PgPool,
        microsite_id: Uuid,
        include_drafts: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE microsite_id = $1 AND ($2 OR status = 'published')
            ORDER BY starts_at ASC, id
            "#
        ))
        .bind(microsite_id)
        .bind(include_drafts)
        .fetch_all(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateEvent) -> Result<Self, EventError> {
        let current = Self::find_by_id(pool, id).await?.ok_or(EventError::NotFound)?;
        let starts_at = data.starts_at.unwrap_or(current.starts_at);
        let ends_at = data.ends_at.unwrap_or(current.ends_at);
        if ends_at <= starts_at {
            return Err(EventError::InvalidSchedule);
        }

        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                starts_at = $5,
                ends_at = $6,
                capacity = COALESCE($7, capacity),
                max_team_size = COALESCE($8, max_team_size),
                registration_fee_cents = COALESCE($9, registration_fee_cents),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.location)
        .bind(starts_at)
        .bind(ends_at)
        .bind(data.capacity)
        .bind(data.max_team_size)
        .bind(data.registration_fee_cents)
        .fetch_optional(pool)
        .await?
        .ok_or(EventError::NotFound)?;

        Ok(event)
    }

    /// Draft → Published
    pub async fn publish(pool: &PgPool, id: Uuid) -> Result<Self, EventError> {
        Self::transition(pool, id, &[EventStatus::Draft], EventStatus::Published).await
    }

    /// Draft | Published → Cancelled
    pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<Self, EventError> {
        Self::transition(
            pool,
            id,
            &[EventStatus::Draft, EventStatus::Published],
            EventStatus::Cancelled,
        )
        .await
    }

    async fn transition(
        pool: &PgPool,
        id: Uuid,
        from: &[EventStatus],
        to: EventStatus,
    ) -> Result<Self, EventError> {
        let updated = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(to)
        .bind(from)
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(event) => Ok(event),
            None => {
                let current = Self::find_by_id(pool, id).await?.ok_or(EventError::NotFound)?;
                Err(EventError::InvalidTransition {
                    from: current.status,
                    to,
                })
            }
        }
    }

    /// Registration preconditions other than capacity and duplicates
    pub fn check_open(&self, now: DateTime<Utc>) -> Result<(), EventError> {
        if self.status != EventStatus::Published {
            return Err(EventError::NotPublished);
        }
        if self.starts_at <= now {
            return Err(EventError::AlreadyStarted);
        }
        Ok(())
    }
}

impl sqlx::postgres::PgHasArrayType for EventStatus {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_event_status")
    }
}

impl Registration {
    /// Registers a user, enforcing status, start time, capacity and uniqueness
    pub async fn register(pool: &PgPool, event_id: Uuid, user_id: &str) -> Result<(Self, Event), EventError> {
        let mut tx = pool.begin().await?;

        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
        ))
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EventError::NotFound)?;

        event.check_open(Utc::now())?;

        let (existing, registered): (bool, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(BOOL_OR(user_id = $2), FALSE), COUNT(*)
            FROM event_registrations
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if existing {
            return Err(EventError::AlreadyRegistered);
        }
        if let Some(capacity) = event.capacity {
            if registered >= i64::from(capacity) {
                return Err(EventError::Full);
            }
        }

        let registration = sqlx::query_as::<_, Registration>(
            r#"
            INSERT INTO event_registrations (event_id, user_id)
            VALUES ($1, $2)
            RETURNING id, event_id, user_id, created_at
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((registration, event))
    }

    /// Removes a registration and any team membership for the event
    pub async fn unregister(pool: &PgPool, event_id: Uuid, user_id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM event_team_members WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM event_registrations WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Registration>(
            "SELECT id, event_id, user_id, created_at FROM event_registrations WHERE event_id = $1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    pub async fn exists(pool: &PgPool, event_id: Uuid, user_id: &str) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM event_registrations WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}

impl Team {
    /// Creates a team with the caller as captain and first member
    ///
    /// # Errors
    ///
    /// `NotRegistered`, `AlreadyInTeam`, or a unique violation on
    /// `event_teams_event_name_key` for a duplicate name.
    pub async fn create(pool: &PgPool, event_id: Uuid, captain_id: &str, name: &str) -> Result<Self, EventError> {
        if !Registration::exists(pool, event_id, captain_id).await? {
            return Err(EventError::NotRegistered);
        }

        let mut tx = pool.begin().await?;

        let team = sqlx::query_as::<_, Team>(
            r#"
            INSERT INTO event_teams (event_id, name, captain_id)
            VALUES ($1, $2, $3)
            RETURNING id, event_id, name, captain_id, created_at
            "#,
        )
        .bind(event_id)
        .bind(name)
        .bind(captain_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_member(&mut tx, team.id, event_id, captain_id).await?;

        tx.commit().await?;
        Ok(team)
    }

    /// Adds a registered user to a team, respecting `max_team_size`
    pub async fn join(pool: &PgPool, event: &Event, team_id: Uuid, user_id: &str) -> Result<Self, EventError> {
        if !Registration::exists(pool, event.id, user_id).await? {
            return Err(EventError::NotRegistered);
        }

        let mut tx = pool.begin().await?;

        let team = sqlx::query_as::<_, Team>(
            r#"
            SELECT id, event_id, name, captain_id, created_at
            FROM event_teams
            WHERE id = $1 AND event_id = $2
            FOR UPDATE
            "#,
        )
        .bind(team_id)
        .bind(event.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EventError::TeamNotFound)?;

        let (members,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_team_members WHERE team_id = $1")
            .bind(team_id)
            .fetch_one(&mut *tx)
            .await?;

        if members >= i64::from(event.max_team_size) {
            return Err(EventError::TeamFull);
        }

        insert_member(&mut tx, team.id, event.id, user_id).await?;

        tx.commit().await?;
        Ok(team)
    }

    pub async fn list(pool: &PgPool, event_id: Uuid) -> Result<Vec<TeamSummary>, sqlx::Error> {
        sqlx::query_as::<_, TeamSummary>(
            r#"
            SELECT t.id, t.event_id, t.name, t.captain_id, COUNT(m.user_id) AS member_count, t.created_at
            FROM event_teams t
            LEFT JOIN event_team_members m ON m.team_id = t.id
            WHERE t.event_id = $1
            GROUP BY t.id
            ORDER BY t.name
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }
}

async fn insert_member(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    team_id: Uuid,
    event_id: Uuid,
    user_id: &str,
) -> Result<(), EventError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO event_team_members (team_id, event_id, user_id)
        VALUES ($1, $2, $3)
        ON CONFLICT ON CONSTRAINT event_team_members_event_user_key DO NOTHING
        "#,
    )
    .bind(team_id)
    .bind(event_id)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(EventError::AlreadyInTeam);
    }
    Ok(())
}

impl Tournament {
    pub async fn create(pool: &PgPool, event_id: Uuid, data: CreateTournament) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Tournament>(
            r#"
            INSERT INTO event_tournaments (event_id, name, format, max_teams, starts_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, event_id, name, format, max_teams, starts_at, created_at
            "#,
        )
        .bind(event_id)
        .bind(&data.name)
        .bind(data.format)
        .bind(data.max_teams)
        .bind(data.starts_at)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tournament>(
            r#"
            SELECT id, event_id, name, format, max_teams, starts_at, created_at
            FROM event_tournaments
            WHERE event_id = $1
            ORDER BY starts_at NULLS LAST, created_at
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }
}

impl Sponsor {
    pub async fn create(pool: &PgPool, event_id: Uuid, data: CreateSponsor) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Sponsor>(
            r#"
            INSERT INTO event_sponsors (event_id, name, tier, website_url, logo_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, event_id, name, tier, website_url, logo_url, created_at
            "#,
        )
        .bind(event_id)
        .bind(&data.name)
        .bind(data.tier)
        .bind(&data.website_url)
        .bind(&data.logo_url)
        .fetch_one(pool)
        .await
    }

    /// Sponsors by tier rank, then name
    pub async fn list(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let mut sponsors = sqlx::query_as::<_, Sponsor>(
            r#"
            SELECT id, event_id, name, tier, website_url, logo_url, created_at
            FROM event_sponsors
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        sort_sponsors(&mut sponsors);
        Ok(sponsors)
    }
}

pub fn sort_sponsors(sponsors: &mut [Sponsor]) {
    sponsors.sort_by(|a, b| a.tier.rank().cmp(&b.tier.rank()).then_with(|| a.name.cmp(&b.name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Maker Faire 2025"), "maker-faire-2025");
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("Déjà vu"), "d-j-vu");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("robotics-night"));
        assert!(!is_valid_slug("Robotics-Night"));
        assert!(!is_valid_slug("robotics--night"));
        assert!(!is_valid_slug("-robotics"));
        assert!(!is_valid_slug(""));
    }

    fn create_event(slug: Option<&str>, title: &str) -> CreateEvent {
        let starts_at = Utc::now() + Duration::days(7);
        CreateEvent {
            slug: slug.map(str::to_string),
            title: title.to_string(),
            description: None,
            location: None,
            starts_at,
            ends_at: starts_at + Duration::hours(3),
            capacity: None,
            max_team_size: None,
            registration_fee_cents: 0,
        }
    }

    #[test]
    fn test_resolve_slug() {
        assert_eq!(create_event(None, "Drone Race!").resolve_slug().unwrap(), "drone-race");
        assert_eq!(create_event(Some("custom-1"), "x").resolve_slug().unwrap(), "custom-1");
        assert!(matches!(
            create_event(Some("Bad Slug"), "x").resolve_slug(),
            Err(EventError::InvalidSlug(_))
        ));
        assert!(matches!(
            create_event(None, "???").resolve_slug(),
            Err(EventError::InvalidSlug(_))
        ));
    }

    fn event(status: EventStatus, starts_in: Duration) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            microsite_id: None,
            slug: "e".to_string(),
            title: "E".to_string(),
            description: None,
            location: None,
            starts_at: now + starts_in,
            ends_at: now + starts_in + Duration::hours(1),
            capacity: Some(10),
            max_team_size: 4,
            registration_fee_cents: 0,
            status,
            organizer_id: "org".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_check_open() {
        let now = Utc::now();
        assert!(event(EventStatus::Published, Duration::days(1)).check_open(now).is_ok());
        assert!(matches!(
            event(EventStatus::Draft, Duration::days(1)).check_open(now),
            Err(EventError::NotPublished)
        ));
        assert!(matches!(
            event(EventStatus::Published, Duration::hours(-1)).check_open(now),
            Err(EventError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_sponsor_ordering() {
        let sponsor = |name: &str, tier| Sponsor {
            id: Uuid::new_v4(),
            event_id: Uuid::nil(),
            name: name.to_string(),
            tier,
            website_url: None,
            logo_url: None,
            created_at: Utc::now(),
        };
        let mut sponsors = vec![
            sponsor("Zeta", SponsorTier::Community),
            sponsor("Beta", SponsorTier::Gold),
            sponsor("Acme", SponsorTier::Platinum),
            sponsor("Alpha", SponsorTier::Gold),
        ];
        sort_sponsors(&mut sponsors);
        let names: Vec<_> = sponsors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Acme", "Alpha", "Beta", "Zeta"]);
    }
}
