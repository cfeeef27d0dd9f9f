/// MakrX Events endpoints
///
/// # Endpoints
///
/// ```text
/// POST /api/v1/microsites                         create a microsite
/// GET  /api/v1/microsites/:slug
/// GET  /api/v1/microsites/:slug/events            sub-events (drafts for the owner)
/// POST /api/v1/microsites/:slug/events            owner creates a sub-event
///
/// POST /api/v1/events                             create a top-level draft
/// GET  /api/v1/events?mine=true                   published, or the caller's own
/// GET  /api/v1/events/:id
/// PUT  /api/v1/events/:id                         organizer
/// POST /api/v1/events/:id/publish | /cancel       organizer
/// POST /api/v1/events/:id/register
/// DELETE /api/v1/events/:id/registration
/// GET  /api/v1/events/:id/registrations           organizer
/// GET|POST /api/v1/events/:id/teams
/// POST /api/v1/events/:id/teams/:team_id/join
/// GET|POST /api/v1/events/:id/tournaments         organizer creates
/// GET|POST /api/v1/events/:id/sponsors            organizer creates
/// ```
///
/// Draft events are only visible to their organizer; everyone else gets 404.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use makrx_shared::{
    auth::{authorization::AuthzError, middleware::AuthContext},
    models::{
        event::{
            CreateEvent, CreateMicrosite, CreateSponsor, CreateTournament, Event, EventStatus, Microsite,
            Registration, Sponsor, SponsorTier, Team, TeamSummary, Tournament, TournamentFormat, UpdateEvent,
        },
        notification::Notification,
    },
    notifications::NotificationKind,
    pagination::PageParams,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMicrositeRequest {
    #[validate(length(min = 1, max = 100, message = "Slug must be 1-100 characters"))]
    pub slug: String,

    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MicrositeResponse {
    #[serde(flatten)]
    pub microsite: Microsite,
    pub events: Vec<Event>,
}

/// Event creation request
///
/// When `slug` is omitted it is derived from the title.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 100, message = "Slug must be 1-100 characters"))]
    pub slug: Option<String>,

    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,

    #[validate(range(min = 1, message = "Capacity must be at least 1"))]
    pub capacity: Option<i32>,

    #[validate(range(min = 1, max = 100, message = "Team size must be 1-100"))]
    pub max_team_size: Option<i32>,

    #[validate(range(min = 0, message = "Fee must not be negative"))]
    #[serde(default)]
    pub registration_fee_cents: i64,
}

impl From<CreateEventRequest> for CreateEvent {
    fn from(req: CreateEventRequest) -> Self {
        Self {
            slug: req.slug,
            title: req.title,
            description: req.description,
            location: req.location,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            capacity: req.capacity,
            max_team_size: req.max_team_size,
            registration_fee_cents: req.registration_fee_cents,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Capacity must be at least 1"))]
    pub capacity: Option<i32>,
    #[validate(range(min = 1, max = 100, message = "Team size must be 1-100"))]
    pub max_team_size: Option<i32>,
    #[validate(range(min = 0, message = "Fee must not be negative"))]
    pub registration_fee_cents: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, max = 100, message = "Team name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTournamentRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    pub format: TournamentFormat,
    #[validate(range(min = 2, message = "A tournament needs at least 2 teams"))]
    pub max_teams: i32,
    pub starts_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSponsorRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    pub tier: SponsorTier,
    #[validate(url(message = "Website must be a valid URL"))]
    pub website_url: Option<String>,
    #[validate(url(message = "Logo must be a valid URL"))]
    pub logo_url: Option<String>,
}

pub async fn create_microsite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateMicrositeRequest>,
) -> ApiResult<(StatusCode, Json<Microsite>)> {
    req.validate()?;

    let microsite = Microsite::create(
        &state.db,
        &auth.user_id,
        CreateMicrosite {
            slug: req.slug,
            title: req.title,
            description: req.description,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(microsite)))
}

/// Microsite with its published sub-events
pub async fn get_microsite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(slug): Path<String>,
) -> ApiResult<Json<MicrositeResponse>> {
    let microsite = find_microsite(&state, &slug).await?;
    let include_drafts = is_owner(&auth, &microsite.owner_id);
    let events = Event::list_for_microsite(&state.db, microsite.id, include_drafts).await?;

    Ok(Json(MicrositeResponse { microsite, events }))
}

pub async fn list_microsite_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<Event>>> {
    let microsite = find_microsite(&state, &slug).await?;
    let include_drafts = is_owner(&auth, &microsite.owner_id);
    Ok(Json(Event::list_for_microsite(&state.db, microsite.id, include_drafts).await?))
}

/// Create a sub-event (microsite owner)
///
/// Slugs are unique per microsite.
pub async fn create_microsite_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(slug): Path<String>,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    let microsite = find_microsite(&state, &slug).await?;
    if !is_owner(&auth, &microsite.owner_id) {
        return Err(AuthzError::NotAuthorized.into());
    }
    req.validate()?;

    let event = Event::create(&state.db, &auth.user_id, Some(microsite.id), req.into()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Create a top-level event in `draft`
pub async fn create_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    req.validate()?;
    let event = Event::create(&state.db, &auth.user_id, None, req.into()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageParams>,
    Query(query): Query<EventListQuery>,
) -> ApiResult<Json<Vec<Event>>> {
    let pagination = page.validate()?;
    let organizer = query.mine.then_some(auth.user_id.as_str());
    Ok(Json(Event::list(&state.db, organizer, pagination).await?))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Event>> {
    Ok(Json(find_visible(&state, &auth, id).await?))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEventRequest>,
) -> ApiResult<Json<Event>> {
    find_organized(&state, &auth, id).await?;
    req.validate()?;

    let event = Event::update(
        &state.db,
        id,
        UpdateEvent {
            title: req.title,
            description: req.description,
            location: req.location,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            capacity: req.capacity,
            max_team_size: req.max_team_size,
            registration_fee_cents: req.registration_fee_cents,
        },
    )
    .await?;

    Ok(Json(event))
}

pub async fn publish_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Event>> {
    find_organized(&state, &auth, id).await?;
    let event = Event::publish(&state.db, id).await?;
    tracing::info!(event_id = %id, "Event published");
    Ok(Json(event))
}

pub async fn cancel_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Event>> {
    find_organized(&state, &auth, id).await?;
    let event = Event::cancel(&state.db, id).await?;
    tracing::info!(event_id = %id, "Event cancelled");
    Ok(Json(event))
}

/// Register the caller
///
/// # Errors
///
/// `409 Conflict` when the event is not published, has started, is full,
/// or the caller is already registered.
pub async fn register(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    let (registration, event) = Registration::register(&state.db, id, &auth.user_id).await?;

    Notification::notify(
        &state.db,
        &auth.user_id,
        NotificationKind::EventRegistration,
        HashMap::from([
            ("event_title".to_string(), event.title.clone()),
            ("starts_at".to_string(), event.starts_at.format("%Y-%m-%d %H:%M UTC").to_string()),
        ]),
    )
    .await;

    Ok((StatusCode::CREATED, Json(registration)))
}

/// Unregister the caller; also drops their team membership
pub async fn unregister(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !Registration::unregister(&state.db, id, &auth.user_id).await? {
        return Err(ApiError::not_found("Registration"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Registration>>> {
    find_organized(&state, &auth, id).await?;
    Ok(Json(Registration::list(&state.db, id).await?))
}

pub async fn list_teams(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<TeamSummary>>> {
    find_visible(&state, &auth, id).await?;
    Ok(Json(Team::list(&state.db, id).await?))
}

/// Create a team; the caller must be registered and becomes captain
pub async fn create_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<Team>)> {
    find_visible(&state, &auth, id).await?;
    req.validate()?;

    let team = Team::create(&state.db, id, &auth.user_id, req.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn join_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, team_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Team>> {
    let event = find_visible(&state, &auth, id).await?;
    let team = Team::join(&state.db, &event, team_id, &auth.user_id).await?;
    Ok(Json(team))
}

pub async fn list_tournaments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Tournament>>> {
    find_visible(&state, &auth, id).await?;
    Ok(Json(Tournament::list(&state.db, id).await?))
}

pub async fn create_tournament(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateTournamentRequest>,
) -> ApiResult<(StatusCode, Json<Tournament>)> {
    find_organized(&state, &auth, id).await?;
    req.validate()?;

    let tournament = Tournament::create(
        &state.db,
        id,
        CreateTournament {
            name: req.name,
            format: req.format,
            max_teams: req.max_teams,
            starts_at: req.starts_at,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(tournament)))
}

pub async fn list_sponsors(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Sponsor>>> {
    find_visible(&state, &auth, id).await?;
    Ok(Json(Sponsor::list(&state.db, id).await?))
}

pub async fn create_sponsor(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateSponsorRequest>,
) -> ApiResult<(StatusCode, Json<Sponsor>)> {
    find_organized(&state, &auth, id).await?;
    req.validate()?;

    let sponsor = Sponsor::create(
        &state.db,
        id,
        CreateSponsor {
            name: req.name,
            tier: req.tier,
            website_url: req.website_url,
            logo_url: req.logo_url,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(sponsor)))
}

fn is_owner(auth: &AuthContext, owner_id: &str) -> bool {
    auth.user_id == owner_id || auth.is_super_admin()
}

async fn find_microsite(state: &AppState, slug: &str) -> ApiResult<Microsite> {
    Microsite::find_by_slug(&state.db, slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Microsite"))
}

async fn find_visible(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<Event> {
    let event = Event::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;

    if event.status == EventStatus::Draft && !is_owner(auth, &event.organizer_id) {
        return Err(ApiError::not_found("Event"));
    }

    Ok(event)
}

async fn find_organized(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<Event> {
    let event = find_visible(state, auth, id).await?;
    if !is_owner(auth, &event.organizer_id) {
        return Err(AuthzError::NotAuthorized.into());
    }
    Ok(event)
}
