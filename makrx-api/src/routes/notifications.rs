/// Notification inbox endpoints
///
/// Every read/update/delete is scoped to the caller; another user's
/// notification id answers 404.
///
/// # Endpoints
///
/// - `GET /api/v1/notifications?unread_only&page&per_page`
/// - `GET /api/v1/notifications/unread-count`
/// - `POST /api/v1/notifications/:id/read`
/// - `POST /api/v1/notifications/read-all`
/// - `DELETE /api/v1/notifications/:id`
/// - `POST /api/v1/notifications` - send (realm admin)

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
    models::notification::{NewNotification, Notification, NotificationPriority},
    notifications::NotificationKind,
    pagination::{Page, PageParams},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// Send request
///
/// ```json
/// {
///   "user_ids": ["user-1", "user-2"],
///   "kind": "system_announcement",
///   "vars": { "title": "Maintenance", "message": "Laser bay closed Friday" },
///   "priority": "high"
/// }
/// ```
#[derive(Debug, Deserialize, Validate)]
pub struct SendNotificationRequest {
    #[validate(length(min = 1, max = 1000, message = "Between 1 and 1000 recipients"))]
    pub user_ids: Vec<String>,

    pub kind: NotificationKind,

    #[serde(default)]
    pub vars: HashMap<String, String>,

    /// Overrides the kind's default priority
    pub priority: Option<NotificationPriority>,
}

#[derive(Debug, Serialize)]
pub struct SendNotificationResponse {
    pub sent: usize,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageParams>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Json<Page<Notification>>> {
    let pagination = page.validate()?;

    let (items, total) =
        Notification::list_for_user(&state.db, &auth.user_id, query.unread_only, pagination).await?;
    Ok(Json(Page::new(items, pagination, total)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let unread = Notification::unread_count(&state.db, &auth.user_id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = Notification::mark_read(&state.db, id, &auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let updated = Notification::mark_all_read(&state.db, &auth.user_id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !Notification::delete(&state.db, id, &auth.user_id).await? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Send a templated notification to a list of users (realm admin)
///
/// The template is rendered before anything is stored, so a missing
/// variable fails the whole request with 422. All rows are inserted in one
/// transaction.
pub async fn send_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SendNotificationRequest>,
) -> ApiResult<(StatusCode, Json<SendNotificationResponse>)> {
    require_admin(&auth)?;
    req.validate()?;

    let mut pending = Vec::with_capacity(req.user_ids.len());
    for user_id in &req.user_ids {
        let mut new = NewNotification::from_template(user_id.as_str(), req.kind, &req.vars)?;
        if let Some(priority) = req.priority {
            new = new.with_priority(priority);
        }
        pending.push(new);
    }

    let mut tx = state.db.begin().await?;
    for new in &pending {
        Notification::create(&mut *tx, new).await?;
    }
    tx.commit().await?;

    tracing::info!(
        kind = req.kind.as_str(),
        recipients = pending.len(),
        sender = %auth.user_id,
        "Notifications sent"
    );

    Ok((StatusCode::CREATED, Json(SendNotificationResponse { sent: pending.len() })))
}
