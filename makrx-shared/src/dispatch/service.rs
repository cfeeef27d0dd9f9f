/// Service-order dispatch and provider job actions
///
/// [`DispatchService`] owns every write that moves a service order between
/// states once it exists. Each operation runs in a single transaction that
/// holds the order's row lock; store sync and the customer notification are
/// published after commit and never fail the operation.
///
/// # Dispatch
///
/// ```text
/// dispatch_order(id)
///   ├─> lock order (SKIP LOCKED), require pending
///   ├─> rank providers offering the service type
///   ├─> for each match: reserve capacity (conditional), first success wins
///   │     └─> insert offer, order → assigned
///   └─> nothing reserved: attempts + 1, next_dispatch_at = now + backoff
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::matcher::{rank_providers, JobRequirements, MatchResult, ProviderMatch};
use super::scoring::MatchWeights;
use crate::integration::StoreSync;
use crate::models::notification::Notification;
use crate::models::provider::Provider;
use crate::models::service_order::{
    AssignmentStatus, JobAssignment, ServiceOrder, ServiceOrderStatus, TransitionError,
};
use crate::notifications::NotificationKind;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Service order not found")]
    NotFound,

    #[error("Service order is {0:?}, not pending")]
    NotPending(ServiceOrderStatus),

    #[error("Service order is being dispatched by another worker")]
    Busy,

    #[error("No eligible provider: {reason}")]
    NoEligibleProvider {
        reason: String,
        next_attempt_at: DateTime<Utc>,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Exponential backoff between dispatch attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_secs: u64,
    pub cap_secs: u64,
    /// Orders at this many attempts are left for manual dispatch
    pub max_attempts: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_secs: 60,
            cap_secs: 3600,
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// `min(base · 2^attempts, cap)` seconds
    pub fn delay_for(&self, attempts: i32) -> Duration {
        let exponent = u32::try_from(attempts.max(0)).unwrap_or(0);
        let secs = 2u64
            .checked_pow(exponent)
            .and_then(|factor| self.base_secs.checked_mul(factor))
            .map_or(self.cap_secs, |secs| secs.min(self.cap_secs));

        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }

    pub fn is_exhausted(&self, attempts: i32) -> bool {
        attempts >= self.max_attempts
    }
}

/// A successful dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub order: ServiceOrder,
    pub assignment: JobAssignment,
    pub matched: ProviderMatch,
}

/// Who is asking for a customer-side change
#[derive(Debug, Clone, Copy)]
pub struct Requester<'a> {
    pub user_id: &'a str,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct DispatchService {
    pool: PgPool,
    weights: MatchWeights,
    retry: RetryPolicy,
    store_sync: Arc<dyn StoreSync>,
}

impl DispatchService {
    pub fn new(pool: PgPool, store_sync: Arc<dyn StoreSync>) -> Self {
        Self {
            pool,
            weights: MatchWeights::default(),
            retry: RetryPolicy::default(),
            store_sync,
        }
    }

    pub fn with_weights(mut self, weights: MatchWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Ranks candidates for an order without changing anything
    pub async fn preview(&self, order_id: Uuid) -> Result<MatchResult, DispatchError> {
        let order = ServiceOrder::find_by_id(&self.pool, order_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        let mut conn = self.pool.acquire().await?;
        let providers = Provider::list_offering(&mut conn, order.service_type).await?;

        Ok(rank_providers(&JobRequirements::from(&order), &providers, &self.weights))
    }

    /// Offers a pending order to the best available provider
    ///
    /// # Errors
    ///
    /// - `NotFound` / `NotPending` / `Busy` when the order can't be dispatched now
    /// - `NoEligibleProvider` after recording the failed attempt and its retry time
    pub async fn dispatch_order(&self, order_id: Uuid) -> Result<DispatchOutcome, DispatchError> {
        let mut tx = self.pool.begin().await?;

        let order = match ServiceOrder::try_lock(&mut tx, order_id).await? {
            Some(order) => order,
            None => {
                drop(tx);
                return match ServiceOrder::find_by_id(&self.pool, order_id).await? {
                    Some(_) => Err(DispatchError::Busy),
                    None => Err(DispatchError::NotFound),
                };
            }
        };

        if order.status != ServiceOrderStatus::Pending {
            return Err(DispatchError::NotPending(order.status));
        }

        let providers = Provider::list_offering(&mut tx, order.service_type).await?;
        let ranking = rank_providers(&JobRequirements::from(&order), &providers, &self.weights);

        for candidate in &ranking.matches {
            if !Provider::reserve_capacity(&mut tx, candidate.provider_id).await? {
                tracing::debug!(
                    order_id = %order_id,
                    provider_id = %candidate.provider_id,
                    "Provider filled up during dispatch, trying next candidate"
                );
                continue;
            }

            let breakdown = serde_json::json!({
                "rating": candidate.score.rating,
                "distance": candidate.score.distance,
                "response": candidate.score.response,
                "capacity": candidate.score.capacity,
                "experience": candidate.score.experience,
                "total": candidate.score.total,
                "distance_km": candidate.distance_km,
            });

            let assignment = JobAssignment::create_offer(
                &mut tx,
                order_id,
                candidate.provider_id,
                candidate.score.total,
                breakdown,
            )
            .await?;
            let order = ServiceOrder::assign(&mut tx, order_id, candidate.provider_id).await?;

            tx.commit().await?;

            tracing::info!(
                order_id = %order_id,
                provider_id = %candidate.provider_id,
                score = candidate.score.total,
                candidates = ranking.matches.len(),
                "Service order offered to provider"
            );

            self.publish_status_change(&order).await;

            return Ok(DispatchOutcome {
                order,
                assignment,
                matched: candidate.clone(),
            });
        }

        let reason = if ranking.matches.is_empty() {
            ranking.rejection_summary()
        } else {
            "every eligible provider reached capacity during dispatch".to_string()
        };
        let next_attempt_at = Utc::now() + self.retry.delay_for(order.dispatch_attempts);

        let updated = ServiceOrder::record_dispatch_failure(&mut tx, order_id, &reason, next_attempt_at).await?;
        tx.commit().await?;

        if self.retry.is_exhausted(updated.dispatch_attempts) {
            tracing::warn!(
                order_id = %order_id,
                attempts = updated.dispatch_attempts,
                reason = %reason,
                "Service order exhausted dispatch attempts, needs manual dispatch"
            );
        } else {
            tracing::info!(
                order_id = %order_id,
                attempts = updated.dispatch_attempts,
                next_attempt_at = %next_attempt_at,
                reason = %reason,
                "No provider available, dispatch rescheduled"
            );
        }

        Err(DispatchError::NoEligibleProvider {
            reason,
            next_attempt_at,
        })
    }

    /// Provider accepts the offer; the response time feeds their average
    pub async fn accept(&self, order_id: Uuid, provider: &Provider) -> Result<ServiceOrder, DispatchError> {
        let mut tx = self.pool.begin().await?;
        lock_assigned_to(&mut tx, order_id, provider.id).await?;

        let order = ServiceOrder::transition(
            &mut tx,
            order_id,
            ServiceOrderStatus::Accepted,
            Some(&provider.user_id),
            None,
        )
        .await?;

        if let Some(offer) = JobAssignment::find_open(&mut tx, order_id).await? {
            JobAssignment::resolve(&mut tx, offer.id, AssignmentStatus::Accepted).await?;
            let minutes = response_minutes(offer.offered_at, Utc::now());
            Provider::record_response(&mut tx, provider.id, minutes).await?;
        }

        tx.commit().await?;
        tracing::info!(order_id = %order_id, provider_id = %provider.id, "Offer accepted");

        self.publish_status_change(&order).await;
        Ok(order)
    }

    /// Provider declines; the order goes back to the pool without them
    pub async fn decline(&self, order_id: Uuid, provider: &Provider) -> Result<ServiceOrder, DispatchError> {
        let mut tx = self.pool.begin().await?;
        lock_assigned_to(&mut tx, order_id, provider.id).await?;

        let order = release_offer(
            &mut tx,
            order_id,
            provider.id,
            AssignmentStatus::Declined,
            Some(&provider.user_id),
            "declined by provider",
        )
        .await?;

        tx.commit().await?;
        tracing::info!(order_id = %order_id, provider_id = %provider.id, "Offer declined");

        self.publish_status_change(&order).await;
        Ok(order)
    }

    pub async fn start(&self, order_id: Uuid, provider: &Provider) -> Result<ServiceOrder, DispatchError> {
        let mut tx = self.pool.begin().await?;
        lock_assigned_to(&mut tx, order_id, provider.id).await?;

        let order = ServiceOrder::transition(
            &mut tx,
            order_id,
            ServiceOrderStatus::InProgress,
            Some(&provider.user_id),
            None,
        )
        .await?;

        tx.commit().await?;
        self.publish_status_change(&order).await;
        Ok(order)
    }

    /// Finishes the job and frees the provider's slot
    pub async fn complete(&self, order_id: Uuid, provider: &Provider) -> Result<ServiceOrder, DispatchError> {
        let mut tx = self.pool.begin().await?;
        lock_assigned_to(&mut tx, order_id, provider.id).await?;

        let order = ServiceOrder::transition(
            &mut tx,
            order_id,
            ServiceOrderStatus::Completed,
            Some(&provider.user_id),
            None,
        )
        .await?;
        Provider::record_completion(&mut tx, provider.id).await?;

        tx.commit().await?;
        tracing::info!(order_id = %order_id, provider_id = %provider.id, "Service order completed");

        self.publish_status_change(&order).await;
        Ok(order)
    }

    /// Customer (or admin) cancellation
    ///
    /// Orders belonging to someone else behave as not found.
    pub async fn cancel(&self, order_id: Uuid, requester: Requester<'_>) -> Result<ServiceOrder, DispatchError> {
        let mut tx = self.pool.begin().await?;

        let current = ServiceOrder::lock(&mut tx, order_id)
            .await?
            .ok_or(DispatchError::NotFound)?;
        if current.customer_id != requester.user_id && !requester.is_admin {
            return Err(DispatchError::NotFound);
        }

        let order = ServiceOrder::transition(
            &mut tx,
            order_id,
            ServiceOrderStatus::Cancelled,
            Some(requester.user_id),
            None,
        )
        .await?;

        if current.status.holds_capacity() {
            if let Some(provider_id) = current.provider_id {
                Provider::release_capacity(&mut tx, provider_id).await?;
            }
        }
        if let Some(offer) = JobAssignment::find_open(&mut tx, order_id).await? {
            JobAssignment::resolve(&mut tx, offer.id, AssignmentStatus::Cancelled).await?;
        }

        tx.commit().await?;
        tracing::info!(order_id = %order_id, from = current.status.as_str(), "Service order cancelled");

        self.publish_status_change(&order).await;
        Ok(order)
    }

    /// Expires offers left unanswered for longer than `timeout`
    ///
    /// Returns how many offers were expired.
    pub async fn expire_offers(&self, timeout: Duration, limit: i64) -> Result<usize, DispatchError> {
        let cutoff = Utc::now() - timeout;
        let stale = JobAssignment::list_stale(&self.pool, cutoff, limit).await?;
        let mut expired = 0;

        for offer in stale {
            let mut tx = self.pool.begin().await?;

            let order = match ServiceOrder::try_lock(&mut tx, offer.order_id).await? {
                Some(order) => order,
                None => continue,
            };

            if order.status != ServiceOrderStatus::Assigned || order.provider_id != Some(offer.provider_id) {
                // Offer outlived its order's assignment; just close it
                JobAssignment::resolve(&mut tx, offer.id, AssignmentStatus::Expired).await?;
                tx.commit().await?;
                continue;
            }

            let order = release_offer(
                &mut tx,
                order.id,
                offer.provider_id,
                AssignmentStatus::Expired,
                None,
                "offer expired",
            )
            .await?;

            tx.commit().await?;
            expired += 1;

            tracing::info!(
                order_id = %order.id,
                provider_id = %offer.provider_id,
                offered_at = %offer.offered_at,
                "Offer expired, order returned to pending"
            );

            self.publish_status_change(&order).await;
        }

        Ok(expired)
    }

    /// Pushes the new status to the store and notifies the customer
    pub async fn publish_status_change(&self, order: &ServiceOrder) {
        if let Some(store_order_id) = order.store_order_id {
            if let Err(e) = self
                .store_sync
                .push_service_status(store_order_id, order.id, order.status)
                .await
            {
                tracing::warn!(
                    order_id = %order.id,
                    store_order_id = %store_order_id,
                    error = %e,
                    "Store sync failed"
                );
            }
        }

        Notification::notify(
            &self.pool,
            &order.customer_id,
            NotificationKind::ServiceOrderUpdate,
            status_vars(order),
        )
        .await;
    }
}

/// Locks an order and checks it is assigned to `provider_id`
async fn lock_assigned_to(
    conn: &mut PgConnection,
    order_id: Uuid,
    provider_id: Uuid,
) -> Result<ServiceOrder, DispatchError> {
    let order = ServiceOrder::lock(conn, order_id)
        .await?
        .ok_or(DispatchError::NotFound)?;

    if order.provider_id != Some(provider_id) {
        return Err(DispatchError::NotFound);
    }

    Ok(order)
}

/// Closes the open offer, frees the slot, excludes the provider and
/// returns the order to pending
async fn release_offer(
    conn: &mut PgConnection,
    order_id: Uuid,
    provider_id: Uuid,
    outcome: AssignmentStatus,
    actor_id: Option<&str>,
    note: &str,
) -> Result<ServiceOrder, DispatchError> {
    let order = ServiceOrder::transition(
        &mut *conn,
        order_id,
        ServiceOrderStatus::Pending,
        actor_id,
        Some(note),
    )
    .await?;

    if let Some(offer) = JobAssignment::find_open(&mut *conn, order_id).await? {
        JobAssignment::resolve(&mut *conn, offer.id, outcome).await?;
    }
    Provider::release_capacity(&mut *conn, provider_id).await?;
    ServiceOrder::exclude_provider(&mut *conn, order_id, provider_id).await?;

    Ok(order)
}

fn response_minutes(offered_at: DateTime<Utc>, responded_at: DateTime<Utc>) -> f64 {
    let seconds = (responded_at - offered_at).num_seconds().max(0);
    seconds as f64 / 60.0
}

fn status_vars(order: &ServiceOrder) -> HashMap<String, String> {
    HashMap::from([
        ("service_type".to_string(), order.service_type.as_str().to_string()),
        ("order_id".to_string(), order.id.to_string()),
        ("status".to_string(), order.status.as_str().to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::seconds(60));
        assert_eq!(policy.delay_for(1), Duration::seconds(120));
        assert_eq!(policy.delay_for(3), Duration::seconds(480));
        assert_eq!(policy.delay_for(5), Duration::seconds(1920));
        assert_eq!(policy.delay_for(6), Duration::seconds(3600));
        assert_eq!(policy.delay_for(40), Duration::seconds(3600));
        assert_eq!(policy.delay_for(200), Duration::seconds(3600));
    }

    #[test]
    fn test_backoff_negative_attempts() {
        assert_eq!(RetryPolicy::default().delay_for(-3), Duration::seconds(60));
    }

    #[test]
    fn test_exhausted() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(9));
        assert!(policy.is_exhausted(10));
    }

    #[test]
    fn test_response_minutes() {
        let offered = Utc::now();
        assert_eq!(response_minutes(offered, offered + Duration::seconds(90)), 1.5);
        assert_eq!(response_minutes(offered, offered - Duration::seconds(30)), 0.0);
    }

    #[test]
    fn test_status_vars_render() {
        let order = ServiceOrder {
            id: Uuid::nil(),
            customer_id: "user-1".to_string(),
            service_type: crate::models::service_order::ServiceType::LaserCutting,
            material: "acrylic".to_string(),
            quantity: 2,
            priority: Default::default(),
            specifications: serde_json::json!({}),
            quoted_total_cents: 1000,
            delivery_latitude: None,
            delivery_longitude: None,
            status: ServiceOrderStatus::Accepted,
            provider_id: None,
            store_order_id: None,
            excluded_provider_ids: vec![],
            dispatch_attempts: 0,
            next_dispatch_at: Utc::now(),
            last_dispatch_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let rendered = NotificationKind::ServiceOrderUpdate.render(&status_vars(&order)).unwrap();
        assert_eq!(
            rendered.body,
            "Your laser_cutting order 00000000-0000-0000-0000-000000000000 is now accepted."
        );
    }
}
