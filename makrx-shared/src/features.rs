/// Feature flag evaluation and caching
///
/// # Rules
///
/// For a flag and a caller `(user_id, roles)`:
///
/// 1. unknown or disabled flag → off
/// 2. non-empty `allowed_roles` not intersecting the caller's roles → off
///    (`super_admin` always intersects)
/// 3. rollout 100 → on, rollout 0 → off
/// 4. otherwise on iff `bucket(key, user_id) < rollout`
///
/// The bucket is the first four bytes (big-endian) of
/// `SHA-256("<key>:<user_id>")` modulo 100, so a user's result is stable for
/// a flag while rollouts of different flags are independent.
///
/// # Example
///
/// ```
/// use makrx_shared::features::bucket;
///
/// let b = bucket("service_marketplace", "user-123");
/// assert!(b < 100);
/// assert_eq!(b, bucket("service_marketplace", "user-123"));
/// ```

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::auth::roles;
use crate::models::feature_flag::FeatureFlag;

/// Gate for every `/services` route
pub const SERVICE_MARKETPLACE: &str = "service_marketplace";

/// Stable rollout bucket in `0..100`
pub fn bucket(key: &str, user_id: &str) -> u32 {
    let digest = Sha256::digest(format!("{key}:{user_id}").as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % 100
}

/// Evaluates a flag for a caller; `None` (unknown flag) is off
pub fn evaluate(flag: Option<&FeatureFlag>, user_id: &str, user_roles: &[String]) -> bool {
    let Some(flag) = flag else {
        return false;
    };

    if !flag.enabled {
        return false;
    }

    if !flag.allowed_roles.is_empty() {
        let is_super_admin = user_roles.iter().any(|r| r == roles::SUPER_ADMIN);
        let intersects = user_roles.iter().any(|r| flag.allowed_roles.contains(r));
        if !is_super_admin && !intersects {
            return false;
        }
    }

    match flag.rollout_percentage {
        p if p >= 100 => true,
        p if p <= 0 => false,
        p => bucket(&flag.key, user_id) < p as u32,
    }
}

type FlagMap = Arc<HashMap<String, FeatureFlag>>;

/// Process-local TTL cache over the `feature_flags` table
///
/// Cloning shares the cache.
#[derive(Clone)]
pub struct FlagCache {
    ttl: Duration,
    entry: Arc<RwLock<Option<(Instant, FlagMap)>>>,
}

impl FlagCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Arc::new(RwLock::new(None)),
        }
    }

    /// Seeds the cache (tests and warm starts)
    pub async fn prime(&self, flags: Vec<FeatureFlag>) {
        let map = flags.into_iter().map(|f| (f.key.clone(), f)).collect();
        *self.entry.write().await = Some((Instant::now(), Arc::new(map)));
    }

    /// All flags, reloading when the cached copy is older than the TTL
    pub async fn flags(&self, pool: &PgPool) -> Result<FlagMap, sqlx::Error> {
        if let Some((loaded_at, flags)) = self.entry.read().await.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(flags));
            }
        }

        let mut entry = self.entry.write().await;
        if let Some((loaded_at, flags)) = entry.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(flags));
            }
        }

        let map: HashMap<String, FeatureFlag> = FeatureFlag::list_all(pool)
            .await?
            .into_iter()
            .map(|f| (f.key.clone(), f))
            .collect();
        let map = Arc::new(map);

        tracing::debug!(count = map.len(), "Feature flags reloaded");
        *entry = Some((Instant::now(), Arc::clone(&map)));
        Ok(map)
    }

    pub async fn is_enabled(
        &self,
        pool: &PgPool,
        key: &str,
        user_id: &str,
        user_roles: &[String],
    ) -> Result<bool, sqlx::Error> {
        let flags = self.flags(pool).await?;
        Ok(evaluate(flags.get(key), user_id, user_roles))
    }

    /// Evaluates every known flag for a caller
    pub async fn evaluate_all(
        &self,
        pool: &PgPool,
        user_id: &str,
        user_roles: &[String],
    ) -> Result<HashMap<String, bool>, sqlx::Error> {
        let flags = self.flags(pool).await?;
        Ok(flags
            .iter()
            .map(|(key, flag)| (key.clone(), evaluate(Some(flag), user_id, user_roles)))
            .collect())
    }

    /// Drops the cached copy; the next read reloads
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}
