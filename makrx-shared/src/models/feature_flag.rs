/// Feature flag rows
///
/// Evaluation lives in [`crate::features`]; this module only persists flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeatureFlag {
    pub key: String,
    pub enabled: bool,
    /// 0..=100
    pub rollout_percentage: i32,
    /// Empty means every role
    pub allowed_roles: Vec<String>,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertFeatureFlag {
    pub enabled: bool,
    pub rollout_percentage: i32,
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    pub description: Option<String>,
}

impl FeatureFlag {
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FeatureFlag>(
            "SELECT key, enabled, rollout_percentage, allowed_roles, description, updated_at FROM feature_flags ORDER BY key",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn upsert(pool: &PgPool, key: &str, data: UpsertFeatureFlag) -> Result<Self, sqlx::Error> {
        let flag = sqlx::query_as::<_, FeatureFlag>(
            r#"
            INSERT INTO feature_flags (key, enabled, rollout_percentage, allowed_roles, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO UPDATE
            SET enabled = EXCLUDED.enabled,
                rollout_percentage = EXCLUDED.rollout_percentage,
                allowed_roles = EXCLUDED.allowed_roles,
                description = COALESCE(EXCLUDED.description, feature_flags.description),
                updated_at = NOW()
            RETURNING key, enabled, rollout_percentage, allowed_roles, description, updated_at
            "#,
        )
        .bind(key)
        .bind(data.enabled)
        .bind(data.rollout_percentage)
        .bind(&data.allowed_roles)
        .bind(&data.description)
        .fetch_one(pool)
        .await?;

        tracing::info!(
            key = %flag.key,
            enabled = flag.enabled,
            rollout = flag.rollout_percentage,
            "Feature flag updated"
        );
        Ok(flag)
    }
}
