/// Fabrication service providers
///
/// Capacity counters (`current_jobs`) are only changed with conditional
/// updates so concurrent dispatches can never overfill a provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::service_order::ServiceType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Provider {
    pub id: Uuid,
    pub user_id: String,
    pub business_name: String,
    pub services: Vec<ServiceType>,
    pub materials: Vec<String>,
    pub rating: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: f64,
    pub avg_response_minutes: Option<f64>,
    pub response_samples: i32,
    pub max_concurrent_jobs: i32,
    pub current_jobs: i32,
    pub completed_jobs: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn location(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    pub fn free_capacity(&self) -> i32 {
        (self.max_concurrent_jobs - self.current_jobs).max(0)
    }

    pub fn offers_material(&self, material: &str) -> bool {
        self.materials.iter().any(|m| m.eq_ignore_ascii_case(material))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProvider {
    pub business_name: String,
    pub services: Vec<ServiceType>,
    pub materials: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: Option<f64>,
    pub max_concurrent_jobs: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProvider {
    pub business_name: Option<String>,
    pub services: Option<Vec<ServiceType>>,
    pub materials: Option<Vec<String>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: Option<f64>,
    pub max_concurrent_jobs: Option<i32>,
    pub is_active: Option<bool>,
}

const PROVIDER_COLUMNS: &str = "id, user_id, business_name, services, materials, rating, latitude, \
     longitude, service_radius_km, avg_response_minutes, response_samples, max_concurrent_jobs, \
     current_jobs, completed_jobs, is_active, created_at, updated_at";

impl Provider {
    /// Registers a provider profile for a user
    ///
    /// # Errors
    ///
    /// Unique violation on `service_providers_user_id_key` if the user
    /// already has a profile.
    pub async fn create(pool: &PgPool, user_id: &str, data: CreateProvider) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Provider>(&format!(
            r#"
            INSERT INTO service_providers
                (user_id, business_name, services, materials, latitude, longitude,
                 service_radius_km, max_concurrent_jobs)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 50), COALESCE($8, 5))
            RETURNING {PROVIDER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&data.business_name)
        .bind(&data.services)
        .bind(&data.materials)
        .bind(data.latitude)
        .bind(data.longitude)
        .bind(data.service_radius_km)
        .bind(data.max_concurrent_jobs)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Provider>(&format!("SELECT {PROVIDER_COLUMNS} FROM service_providers WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_user(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Provider>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM service_providers WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateProvider) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Provider>(&format!(
            r#"
            UPDATE service_providers
            SET business_name = COALESCE($2, business_name),
                services = COALESCE($3, services),
                materials = COALESCE($4, materials),
                latitude = COALESCE($5, latitude),
                longitude = COALESCE($6, longitude),
                service_radius_km = COALESCE($7, service_radius_km),
                max_concurrent_jobs = COALESCE($8, max_concurrent_jobs),
                is_active = COALESCE($9, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROVIDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.business_name)
        .bind(data.services)
        .bind(data.materials)
        .bind(data.latitude)
        .bind(data.longitude)
        .bind(data.service_radius_km)
        .bind(data.max_concurrent_jobs)
        .bind(data.is_active)
        .fetch_optional(pool)
        .await
    }

    /// Providers offering a service type, active or not
    ///
    /// Inactive providers are returned so the ranking can report them as
    /// rejected.
    pub async fn list_offering(conn: &mut PgConnection, service_type: ServiceType) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Provider>(&format!(
            r#"
            SELECT {PROVIDER_COLUMNS}
            FROM service_providers
            WHERE $1 = ANY(services)
            ORDER BY id
            "#
        ))
        .bind(service_type)
        .fetch_all(conn)
        .await
    }

    /// Takes one capacity slot; `false` when the provider is full or inactive
    pub async fn reserve_capacity(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE service_providers
            SET current_jobs = current_jobs + 1, updated_at = NOW()
            WHERE id = $1 AND is_active AND current_jobs < max_concurrent_jobs
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Gives back a capacity slot
    pub async fn release_capacity(conn: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE service_providers
            SET current_jobs = GREATEST(current_jobs - 1, 0), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Releases the slot and counts the job as completed
    pub async fn record_completion(conn: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE service_providers
            SET current_jobs = GREATEST(current_jobs - 1, 0),
                completed_jobs = completed_jobs + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Folds one response time into the running average
    pub async fn record_response(conn: &mut PgConnection, id: Uuid, minutes: f64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE service_providers
            SET avg_response_minutes =
                    (COALESCE(avg_response_minutes, 0) * response_samples + $2) / (response_samples + 1),
                response_samples = response_samples + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(minutes)
        .execute(conn)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> Provider {
        Provider {
            id: Uuid::new_v4(),
            user_id: "u".to_string(),
            business_name: "Print Hub".to_string(),
            services: vec![ServiceType::Printing3d],
            materials: vec!["PLA".to_string(), "PETG".to_string()],
            rating: 4.5,
            latitude: Some(12.97),
            longitude: Some(77.59),
            service_radius_km: 25.0,
            avg_response_minutes: None,
            response_samples: 0,
            max_concurrent_jobs: 5,
            current_jobs: 2,
            completed_jobs: 10,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_offers_material_case_insensitive() {
        let p = provider();
        assert!(p.offers_material("pla"));
        assert!(p.offers_material("Petg"));
        assert!(!p.offers_material("resin"));
    }

    #[test]
    fn test_free_capacity() {
        let mut p = provider();
        assert_eq!(p.free_capacity(), 3);
        p.current_jobs = 7;
        assert_eq!(p.free_capacity(), 0);
    }
}
