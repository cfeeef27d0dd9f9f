/// Equipment and reservations
///
/// Reservations are half-open intervals `[starts_at, ends_at)`; two
/// reservations overlap iff `a.start < b.end && b.start < a.end`, so
/// back-to-back bookings are allowed. The overlap check and the insert run
/// in one transaction that holds a row lock on the equipment, which
/// serializes concurrent bookings of the same machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Longest bookable window
pub const MAX_RESERVATION_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "equipment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    Available,
    InUse,
    Maintenance,
    Offline,
}

impl EquipmentStatus {
    pub fn is_reservable(&self) -> bool {
        matches!(self, EquipmentStatus::Available | EquipmentStatus::InUse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Equipment {
    pub id: Uuid,
    pub makerspace_id: Uuid,
    pub name: String,
    pub equipment_type: String,
    pub status: EquipmentStatus,
    pub location: Option<String>,
    pub hourly_rate_cents: i64,
    pub requires_certification: bool,
    pub specifications: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEquipment {
    pub name: String,
    pub equipment_type: String,
    pub status: Option<EquipmentStatus>,
    pub location: Option<String>,
    pub hourly_rate_cents: i64,
    pub requires_certification: bool,
    pub specifications: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEquipment {
    pub name: Option<String>,
    pub equipment_type: Option<String>,
    pub status: Option<EquipmentStatus>,
    pub location: Option<String>,
    pub hourly_rate_cents: Option<i64>,
    pub requires_certification: Option<bool>,
    pub specifications: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub makerspace_id: Uuid,
    pub user_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub purpose: Option<String>,
    pub status: ReservationStatus,
    pub cost_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservation {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub purpose: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("{0}")]
    InvalidWindow(&'static str),

    #[error("Equipment not found")]
    EquipmentNotFound,

    #[error("Equipment is {0:?} and cannot be reserved")]
    EquipmentUnavailable(EquipmentStatus),

    #[error("Overlaps existing reservation {0}")]
    Overlap(Uuid),

    #[error("Reservation not found")]
    NotFound,

    #[error("Only confirmed reservations can be cancelled")]
    NotCancellable,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Checks ordering, maximum length and that the window isn't in the past
pub fn validate_window(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ReservationError> {
    if ends_at <= starts_at {
        return Err(ReservationError::InvalidWindow("ends_at must be after starts_at"));
    }
    if ends_at - starts_at > Duration::hours(MAX_RESERVATION_HOURS) {
        return Err(ReservationError::InvalidWindow("reservations are limited to 12 hours"));
    }
    if starts_at < now {
        return Err(ReservationError::InvalidWindow("starts_at is in the past"));
    }
    Ok(())
}

/// Half-open interval overlap
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Hourly rate applied to the duration rounded up to whole minutes
///
/// The cent amount is rounded up as well.
pub fn reservation_cost_cents(hourly_rate_cents: i64, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> i64 {
    let seconds = (ends_at - starts_at).num_seconds().max(0);
    let minutes = (seconds + 59) / 60;
    (hourly_rate_cents * minutes + 59) / 60
}

const EQUIPMENT_COLUMNS: &str = "id, makerspace_id, name, equipment_type, status, location, \
     hourly_rate_cents, requires_certification, specifications, created_at, updated_at";

const RESERVATION_COLUMNS: &str = "id, equipment_id, makerspace_id, user_id, starts_at, ends_at, \
     purpose, status, cost_cents, created_at, updated_at";

impl Equipment {
    pub async fn create(pool: &PgPool, makerspace_id: Uuid, data: CreateEquipment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Equipment>(&format!(
            r#"
            INSERT INTO equipment
                (makerspace_id, name, equipment_type, status, location, hourly_rate_cents,
                 requires_certification, specifications)
            VALUES ($1, $2, $3, COALESCE($4, 'available'::equipment_status), $5, $6, $7, COALESCE($8, '{{}}'::jsonb))
            RETURNING {EQUIPMENT_COLUMNS}
            "#
        ))
        .bind(makerspace_id)
        .bind(&data.name)
        .bind(&data.equipment_type)
        .bind(data.status)
        .bind(&data.location)
        .bind(data.hourly_rate_cents)
        .bind(data.requires_certification)
        .bind(&data.specifications)
        .fetch_one(pool)
        .await
    }

    pub async fn find(pool: &PgPool, makerspace_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Equipment>(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = $1 AND makerspace_id = $2"
        ))
        .bind(id)
        .bind(makerspace_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &PgPool,
        makerspace_id: Uuid,
        status: Option<EquipmentStatus>,
        equipment_type: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Equipment>(&format!(
            r#"
            SELECT {EQUIPMENT_COLUMNS}
            FROM equipment
            WHERE makerspace_id = $1
              AND ($2::equipment_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR equipment_type = $3)
            ORDER BY name ASC
            "#
        ))
        .bind(makerspace_id)
        .bind(status)
        .bind(equipment_type)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        makerspace_id: Uuid,
        id: Uuid,
        data: UpdateEquipment,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Equipment>(&format!(
            r#"
            UPDATE equipment
            SET name = COALESCE($3, name),
                equipment_type = COALESCE($4, equipment_type),
                status = COALESCE($5, status),
                location = COALESCE($6, location),
                hourly_rate_cents = COALESCE($7, hourly_rate_cents),
                requires_certification = COALESCE($8, requires_certification),
                specifications = COALESCE($9, specifications),
                updated_at = NOW()
            WHERE id = $1 AND makerspace_id = $2
            RETURNING {EQUIPMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(makerspace_id)
        .bind(data.name)
        .bind(data.equipment_type)
        .bind(data.status)
        .bind(data.location)
        .bind(data.hourly_rate_cents)
        .bind(data.requires_certification)
        .bind(data.specifications)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, makerspace_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM equipment WHERE id = $1 AND makerspace_id = $2")
            .bind(id)
            .bind(makerspace_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl Reservation {
    /// Books equipment for a window
    ///
    /// Returns the reservation together with the locked equipment row.
    pub async fn create(
        pool: &PgPool,
        makerspace_id: Uuid,
        equipment_id: Uuid,
        user_id: &str,
        data: CreateReservation,
    ) -> Result<(Self, Equipment), ReservationError> {
        validate_window(data.starts_at, data.ends_at, Utc::now())?;

        let mut tx = pool.begin().await?;

        let equipment = sqlx::query_as::<_, Equipment>(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = $1 AND makerspace_id = $2 FOR UPDATE"
        ))
        .bind(equipment_id)
        .bind(makerspace_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ReservationError::EquipmentNotFound)?;

        if !equipment.status.is_reservable() {
            return Err(ReservationError::EquipmentUnavailable(equipment.status));
        }

        let conflict: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM equipment_reservations
            WHERE equipment_id = $1
              AND status = 'confirmed'
              AND starts_at < $3
              AND $2 < ends_at
            LIMIT 1
            "#,
        )
        .bind(equipment_id)
        .bind(data.starts_at)
        .bind(data.ends_at)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((existing,)) = conflict {
            return Err(ReservationError::Overlap(existing));
        }

        let cost = reservation_cost_cents(equipment.hourly_rate_cents, data.starts_at, data.ends_at);

        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO equipment_reservations
                (equipment_id, makerspace_id, user_id, starts_at, ends_at, purpose, cost_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(equipment_id)
        .bind(makerspace_id)
        .bind(user_id)
        .bind(data.starts_at)
        .bind(data.ends_at)
        .bind(&data.purpose)
        .bind(cost)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            reservation_id = %reservation.id,
            equipment_id = %equipment_id,
            cost_cents = cost,
            "Reservation confirmed"
        );
        Ok((reservation, equipment))
    }

    pub async fn find(pool: &PgPool, makerspace_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM equipment_reservations WHERE id = $1 AND makerspace_id = $2"
        ))
        .bind(id)
        .bind(makerspace_id)
        .fetch_optional(pool)
        .await
    }

    /// Confirmed reservations intersecting `[from, to)` (either bound optional)
    pub async fn list_confirmed(
        pool: &PgPool,
        equipment_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM equipment_reservations
            WHERE equipment_id = $1
              AND status = 'confirmed'
              AND ($2::timestamptz IS NULL OR ends_at > $2)
              AND ($3::timestamptz IS NULL OR starts_at < $3)
            ORDER BY starts_at ASC
            "#
        ))
        .bind(equipment_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Cancels a confirmed reservation
    pub async fn cancel(pool: &PgPool, makerspace_id: Uuid, id: Uuid) -> Result<Self, ReservationError> {
        let cancelled = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            UPDATE equipment_reservations
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND makerspace_id = $2 AND status = 'confirmed'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(makerspace_id)
        .fetch_optional(pool)
        .await?;

        match cancelled {
            Some(reservation) => Ok(reservation),
            None => match Self::find(pool, makerspace_id, id).await? {
                Some(_) => Err(ReservationError::NotCancellable),
                None => Err(ReservationError::NotFound),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_overlap_is_half_open() {
        assert!(overlaps(at(9, 0), at(11, 0), at(10, 0), at(12, 0)));
        assert!(overlaps(at(9, 0), at(12, 0), at(10, 0), at(11, 0)));
        assert!(!overlaps(at(9, 0), at(10, 0), at(10, 0), at(11, 0)));
        assert!(!overlaps(at(10, 0), at(11, 0), at(9, 0), at(10, 0)));
    }

    #[test]
    fn test_validate_window() {
        let now = at(8, 0);
        assert!(validate_window(at(9, 0), at(10, 0), now).is_ok());
        assert!(validate_window(at(9, 0), at(21, 0), now).is_ok());
        assert!(matches!(
            validate_window(at(10, 0), at(10, 0), now),
            Err(ReservationError::InvalidWindow(_))
        ));
        assert!(matches!(
            validate_window(at(9, 0), at(21, 1), now),
            Err(ReservationError::InvalidWindow(_))
        ));
        assert!(matches!(
            validate_window(at(7, 0), at(9, 0), now),
            Err(ReservationError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_cost_rounds_up_to_minutes() {
        assert_eq!(reservation_cost_cents(6000, at(9, 0), at(10, 0)), 6000);
        assert_eq!(reservation_cost_cents(6000, at(9, 0), at(9, 30)), 3000);
        let start = at(9, 0);
        let end = start + Duration::seconds(61);
        assert_eq!(reservation_cost_cents(6000, start, end), 200);
        assert_eq!(reservation_cost_cents(0, at(9, 0), at(12, 0)), 0);
    }

    #[test]
    fn test_reservable_statuses() {
        assert!(EquipmentStatus::Available.is_reservable());
        assert!(EquipmentStatus::InUse.is_reservable());
        assert!(!EquipmentStatus::Maintenance.is_reservable());
        assert!(!EquipmentStatus::Offline.is_reservable());
    }
}
