use crate::{db::Db, models::BookingRow};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

#[derive(Clone)]
pub struct BookingRepo {
    pool: Db,
}

impl BookingRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> SqlxResult<Option<BookingRow>> {
        sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, slot_id, user_id, group_size, status, booked_with_points, is_recycled,
                   amount_paid_cents, points_paid, created_at, updated_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_by_slot(&self, slot_id: Uuid) -> SqlxResult<Vec<BookingRow>> {
        sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, slot_id, user_id, group_size, status, booked_with_points, is_recycled,
                   amount_paid_cents, points_paid, created_at, updated_at
            FROM bookings
            WHERE slot_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(slot_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_by_user(&self, user_id: Uuid) -> SqlxResult<Vec<BookingRow>> {
        sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, slot_id, user_id, group_size, status, booked_with_points, is_recycled,
                   amount_paid_cents, points_paid, created_at, updated_at
            FROM bookings
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn insert(conn: &mut PgConnection, b: &BookingRow) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, slot_id, user_id, group_size, status, booked_with_points,
                                  is_recycled, amount_paid_cents, points_paid, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(b.id)
        .bind(b.slot_id)
        .bind(b.user_id)
        .bind(b.group_size)
        .bind(b.status)
        .bind(b.booked_with_points)
        .bind(b.is_recycled)
        .bind(b.amount_paid_cents)
        .bind(b.points_paid)
        .bind(b.created_at)
        .bind(b.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn update(conn: &mut PgConnection, b: &BookingRow) -> SqlxResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET group_size = $2,
                status = $3,
                is_recycled = $4,
                amount_paid_cents = $5,
                points_paid = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(b.id)
        .bind(b.group_size)
        .bind(b.status)
        .bind(b.is_recycled)
        .bind(b.amount_paid_cents)
        .bind(b.points_paid)
        .bind(b.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Seats held by pending and confirmed bookings of a slot.
    pub async fn active_seats(conn: &mut PgConnection, slot_id: Uuid) -> SqlxResult<i64> {
        let seats: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(group_size), 0)::BIGINT
            FROM bookings
            WHERE slot_id = $1 AND status IN ('pending', 'confirmed')
            "#,
        )
        .bind(slot_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(seats.0)
    }
}
