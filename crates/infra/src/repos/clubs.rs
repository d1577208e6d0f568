use crate::{db::Db, models::ClubRow};
use sqlx::Result as SqlxResult;
use uuid::Uuid;

#[derive(Clone)]
pub struct ClubRepo {
    pool: Db,
}

impl ClubRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> SqlxResult<Option<ClubRow>> {
        sqlx::query_as::<_, ClubRow>(
            r#"
            SELECT id, name, utc_offset_minutes, opens_at, closes_at, default_rate_cents,
                   redemption_points_per_euro, cancellation_points_per_euro,
                   cancel_penalty_kind, cancel_penalty_amount, renewal_window_hours,
                   created_at, updated_at
            FROM clubs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}
