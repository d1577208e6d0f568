use crate::{db::Db, models::InstructorRow};
use sqlx::Result as SqlxResult;
use uuid::Uuid;

#[derive(Clone)]
pub struct InstructorRepo {
    pool: Db,
}

impl InstructorRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> SqlxResult<Option<InstructorRow>> {
        sqlx::query_as::<_, InstructorRow>(
            r#"
            SELECT id, user_id, club_id, hourly_rate_cents, is_active, created_at, updated_at
            FROM instructors
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}
