use crate::{db::Db, models::CourtRow};
use sqlx::Result as SqlxResult;
use uuid::Uuid;

#[derive(Clone)]
pub struct CourtRepo {
    pool: Db,
}

impl CourtRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// All courts of a club, inactive ones included, by court number
    pub async fn get_by_club(&self, club_id: Uuid) -> SqlxResult<Vec<CourtRow>> {
        sqlx::query_as::<_, CourtRow>(
            r#"
            SELECT id, club_id, number, is_active, capacity, created_at, updated_at
            FROM courts
            WHERE club_id = $1
            ORDER BY number ASC
            "#,
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await
    }
}
