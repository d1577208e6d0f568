use crate::{db::Db, models::PriceRuleRow};
use sqlx::Result as SqlxResult;
use uuid::Uuid;

#[derive(Clone)]
pub struct PriceRuleRepo {
    pool: Db,
}

impl PriceRuleRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get_by_club(&self, club_id: Uuid) -> SqlxResult<Vec<PriceRuleRow>> {
        sqlx::query_as::<_, PriceRuleRow>(
            r#"
            SELECT id, club_id, name, starts_at, ends_at, weekday_mask,
                   price_per_hour_cents, priority, created_at
            FROM price_rules
            WHERE club_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await
    }
}
