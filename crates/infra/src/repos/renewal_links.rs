use crate::{db::Db, models::RecurringMatchLinkRow};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

#[derive(Clone)]
pub struct RenewalLinkRepo {
    pool: Db,
}

impl RenewalLinkRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> SqlxResult<Option<RecurringMatchLinkRow>> {
        sqlx::query_as::<_, RecurringMatchLinkRow>(
            r#"
            SELECT id, organizer_id, base_match_id, next_slot_id, expires_at, reminder_sent, created_at
            FROM recurring_match_links
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_all(&self) -> SqlxResult<Vec<RecurringMatchLinkRow>> {
        sqlx::query_as::<_, RecurringMatchLinkRow>(
            r#"
            SELECT id, organizer_id, base_match_id, next_slot_id, expires_at, reminder_sent, created_at
            FROM recurring_match_links
            ORDER BY expires_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn mark_reminded(&self, id: Uuid) -> SqlxResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE recurring_match_links
            SET reminder_sent = TRUE
            WHERE id = $1 AND reminder_sent = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> SqlxResult<bool> {
        let result = sqlx::query("DELETE FROM recurring_match_links WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn insert(conn: &mut PgConnection, link: &RecurringMatchLinkRow) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recurring_match_links
                (id, organizer_id, base_match_id, next_slot_id, expires_at, reminder_sent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(link.id)
        .bind(link.organizer_id)
        .bind(link.base_match_id)
        .bind(link.next_slot_id)
        .bind(link.expires_at)
        .bind(link.reminder_sent)
        .bind(link.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
