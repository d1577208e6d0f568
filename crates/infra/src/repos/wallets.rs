use crate::{db::Db, models::WalletRow};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    Insufficient,
    Missing,
}

#[derive(Clone)]
pub struct WalletRepo {
    pool: Db,
}

impl WalletRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid) -> SqlxResult<Option<WalletRow>> {
        sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT user_id, credit_cents, points, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Adjust both balances only if neither would go negative.
    pub async fn apply_delta(
        conn: &mut PgConnection,
        user_id: Uuid,
        credit_cents: i64,
        points: i64,
        at: DateTime<Utc>,
    ) -> SqlxResult<DeltaOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET credit_cents = credit_cents + $2,
                points = points + $3,
                updated_at = $4
            WHERE user_id = $1
              AND credit_cents + $2 >= 0
              AND points + $3 >= 0
            "#,
        )
        .bind(user_id)
        .bind(credit_cents)
        .bind(points)
        .bind(at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(DeltaOutcome::Applied);
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT user_id FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(match exists {
            Some(_) => DeltaOutcome::Insufficient,
            None => DeltaOutcome::Missing,
        })
    }
}
