use crate::{
    db::Db,
    models::{Slot, SlotRow},
    pagination::LimitOffset,
    store::SlotFilter,
};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

#[derive(Clone)]
pub struct SlotRepo {
    pool: Db,
}

impl SlotRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> SqlxResult<Option<SlotRow>> {
        sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, club_id, kind, instructor_id, organizer_id, is_recurring, court_id,
                   start_at, end_at, duration_minutes, capacity, level_min, level_max, category,
                   total_price_cents, state, recycled_seats, needs_court_review, reserved_for,
                   completion_processed, version, created_at, updated_at
            FROM slots
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list(&self, filter: SlotFilter, page: Option<LimitOffset>) -> SqlxResult<Vec<SlotRow>> {
        // NULL limit means no limit
        let (limit, offset) = match page {
            Some(p) => (Some(p.limit), p.offset),
            None => (None, 0),
        };

        sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, club_id, kind, instructor_id, organizer_id, is_recurring, court_id,
                   start_at, end_at, duration_minutes, capacity, level_min, level_max, category,
                   total_price_cents, state, recycled_seats, needs_court_review, reserved_for,
                   completion_processed, version, created_at, updated_at
            FROM slots
            WHERE ($1::uuid IS NULL OR club_id = $1)
              AND ($2::uuid IS NULL OR instructor_id = $2)
              AND ($3::uuid IS NULL OR court_id = $3)
              AND ($4::slot_state IS NULL OR state = $4)
              AND ($5::timestamptz IS NULL OR start_at >= $5)
              AND ($6::timestamptz IS NULL OR start_at < $6)
            ORDER BY start_at ASC, id ASC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filter.club_id)
        .bind(filter.instructor_id)
        .bind(filter.court_id)
        .bind(filter.state)
        .bind(filter.from)
        .bind(filter.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Insert a slot. With `skip_open_duplicate` a clash with an open proposal of the same
    /// instructor and start is ignored and `false` is returned.
    pub async fn insert(conn: &mut PgConnection, slot: &Slot, skip_open_duplicate: bool) -> SqlxResult<bool> {
        let conflict_clause = if skip_open_duplicate {
            "ON CONFLICT (instructor_id, start_at) WHERE state = 'proposed' AND instructor_id IS NOT NULL DO NOTHING"
        } else {
            ""
        };
        let sql = format!(
            r#"
            INSERT INTO slots (
                id, club_id, kind, instructor_id, organizer_id, is_recurring, court_id,
                start_at, end_at, duration_minutes, capacity, level_min, level_max, category,
                total_price_cents, state, recycled_seats, needs_court_review, reserved_for,
                completion_processed, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            {conflict_clause}
            "#
        );
        let result = sqlx::query(&sql)
            .bind(slot.id)
            .bind(slot.club_id)
            .bind(slot.kind.tag())
            .bind(slot.kind.instructor_id())
            .bind(slot.kind.organizer_id())
            .bind(slot.kind.is_recurring())
            .bind(slot.court_id)
            .bind(slot.start_at)
            .bind(slot.end_at())
            .bind(slot.duration_minutes)
            .bind(slot.capacity)
            .bind(slot.level_min)
            .bind(slot.level_max)
            .bind(&slot.category)
            .bind(slot.total_price_cents)
            .bind(slot.state)
            .bind(slot.recycled_seats)
            .bind(slot.needs_court_review)
            .bind(slot.reserved_for)
            .bind(slot.completion_processed)
            .bind(slot.version)
            .bind(slot.created_at)
            .bind(slot.updated_at)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Write back the mutable columns of `slot`, bumping its version, only if the stored
    /// version still equals `slot.version`. Returns false when the version moved on.
    pub async fn update_versioned(conn: &mut PgConnection, slot: &Slot) -> SqlxResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET court_id = $3,
                state = $4,
                recycled_seats = $5,
                needs_court_review = $6,
                reserved_for = $7,
                completion_processed = $8,
                total_price_cents = $9,
                version = version + 1,
                updated_at = $10
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(slot.id)
        .bind(slot.version)
        .bind(slot.court_id)
        .bind(slot.state)
        .bind(slot.recycled_seats)
        .bind(slot.needs_court_review)
        .bind(slot.reserved_for)
        .bind(slot.completion_processed)
        .bind(slot.total_price_cents)
        .bind(slot.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
