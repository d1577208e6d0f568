use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{BookingStore, SlotChange, SlotFilter};
use crate::db::{self, Db};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    BookingRow, Club, CourtRow, InstructorRow, PriceRuleRow, RecurringMatchLinkRow, Slot, WalletRow,
};
use crate::pagination::LimitOffset;
use crate::repos::{
    wallets::DeltaOutcome, BookingRepo, ClubRepo, CourtRepo, InstructorRepo, PriceRuleRepo,
    RenewalLinkRepo, SlotRepo, WalletRepo,
};

/// unique_violation, exclusion_violation, serialization_failure
const CONFLICT_CODES: [&str; 3] = ["23505", "23P01", "40001"];

fn conflict_or_db(err: sqlx::Error, slot_id: Uuid) -> StoreError {
    let is_conflict = err
        .as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| CONFLICT_CODES.contains(&code.as_ref()));
    if is_conflict {
        StoreError::VersionConflict(slot_id)
    } else {
        StoreError::Db(err)
    }
}

fn to_slot(row: crate::models::SlotRow) -> StoreResult<Slot> {
    Slot::try_from(row).map_err(StoreError::Corrupt)
}

/// Postgres-backed store. The slot row's `version` column is the optimistic lock; the
/// partial unique indexes and the court exclusion constraint backstop the engine's checks.
#[derive(Clone)]
pub struct PgStore {
    pool: Db,
    clubs: ClubRepo,
    courts: CourtRepo,
    price_rules: PriceRuleRepo,
    instructors: InstructorRepo,
    slots: SlotRepo,
    bookings: BookingRepo,
    wallets: WalletRepo,
    links: RenewalLinkRepo,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self {
            clubs: ClubRepo::new(pool.clone()),
            courts: CourtRepo::new(pool.clone()),
            price_rules: PriceRuleRepo::new(pool.clone()),
            instructors: InstructorRepo::new(pool.clone()),
            slots: SlotRepo::new(pool.clone()),
            bookings: BookingRepo::new(pool.clone()),
            wallets: WalletRepo::new(pool.clone()),
            links: RenewalLinkRepo::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &Db {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        db::ping(&self.pool).await?;
        Ok(())
    }

    async fn club(&self, id: Uuid) -> StoreResult<Option<Club>> {
        Ok(self.clubs.get(id).await?.map(Club::from))
    }

    async fn courts(&self, club_id: Uuid) -> StoreResult<Vec<CourtRow>> {
        Ok(self.courts.get_by_club(club_id).await?)
    }

    async fn price_rules(&self, club_id: Uuid) -> StoreResult<Vec<PriceRuleRow>> {
        Ok(self.price_rules.get_by_club(club_id).await?)
    }

    async fn instructor(&self, id: Uuid) -> StoreResult<Option<InstructorRow>> {
        Ok(self.instructors.get(id).await?)
    }

    async fn slot(&self, id: Uuid) -> StoreResult<Option<Slot>> {
        self.slots.get(id).await?.map(to_slot).transpose()
    }

    async fn slots(&self, filter: SlotFilter, page: Option<LimitOffset>) -> StoreResult<Vec<Slot>> {
        self.slots
            .list(filter, page)
            .await?
            .into_iter()
            .map(to_slot)
            .collect()
    }

    async fn insert_slot(&self, slot: Slot) -> StoreResult<Slot> {
        let mut conn = self.pool.acquire().await?;
        SlotRepo::insert(&mut conn, &slot, false)
            .await
            .map_err(|e| conflict_or_db(e, slot.id))?;
        Ok(slot)
    }

    async fn insert_proposals(&self, slots: Vec<Slot>) -> StoreResult<Vec<Slot>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(slots.len());
        for slot in slots {
            if SlotRepo::insert(&mut tx, &slot, true).await? {
                inserted.push(slot);
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn booking(&self, id: Uuid) -> StoreResult<Option<BookingRow>> {
        Ok(self.bookings.get(id).await?)
    }

    async fn bookings_for_slot(&self, slot_id: Uuid) -> StoreResult<Vec<BookingRow>> {
        Ok(self.bookings.get_by_slot(slot_id).await?)
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<BookingRow>> {
        Ok(self.bookings.get_by_user(user_id).await?)
    }

    async fn wallet(&self, user_id: Uuid) -> StoreResult<Option<WalletRow>> {
        Ok(self.wallets.get(user_id).await?)
    }

    async fn renewal_link(&self, id: Uuid) -> StoreResult<Option<RecurringMatchLinkRow>> {
        Ok(self.links.get(id).await?)
    }

    async fn renewal_links(&self) -> StoreResult<Vec<RecurringMatchLinkRow>> {
        Ok(self.links.list_all().await?)
    }

    async fn mark_link_reminded(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.links.mark_reminded(id).await?)
    }

    async fn delete_link(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(RenewalLinkRepo::delete(&mut conn, id).await?)
    }

    async fn commit(&self, change: SlotChange) -> StoreResult<Slot> {
        let slot_id = change.slot.id;
        let at = change.slot.updated_at;
        let mut tx = self.pool.begin().await?;

        // Row lock + version check; a concurrent writer on the same slot blocks here and
        // then matches zero rows.
        let updated = SlotRepo::update_versioned(&mut tx, &change.slot)
            .await
            .map_err(|e| conflict_or_db(e, slot_id))?;
        if !updated {
            debug!(%slot_id, version = change.slot.version, "slot version moved on");
            return Err(StoreError::VersionConflict(slot_id));
        }

        for booking in &change.updated_bookings {
            BookingRepo::update(&mut tx, booking)
                .await
                .map_err(|e| conflict_or_db(e, slot_id))?;
        }
        for booking in &change.inserted_bookings {
            BookingRepo::insert(&mut tx, booking)
                .await
                .map_err(|e| conflict_or_db(e, slot_id))?;
        }

        let seats = BookingRepo::active_seats(&mut tx, slot_id).await?;
        if seats > change.slot.capacity as i64 {
            return Err(StoreError::VersionConflict(slot_id));
        }

        // Deterministic order keeps concurrent commits from deadlocking on wallet rows.
        let mut merged: BTreeMap<Uuid, (i64, i64)> = BTreeMap::new();
        for d in &change.wallet_deltas {
            let entry = merged.entry(d.user_id).or_default();
            entry.0 += d.credit_cents;
            entry.1 += d.points;
        }
        for (user_id, (credit, points)) in merged {
            match WalletRepo::apply_delta(&mut tx, user_id, credit, points, at).await? {
                DeltaOutcome::Applied => {}
                DeltaOutcome::Insufficient => return Err(StoreError::InsufficientBalance(user_id)),
                DeltaOutcome::Missing => return Err(StoreError::MissingWallet(user_id)),
            }
        }

        for slot in &change.inserted_slots {
            SlotRepo::insert(&mut tx, slot, false)
                .await
                .map_err(|e| conflict_or_db(e, slot_id))?;
        }
        if let Some(link) = &change.inserted_link {
            RenewalLinkRepo::insert(&mut tx, link)
                .await
                .map_err(|e| conflict_or_db(e, slot_id))?;
        }
        if let Some(id) = change.deleted_link {
            RenewalLinkRepo::delete(&mut tx, id).await?;
        }

        tx.commit().await.map_err(|e| conflict_or_db(e, slot_id))?;

        let mut slot = change.slot;
        slot.version += 1;
        Ok(slot)
    }
}
