//! Persistence seam of the booking engine.
//!
//! Reads are plain lookups. Every mutation of a slot and the rows that hang off it goes
//! through [`BookingStore::commit`], which applies a [`SlotChange`] atomically and only if
//! the slot still carries the version the engine read (optimistic locking).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    BookingRow, Club, CourtRow, InstructorRow, PriceRuleRow, RecurringMatchLinkRow, Slot,
    SlotState, WalletRow,
};
use crate::pagination::LimitOffset;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub club_id: Option<Uuid>,
    pub instructor_id: Option<Uuid>,
    pub court_id: Option<Uuid>,
    pub state: Option<SlotState>,
    /// Inclusive lower bound on `start_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `start_at`.
    pub to: Option<DateTime<Utc>>,
}

impl SlotFilter {
    pub fn matches(&self, slot: &Slot) -> bool {
        self.club_id.map_or(true, |c| slot.club_id == c)
            && self
                .instructor_id
                .map_or(true, |i| slot.kind.instructor_id() == Some(i))
            && self.court_id.map_or(true, |c| slot.court_id == Some(c))
            && self.state.map_or(true, |s| slot.state == s)
            && self.from.map_or(true, |f| slot.start_at >= f)
            && self.to.map_or(true, |t| slot.start_at < t)
    }
}

/// Signed adjustment of a user's wallet. Applying it must never leave a negative balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletDelta {
    pub user_id: Uuid,
    pub credit_cents: i64,
    pub points: i64,
}

impl WalletDelta {
    pub fn is_noop(&self) -> bool {
        self.credit_cents == 0 && self.points == 0
    }
}

/// Everything one atomic unit writes on behalf of a single slot.
#[derive(Debug, Clone)]
pub struct SlotChange {
    /// Desired slot row; `slot.version` must equal the stored version, which the commit bumps.
    pub slot: Slot,
    pub inserted_bookings: Vec<BookingRow>,
    pub updated_bookings: Vec<BookingRow>,
    pub wallet_deltas: Vec<WalletDelta>,
    pub inserted_slots: Vec<Slot>,
    pub inserted_link: Option<RecurringMatchLinkRow>,
    pub deleted_link: Option<Uuid>,
}

impl SlotChange {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            inserted_bookings: Vec::new(),
            updated_bookings: Vec::new(),
            wallet_deltas: Vec::new(),
            inserted_slots: Vec::new(),
            inserted_link: None,
            deleted_link: None,
        }
    }

    pub fn with_wallet_delta(mut self, delta: WalletDelta) -> Self {
        if !delta.is_noop() {
            self.wallet_deltas.push(delta);
        }
        self
    }

    /// Whether this change moves the slot onto a court it did not hold before.
    pub fn claims_court(&self, previous: Option<Uuid>) -> Option<Uuid> {
        match (self.slot.state, self.slot.court_id) {
            (SlotState::Confirmed, Some(court)) if previous != Some(court) => Some(court),
            _ => None,
        }
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn club(&self, id: Uuid) -> StoreResult<Option<Club>>;
    /// Courts of a club ordered by court number.
    async fn courts(&self, club_id: Uuid) -> StoreResult<Vec<CourtRow>>;
    async fn price_rules(&self, club_id: Uuid) -> StoreResult<Vec<PriceRuleRow>>;
    async fn instructor(&self, id: Uuid) -> StoreResult<Option<InstructorRow>>;

    async fn slot(&self, id: Uuid) -> StoreResult<Option<Slot>>;
    /// Slots matching `filter`, ordered by start time.
    async fn slots(&self, filter: SlotFilter, page: Option<LimitOffset>) -> StoreResult<Vec<Slot>>;
    /// Inserts a new slot. Fails with a version conflict when it would duplicate an open
    /// proposal of the same instructor at the same start.
    async fn insert_slot(&self, slot: Slot) -> StoreResult<Slot>;
    /// Inserts proposals, silently skipping any that duplicate an open proposal of the
    /// same instructor at the same start. Returns the rows actually inserted.
    async fn insert_proposals(&self, slots: Vec<Slot>) -> StoreResult<Vec<Slot>>;

    async fn booking(&self, id: Uuid) -> StoreResult<Option<BookingRow>>;
    async fn bookings_for_slot(&self, slot_id: Uuid) -> StoreResult<Vec<BookingRow>>;
    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<BookingRow>>;

    async fn wallet(&self, user_id: Uuid) -> StoreResult<Option<WalletRow>>;

    async fn renewal_link(&self, id: Uuid) -> StoreResult<Option<RecurringMatchLinkRow>>;
    async fn renewal_links(&self) -> StoreResult<Vec<RecurringMatchLinkRow>>;
    /// Flags the reminder as sent; returns false if it already was.
    async fn mark_link_reminded(&self, id: Uuid) -> StoreResult<bool>;
    async fn delete_link(&self, id: Uuid) -> StoreResult<bool>;

    /// Applies `change` atomically. Errors with [`crate::error::StoreError::VersionConflict`]
    /// when the slot moved on, a claimed court became busy, or an active booking for the
    /// same user appeared in the meantime.
    async fn commit(&self, change: SlotChange) -> StoreResult<Slot>;
}
