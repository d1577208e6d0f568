use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookingStore, SlotChange, SlotFilter};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    BookingRow, Club, CourtRow, InstructorRow, PriceRuleRow, RecurringMatchLinkRow, Slot,
    SlotState, WalletRow,
};
use crate::pagination::LimitOffset;

#[derive(Default)]
struct MemoryState {
    clubs: HashMap<Uuid, Club>,
    courts: Vec<CourtRow>,
    price_rules: Vec<PriceRuleRow>,
    instructors: HashMap<Uuid, InstructorRow>,
    slots: HashMap<Uuid, Slot>,
    bookings: HashMap<Uuid, BookingRow>,
    wallets: HashMap<Uuid, WalletRow>,
    links: HashMap<Uuid, RecurringMatchLinkRow>,
    next_rule_id: i64,
}

impl MemoryState {
    fn is_duplicate_proposal(&self, slot: &Slot) -> bool {
        let Some(instructor) = slot.kind.instructor_id() else {
            return false;
        };
        slot.state == SlotState::Proposed
            && self.slots.values().any(|s| {
                s.id != slot.id
                    && s.state == SlotState::Proposed
                    && s.kind.instructor_id() == Some(instructor)
                    && s.start_at == slot.start_at
            })
    }
}

/// In-process store used for local runs and tests. A single lock serialises writers;
/// commits still go through the same version check as the Postgres store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_club(&self, club: Club) {
        self.state.write().await.clubs.insert(club.id, club);
    }

    pub async fn insert_court(&self, court: CourtRow) {
        let mut state = self.state.write().await;
        state.courts.retain(|c| c.id != court.id);
        state.courts.push(court);
    }

    /// Assigns the next serial id, mirroring `BIGSERIAL`.
    pub async fn insert_price_rule(&self, mut rule: PriceRuleRow) -> PriceRuleRow {
        let mut state = self.state.write().await;
        state.next_rule_id += 1;
        rule.id = state.next_rule_id;
        state.price_rules.push(rule.clone());
        rule
    }

    pub async fn insert_instructor(&self, instructor: InstructorRow) {
        self.state
            .write()
            .await
            .instructors
            .insert(instructor.id, instructor);
    }

    pub async fn upsert_wallet(&self, wallet: WalletRow) {
        self.state.write().await.wallets.insert(wallet.user_id, wallet);
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn club(&self, id: Uuid) -> StoreResult<Option<Club>> {
        Ok(self.state.read().await.clubs.get(&id).cloned())
    }

    async fn courts(&self, club_id: Uuid) -> StoreResult<Vec<CourtRow>> {
        let state = self.state.read().await;
        let mut courts: Vec<_> = state
            .courts
            .iter()
            .filter(|c| c.club_id == club_id)
            .cloned()
            .collect();
        courts.sort_by_key(|c| c.number);
        Ok(courts)
    }

    async fn price_rules(&self, club_id: Uuid) -> StoreResult<Vec<PriceRuleRow>> {
        let state = self.state.read().await;
        Ok(state
            .price_rules
            .iter()
            .filter(|r| r.club_id == club_id)
            .cloned()
            .collect())
    }

    async fn instructor(&self, id: Uuid) -> StoreResult<Option<InstructorRow>> {
        Ok(self.state.read().await.instructors.get(&id).cloned())
    }

    async fn slot(&self, id: Uuid) -> StoreResult<Option<Slot>> {
        Ok(self.state.read().await.slots.get(&id).cloned())
    }

    async fn slots(&self, filter: SlotFilter, page: Option<LimitOffset>) -> StoreResult<Vec<Slot>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .slots
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.start_at, s.id));
        if let Some(p) = page {
            rows = rows
                .into_iter()
                .skip(p.offset.max(0) as usize)
                .take(p.limit.max(0) as usize)
                .collect();
        }
        Ok(rows)
    }

    async fn insert_slot(&self, slot: Slot) -> StoreResult<Slot> {
        let mut state = self.state.write().await;
        if state.is_duplicate_proposal(&slot) {
            return Err(StoreError::VersionConflict(slot.id));
        }
        state.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn insert_proposals(&self, slots: Vec<Slot>) -> StoreResult<Vec<Slot>> {
        let mut state = self.state.write().await;
        let mut inserted = Vec::with_capacity(slots.len());
        for slot in slots {
            if state.is_duplicate_proposal(&slot) {
                continue;
            }
            state.slots.insert(slot.id, slot.clone());
            inserted.push(slot);
        }
        Ok(inserted)
    }

    async fn booking(&self, id: Uuid) -> StoreResult<Option<BookingRow>> {
        Ok(self.state.read().await.bookings.get(&id).cloned())
    }

    async fn bookings_for_slot(&self, slot_id: Uuid) -> StoreResult<Vec<BookingRow>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .bookings
            .values()
            .filter(|b| b.slot_id == slot_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| (b.created_at, b.id));
        Ok(rows)
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<BookingRow>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| std::cmp::Reverse(b.created_at));
        Ok(rows)
    }

    async fn wallet(&self, user_id: Uuid) -> StoreResult<Option<WalletRow>> {
        Ok(self.state.read().await.wallets.get(&user_id).cloned())
    }

    async fn renewal_link(&self, id: Uuid) -> StoreResult<Option<RecurringMatchLinkRow>> {
        Ok(self.state.read().await.links.get(&id).cloned())
    }

    async fn renewal_links(&self) -> StoreResult<Vec<RecurringMatchLinkRow>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state.links.values().cloned().collect();
        rows.sort_by_key(|l| l.expires_at);
        Ok(rows)
    }

    async fn mark_link_reminded(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.links.get_mut(&id) {
            Some(link) if !link.reminder_sent => {
                link.reminder_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_link(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.state.write().await.links.remove(&id).is_some())
    }

    async fn commit(&self, change: SlotChange) -> StoreResult<Slot> {
        let mut state = self.state.write().await;
        let slot_id = change.slot.id;

        let stored = state
            .slots
            .get(&slot_id)
            .ok_or(StoreError::VersionConflict(slot_id))?;
        if stored.version != change.slot.version {
            return Err(StoreError::VersionConflict(slot_id));
        }

        if let Some(court) = change.claims_court(stored.court_id) {
            let (start, end) = (change.slot.start_at, change.slot.end_at());
            let taken = state.slots.values().any(|s| {
                s.id != slot_id
                    && s.state == SlotState::Confirmed
                    && s.court_id == Some(court)
                    && s.overlaps(start, end)
            });
            if taken {
                return Err(StoreError::VersionConflict(slot_id));
            }
        }

        // Bookings of this slot as they will look after the change.
        let mut after: HashMap<Uuid, &BookingRow> = state
            .bookings
            .values()
            .filter(|b| b.slot_id == slot_id)
            .map(|b| (b.id, b))
            .collect();
        for b in change.updated_bookings.iter().chain(&change.inserted_bookings) {
            after.insert(b.id, b);
        }
        let mut holders = std::collections::HashSet::new();
        let mut seats = 0;
        for b in after.values().filter(|b| b.is_active()) {
            if !holders.insert(b.user_id) {
                return Err(StoreError::VersionConflict(slot_id));
            }
            seats += b.group_size;
        }
        if seats > change.slot.capacity {
            return Err(StoreError::VersionConflict(slot_id));
        }

        let mut merged: HashMap<Uuid, (i64, i64)> = HashMap::new();
        for d in &change.wallet_deltas {
            let entry = merged.entry(d.user_id).or_default();
            entry.0 += d.credit_cents;
            entry.1 += d.points;
        }
        for (user_id, (credit, points)) in &merged {
            let wallet = state
                .wallets
                .get(user_id)
                .ok_or(StoreError::MissingWallet(*user_id))?;
            if wallet.credit_cents + credit < 0 || wallet.points + points < 0 {
                return Err(StoreError::InsufficientBalance(*user_id));
            }
        }

        let mut slot = change.slot;
        slot.version += 1;
        let now = slot.updated_at;
        state.slots.insert(slot_id, slot.clone());
        for b in change.inserted_bookings.into_iter().chain(change.updated_bookings) {
            state.bookings.insert(b.id, b);
        }
        for (user_id, (credit, points)) in merged {
            if let Some(wallet) = state.wallets.get_mut(&user_id) {
                wallet.credit_cents += credit;
                wallet.points += points;
                wallet.updated_at = now;
            }
        }
        for s in change.inserted_slots {
            state.slots.insert(s.id, s);
        }
        if let Some(link) = change.inserted_link {
            state.links.insert(link.id, link);
        }
        if let Some(id) = change.deleted_link {
            state.links.remove(&id);
        }
        Ok(slot)
    }
}
