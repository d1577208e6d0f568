use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::availability::{busy_intervals, can_start_at, BUFFER_MINUTES};
use super::pricing::points_for_cents;
use super::BookingEngine;
use crate::error::{
    ConflictError, EngineResult, NotFoundError, StateError, ValidationError,
};
use crate::events::EngineEvent;
use crate::models::{
    BookingRow, BookingStatus, Club, Player, Slot, SlotState, WalletRow, MAX_GROUP_SIZE,
};
use crate::store::{SlotChange, WalletDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payment {
    Credits,
    Points,
}

/// What happened to the slot as a side effect of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Confirmation {
    /// Still open, or was already confirmed.
    Unchanged,
    Confirmed { court_id: Uuid },
    /// Full, but no court was free; flagged for review.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct BookingReceipt {
    pub booking: BookingRow,
    pub slot: Slot,
    pub confirmation: Confirmation,
}

/// A booking decided against a snapshot, ready to commit.
pub(crate) struct PlannedBooking {
    pub change: SlotChange,
    pub booking: BookingRow,
    pub confirmation: Confirmation,
}

pub(crate) fn active_seats(bookings: &[BookingRow]) -> i32 {
    bookings
        .iter()
        .filter(|b| b.is_active())
        .map(|b| b.group_size)
        .sum()
}

/// Moves a full slot onto `court_id` and confirms its pending seats.
fn confirm_on_court(slot: &mut Slot, court_id: Uuid, bookings: &[BookingRow], now: DateTime<Utc>) -> Vec<BookingRow> {
    slot.state = SlotState::Confirmed;
    slot.court_id = Some(court_id);
    slot.needs_court_review = false;
    bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Pending)
        .map(|b| BookingRow {
            status: BookingStatus::Confirmed,
            updated_at: now,
            ..b.clone()
        })
        .collect()
}

impl BookingEngine {
    async fn load_wallet(&self, user_id: Uuid) -> EngineResult<WalletRow> {
        self.store
            .wallet(user_id)
            .await?
            .ok_or_else(|| NotFoundError::Wallet(user_id).into())
    }

    /// First active court, by number, that seats the slot and has no overlapping
    /// confirmed slot.
    pub(crate) async fn pick_court(&self, slot: &Slot) -> EngineResult<Option<Uuid>> {
        let courts = self.store.courts(slot.club_id).await?;
        for court in courts
            .iter()
            .filter(|c| c.is_active && c.capacity >= slot.capacity)
        {
            let neighbours = self
                .court_neighbours(court.id, slot.start_at, slot.end_at())
                .await?;
            let busy = busy_intervals(&neighbours, Some(slot.id));
            if can_start_at(&busy, slot.start_at, slot.duration_minutes, Duration::zero()) {
                return Ok(Some(court.id));
            }
        }
        Ok(None)
    }

    /// A class confirms only while its instructor is free at that time, changeover buffer
    /// included. Other slot kinds pass.
    async fn ensure_instructor_free(&self, slot: &Slot) -> EngineResult<()> {
        let Some(instructor_id) = slot.kind.instructor_id() else {
            return Ok(());
        };
        let club = self.load_club(slot.club_id).await?;
        let day = slot.start_at.with_timezone(&club.settings.offset()).date_naive();
        let taken = self
            .instructor_day(&club.settings, club.id, instructor_id, day)
            .await?;
        let busy = busy_intervals(&taken, Some(slot.id));
        let buffer = Duration::minutes(BUFFER_MINUTES);
        if can_start_at(&busy, slot.start_at, slot.duration_minutes, buffer) {
            Ok(())
        } else {
            Err(ConflictError::InstructorUnavailable {
                instructor_id,
                start: slot.start_at,
            }
            .into())
        }
    }

    /// Confirms a now-full proposal, or flags it when every court is taken.
    async fn settle_full_slot(
        &self,
        slot: &mut Slot,
        bookings: &[BookingRow],
        now: DateTime<Utc>,
    ) -> EngineResult<(Confirmation, Vec<BookingRow>)> {
        self.ensure_instructor_free(slot).await?;
        match self.pick_court(slot).await? {
            Some(court_id) => {
                let promoted = confirm_on_court(slot, court_id, bookings, now);
                Ok((Confirmation::Confirmed { court_id }, promoted))
            }
            None => {
                slot.needs_court_review = true;
                Ok((Confirmation::Deferred, Vec::new()))
            }
        }
    }

    /// Decides a booking of `group_size` seats against the given snapshot. Shared by
    /// regular bookings and renewals.
    pub(crate) async fn plan_booking(
        &self,
        club: &Club,
        mut slot: Slot,
        bookings: &[BookingRow],
        player: &Player,
        group_size: i32,
        payment: Payment,
        now: DateTime<Utc>,
    ) -> EngineResult<PlannedBooking> {
        match slot.state {
            SlotState::Cancelled => {
                return Err(StateError::NotBookable {
                    slot_id: slot.id,
                    state: slot.state,
                }
                .into())
            }
            _ if now >= slot.start_at => {
                return Err(StateError::AlreadyStarted {
                    slot_id: slot.id,
                    started_at: slot.start_at,
                }
                .into())
            }
            _ => {}
        }
        if slot.reserved_for.is_some() {
            return Err(StateError::ReservedForOrganizer(slot.id).into());
        }
        if !player.is_compatible_with(&slot) {
            return Err(ValidationError::LevelMismatch(slot.id).into());
        }
        if bookings
            .iter()
            .any(|b| b.is_active() && b.user_id == player.user_id)
        {
            return Err(ConflictError::DuplicateBooking {
                slot_id: slot.id,
                user_id: player.user_id,
            }
            .into());
        }

        let occupied = active_seats(bookings);
        let free = (slot.capacity - occupied).max(0);
        let recycled = slot.recycled_seats.min(free);
        if group_size > free {
            return Err(ConflictError::CapacityExceeded {
                requested: group_size,
                available: free,
                over: group_size - free,
            }
            .into());
        }
        if payment == Payment::Credits && group_size > free - recycled {
            return Err(ConflictError::RecycledSeatsRequirePoints { recycled }.into());
        }

        let wallet = self.load_wallet(player.user_id).await?;
        let cost_cents = slot.seat_price_cents() * group_size as i64;
        let (delta, amount_paid_cents, points_paid, is_recycled) = match payment {
            Payment::Credits => {
                if wallet.credit_cents < cost_cents {
                    return Err(ConflictError::InsufficientCredits {
                        needed: cost_cents,
                        available: wallet.credit_cents,
                    }
                    .into());
                }
                (
                    WalletDelta {
                        user_id: player.user_id,
                        credit_cents: -cost_cents,
                        points: 0,
                    },
                    cost_cents,
                    0,
                    false,
                )
            }
            Payment::Points => {
                let points = points_for_cents(cost_cents, club.settings.redemption_points_per_euro);
                if wallet.points < points {
                    return Err(ConflictError::InsufficientPoints {
                        needed: points,
                        available: wallet.points,
                    }
                    .into());
                }
                let claimed = group_size.min(recycled);
                slot.recycled_seats -= claimed;
                (
                    WalletDelta {
                        user_id: player.user_id,
                        credit_cents: 0,
                        points: -points,
                    },
                    0,
                    points,
                    claimed > 0,
                )
            }
        };

        let mut booking = BookingRow {
            id: Uuid::new_v4(),
            slot_id: slot.id,
            user_id: player.user_id,
            group_size,
            status: match slot.state {
                SlotState::Confirmed => BookingStatus::Confirmed,
                _ => BookingStatus::Pending,
            },
            booked_with_points: payment == Payment::Points,
            is_recycled,
            amount_paid_cents,
            points_paid,
            created_at: now,
            updated_at: now,
        };

        let mut confirmation = Confirmation::Unchanged;
        let mut promoted = Vec::new();
        if slot.state == SlotState::Proposed && occupied + group_size == slot.capacity {
            let (outcome, rows) = self.settle_full_slot(&mut slot, bookings, now).await?;
            confirmation = outcome;
            promoted = rows;
            if slot.state == SlotState::Confirmed {
                booking.status = BookingStatus::Confirmed;
            }
        }

        slot.updated_at = now;
        let mut change = SlotChange::new(slot).with_wallet_delta(delta);
        change.inserted_bookings.push(booking.clone());
        change.updated_bookings = promoted;

        Ok(PlannedBooking {
            change,
            booking,
            confirmation,
        })
    }

    /// Emits the follow-up events of a committed booking.
    pub(crate) fn announce(&self, slot: &Slot, confirmation: Confirmation) {
        match confirmation {
            Confirmation::Confirmed { court_id } => {
                info!(slot_id = %slot.id, %court_id, "slot confirmed");
                self.events.publish(EngineEvent::SlotConfirmed {
                    slot_id: slot.id,
                    club_id: slot.club_id,
                    court_id,
                    start_at: slot.start_at,
                });
            }
            Confirmation::Deferred => {
                warn!(slot_id = %slot.id, start = %slot.start_at, "slot full but no court free; awaiting review");
            }
            Confirmation::Unchanged => {}
        }
    }

    /// Books `group_size` seats for `player`. The capacity check, the wallet debit, the
    /// insert and any confirmation land in one commit against the slot version.
    pub async fn place_booking(
        &self,
        slot_id: Uuid,
        player: &Player,
        group_size: i32,
        payment: Payment,
    ) -> EngineResult<BookingReceipt> {
        if !(1..=MAX_GROUP_SIZE).contains(&group_size) {
            return Err(ValidationError::InvalidGroupSize(group_size).into());
        }
        let receipt = self
            .with_retry(slot_id, || self.try_place_booking(slot_id, player, group_size, payment))
            .await?;
        info!(
            booking_id = %receipt.booking.id,
            %slot_id,
            user_id = %player.user_id,
            group_size,
            ?payment,
            "booking placed"
        );
        Ok(receipt)
    }

    async fn try_place_booking(
        &self,
        slot_id: Uuid,
        player: &Player,
        group_size: i32,
        payment: Payment,
    ) -> EngineResult<BookingReceipt> {
        let now = self.now();
        let slot = self.load_slot(slot_id).await?;
        let club = self.load_club(slot.club_id).await?;
        let bookings = self.store.bookings_for_slot(slot_id).await?;

        let plan = self
            .plan_booking(&club, slot, &bookings, player, group_size, payment, now)
            .await?;
        let slot = self.commit(plan.change).await?;
        self.announce(&slot, plan.confirmation);
        Ok(BookingReceipt {
            booking: plan.booking,
            slot,
            confirmation: plan.confirmation,
        })
    }

    /// The organizer buys every unfilled seat with credits and the slot confirms at once
    /// (or is flagged when no court is free). An organizer already on the slot has the
    /// seats added to their booking.
    pub async fn privatize(&self, slot_id: Uuid, organizer: &Player) -> EngineResult<BookingReceipt> {
        let receipt = self
            .with_retry(slot_id, || self.try_privatize(slot_id, organizer))
            .await?;
        info!(%slot_id, user_id = %organizer.user_id, "slot privatized");
        Ok(receipt)
    }

    async fn try_privatize(&self, slot_id: Uuid, organizer: &Player) -> EngineResult<BookingReceipt> {
        let now = self.now();
        let mut slot = self.load_slot(slot_id).await?;
        match slot.state {
            SlotState::Confirmed => return Err(StateError::AlreadyConfirmed(slot_id).into()),
            SlotState::Cancelled => {
                return Err(StateError::NotBookable {
                    slot_id,
                    state: slot.state,
                }
                .into())
            }
            SlotState::Proposed => {}
        }
        if now >= slot.start_at {
            return Err(StateError::AlreadyStarted {
                slot_id,
                started_at: slot.start_at,
            }
            .into());
        }
        if slot.reserved_for.is_some() {
            return Err(StateError::ReservedForOrganizer(slot_id).into());
        }
        if !organizer.is_compatible_with(&slot) {
            return Err(ValidationError::LevelMismatch(slot_id).into());
        }

        let bookings = self.store.bookings_for_slot(slot_id).await?;
        let free = slot.capacity - active_seats(&bookings);
        if free <= 0 {
            return Err(StateError::NothingToPrivatize(slot_id).into());
        }

        let cost_cents = slot.seat_price_cents() * free as i64;
        let wallet = self.load_wallet(organizer.user_id).await?;
        if wallet.credit_cents < cost_cents {
            return Err(ConflictError::InsufficientCredits {
                needed: cost_cents,
                available: wallet.credit_cents,
            }
            .into());
        }

        let existing = bookings
            .iter()
            .find(|b| b.is_active() && b.user_id == organizer.user_id)
            .cloned();
        let is_update = existing.is_some();
        let mut booking = match existing {
            Some(mine) => BookingRow {
                group_size: mine.group_size + free,
                amount_paid_cents: mine.amount_paid_cents + cost_cents,
                updated_at: now,
                ..mine
            },
            None => BookingRow {
                id: Uuid::new_v4(),
                slot_id,
                user_id: organizer.user_id,
                group_size: free,
                status: BookingStatus::Pending,
                booked_with_points: false,
                is_recycled: false,
                amount_paid_cents: cost_cents,
                points_paid: 0,
                created_at: now,
                updated_at: now,
            },
        };

        slot.recycled_seats = 0;
        let (confirmation, promoted) = self.settle_full_slot(&mut slot, &bookings, now).await?;
        if slot.state == SlotState::Confirmed {
            booking.status = BookingStatus::Confirmed;
        }
        slot.updated_at = now;

        let mut change = SlotChange::new(slot).with_wallet_delta(WalletDelta {
            user_id: organizer.user_id,
            credit_cents: -cost_cents,
            points: 0,
        });
        change.updated_bookings = promoted
            .into_iter()
            .filter(|b| b.id != booking.id)
            .collect();
        if is_update {
            change.updated_bookings.push(booking.clone());
        } else {
            change.inserted_bookings.push(booking.clone());
        }

        let slot = self.commit(change).await?;
        self.announce(&slot, confirmation);
        Ok(BookingReceipt {
            booking,
            slot,
            confirmation,
        })
    }

    /// Retries court assignment for a full slot that was flagged for review.
    pub async fn resolve_deferred_confirmation(&self, slot_id: Uuid) -> EngineResult<Slot> {
        self.with_retry(slot_id, || self.try_resolve_deferred(slot_id))
            .await
    }

    async fn try_resolve_deferred(&self, slot_id: Uuid) -> EngineResult<Slot> {
        let now = self.now();
        let mut slot = self.load_slot(slot_id).await?;
        if slot.state == SlotState::Confirmed {
            return Err(StateError::AlreadyConfirmed(slot_id).into());
        }
        if slot.state != SlotState::Proposed || !slot.needs_court_review {
            return Err(StateError::NotAwaitingCourt(slot_id).into());
        }

        self.ensure_instructor_free(&slot).await?;
        let court_id = self
            .pick_court(&slot)
            .await?
            .ok_or(ConflictError::NoCourtAvailable(slot_id))?;
        let bookings = self.store.bookings_for_slot(slot_id).await?;
        let promoted = confirm_on_court(&mut slot, court_id, &bookings, now);
        slot.updated_at = now;

        let mut change = SlotChange::new(slot);
        change.updated_bookings = promoted;
        let slot = self.commit(change).await?;
        self.announce(&slot, Confirmation::Confirmed { court_id });
        Ok(slot)
    }

    pub async fn get_booking(&self, id: Uuid) -> EngineResult<BookingRow> {
        self.store
            .booking(id)
            .await?
            .ok_or_else(|| NotFoundError::Booking(id).into())
    }

    pub async fn slot_bookings(&self, slot_id: Uuid) -> EngineResult<Vec<BookingRow>> {
        self.load_slot(slot_id).await?;
        Ok(self.store.bookings_for_slot(slot_id).await?)
    }

    pub async fn user_bookings(&self, user_id: Uuid) -> EngineResult<Vec<BookingRow>> {
        Ok(self.store.bookings_for_user(user_id).await?)
    }

    pub async fn wallet(&self, user_id: Uuid) -> EngineResult<WalletRow> {
        self.load_wallet(user_id).await
    }
}
