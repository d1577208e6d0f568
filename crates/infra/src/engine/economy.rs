//! Cancellation settlement and the points economy.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::pricing::bonus_points;
use super::BookingEngine;
use crate::error::{EngineResult, StateError};
use crate::events::{CancellationKind, EngineEvent};
use crate::models::{BookingRow, BookingStatus, CancellationPenalty, ClubSettings, Slot, SlotState};
use crate::store::{SlotChange, WalletDelta};

/// Financial effect of cancelling one booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub refund_credits: i64,
    pub refund_points: i64,
    /// Penalty actually taken, after clamping to what the player has.
    pub penalty: Option<CancellationPenalty>,
    /// Whether the freed seats come back as points-only recycled seats.
    pub recycles_seats: bool,
    pub kind: CancellationKind,
}

impl Settlement {
    pub fn wallet_delta(&self, user_id: Uuid) -> WalletDelta {
        let points_penalty = match self.penalty {
            Some(CancellationPenalty::Points(p)) => p,
            _ => 0,
        };
        WalletDelta {
            user_id,
            credit_cents: self.refund_credits,
            points: self.refund_points - points_penalty,
        }
    }
}

/// Applies the cancellation rules in order:
///
/// 1. seats paid with points are forfeited outright and come back as normal seats;
/// 2. on a confirmed slot the player earns bonus points per seat and the seats are recycled;
/// 3. otherwise the credits paid are returned minus the club's penalty.
///
/// A points penalty never takes more than `points_balance`; a credits penalty never more
/// than was paid.
pub fn settle_cancellation(
    settings: &ClubSettings,
    booking: &BookingRow,
    slot: &Slot,
    points_balance: i64,
) -> Settlement {
    if booking.booked_with_points {
        return Settlement {
            refund_credits: 0,
            refund_points: 0,
            penalty: None,
            recycles_seats: false,
            kind: CancellationKind::PointsBooking,
        };
    }

    if slot.state == SlotState::Confirmed {
        let per_seat = bonus_points(slot.seat_price_cents(), settings.cancellation_points_per_euro);
        return Settlement {
            refund_credits: 0,
            refund_points: per_seat * booking.group_size as i64,
            penalty: None,
            recycles_seats: true,
            kind: CancellationKind::WithBonus,
        };
    }

    let (refund_credits, penalty) = match settings.cancellation_penalty {
        CancellationPenalty::Points(p) => (
            booking.amount_paid_cents,
            CancellationPenalty::Points(p.min(points_balance).max(0)),
        ),
        CancellationPenalty::Credits(c) => {
            let taken = c.min(booking.amount_paid_cents).max(0);
            (booking.amount_paid_cents - taken, CancellationPenalty::Credits(taken))
        }
    };
    Settlement {
        refund_credits,
        refund_points: 0,
        penalty: Some(penalty),
        recycles_seats: false,
        kind: CancellationKind::WithPenalty,
    }
}

#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub booking: BookingRow,
    pub slot: Slot,
    pub settlement: Settlement,
}

impl BookingEngine {
    /// Cancels a booking and settles it. The booking's seats are freed; every other
    /// booking on the slot is left as it was, and a confirmed slot stays confirmed.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> EngineResult<CancellationOutcome> {
        let booking = self.get_booking(booking_id).await?;
        let outcome = self
            .with_retry(booking.slot_id, || self.try_cancel(booking_id))
            .await?;
        info!(
            %booking_id,
            slot_id = %outcome.slot.id,
            kind = ?outcome.settlement.kind,
            refund_credits = outcome.settlement.refund_credits,
            refund_points = outcome.settlement.refund_points,
            "booking cancelled"
        );
        Ok(outcome)
    }

    async fn try_cancel(&self, booking_id: Uuid) -> EngineResult<CancellationOutcome> {
        let now = self.now();
        let mut booking = self.get_booking(booking_id).await?;
        if booking.status == BookingStatus::Cancelled {
            return Err(StateError::AlreadyCancelled(booking_id).into());
        }
        let mut slot = self.load_slot(booking.slot_id).await?;
        if now >= slot.end_at() {
            return Err(StateError::PastActivity {
                slot_id: slot.id,
                ended_at: slot.end_at(),
            }
            .into());
        }
        let club = self.load_club(slot.club_id).await?;
        let wallet = self.wallet(booking.user_id).await?;

        let settlement = settle_cancellation(&club.settings, &booking, &slot, wallet.points);

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;
        if settlement.recycles_seats {
            slot.recycled_seats += booking.group_size;
        }
        if slot.state == SlotState::Proposed {
            // No longer full, so nothing is waiting for a court.
            slot.needs_court_review = false;
        }
        slot.updated_at = now;

        let mut change =
            SlotChange::new(slot).with_wallet_delta(settlement.wallet_delta(booking.user_id));
        change.updated_bookings.push(booking.clone());
        let slot = self.commit(change).await?;

        self.events.publish(EngineEvent::BookingCancelled {
            booking_id,
            slot_id: slot.id,
            user_id: booking.user_id,
            kind: settlement.kind,
        });
        Ok(CancellationOutcome {
            booking,
            slot,
            settlement,
        })
    }
}
