use async_graphql::{Enum, InputObject, SimpleObject};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use infra::engine;
use infra::events::EngineEvent;
use infra::models::{self, CancellationPenalty};

use crate::gql::scalars::Money;

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Manager,
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
#[graphql(remote = "infra::models::SlotState")]
pub enum SlotState {
    Proposed,
    Confirmed,
    Cancelled,
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
#[graphql(remote = "infra::models::SlotKindTag")]
pub enum SlotKind {
    Class,
    Match,
    Rental,
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
#[graphql(remote = "infra::models::BookingStatus")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
#[graphql(remote = "infra::engine::Payment")]
pub enum PaymentMethod {
    Credits,
    Points,
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
#[graphql(remote = "infra::events::CancellationKind")]
pub enum CancellationKind {
    PointsBooking,
    WithBonus,
    WithPenalty,
    Expired,
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Unchanged,
    Confirmed,
    /// Full, waiting for a manager to find a court.
    Deferred,
}

#[derive(SimpleObject, Clone)]
pub struct Slot {
    pub id: Uuid,
    pub club_id: Uuid,
    pub kind: SlotKind,
    pub instructor_id: Option<Uuid>,
    pub organizer_id: Option<Uuid>,
    pub recurring: bool,
    pub court_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    pub level_min: Option<f64>,
    pub level_max: Option<f64>,
    pub category: Option<String>,
    pub total_price: Money,
    pub seat_price: Money,
    pub state: SlotState,
    pub recycled_seats: i32,
    pub needs_court_review: bool,
    pub reserved_for: Option<Uuid>,
    pub version: i64,
}

impl From<models::Slot> for Slot {
    fn from(s: models::Slot) -> Self {
        Self {
            end_at: s.end_at(),
            seat_price: Money(s.seat_price_cents()),
            id: s.id,
            club_id: s.club_id,
            kind: s.kind.tag().into(),
            instructor_id: s.kind.instructor_id(),
            organizer_id: s.kind.organizer_id(),
            recurring: s.kind.is_recurring(),
            court_id: s.court_id,
            start_at: s.start_at,
            duration_minutes: s.duration_minutes,
            capacity: s.capacity,
            level_min: s.level_min,
            level_max: s.level_max,
            category: s.category,
            total_price: Money(s.total_price_cents),
            state: s.state.into(),
            recycled_seats: s.recycled_seats,
            needs_court_review: s.needs_court_review,
            reserved_for: s.reserved_for,
            version: s.version,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub user_id: Uuid,
    pub group_size: i32,
    pub status: BookingStatus,
    pub payment: PaymentMethod,
    /// Seat taken from the recycled pool.
    pub is_recycled: bool,
    pub amount_paid: Money,
    pub points_paid: i64,
    pub created_at: DateTime<Utc>,
}

impl From<models::BookingRow> for Booking {
    fn from(b: models::BookingRow) -> Self {
        Self {
            id: b.id,
            slot_id: b.slot_id,
            user_id: b.user_id,
            group_size: b.group_size,
            status: b.status.into(),
            payment: if b.booked_with_points {
                PaymentMethod::Points
            } else {
                PaymentMethod::Credits
            },
            is_recycled: b.is_recycled,
            amount_paid: Money(b.amount_paid_cents),
            points_paid: b.points_paid,
            created_at: b.created_at,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct Wallet {
    pub user_id: Uuid,
    pub credit: Money,
    pub points: i64,
}

impl From<models::WalletRow> for Wallet {
    fn from(w: models::WalletRow) -> Self {
        Self {
            user_id: w.user_id,
            credit: Money(w.credit_cents),
            points: w.points,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub slot: Slot,
    pub confirmation: ConfirmationOutcome,
    /// Court assigned when this booking confirmed the slot.
    pub court_id: Option<Uuid>,
}

impl From<engine::BookingReceipt> for BookingReceipt {
    fn from(r: engine::BookingReceipt) -> Self {
        let (confirmation, court_id) = match r.confirmation {
            engine::Confirmation::Unchanged => (ConfirmationOutcome::Unchanged, None),
            engine::Confirmation::Confirmed { court_id } => {
                (ConfirmationOutcome::Confirmed, Some(court_id))
            }
            engine::Confirmation::Deferred => (ConfirmationOutcome::Deferred, None),
        };
        Self {
            booking: r.booking.into(),
            slot: r.slot.into(),
            confirmation,
            court_id,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct CancellationResult {
    pub booking: Booking,
    pub slot: Slot,
    pub kind: CancellationKind,
    pub refunded_credit: Money,
    pub refunded_points: i64,
    pub penalty_points: i64,
    pub penalty_credit: Money,
    pub seats_recycled: bool,
}

impl From<engine::CancellationOutcome> for CancellationResult {
    fn from(o: engine::CancellationOutcome) -> Self {
        let s = o.settlement;
        let (penalty_points, penalty_credit) = match s.penalty {
            Some(CancellationPenalty::Points(p)) => (p, 0),
            Some(CancellationPenalty::Credits(c)) => (0, c),
            None => (0, 0),
        };
        Self {
            booking: o.booking.into(),
            slot: o.slot.into(),
            kind: s.kind.into(),
            refunded_credit: Money(s.refund_credits),
            refunded_points: s.refund_points,
            penalty_points,
            penalty_credit: Money(penalty_credit),
            seats_recycled: s.recycles_seats,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct RenewalLink {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub base_match_id: Uuid,
    pub next_slot_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub reminder_sent: bool,
}

impl From<models::RecurringMatchLinkRow> for RenewalLink {
    fn from(l: models::RecurringMatchLinkRow) -> Self {
        Self {
            id: l.id,
            organizer_id: l.organizer_id,
            base_match_id: l.base_match_id,
            next_slot_id: l.next_slot_id,
            expires_at: l.expires_at,
            reminder_sent: l.reminder_sent,
        }
    }
}

#[derive(SimpleObject, Clone, Copy)]
pub struct SweepReport {
    pub expired_proposals: i32,
    pub renewals_opened: i32,
    pub reminders_sent: i32,
    pub links_removed: i32,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl From<engine::SweepReport> for SweepReport {
    fn from(r: engine::SweepReport) -> Self {
        Self {
            expired_proposals: count(r.expired_proposals),
            renewals_opened: count(r.renewals_opened),
            reminders_sent: count(r.reminders_sent),
            links_removed: count(r.links_removed),
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineEventType {
    SlotConfirmed,
    BookingCancelled,
    RenewalExpiringSoon,
}

/// Flattened engine event; fields not relevant to `event_type` are null.
#[derive(SimpleObject, Clone)]
pub struct EngineEventPayload {
    pub event_type: EngineEventType,
    pub slot_id: Uuid,
    pub club_id: Option<Uuid>,
    pub court_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub link_id: Option<Uuid>,
    pub cancellation_kind: Option<CancellationKind>,
    /// Slot start for confirmations, deadline for renewal reminders.
    pub at: Option<DateTime<Utc>>,
}

impl From<EngineEvent> for EngineEventPayload {
    fn from(event: EngineEvent) -> Self {
        let blank = |event_type, slot_id| Self {
            event_type,
            slot_id,
            club_id: None,
            court_id: None,
            booking_id: None,
            user_id: None,
            link_id: None,
            cancellation_kind: None,
            at: None,
        };
        match event {
            EngineEvent::SlotConfirmed {
                slot_id,
                club_id,
                court_id,
                start_at,
            } => Self {
                club_id: Some(club_id),
                court_id: Some(court_id),
                at: Some(start_at),
                ..blank(EngineEventType::SlotConfirmed, slot_id)
            },
            EngineEvent::BookingCancelled {
                booking_id,
                slot_id,
                user_id,
                kind,
            } => Self {
                booking_id: Some(booking_id),
                user_id: Some(user_id),
                cancellation_kind: Some(kind.into()),
                ..blank(EngineEventType::BookingCancelled, slot_id)
            },
            EngineEvent::RenewalExpiringSoon {
                link_id,
                organizer_id,
                next_slot_id,
                expires_at,
            } => Self {
                link_id: Some(link_id),
                user_id: Some(organizer_id),
                at: Some(expires_at),
                ..blank(EngineEventType::RenewalExpiringSoon, next_slot_id)
            },
        }
    }
}

impl EngineEventPayload {
    /// Whether a subscriber filtering on `club_id` / `user_id` should see this event.
    /// Events without the field in question pass.
    pub fn is_visible_to(&self, club_id: Option<Uuid>, user_id: Option<Uuid>) -> bool {
        let club_ok = match (club_id, self.club_id) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        };
        let user_ok = match (user_id, self.user_id) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        };
        club_ok && user_ok
    }
}

#[derive(InputObject)]
pub struct ProposeSlotInput {
    pub club_id: Uuid,
    pub kind: SlotKind,
    /// Required for classes.
    pub instructor_id: Option<Uuid>,
    #[graphql(default)]
    pub recurring: bool,
    pub start_at: DateTime<Utc>,
    #[graphql(default = 60)]
    pub duration_minutes: i32,
    #[graphql(default = 4)]
    pub capacity: i32,
    pub level_min: Option<f64>,
    pub level_max: Option<f64>,
    pub category: Option<String>,
}

#[derive(InputObject)]
pub struct CanStartAtInput {
    pub club_id: Uuid,
    pub instructor_id: Option<Uuid>,
    pub court_id: Option<Uuid>,
    /// Club-local calendar day.
    pub day: NaiveDate,
    /// Club-local time of day.
    pub time: NaiveTime,
    #[graphql(default = 60)]
    pub duration_minutes: i32,
}

impl From<CanStartAtInput> for engine::AvailabilityQuery {
    fn from(i: CanStartAtInput) -> Self {
        Self {
            club_id: i.club_id,
            instructor_id: i.instructor_id,
            court_id: i.court_id,
            day: i.day,
            time: i.time,
            duration_minutes: i.duration_minutes,
        }
    }
}
