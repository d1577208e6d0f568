use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Seats a single booking may occupy, and the largest capacity a slot may declare.
pub const MAX_GROUP_SIZE: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "penalty_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    Points,
    Credits,
}

/// What a player forfeits when cancelling a seat on a slot that never filled up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationPenalty {
    Points(i64),
    Credits(i64),
}

/// Per-club business configuration handed explicitly to pricing and the points economy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClubSettings {
    pub utc_offset_minutes: i32,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub default_rate_cents: i64,
    /// Points charged per euro when paying a booking with points.
    pub redemption_points_per_euro: i64,
    /// Bonus points credited per euro of seat price on a bonified cancellation.
    pub cancellation_points_per_euro: i64,
    pub cancellation_penalty: CancellationPenalty,
    pub renewal_window_hours: i32,
}

impl Default for ClubSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            opens_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            closes_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            default_rate_cents: 2000,
            redemption_points_per_euro: 10,
            cancellation_points_per_euro: 1,
            cancellation_penalty: CancellationPenalty::Points(1),
            renewal_window_hours: 24,
        }
    }
}

impl ClubSettings {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn renewal_window(&self) -> Duration {
        Duration::hours(self.renewal_window_hours as i64)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClubRow {
    pub id: Uuid,
    pub name: String,
    pub utc_offset_minutes: i32,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub default_rate_cents: i64,
    pub redemption_points_per_euro: i64,
    pub cancellation_points_per_euro: i64,
    pub cancel_penalty_kind: PenaltyKind,
    pub cancel_penalty_amount: i64,
    pub renewal_window_hours: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Club {
    pub id: Uuid,
    pub name: String,
    pub settings: ClubSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ClubRow> for Club {
    fn from(r: ClubRow) -> Self {
        let cancellation_penalty = match r.cancel_penalty_kind {
            PenaltyKind::Points => CancellationPenalty::Points(r.cancel_penalty_amount),
            PenaltyKind::Credits => CancellationPenalty::Credits(r.cancel_penalty_amount),
        };
        Self {
            id: r.id,
            name: r.name,
            settings: ClubSettings {
                utc_offset_minutes: r.utc_offset_minutes,
                opens_at: r.opens_at,
                closes_at: r.closes_at,
                default_rate_cents: r.default_rate_cents,
                redemption_points_per_euro: r.redemption_points_per_euro,
                cancellation_points_per_euro: r.cancellation_points_per_euro,
                cancellation_penalty,
                renewal_window_hours: r.renewal_window_hours,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CourtRow {
    pub id: Uuid,
    pub club_id: Uuid,
    pub number: i32,
    pub is_active: bool,
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InstructorRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub club_id: Uuid,
    pub hourly_rate_cents: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Time-of-day rate rule. `id` is a serial so ascending id is creation order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PriceRuleRow {
    pub id: i64,
    pub club_id: Uuid,
    pub name: String,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    /// Bit 0 is Monday, bit 6 is Sunday.
    pub weekday_mask: i16,
    pub price_per_hour_cents: i64,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl PriceRuleRow {
    pub fn mask_for(days: &[Weekday]) -> i16 {
        days.iter()
            .fold(0i16, |mask, d| mask | (1 << d.num_days_from_monday()))
    }

    pub fn applies_on(&self, day: Weekday) -> bool {
        self.weekday_mask & (1 << day.num_days_from_monday()) != 0
    }

    /// Half-open `[starts_at, ends_at)`; a window whose end is not after its start wraps midnight.
    pub fn covers(&self, time: NaiveTime) -> bool {
        if self.starts_at < self.ends_at {
            self.starts_at <= time && time < self.ends_at
        } else if self.starts_at == self.ends_at {
            true
        } else {
            time >= self.starts_at || time < self.ends_at
        }
    }

    pub fn window_minutes(&self) -> i64 {
        let span = (self.ends_at - self.starts_at).num_minutes();
        if span > 0 {
            span
        } else {
            24 * 60 + span
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "slot_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Proposed,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "slot_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotKindTag {
    Class,
    Match,
    Rental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotKind {
    /// Instructor-led class, always 60 minutes.
    Class { instructor_id: Uuid },
    Match { organizer_id: Uuid, recurring: bool },
    Rental { organizer_id: Uuid },
}

impl SlotKind {
    pub fn tag(&self) -> SlotKindTag {
        match self {
            SlotKind::Class { .. } => SlotKindTag::Class,
            SlotKind::Match { .. } => SlotKindTag::Match,
            SlotKind::Rental { .. } => SlotKindTag::Rental,
        }
    }

    pub fn instructor_id(&self) -> Option<Uuid> {
        match self {
            SlotKind::Class { instructor_id } => Some(*instructor_id),
            _ => None,
        }
    }

    pub fn organizer_id(&self) -> Option<Uuid> {
        match self {
            SlotKind::Class { .. } => None,
            SlotKind::Match { organizer_id, .. } | SlotKind::Rental { organizer_id } => {
                Some(*organizer_id)
            }
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, SlotKind::Match { recurring: true, .. })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SlotRow {
    pub id: Uuid,
    pub club_id: Uuid,
    pub kind: SlotKindTag,
    pub instructor_id: Option<Uuid>,
    pub organizer_id: Option<Uuid>,
    pub is_recurring: bool,
    pub court_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    pub level_min: Option<f64>,
    pub level_max: Option<f64>,
    pub category: Option<String>,
    pub total_price_cents: i64,
    pub state: SlotState,
    pub recycled_seats: i32,
    pub needs_court_review: bool,
    pub reserved_for: Option<Uuid>,
    pub completion_processed: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A schedulable unit of court time: a class, a match or a plain court rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub club_id: Uuid,
    pub kind: SlotKind,
    pub court_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    pub level_min: Option<f64>,
    pub level_max: Option<f64>,
    pub category: Option<String>,
    pub total_price_cents: i64,
    pub state: SlotState,
    /// Free seats released by bonified cancellations; payable only with points.
    pub recycled_seats: i32,
    /// Full, but no court could be assigned at confirmation time.
    pub needs_court_review: bool,
    /// Provisional recurring occurrence held for its organizer until renewal.
    pub reserved_for: Option<Uuid>,
    pub completion_processed: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn end_at(&self) -> DateTime<Utc> {
        self.start_at + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        end > self.start_at && start < self.end_at()
    }

    /// Price of one seat, rounded half-up to the cent.
    pub fn seat_price_cents(&self) -> i64 {
        crate::engine::pricing::div_round_half_up(self.total_price_cents, self.capacity.max(1) as i64)
    }

    pub fn local_weekday(&self, offset: FixedOffset) -> Weekday {
        self.start_at.with_timezone(&offset).weekday()
    }
}

impl TryFrom<SlotRow> for Slot {
    type Error = String;

    fn try_from(r: SlotRow) -> Result<Self, Self::Error> {
        let kind = match (r.kind, r.instructor_id, r.organizer_id) {
            (SlotKindTag::Class, Some(instructor_id), _) => SlotKind::Class { instructor_id },
            (SlotKindTag::Match, _, Some(organizer_id)) => SlotKind::Match {
                organizer_id,
                recurring: r.is_recurring,
            },
            (SlotKindTag::Rental, _, Some(organizer_id)) => SlotKind::Rental { organizer_id },
            (tag, _, _) => return Err(format!("slot {} has inconsistent {:?} kind columns", r.id, tag)),
        };
        Ok(Self {
            id: r.id,
            club_id: r.club_id,
            kind,
            court_id: r.court_id,
            start_at: r.start_at,
            duration_minutes: r.duration_minutes,
            capacity: r.capacity,
            level_min: r.level_min,
            level_max: r.level_max,
            category: r.category,
            total_price_cents: r.total_price_cents,
            state: r.state,
            recycled_seats: r.recycled_seats,
            needs_court_review: r.needs_court_review,
            reserved_for: r.reserved_for,
            completion_processed: r.completion_processed,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct BookingRow {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub user_id: Uuid,
    pub group_size: i32,
    pub status: BookingStatus,
    pub booked_with_points: bool,
    pub is_recycled: bool,
    pub amount_paid_cents: i64,
    pub points_paid: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRow {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WalletRow {
    pub user_id: Uuid,
    pub credit_cents: i64,
    pub points: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct RecurringMatchLinkRow {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub base_match_id: Uuid,
    pub next_slot_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Requesting player, as vouched for by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: Uuid,
    pub level: Option<f64>,
    pub category: Option<String>,
}

impl Player {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            level: None,
            category: None,
        }
    }

    /// Level must sit inside the slot's declared range (open bounds allowed) and the
    /// category must match unless the slot is open to everyone.
    pub fn is_compatible_with(&self, slot: &Slot) -> bool {
        let level_ok = match (slot.level_min, slot.level_max) {
            (None, None) => true,
            (min, max) => match self.level {
                Some(level) => {
                    min.map_or(true, |m| level >= m) && max.map_or(true, |m| level <= m)
                }
                None => false,
            },
        };
        let category_ok = match slot.category.as_deref() {
            None => true,
            Some(c) if c.eq_ignore_ascii_case("open") => true,
            Some(c) => self
                .category
                .as_deref()
                .is_some_and(|mine| mine.eq_ignore_ascii_case(c)),
        };
        level_ok && category_ok
    }
}
