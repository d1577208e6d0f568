use chrono::{DateTime, NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::SlotState;

pub type EngineResult<T> = Result<T, EngineError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by a [`crate::store::BookingStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Optimistic lock lost: the slot (or a row guarded alongside it) changed since it was read.
    #[error("slot {0} was modified concurrently")]
    VersionConflict(Uuid),

    #[error("wallet of user {0} would go negative")]
    InsufficientBalance(Uuid),

    #[error("no wallet for user {0}")]
    MissingWallet(Uuid),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("duration of {0} minutes is not aligned to the 30-minute grid")]
    MisalignedDuration(i32),

    #[error("start {0} is not aligned to the 30-minute grid")]
    MisalignedStart(DateTime<Utc>),

    #[error("classes last exactly 60 minutes, got {0}")]
    ClassDuration(i32),

    #[error("{start}-{end} falls outside opening hours {opens}-{closes}")]
    OutOfHours {
        start: NaiveTime,
        end: NaiveTime,
        opens: NaiveTime,
        closes: NaiveTime,
    },

    #[error("group size {0} must be between 1 and 4")]
    InvalidGroupSize(i32),

    #[error("capacity {0} must be between 1 and 4")]
    InvalidCapacity(i32),

    #[error("player level is not compatible with slot {0}")]
    LevelMismatch(Uuid),

    #[error("instructor {0} is inactive")]
    InactiveInstructor(Uuid),

    #[error("instructor {instructor_id} does not belong to club {club_id}")]
    ForeignInstructor { instructor_id: Uuid, club_id: Uuid },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConflictError {
    #[error("capacity exceeded by {over} seat(s): requested {requested}, {available} free")]
    CapacityExceeded {
        requested: i32,
        available: i32,
        over: i32,
    },

    #[error("user {user_id} already holds an active booking on slot {slot_id}")]
    DuplicateBooking { slot_id: Uuid, user_id: Uuid },

    #[error("only recycled seats remain ({recycled}); they are payable with points only")]
    RecycledSeatsRequirePoints { recycled: i32 },

    #[error("instructor {instructor_id} is busy or inside the changeover buffer at {start}")]
    InstructorUnavailable {
        instructor_id: Uuid,
        start: DateTime<Utc>,
    },

    #[error("instructor {instructor_id} already has an open proposal at {start}")]
    DuplicateProposal {
        instructor_id: Uuid,
        start: DateTime<Utc>,
    },

    #[error("no free court for slot {0}")]
    NoCourtAvailable(Uuid),

    #[error("insufficient credit: {needed} cents needed, {available} available")]
    InsufficientCredits { needed: i64, available: i64 },

    #[error("insufficient points: {needed} needed, {available} available")]
    InsufficientPoints { needed: i64, available: i64 },

    #[error("slot {0} kept changing under concurrent requests; retry with fresh data")]
    ConcurrentModification(Uuid),
}

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(Uuid),

    #[error("slot {slot_id} already ended at {ended_at}")]
    PastActivity {
        slot_id: Uuid,
        ended_at: DateTime<Utc>,
    },

    #[error("slot {slot_id} started at {started_at} and no longer takes bookings")]
    AlreadyStarted {
        slot_id: Uuid,
        started_at: DateTime<Utc>,
    },

    #[error("renewal window closed at {0}")]
    RenewalExpired(DateTime<Utc>),

    #[error("slot {slot_id} is {state:?} and cannot be booked")]
    NotBookable { slot_id: Uuid, state: SlotState },

    #[error("slot {0} is already confirmed")]
    AlreadyConfirmed(Uuid),

    #[error("slot {0} is not waiting for a court")]
    NotAwaitingCourt(Uuid),

    #[error("slot {0} is held for its organizer's renewal")]
    ReservedForOrganizer(Uuid),

    #[error("slot {0} has no unfilled seats left to privatize")]
    NothingToPrivatize(Uuid),
}

#[derive(Debug, Error, PartialEq)]
pub enum NotFoundError {
    #[error("club {0} not found")]
    Club(Uuid),
    #[error("instructor {0} not found")]
    Instructor(Uuid),
    #[error("slot {0} not found")]
    Slot(Uuid),
    #[error("booking {0} not found")]
    Booking(Uuid),
    #[error("wallet for user {0} not found")]
    Wallet(Uuid),
    #[error("renewal link {0} not found")]
    RenewalLink(Uuid),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    State,
    NotFound,
    Store,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::State => "STATE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Store => "STORE",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::State(_) => ErrorKind::State,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Store(StoreError::VersionConflict(_) | StoreError::InsufficientBalance(_)) => {
                ErrorKind::Conflict
            }
            EngineError::Store(_) => ErrorKind::Store,
        }
    }

    /// Only a lost optimistic lock is worth re-running with fresh data. A balance check
    /// failing at commit means the wallet moved after it was read, so it counts too.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::VersionConflict(_) | StoreError::InsufficientBalance(_))
        )
    }

    /// Maps store-level balance checks onto the caller-facing taxonomy.
    pub(crate) fn from_commit(err: StoreError) -> Self {
        match err {
            StoreError::MissingWallet(user_id) => NotFoundError::Wallet(user_id).into(),
            other => other.into(),
        }
    }
}
