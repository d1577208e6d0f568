use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// How a cancellation was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationKind {
    /// Seat had been paid with points: nothing comes back.
    PointsBooking,
    /// Slot was confirmed: bonus points, seat recycled.
    WithBonus,
    /// Slot was still a proposal: refund minus penalty.
    WithPenalty,
    /// Proposal expired before filling: full refund.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SlotConfirmed {
        slot_id: Uuid,
        club_id: Uuid,
        court_id: Uuid,
        start_at: DateTime<Utc>,
    },
    BookingCancelled {
        booking_id: Uuid,
        slot_id: Uuid,
        user_id: Uuid,
        kind: CancellationKind,
    },
    RenewalExpiringSoon {
        link_id: Uuid,
        organizer_id: Uuid,
        next_slot_id: Uuid,
        expires_at: DateTime<Utc>,
    },
}

/// Fire-and-forget fan-out of engine events to whoever is listening.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: EngineEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
