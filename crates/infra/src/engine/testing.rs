//! Seeded in-memory club shared by the engine tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use super::BookingEngine;
use crate::clock::ManualClock;
use crate::models::{
    Club, ClubSettings, CourtRow, InstructorRow, Player, Slot, SlotKind, SlotState, WalletRow,
};
use crate::retry::RetryPolicy;
use crate::store::{BookingStore, MemoryStore};

pub(crate) struct Fixture {
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub engine: BookingEngine,
    pub club: Club,
    pub courts: Vec<CourtRow>,
    pub instructor: InstructorRow,
}

impl Fixture {
    /// Club open 08:00-22:00 UTC with two courts; the clock reads Monday 2026-03-02 06:00.
    pub async fn new() -> Self {
        Self::with_settings(ClubSettings::default()).await
    }

    pub async fn with_settings(settings: ClubSettings) -> Self {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap();
        let store = MemoryStore::new();
        let clock = ManualClock::new(now);

        let club = Club {
            id: Uuid::new_v4(),
            name: "Padel Norte".into(),
            settings,
            created_at: now,
            updated_at: now,
        };
        store.insert_club(club.clone()).await;

        let mut courts = Vec::new();
        for number in 1..=2 {
            let court = CourtRow {
                id: Uuid::new_v4(),
                club_id: club.id,
                number,
                is_active: true,
                capacity: 4,
                created_at: now,
                updated_at: now,
            };
            store.insert_court(court.clone()).await;
            courts.push(court);
        }

        let instructor = InstructorRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            club_id: club.id,
            hourly_rate_cents: 3000,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_instructor(instructor.clone()).await;

        let engine = BookingEngine::new(Arc::new(store.clone()), Arc::new(clock.clone()))
            .with_retry_policy(RetryPolicy::new(3, 1, 2, 0.0));

        Self {
            store,
            clock,
            engine,
            club,
            courts,
            instructor,
        }
    }

    pub fn day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    pub fn at(&self, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    pub async fn player(&self, credit_cents: i64, points: i64) -> Player {
        let player = Player::new(Uuid::new_v4());
        self.store
            .upsert_wallet(WalletRow {
                user_id: player.user_id,
                credit_cents,
                points,
                updated_at: self.clock_now(),
            })
            .await;
        player
    }

    pub async fn balance(&self, player: &Player) -> (i64, i64) {
        let wallet = self.store.wallet(player.user_id).await.unwrap().unwrap();
        (wallet.credit_cents, wallet.points)
    }

    pub fn slot_at(&self, kind: SlotKind, start_at: DateTime<Utc>, duration_minutes: i32) -> Slot {
        let now = self.clock_now();
        Slot {
            id: Uuid::new_v4(),
            club_id: self.club.id,
            kind,
            court_id: None,
            start_at,
            duration_minutes,
            capacity: 4,
            level_min: None,
            level_max: None,
            category: None,
            total_price_cents: 6000,
            state: SlotState::Proposed,
            recycled_seats: 0,
            needs_court_review: false,
            reserved_for: None,
            completion_processed: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Open class proposal at `h:00` priced 60.00 (15.00 a seat).
    pub async fn class_proposal(&self, h: u32) -> Slot {
        let slot = self.slot_at(
            SlotKind::Class {
                instructor_id: self.instructor.id,
            },
            self.at(h, 0),
            60,
        );
        self.store.insert_slot(slot).await.unwrap()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    fn clock_now(&self) -> DateTime<Utc> {
        use crate::clock::Clock;
        self.clock.now()
    }
}
