use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures_util::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::availability::{
    busy_intervals, can_start_at, day_bounds, is_on_grid, opening_window, BUFFER_MINUTES,
    CLASS_MINUTES, GRID_MINUTES,
};
use super::BookingEngine;
use crate::error::{
    ConflictError, EngineError, EngineResult, NotFoundError, StateError, StoreError,
    ValidationError,
};
use crate::events::{CancellationKind, EngineEvent};
use crate::models::{
    BookingRow, BookingStatus, Club, InstructorRow, Player, Slot, SlotKind, SlotState,
    MAX_GROUP_SIZE,
};
use crate::pagination::LimitOffset;
use crate::store::{SlotChange, SlotFilter, WalletDelta};

/// Request to open a single slot.
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub club_id: Uuid,
    pub kind: SlotKind,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    pub level_min: Option<f64>,
    pub level_max: Option<f64>,
    pub category: Option<String>,
}

fn check_duration(kind: &SlotKind, duration_minutes: i32) -> Result<(), ValidationError> {
    if duration_minutes <= 0 || duration_minutes as i64 % GRID_MINUTES != 0 {
        return Err(ValidationError::MisalignedDuration(duration_minutes));
    }
    if matches!(kind, SlotKind::Class { .. }) && duration_minutes != CLASS_MINUTES {
        return Err(ValidationError::ClassDuration(duration_minutes));
    }
    Ok(())
}

fn check_opening_hours(club: &Club, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    let settings = &club.settings;
    let local_day = start.with_timezone(&settings.offset()).date_naive();
    // A window that closes after midnight may still hold an early-morning start.
    let fits = [local_day.pred_opt(), Some(local_day)]
        .into_iter()
        .flatten()
        .map(|day| opening_window(settings, day))
        .any(|(opens, closes)| start >= opens && end <= closes);
    if fits {
        return Ok(());
    }
    let offset = settings.offset();
    Err(ValidationError::OutOfHours {
        start: start.with_timezone(&offset).time(),
        end: end.with_timezone(&offset).time(),
        opens: settings.opens_at,
        closes: settings.closes_at,
    })
}

fn check_instructor(club: &Club, instructor: &InstructorRow) -> Result<(), ValidationError> {
    if instructor.club_id != club.id {
        return Err(ValidationError::ForeignInstructor {
            instructor_id: instructor.id,
            club_id: club.id,
        });
    }
    if !instructor.is_active {
        return Err(ValidationError::InactiveInstructor(instructor.id));
    }
    Ok(())
}

impl BookingEngine {
    async fn load_instructor(&self, id: Uuid) -> EngineResult<InstructorRow> {
        self.store
            .instructor(id)
            .await?
            .ok_or_else(|| NotFoundError::Instructor(id).into())
    }

    /// Opens a class proposal on every free grid point of `day` for each instructor.
    ///
    /// Instructors are handled concurrently. Starts that already carry an open proposal are
    /// skipped, so re-running only fills gaps; the returned slots are the ones created now.
    pub async fn create_proposals(
        &self,
        club_id: Uuid,
        day: NaiveDate,
        instructor_ids: &[Uuid],
    ) -> EngineResult<Vec<Slot>> {
        let club = self.load_club(club_id).await?;
        let batches = try_join_all(
            instructor_ids
                .iter()
                .map(|&id| self.propose_day_for(&club, day, id)),
        )
        .await?;
        let created: Vec<Slot> = batches.into_iter().flatten().collect();
        info!(%club_id, %day, instructors = instructor_ids.len(), created = created.len(), "proposals generated");
        Ok(created)
    }

    async fn propose_day_for(&self, club: &Club, day: NaiveDate, instructor_id: Uuid) -> EngineResult<Vec<Slot>> {
        let instructor = self.load_instructor(instructor_id).await?;
        check_instructor(club, &instructor)?;

        let now = self.now();
        let (opens, closes) = opening_window(&club.settings, day);
        let rules = self.store.price_rules(club.id).await?;
        let taken = self
            .instructor_day(&club.settings, club.id, instructor_id, day)
            .await?;
        let busy = busy_intervals(&taken, None);
        let buffer = Duration::minutes(BUFFER_MINUTES);
        let class = Duration::minutes(CLASS_MINUTES as i64);

        let mut candidates = Vec::new();
        let mut start = opens;
        while start + class <= closes {
            if start > now && can_start_at(&busy, start, CLASS_MINUTES, buffer) {
                let rate = super::pricing::resolve_rate(&club.settings, &rules, start);
                candidates.push(Slot {
                    id: Uuid::new_v4(),
                    club_id: club.id,
                    kind: SlotKind::Class { instructor_id },
                    court_id: None,
                    start_at: start,
                    duration_minutes: CLASS_MINUTES,
                    capacity: MAX_GROUP_SIZE,
                    level_min: None,
                    level_max: None,
                    category: None,
                    total_price_cents: super::pricing::slot_total_cents(rate, CLASS_MINUTES),
                    state: SlotState::Proposed,
                    recycled_seats: 0,
                    needs_court_review: false,
                    reserved_for: None,
                    completion_processed: false,
                    version: 0,
                    created_at: now,
                    updated_at: now,
                });
            }
            start += Duration::minutes(GRID_MINUTES);
        }

        let considered = candidates.len();
        let inserted = self.store.insert_proposals(candidates).await?;
        debug!(%instructor_id, considered, inserted = inserted.len(), "instructor day proposed");
        Ok(inserted)
    }

    /// Opens a single class, match or rental slot after grid, opening-hours and instructor
    /// checks. The slot is priced from the rate in force at its start.
    pub async fn propose_slot(&self, new: NewSlot) -> EngineResult<Slot> {
        let club = self.load_club(new.club_id).await?;
        let now = self.now();

        check_duration(&new.kind, new.duration_minutes)?;
        if !(1..=MAX_GROUP_SIZE).contains(&new.capacity) {
            return Err(ValidationError::InvalidCapacity(new.capacity).into());
        }
        if !is_on_grid(&club.settings, new.start_at) {
            return Err(ValidationError::MisalignedStart(new.start_at).into());
        }
        let end = new.start_at + Duration::minutes(new.duration_minutes as i64);
        check_opening_hours(&club, new.start_at, end)?;

        let id = Uuid::new_v4();
        if new.start_at <= now {
            return Err(StateError::AlreadyStarted {
                slot_id: id,
                started_at: new.start_at,
            }
            .into());
        }

        if let SlotKind::Class { instructor_id } = new.kind {
            let instructor = self.load_instructor(instructor_id).await?;
            check_instructor(&club, &instructor)?;
            let local_day = new.start_at.with_timezone(&club.settings.offset()).date_naive();
            let taken = self
                .instructor_day(&club.settings, club.id, instructor_id, local_day)
                .await?;
            let busy = busy_intervals(&taken, None);
            if !can_start_at(&busy, new.start_at, new.duration_minutes, Duration::minutes(BUFFER_MINUTES)) {
                return Err(ConflictError::InstructorUnavailable {
                    instructor_id,
                    start: new.start_at,
                }
                .into());
            }
        }

        let total_price_cents = self
            .slot_price(club.id, &club.settings, new.start_at, new.duration_minutes)
            .await?;
        let slot = Slot {
            id,
            club_id: club.id,
            kind: new.kind,
            court_id: None,
            start_at: new.start_at,
            duration_minutes: new.duration_minutes,
            capacity: new.capacity,
            level_min: new.level_min,
            level_max: new.level_max,
            category: new.category,
            total_price_cents,
            state: SlotState::Proposed,
            recycled_seats: 0,
            needs_court_review: false,
            reserved_for: None,
            completion_processed: false,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let slot = self.store.insert_slot(slot).await.map_err(|e| -> EngineError {
            match e {
                StoreError::VersionConflict(_) => ConflictError::DuplicateProposal {
                    instructor_id: new.kind.instructor_id().unwrap_or_default(),
                    start: new.start_at,
                }
                .into(),
                other => other.into(),
            }
        })?;
        info!(slot_id = %slot.id, kind = ?slot.kind.tag(), start = %slot.start_at, "slot proposed");
        Ok(slot)
    }

    /// Upcoming proposals the player may join. Slots held for another organizer's renewal
    /// are hidden.
    pub async fn list_proposals(
        &self,
        club_id: Uuid,
        player: &Player,
        instructor_id: Option<Uuid>,
        from: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<Slot>> {
        let filter = SlotFilter {
            club_id: Some(club_id),
            instructor_id,
            state: Some(SlotState::Proposed),
            from: Some(from.unwrap_or_else(|| self.now())),
            ..SlotFilter::default()
        };
        let slots = self.store.slots(filter, None).await?;
        Ok(slots
            .into_iter()
            .filter(|s| s.reserved_for.map_or(true, |owner| owner == player.user_id))
            .filter(|s| player.is_compatible_with(s))
            .collect())
    }

    /// Slots starting on a club-local calendar day, any state.
    pub async fn day_slots(
        &self,
        club_id: Uuid,
        day: NaiveDate,
        instructor_id: Option<Uuid>,
        court_id: Option<Uuid>,
    ) -> EngineResult<Vec<Slot>> {
        let club = self.load_club(club_id).await?;
        let (from, to) = day_bounds(&club.settings, day);
        let filter = SlotFilter {
            club_id: Some(club_id),
            instructor_id,
            court_id,
            from: Some(from),
            to: Some(to),
            ..SlotFilter::default()
        };
        Ok(self.store.slots(filter, None).await?)
    }

    pub async fn get_slot(&self, id: Uuid) -> EngineResult<Slot> {
        self.load_slot(id).await
    }

    /// Cancels every proposal whose start has passed. Pending seats get back exactly what
    /// they paid, so the expiry has no net financial effect. Returns the expired slot ids.
    pub async fn expire_stale_proposals(&self) -> EngineResult<Vec<Uuid>> {
        let filter = SlotFilter {
            state: Some(SlotState::Proposed),
            to: Some(self.now() + Duration::seconds(1)),
            ..SlotFilter::default()
        };
        let page = LimitOffset {
            limit: 500,
            offset: 0,
        };
        let stale = self.store.slots(filter, Some(page)).await?;

        let mut expired = Vec::with_capacity(stale.len());
        for slot in stale {
            match self.with_retry(slot.id, || self.try_expire(slot.id)).await {
                Ok(true) => expired.push(slot.id),
                Ok(false) => {}
                Err(e) => warn!(slot_id = %slot.id, error = %e, "failed to expire proposal"),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "stale proposals expired");
        }
        Ok(expired)
    }

    async fn try_expire(&self, slot_id: Uuid) -> EngineResult<bool> {
        let now = self.now();
        let mut slot = self.load_slot(slot_id).await?;
        if slot.state != SlotState::Proposed || slot.start_at > now {
            return Ok(false);
        }

        let refunded: Vec<BookingRow> = self
            .store
            .bookings_for_slot(slot_id)
            .await?
            .into_iter()
            .filter(BookingRow::is_active)
            .map(|mut b| {
                b.status = BookingStatus::Cancelled;
                b.updated_at = now;
                b
            })
            .collect();

        slot.state = SlotState::Cancelled;
        slot.needs_court_review = false;
        slot.updated_at = now;
        let mut change = SlotChange::new(slot);
        for b in &refunded {
            change = change.with_wallet_delta(WalletDelta {
                user_id: b.user_id,
                credit_cents: b.amount_paid_cents,
                points: b.points_paid,
            });
        }
        change.updated_bookings = refunded.clone();
        self.commit(change).await?;

        for b in refunded {
            self.events.publish(EngineEvent::BookingCancelled {
                booking_id: b.id,
                slot_id,
                user_id: b.user_id,
                kind: CancellationKind::Expired,
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use crate::engine::Payment;
    use crate::error::EngineError;
    use crate::models::{ClubSettings, PriceRuleRow};
    use crate::store::BookingStore;
    use chrono::{NaiveTime, TimeZone, Weekday};

    #[tokio::test]
    async fn test_create_proposals_is_idempotent() {
        let fx = Fixture::new().await;
        let first = fx
            .engine
            .create_proposals(fx.club.id, fx.day(), &[fx.instructor.id])
            .await
            .unwrap();
        // 08:00 through 21:00 inclusive.
        assert_eq!(first.len(), 27);
        assert!(first.iter().all(|s| s.capacity == 4 && s.state == SlotState::Proposed));

        let second = fx
            .engine
            .create_proposals(fx.club.id, fx.day(), &[fx.instructor.id])
            .await
            .unwrap();
        assert!(second.is_empty());

        let all = fx
            .engine
            .day_slots(fx.club.id, fx.day(), Some(fx.instructor.id), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 27);
    }

    #[tokio::test]
    async fn test_create_proposals_respects_confirmed_classes() {
        let fx = Fixture::new().await;
        let mut class = fx.slot_at(
            SlotKind::Class {
                instructor_id: fx.instructor.id,
            },
            fx.at(10, 0),
            60,
        );
        class.state = SlotState::Confirmed;
        class.court_id = Some(fx.courts[0].id);
        fx.store.insert_slot(class).await.unwrap();

        let created = fx
            .engine
            .create_proposals(fx.club.id, fx.day(), &[fx.instructor.id])
            .await
            .unwrap();
        let starts: Vec<_> = created.iter().map(|s| s.start_at).collect();
        assert!(starts.contains(&fx.at(9, 0)));
        assert!(!starts.contains(&fx.at(9, 30)));
        assert!(!starts.contains(&fx.at(10, 0)));
        assert!(!starts.contains(&fx.at(10, 30)));
        assert!(starts.contains(&fx.at(11, 0)));
    }

    #[tokio::test]
    async fn test_create_proposals_skips_past_starts_and_prices_from_rules() {
        let fx = Fixture::new().await;
        fx.store
            .insert_price_rule(PriceRuleRow {
                id: 0,
                club_id: fx.club.id,
                name: "evening".into(),
                starts_at: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                ends_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                weekday_mask: PriceRuleRow::mask_for(&[Weekday::Mon]),
                price_per_hour_cents: 3200,
                priority: 1,
                created_at: fx.at(0, 0),
            })
            .await;
        fx.clock.set(fx.at(12, 10));

        let created = fx
            .engine
            .create_proposals(fx.club.id, fx.day(), &[fx.instructor.id])
            .await
            .unwrap();
        assert_eq!(created.first().map(|s| s.start_at), Some(fx.at(12, 30)));
        let evening = created.iter().find(|s| s.start_at == fx.at(18, 0)).unwrap();
        assert_eq!(evening.total_price_cents, 3200);
        let noon = created.iter().find(|s| s.start_at == fx.at(13, 0)).unwrap();
        assert_eq!(noon.total_price_cents, 2000);
    }

    #[tokio::test]
    async fn test_inactive_instructor_is_rejected() {
        let fx = Fixture::new().await;
        let mut idle = fx.instructor.clone();
        idle.id = Uuid::new_v4();
        idle.is_active = false;
        fx.store.insert_instructor(idle.clone()).await;

        let err = fx
            .engine
            .create_proposals(fx.club.id, fx.day(), &[idle.id])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InactiveInstructor(id)) if id == idle.id
        ));
    }

    fn new_match(fx: &Fixture, start: DateTime<Utc>, duration: i32) -> NewSlot {
        NewSlot {
            club_id: fx.club.id,
            kind: SlotKind::Match {
                organizer_id: Uuid::new_v4(),
                recurring: false,
            },
            start_at: start,
            duration_minutes: duration,
            capacity: 4,
            level_min: None,
            level_max: None,
            category: None,
        }
    }

    #[tokio::test]
    async fn test_propose_slot_validates_grid_and_hours() {
        let fx = Fixture::new().await;

        let err = fx.engine.propose_slot(new_match(&fx, fx.at(9, 0), 45)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::MisalignedDuration(45))));

        let err = fx.engine.propose_slot(new_match(&fx, fx.at(9, 15), 60)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::MisalignedStart(_))));

        let err = fx.engine.propose_slot(new_match(&fx, fx.at(21, 0), 90)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::OutOfHours { .. })));

        let err = fx.engine.propose_slot(new_match(&fx, fx.at(7, 30), 60)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::OutOfHours { .. })));

        let ok = fx.engine.propose_slot(new_match(&fx, fx.at(20, 30), 90)).await.unwrap();
        assert_eq!(ok.end_at(), fx.at(22, 0));
        assert_eq!(ok.total_price_cents, 3000);
    }

    #[tokio::test]
    async fn test_propose_slot_after_midnight_in_late_club() {
        let fx = Fixture::with_settings(ClubSettings {
            opens_at: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            closes_at: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            ..ClubSettings::default()
        })
        .await;
        let late = Utc.with_ymd_and_hms(2026, 3, 3, 0, 30, 0).unwrap();
        assert!(fx.engine.propose_slot(new_match(&fx, late, 90)).await.is_ok());
    }

    #[tokio::test]
    async fn test_class_duration_is_fixed() {
        let fx = Fixture::new().await;
        let mut new = new_match(&fx, fx.at(9, 0), 90);
        new.kind = SlotKind::Class {
            instructor_id: fx.instructor.id,
        };
        let err = fx.engine.propose_slot(new).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::ClassDuration(90))));
    }

    #[tokio::test]
    async fn test_duplicate_class_proposal_conflicts() {
        let fx = Fixture::new().await;
        let mut new = new_match(&fx, fx.at(9, 0), 60);
        new.kind = SlotKind::Class {
            instructor_id: fx.instructor.id,
        };
        fx.engine.propose_slot(new.clone()).await.unwrap();
        let err = fx.engine.propose_slot(new).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(ConflictError::DuplicateProposal { .. })));
    }

    #[tokio::test]
    async fn test_list_proposals_filters_by_level() {
        let fx = Fixture::new().await;
        let mut advanced = new_match(&fx, fx.at(9, 0), 60);
        advanced.level_min = Some(4.0);
        advanced.level_max = Some(5.0);
        let advanced = fx.engine.propose_slot(advanced).await.unwrap();
        let open = fx.engine.propose_slot(new_match(&fx, fx.at(10, 0), 60)).await.unwrap();

        let mut beginner = Player::new(Uuid::new_v4());
        beginner.level = Some(2.0);
        let visible = fx
            .engine
            .list_proposals(fx.club.id, &beginner, None, None)
            .await
            .unwrap();
        let ids: Vec<_> = visible.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![open.id]);

        beginner.level = Some(4.5);
        let visible = fx
            .engine
            .list_proposals(fx.club.id, &beginner, None, None)
            .await
            .unwrap();
        assert!(visible.iter().any(|s| s.id == advanced.id));
    }

    #[tokio::test]
    async fn test_expiry_refunds_pending_seats() {
        let fx = Fixture::new().await;
        let slot = fx.class_proposal(9).await;
        let player = fx.player(5000, 0).await;
        fx.engine
            .place_booking(slot.id, &player, 2, Payment::Credits)
            .await
            .unwrap();
        assert_eq!(fx.balance(&player).await, (2000, 0));

        assert!(fx.engine.expire_stale_proposals().await.unwrap().is_empty());

        fx.clock.set(fx.at(9, 0));
        let mut events = fx.engine.events().subscribe();
        let expired = fx.engine.expire_stale_proposals().await.unwrap();
        assert_eq!(expired, vec![slot.id]);
        assert_eq!(fx.balance(&player).await, (5000, 0));

        let slot = fx.engine.get_slot(slot.id).await.unwrap();
        assert_eq!(slot.state, SlotState::Cancelled);
        let bookings = fx.store.bookings_for_slot(slot.id).await.unwrap();
        assert!(bookings.iter().all(|b| b.status == BookingStatus::Cancelled));
        assert!(matches!(
            events.try_recv(),
            Ok(EngineEvent::BookingCancelled {
                kind: CancellationKind::Expired,
                ..
            })
        ));

        assert!(fx.engine.expire_stale_proposals().await.unwrap().is_empty());
    }
}
