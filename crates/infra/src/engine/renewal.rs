use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::ledger::{BookingReceipt, Payment};
use super::BookingEngine;
use crate::error::{EngineError, EngineResult, NotFoundError, StateError};
use crate::events::EngineEvent;
use crate::models::{Player, RecurringMatchLinkRow, Slot, SlotKind, SlotState};
use crate::store::{SlotChange, SlotFilter};

/// How far back the sweeper looks for finished recurring matches.
const COMPLETION_LOOKBACK_DAYS: i64 = 7;

impl BookingEngine {
    /// Opens next week's occurrence of a finished recurring match, held for its organizer
    /// until the renewal window closes. Non-recurring, cancelled or already handled slots
    /// yield `None`.
    pub async fn on_match_completion(&self, slot_id: Uuid) -> EngineResult<Option<RecurringMatchLinkRow>> {
        self.with_retry(slot_id, || self.try_complete(slot_id))
            .await
    }

    async fn try_complete(&self, slot_id: Uuid) -> EngineResult<Option<RecurringMatchLinkRow>> {
        let now = self.now();
        let mut base = self.load_slot(slot_id).await?;
        let organizer_id = match base.kind {
            SlotKind::Match {
                organizer_id,
                recurring: true,
            } if base.state == SlotState::Confirmed && !base.completion_processed => organizer_id,
            _ => return Ok(None),
        };
        let club = self.load_club(base.club_id).await?;

        let start_at = base.start_at + Duration::days(7);
        let total_price_cents = self
            .slot_price(club.id, &club.settings, start_at, base.duration_minutes)
            .await?;
        let next = Slot {
            id: Uuid::new_v4(),
            court_id: None,
            start_at,
            total_price_cents,
            state: SlotState::Proposed,
            recycled_seats: 0,
            needs_court_review: false,
            reserved_for: Some(organizer_id),
            completion_processed: false,
            version: 0,
            created_at: now,
            updated_at: now,
            ..base.clone()
        };
        let link = RecurringMatchLinkRow {
            id: Uuid::new_v4(),
            organizer_id,
            base_match_id: base.id,
            next_slot_id: next.id,
            expires_at: now + club.settings.renewal_window(),
            reminder_sent: false,
            created_at: now,
        };

        base.completion_processed = true;
        base.updated_at = now;
        let mut change = SlotChange::new(base);
        change.inserted_slots.push(next);
        change.inserted_link = Some(link.clone());
        self.commit(change).await?;

        info!(
            base_match_id = %slot_id,
            next_slot_id = %link.next_slot_id,
            expires_at = %link.expires_at,
            "recurring match provisionally renewed"
        );
        Ok(Some(link))
    }

    pub async fn get_renewal_link(&self, id: Uuid) -> EngineResult<RecurringMatchLinkRow> {
        self.store
            .renewal_link(id)
            .await?
            .ok_or_else(|| NotFoundError::RenewalLink(id).into())
    }

    /// Open renewal offers of one organizer, soonest deadline first.
    pub async fn renewal_links_for(&self, organizer_id: Uuid) -> EngineResult<Vec<RecurringMatchLinkRow>> {
        let mut links: Vec<_> = self
            .store
            .renewal_links()
            .await?
            .into_iter()
            .filter(|l| l.organizer_id == organizer_id)
            .collect();
        links.sort_by_key(|l| l.expires_at);
        Ok(links)
    }

    /// Takes up the provisional occurrence: the organizer is booked with the seats they
    /// held on the base match, the hold is lifted and the link removed, all in one commit.
    /// Valid strictly before the link expires.
    pub async fn renew(&self, link_id: Uuid, organizer: &Player) -> EngineResult<BookingReceipt> {
        let link = self.get_renewal_link(link_id).await?;
        if link.organizer_id != organizer.user_id {
            return Err(StateError::ReservedForOrganizer(link.next_slot_id).into());
        }
        let receipt = self
            .with_retry(link.next_slot_id, || self.try_renew(&link, organizer))
            .await?;
        info!(%link_id, slot_id = %receipt.slot.id, "recurring match renewed");
        Ok(receipt)
    }

    async fn try_renew(&self, link: &RecurringMatchLinkRow, organizer: &Player) -> EngineResult<BookingReceipt> {
        let now = self.now();
        if now >= link.expires_at {
            return Err(StateError::RenewalExpired(link.expires_at).into());
        }
        // Re-read: a concurrent renewal may already have consumed the link.
        if self.store.renewal_link(link.id).await?.is_none() {
            return Err(NotFoundError::RenewalLink(link.id).into());
        }

        let mut slot = self.load_slot(link.next_slot_id).await?;
        let club = self.load_club(slot.club_id).await?;
        let group_size = self
            .store
            .bookings_for_slot(link.base_match_id)
            .await?
            .into_iter()
            .filter(|b| b.is_active() && b.user_id == organizer.user_id)
            .max_by_key(|b| b.created_at)
            .map_or(1, |b| b.group_size)
            .min(slot.capacity);

        slot.reserved_for = None;
        let bookings = self.store.bookings_for_slot(slot.id).await?;
        let mut plan = self
            .plan_booking(&club, slot, &bookings, organizer, group_size, Payment::Credits, now)
            .await?;
        plan.change.deleted_link = Some(link.id);

        let slot = self.commit(plan.change).await?;
        self.announce(&slot, plan.confirmation);
        Ok(BookingReceipt {
            booking: plan.booking,
            slot,
            confirmation: plan.confirmation,
        })
    }

    /// Runs completion processing for recurring matches that ended within the lookback.
    pub async fn process_completed_matches(&self) -> EngineResult<usize> {
        let now = self.now();
        let filter = SlotFilter {
            state: Some(SlotState::Confirmed),
            from: Some(now - Duration::days(COMPLETION_LOOKBACK_DAYS)),
            to: Some(now),
            ..SlotFilter::default()
        };
        let finished = self
            .store
            .slots(filter, None)
            .await?
            .into_iter()
            .filter(|s| s.kind.is_recurring() && !s.completion_processed && s.end_at() <= now);

        let mut renewed = 0;
        for slot in finished {
            match self.on_match_completion(slot.id).await {
                Ok(Some(_)) => renewed += 1,
                Ok(None) => {}
                Err(e) => warn!(slot_id = %slot.id, error = %e, "completion processing failed"),
            }
        }
        Ok(renewed)
    }

    /// Publishes one `RenewalExpiringSoon` per link once its expiry is within `lead`.
    pub async fn send_renewal_reminders(&self, lead: Duration) -> EngineResult<usize> {
        let now = self.now();
        let mut sent = 0;
        for link in self.store.renewal_links().await? {
            let due = !link.reminder_sent && link.expires_at > now && link.expires_at - now <= lead;
            if !due || !self.store.mark_link_reminded(link.id).await? {
                continue;
            }
            self.events.publish(EngineEvent::RenewalExpiringSoon {
                link_id: link.id,
                organizer_id: link.organizer_id,
                next_slot_id: link.next_slot_id,
                expires_at: link.expires_at,
            });
            sent += 1;
        }
        Ok(sent)
    }

    /// Removes links that expired or whose provisional slot is gone. The held occurrence of
    /// an expired link is cancelled in the same commit that drops the link.
    pub async fn sweep_renewal_links(&self) -> EngineResult<usize> {
        let now = self.now();
        let mut removed = 0;
        for link in self.store.renewal_links().await? {
            let held = match self.store.slot(link.next_slot_id).await? {
                Some(slot) if slot.state != SlotState::Cancelled => Some(slot),
                _ => None,
            };
            let outcome = match held {
                Some(_) if link.expires_at > now => continue,
                Some(slot) if slot.state == SlotState::Proposed => {
                    self.with_retry(slot.id, || self.try_release_hold(&link)).await
                }
                _ => self.store.delete_link(link.id).await.map_err(EngineError::from),
            };
            match outcome {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(link_id = %link.id, error = %e, "renewal link cleanup failed"),
            }
        }
        Ok(removed)
    }

    async fn try_release_hold(&self, link: &RecurringMatchLinkRow) -> EngineResult<bool> {
        let now = self.now();
        let mut slot = self.load_slot(link.next_slot_id).await?;
        if slot.state != SlotState::Proposed {
            return Ok(self.store.delete_link(link.id).await?);
        }
        slot.state = SlotState::Cancelled;
        slot.reserved_for = None;
        slot.updated_at = now;
        let mut change = SlotChange::new(slot);
        change.deleted_link = Some(link.id);
        self.commit(change).await?;
        info!(
            link_id = %link.id,
            slot_id = %link.next_slot_id,
            expired_at = %link.expires_at,
            "renewal not taken; held occurrence released"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use crate::error::EngineError;
    use crate::models::{BookingStatus, ClubSettings};
    use crate::store::BookingStore;

    /// Confirmed recurring match on court 1 at 09:00 organized by a player booked with
    /// two seats; returns (fixture, organizer, match).
    async fn finished_match() -> (Fixture, Player, Slot) {
        let fx = Fixture::with_settings(ClubSettings {
            renewal_window_hours: 24,
            ..ClubSettings::default()
        })
        .await;
        let organizer = fx.player(20_000, 0).await;
        let mut slot = fx.slot_at(
            SlotKind::Match {
                organizer_id: organizer.user_id,
                recurring: true,
            },
            fx.at(9, 0),
            90,
        );
        slot.capacity = 2;
        let slot = fx.store.insert_slot(slot).await.unwrap();
        fx.engine
            .place_booking(slot.id, &organizer, 2, Payment::Credits)
            .await
            .unwrap();
        fx.clock.set(fx.at(11, 0));
        let slot = fx.engine.get_slot(slot.id).await.unwrap();
        assert_eq!(slot.state, SlotState::Confirmed);
        (fx, organizer, slot)
    }

    #[tokio::test]
    async fn test_completion_creates_held_next_occurrence() {
        let (fx, organizer, base) = finished_match().await;
        let link = fx.engine.on_match_completion(base.id).await.unwrap().unwrap();
        assert_eq!(link.expires_at, fx.at(11, 0) + Duration::hours(24));

        let next = fx.engine.get_slot(link.next_slot_id).await.unwrap();
        assert_eq!(next.start_at, base.start_at + Duration::days(7));
        assert_eq!(next.state, SlotState::Proposed);
        assert_eq!(next.reserved_for, Some(organizer.user_id));
        assert_eq!(next.court_id, None);

        // Second run is a no-op.
        assert!(fx.engine.on_match_completion(base.id).await.unwrap().is_none());
        assert_eq!(fx.store.renewal_links().await.unwrap().len(), 1);

        let stranger = fx.player(20_000, 0).await;
        let err = fx
            .engine
            .place_booking(next.id, &stranger, 1, Payment::Credits)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::State(StateError::ReservedForOrganizer(_))));
    }

    #[tokio::test]
    async fn test_renew_one_second_before_expiry() {
        let (fx, organizer, base) = finished_match().await;
        let link = fx.engine.on_match_completion(base.id).await.unwrap().unwrap();

        fx.clock.set(link.expires_at - Duration::seconds(1));
        let receipt = fx.engine.renew(link.id, &organizer).await.unwrap();
        assert_eq!(receipt.booking.group_size, 2);
        assert_eq!(receipt.slot.reserved_for, None);
        assert_eq!(receipt.slot.state, SlotState::Confirmed);
        assert_eq!(receipt.booking.status, BookingStatus::Confirmed);
        assert!(fx.store.renewal_link(link.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_renew_one_second_after_expiry() {
        let (fx, organizer, base) = finished_match().await;
        let link = fx.engine.on_match_completion(base.id).await.unwrap().unwrap();

        fx.clock.set(link.expires_at + Duration::seconds(1));
        let err = fx.engine.renew(link.id, &organizer).await.unwrap_err();
        assert!(matches!(err, EngineError::State(StateError::RenewalExpired(at)) if at == link.expires_at));
        assert!(fx.store.renewal_link(link.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_only_organizer_may_renew() {
        let (fx, _organizer, base) = finished_match().await;
        let link = fx.engine.on_match_completion(base.id).await.unwrap().unwrap();
        let other = fx.player(20_000, 0).await;
        let err = fx.engine.renew(link.id, &other).await.unwrap_err();
        assert!(matches!(err, EngineError::State(StateError::ReservedForOrganizer(_))));
    }

    #[tokio::test]
    async fn test_reminders_are_sent_once() {
        let (fx, _organizer, base) = finished_match().await;
        let link = fx.engine.on_match_completion(base.id).await.unwrap().unwrap();
        let mut events = fx.engine.events().subscribe();

        assert_eq!(fx.engine.send_renewal_reminders(Duration::hours(2)).await.unwrap(), 0);
        fx.clock.set(link.expires_at - Duration::minutes(90));
        assert_eq!(fx.engine.send_renewal_reminders(Duration::hours(2)).await.unwrap(), 1);
        assert_eq!(fx.engine.send_renewal_reminders(Duration::hours(2)).await.unwrap(), 0);
        assert!(matches!(
            events.try_recv(),
            Ok(EngineEvent::RenewalExpiringSoon { link_id, .. }) if link_id == link.id
        ));
    }

    #[tokio::test]
    async fn test_expired_link_is_swept_and_its_hold_released() {
        let (fx, _organizer, base) = finished_match().await;
        let link = fx.engine.on_match_completion(base.id).await.unwrap().unwrap();

        fx.clock.set(link.expires_at - Duration::seconds(1));
        assert_eq!(fx.engine.sweep_renewal_links().await.unwrap(), 0);

        fx.clock.set(link.expires_at + Duration::hours(1));
        assert_eq!(fx.engine.sweep_renewal_links().await.unwrap(), 1);
        assert!(fx.store.renewal_links().await.unwrap().is_empty());
        assert!(fx.engine.renewal_links_for(link.organizer_id).await.unwrap().is_empty());

        let next = fx.engine.get_slot(link.next_slot_id).await.unwrap();
        assert_eq!(next.state, SlotState::Cancelled);
        assert_eq!(next.reserved_for, None);

        let stranger = fx.player(20_000, 0).await;
        let err = fx
            .engine
            .place_booking(next.id, &stranger, 1, Payment::Credits)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::State(StateError::NotBookable { .. })));

        assert_eq!(fx.engine.sweep_renewal_links().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_link_of_vanished_slot_is_dropped() {
        let (fx, _organizer, base) = finished_match().await;
        fx.engine.on_match_completion(base.id).await.unwrap().unwrap();

        fx.clock.set(base.start_at + Duration::days(7));
        fx.engine.expire_stale_proposals().await.unwrap();
        assert_eq!(fx.engine.sweep_renewal_links().await.unwrap(), 1);
        assert!(fx.store.renewal_links().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_renewal_ignores_cancelled_base_bookings() {
        let (fx, organizer, base) = finished_match().await;
        let mut cancelled = fx.store.bookings_for_slot(base.id).await.unwrap()[0].clone();
        cancelled.id = Uuid::new_v4();
        cancelled.group_size = 1;
        cancelled.status = BookingStatus::Cancelled;
        cancelled.created_at = fx.at(10, 0);
        let mut change = SlotChange::new(base.clone());
        change.inserted_bookings.push(cancelled);
        let base = fx.store.commit(change).await.unwrap();

        let link = fx.engine.on_match_completion(base.id).await.unwrap().unwrap();
        let receipt = fx.engine.renew(link.id, &organizer).await.unwrap();
        assert_eq!(receipt.booking.group_size, 2);
    }

    #[tokio::test]
    async fn test_process_completed_matches_picks_up_finished_recurring() {
        let (fx, _organizer, _base) = finished_match().await;
        assert_eq!(fx.engine.process_completed_matches().await.unwrap(), 1);
        assert_eq!(fx.engine.process_completed_matches().await.unwrap(), 0);
    }
}
