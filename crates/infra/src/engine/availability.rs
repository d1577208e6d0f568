use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use uuid::Uuid;

use super::BookingEngine;
use crate::error::EngineResult;
use crate::models::{ClubSettings, Slot, SlotState};
use crate::store::SlotFilter;

pub const GRID_MINUTES: i64 = 30;
/// Changeover time an instructor needs before a class already on the books.
pub const BUFFER_MINUTES: i64 = 30;
pub const CLASS_MINUTES: i32 = 60;

/// Club-local wall time on `day` as a UTC instant.
pub fn local_instant(settings: &ClubSettings, day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let shift = Duration::seconds(settings.offset().local_minus_utc() as i64);
    Utc.from_utc_datetime(&(day.and_time(time) - shift))
}

/// `[local midnight, next local midnight)` of `day`.
pub fn day_bounds(settings: &ClubSettings, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_instant(settings, day, NaiveTime::MIN);
    (start, start + Duration::days(1))
}

/// Opening hours of `day`; a closing time not after the opening time falls on the next day.
pub fn opening_window(settings: &ClubSettings, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let opens = local_instant(settings, day, settings.opens_at);
    let mut closes = local_instant(settings, day, settings.closes_at);
    if closes <= opens {
        closes += Duration::days(1);
    }
    (opens, closes)
}

pub fn is_on_grid(settings: &ClubSettings, at: DateTime<Utc>) -> bool {
    let local = at.with_timezone(&settings.offset());
    local.second() == 0 && local.nanosecond() == 0 && local.minute() as i64 % GRID_MINUTES == 0
}

/// Whether a `[start, start + duration)` booking fits around `busy` intervals.
///
/// Overlap is half-open, so back-to-back is fine. With a non-zero `buffer`, a start that
/// lands inside the `buffer` right before an existing start is refused as well; the
/// trailing edge of an existing slot carries no buffer.
pub fn can_start_at(
    busy: &[(DateTime<Utc>, DateTime<Utc>)],
    start: DateTime<Utc>,
    duration_minutes: i32,
    buffer: Duration,
) -> bool {
    let end = start + Duration::minutes(duration_minutes as i64);
    busy.iter().all(|&(busy_start, busy_end)| {
        let in_buffer = start >= busy_start - buffer && start < busy_start;
        let overlaps = end > busy_start && start < busy_end;
        !in_buffer && !overlaps
    })
}

pub(crate) fn busy_intervals<'a>(
    slots: impl IntoIterator<Item = &'a Slot>,
    except: Option<Uuid>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    slots
        .into_iter()
        .filter(|s| s.state == SlotState::Confirmed && Some(s.id) != except)
        .map(|s| (s.start_at, s.end_at()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct AvailabilityQuery {
    pub club_id: Uuid,
    pub instructor_id: Option<Uuid>,
    pub court_id: Option<Uuid>,
    pub day: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i32,
}

impl BookingEngine {
    /// Confirmed slots of an instructor on a club-local calendar day.
    pub(crate) async fn instructor_day(
        &self,
        settings: &ClubSettings,
        club_id: Uuid,
        instructor_id: Uuid,
        day: NaiveDate,
    ) -> EngineResult<Vec<Slot>> {
        let (from, to) = day_bounds(settings, day);
        let filter = SlotFilter {
            club_id: Some(club_id),
            instructor_id: Some(instructor_id),
            state: Some(SlotState::Confirmed),
            from: Some(from),
            to: Some(to),
            ..SlotFilter::default()
        };
        Ok(self.store.slots(filter, None).await?)
    }

    /// Confirmed slots on a court that could overlap `[start, end)`.
    pub(crate) async fn court_neighbours(
        &self,
        court_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Vec<Slot>> {
        let filter = SlotFilter {
            court_id: Some(court_id),
            state: Some(SlotState::Confirmed),
            from: Some(start - Duration::days(1)),
            to: Some(end),
            ..SlotFilter::default()
        };
        Ok(self.store.slots(filter, None).await?)
    }

    /// Instructor check applies the leading changeover buffer; the court check is a plain
    /// overlap test. With neither given every grid-aligned start is free.
    pub async fn can_start_at(&self, query: AvailabilityQuery) -> EngineResult<bool> {
        let club = self.load_club(query.club_id).await?;
        let start = local_instant(&club.settings, query.day, query.time);

        if let Some(instructor_id) = query.instructor_id {
            let slots = self
                .instructor_day(&club.settings, club.id, instructor_id, query.day)
                .await?;
            let busy = busy_intervals(&slots, None);
            if !can_start_at(&busy, start, query.duration_minutes, Duration::minutes(BUFFER_MINUTES)) {
                return Ok(false);
            }
        }

        if let Some(court_id) = query.court_id {
            let end = start + Duration::minutes(query.duration_minutes as i64);
            let slots = self.court_neighbours(court_id, start, end).await?;
            let busy = busy_intervals(&slots, None);
            if !can_start_at(&busy, start, query.duration_minutes, Duration::zero()) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use crate::models::SlotKind;
    use crate::store::BookingStore;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn buffer() -> Duration {
        Duration::minutes(BUFFER_MINUTES)
    }

    #[test]
    fn test_leading_buffer_rejects_start_half_hour_before() {
        let busy = [(at(10, 0), at(11, 0))];
        assert!(!can_start_at(&busy, at(9, 30), 60, buffer()));
        assert!(!can_start_at(&busy, at(9, 30), 30, buffer()));
    }

    #[test]
    fn test_back_to_back_is_allowed() {
        let busy = [(at(10, 0), at(11, 0))];
        assert!(can_start_at(&busy, at(11, 0), 60, buffer()));
        assert!(can_start_at(&busy, at(9, 0), 60, buffer()));
    }

    #[test]
    fn test_overlap_is_rejected() {
        let busy = [(at(10, 0), at(11, 0))];
        assert!(!can_start_at(&busy, at(10, 30), 60, buffer()));
        assert!(!can_start_at(&busy, at(10, 0), 30, Duration::zero()));
    }

    #[test]
    fn test_court_check_has_no_buffer() {
        let busy = [(at(10, 0), at(11, 0))];
        assert!(can_start_at(&busy, at(9, 30), 30, Duration::zero()));
    }

    #[test]
    fn test_opening_window_crossing_midnight() {
        let settings = ClubSettings {
            opens_at: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            closes_at: NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
            ..ClubSettings::default()
        };
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let (opens, closes) = opening_window(&settings, day);
        assert_eq!(opens, at(18, 0));
        assert_eq!(closes, Utc.with_ymd_and_hms(2026, 3, 3, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_grid_alignment_uses_club_offset() {
        let settings = ClubSettings {
            utc_offset_minutes: 45,
            ..ClubSettings::default()
        };
        assert!(is_on_grid(&settings, at(9, 15)));
        assert!(!is_on_grid(&settings, at(9, 0)));
    }

    #[tokio::test]
    async fn test_engine_checks_confirmed_instructor_day() {
        let fx = Fixture::new().await;
        let mut class = fx.slot_at(
            SlotKind::Class {
                instructor_id: fx.instructor.id,
            },
            at(10, 0),
            60,
        );
        class.state = SlotState::Confirmed;
        class.court_id = Some(fx.courts[0].id);
        fx.store.insert_slot(class).await.unwrap();

        let query = |h, m| AvailabilityQuery {
            club_id: fx.club.id,
            instructor_id: Some(fx.instructor.id),
            court_id: None,
            day: fx.day(),
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            duration_minutes: 60,
        };
        assert!(!fx.engine.can_start_at(query(9, 30)).await.unwrap());
        assert!(fx.engine.can_start_at(query(11, 0)).await.unwrap());

        let court = AvailabilityQuery {
            instructor_id: None,
            court_id: Some(fx.courts[0].id),
            ..query(10, 30)
        };
        assert!(!fx.engine.can_start_at(court.clone()).await.unwrap());
        let other_court = AvailabilityQuery {
            court_id: Some(fx.courts[1].id),
            ..court
        };
        assert!(fx.engine.can_start_at(other_court).await.unwrap());
    }
}
