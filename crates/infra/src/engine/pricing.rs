use chrono::{DateTime, Datelike, Utc};
use std::cmp::Ordering;
use uuid::Uuid;

use super::BookingEngine;
use crate::error::EngineResult;
use crate::models::{ClubSettings, PriceRuleRow};

/// Integer division of a non-negative amount rounding halves away from zero.
pub fn div_round_half_up(amount: i64, divisor: i64) -> i64 {
    if divisor <= 0 {
        return 0;
    }
    (amount * 2 + divisor) / (divisor * 2)
}

/// Highest priority wins, then the narrower window, then the older rule.
fn precedence(a: &PriceRuleRow, b: &PriceRuleRow) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.window_minutes().cmp(&a.window_minutes()))
        .then_with(|| b.id.cmp(&a.id))
}

/// Rule that prices `at`, if any matches in club-local time.
pub fn matching_rule<'a>(
    settings: &ClubSettings,
    rules: &'a [PriceRuleRow],
    at: DateTime<Utc>,
) -> Option<&'a PriceRuleRow> {
    let local = at.with_timezone(&settings.offset());
    let (weekday, time) = (local.weekday(), local.time());
    rules
        .iter()
        .filter(|r| r.applies_on(weekday) && r.covers(time))
        .max_by(|a, b| precedence(a, b))
}

/// Hourly court rate in cents at `at`. Falls back to the club default; never fails.
pub fn resolve_rate(settings: &ClubSettings, rules: &[PriceRuleRow], at: DateTime<Utc>) -> i64 {
    matching_rule(settings, rules, at)
        .map(|r| r.price_per_hour_cents)
        .unwrap_or(settings.default_rate_cents)
}

pub fn slot_total_cents(rate_per_hour_cents: i64, duration_minutes: i32) -> i64 {
    div_round_half_up(rate_per_hour_cents * duration_minutes as i64, 60)
}

/// Points needed to pay `cents`, rounded up so a points booking is never cheaper than
/// the configured rate.
pub fn points_for_cents(cents: i64, points_per_euro: i64) -> i64 {
    let raw = cents * points_per_euro;
    (raw + 99).div_euclid(100)
}

/// Bonus for giving a seat back on a full slot, per seat.
pub fn bonus_points(seat_price_cents: i64, points_per_euro: i64) -> i64 {
    (seat_price_cents * points_per_euro).div_euclid(100)
}

impl BookingEngine {
    pub async fn resolve_price(&self, club_id: Uuid, at: DateTime<Utc>) -> EngineResult<i64> {
        let club = self.load_club(club_id).await?;
        let rules = self.store.price_rules(club_id).await?;
        Ok(resolve_rate(&club.settings, &rules, at))
    }

    pub(crate) async fn slot_price(
        &self,
        club_id: Uuid,
        settings: &ClubSettings,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> EngineResult<i64> {
        let rules = self.store.price_rules(club_id).await?;
        Ok(slot_total_cents(
            resolve_rate(settings, &rules, start),
            duration_minutes,
        ))
    }
}
