use async_graphql::{Context, ErrorExtensions, Object, Result};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::auth::permissions::{current_player, is_manager};
use crate::error::{gql_error, AppError};
use crate::gql::scalars::Money;
use crate::gql::types::{Booking, CanStartAtInput, RenewalLink, Slot, Wallet};
use crate::state::AppState;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Engine time (UTC). Every expiry and renewal rule is evaluated against it.
    async fn server_time(&self, ctx: &Context<'_>) -> Result<DateTime<Utc>> {
        let state = ctx.data::<AppState>()?;
        Ok(state.engine().now())
    }

    async fn slot(&self, ctx: &Context<'_>, id: Uuid) -> Result<Slot> {
        let state = ctx.data::<AppState>()?;
        let slot = state.engine().get_slot(id).await.map_err(gql_error)?;
        Ok(slot.into())
    }

    /// Every slot starting on a club-local day, optionally narrowed to an instructor or court.
    async fn day_slots(
        &self,
        ctx: &Context<'_>,
        club_id: Uuid,
        day: NaiveDate,
        instructor_id: Option<Uuid>,
        court_id: Option<Uuid>,
    ) -> Result<Vec<Slot>> {
        let state = ctx.data::<AppState>()?;
        let slots = state
            .engine()
            .day_slots(club_id, day, instructor_id, court_id)
            .await
            .map_err(gql_error)?;
        Ok(slots.into_iter().map(Slot::from).collect())
    }

    /// Upcoming proposals the caller's level and category allow them to join.
    async fn proposals(
        &self,
        ctx: &Context<'_>,
        club_id: Uuid,
        instructor_id: Option<Uuid>,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Slot>> {
        let player = current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let slots = state
            .engine()
            .list_proposals(club_id, &player, instructor_id, from)
            .await
            .map_err(gql_error)?;
        Ok(slots.into_iter().map(Slot::from).collect())
    }

    async fn slot_bookings(&self, ctx: &Context<'_>, slot_id: Uuid) -> Result<Vec<Booking>> {
        current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let bookings = state.engine().slot_bookings(slot_id).await.map_err(gql_error)?;
        Ok(bookings.into_iter().map(Booking::from).collect())
    }

    /// Bookings of the caller. Managers may look up another user.
    async fn my_bookings(&self, ctx: &Context<'_>, user_id: Option<Uuid>) -> Result<Vec<Booking>> {
        let user_id = target_user(ctx, user_id)?;
        let state = ctx.data::<AppState>()?;
        let bookings = state.engine().user_bookings(user_id).await.map_err(gql_error)?;
        Ok(bookings.into_iter().map(Booking::from).collect())
    }

    async fn my_wallet(&self, ctx: &Context<'_>, user_id: Option<Uuid>) -> Result<Wallet> {
        let user_id = target_user(ctx, user_id)?;
        let state = ctx.data::<AppState>()?;
        let wallet = state.engine().wallet(user_id).await.map_err(gql_error)?;
        Ok(wallet.into())
    }

    async fn renewal_link(&self, ctx: &Context<'_>, id: Uuid) -> Result<RenewalLink> {
        let player = current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let link = state.engine().get_renewal_link(id).await.map_err(gql_error)?;
        if link.organizer_id != player.user_id && !is_manager(ctx) {
            return Err(AppError::Forbidden("Not your renewal link".into()).extend());
        }
        Ok(link.into())
    }

    /// Renewal offers waiting for the caller.
    async fn my_renewal_links(&self, ctx: &Context<'_>) -> Result<Vec<RenewalLink>> {
        let player = current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let links = state
            .engine()
            .renewal_links_for(player.user_id)
            .await
            .map_err(gql_error)?;
        Ok(links.into_iter().map(RenewalLink::from).collect())
    }

    /// Whether an activity may start at the given club-local day and time.
    async fn can_start_at(&self, ctx: &Context<'_>, input: CanStartAtInput) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        state
            .engine()
            .can_start_at(input.into())
            .await
            .map_err(gql_error)
    }

    /// Hourly court rate in force at `at`.
    async fn resolve_price(&self, ctx: &Context<'_>, club_id: Uuid, at: DateTime<Utc>) -> Result<Money> {
        let state = ctx.data::<AppState>()?;
        let cents = state
            .engine()
            .resolve_price(club_id, at)
            .await
            .map_err(gql_error)?;
        Ok(Money(cents))
    }
}

fn target_user(ctx: &Context<'_>, requested: Option<Uuid>) -> Result<Uuid> {
    let player = current_player(ctx)?;
    match requested {
        Some(other) if other != player.user_id => {
            if is_manager(ctx) {
                Ok(other)
            } else {
                Err(AppError::Forbidden("Only managers can view other users".into()).extend())
            }
        }
        _ => Ok(player.user_id),
    }
}
