use async_graphql::{Context, ErrorExtensions, Object, Result};
use chrono::NaiveDate;
use uuid::Uuid;

use infra::engine::NewSlot;
use infra::models::SlotKind;

use crate::auth::permissions::{current_player, is_manager, require_role};
use crate::error::{gql_error, AppError};
use crate::gql::types::{
    self, BookingReceipt, CancellationResult, PaymentMethod, ProposeSlotInput, Role, Slot,
    SweepReport,
};
use crate::state::AppState;

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Opens class proposals on every free grid point of `day` for each instructor.
    /// Re-running fills only the gaps; the result lists the slots created now.
    async fn create_proposals(
        &self,
        ctx: &Context<'_>,
        club_id: Uuid,
        day: NaiveDate,
        instructor_ids: Vec<Uuid>,
    ) -> Result<Vec<Slot>> {
        require_role(ctx, Role::Manager)?;
        let state = ctx.data::<AppState>()?;
        let slots = state
            .engine()
            .create_proposals(club_id, day, &instructor_ids)
            .await
            .map_err(gql_error)?;
        Ok(slots.into_iter().map(Slot::from).collect())
    }

    /// Opens a single slot. Classes are created by managers; a match or rental is
    /// organized by the caller.
    async fn propose_slot(&self, ctx: &Context<'_>, input: ProposeSlotInput) -> Result<Slot> {
        let player = current_player(ctx)?;
        let kind = match input.kind {
            types::SlotKind::Class => {
                require_role(ctx, Role::Manager)?;
                let instructor_id = input.instructor_id.ok_or_else(|| {
                    async_graphql::Error::new("instructorId is required for classes")
                        .extend_with(|_, ext| ext.set("code", "VALIDATION"))
                })?;
                SlotKind::Class { instructor_id }
            }
            types::SlotKind::Match => SlotKind::Match {
                organizer_id: player.user_id,
                recurring: input.recurring,
            },
            types::SlotKind::Rental => SlotKind::Rental {
                organizer_id: player.user_id,
            },
        };

        let state = ctx.data::<AppState>()?;
        let slot = state
            .engine()
            .propose_slot(NewSlot {
                club_id: input.club_id,
                kind,
                start_at: input.start_at,
                duration_minutes: input.duration_minutes,
                capacity: input.capacity,
                level_min: input.level_min,
                level_max: input.level_max,
                category: input.category,
            })
            .await
            .map_err(gql_error)?;
        Ok(slot.into())
    }

    async fn place_booking(
        &self,
        ctx: &Context<'_>,
        slot_id: Uuid,
        #[graphql(default = 1)] group_size: i32,
        #[graphql(default_with = "PaymentMethod::Credits")] payment: PaymentMethod,
    ) -> Result<BookingReceipt> {
        let player = current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let receipt = state
            .engine()
            .place_booking(slot_id, &player, group_size, payment.into())
            .await
            .map_err(gql_error)?;
        Ok(receipt.into())
    }

    /// Buys every unfilled seat of a proposal, confirming it at once.
    async fn privatize(&self, ctx: &Context<'_>, slot_id: Uuid) -> Result<BookingReceipt> {
        let player = current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let receipt = state
            .engine()
            .privatize(slot_id, &player)
            .await
            .map_err(gql_error)?;
        Ok(receipt.into())
    }

    async fn cancel_booking(&self, ctx: &Context<'_>, booking_id: Uuid) -> Result<CancellationResult> {
        let player = current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let booking = state.engine().get_booking(booking_id).await.map_err(gql_error)?;
        if booking.user_id != player.user_id && !is_manager(ctx) {
            return Err(AppError::Forbidden("You can only cancel your own bookings".into()).extend());
        }

        let outcome = state
            .engine()
            .cancel_booking(booking_id)
            .await
            .map_err(gql_error)?;
        Ok(outcome.into())
    }

    /// Takes up the next occurrence of a recurring match held for the caller.
    async fn renew_match(&self, ctx: &Context<'_>, link_id: Uuid) -> Result<BookingReceipt> {
        let player = current_player(ctx)?;
        let state = ctx.data::<AppState>()?;
        let receipt = state
            .engine()
            .renew(link_id, &player)
            .await
            .map_err(gql_error)?;
        Ok(receipt.into())
    }

    /// Retries court assignment for a full slot flagged for review.
    async fn resolve_deferred_confirmation(&self, ctx: &Context<'_>, slot_id: Uuid) -> Result<Slot> {
        require_role(ctx, Role::Manager)?;
        let state = ctx.data::<AppState>()?;
        let slot = state
            .engine()
            .resolve_deferred_confirmation(slot_id)
            .await
            .map_err(gql_error)?;
        Ok(slot.into())
    }

    async fn expire_stale_proposals(&self, ctx: &Context<'_>) -> Result<Vec<Uuid>> {
        require_role(ctx, Role::Manager)?;
        let state = ctx.data::<AppState>()?;
        state
            .engine()
            .expire_stale_proposals()
            .await
            .map_err(gql_error)
    }

    /// Runs one maintenance pass right away instead of waiting for the sweeper.
    async fn run_sweep(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 120)] reminder_lead_minutes: i64,
    ) -> Result<SweepReport> {
        require_role(ctx, Role::Manager)?;
        let state = ctx.data::<AppState>()?;
        let report = state
            .engine()
            .run_sweep(chrono::Duration::minutes(reminder_lead_minutes))
            .await;
        Ok(report.into())
    }
}
