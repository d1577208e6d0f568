use async_graphql::{Context, Result, Subscription};
use futures_util::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;
use uuid::Uuid;

use crate::gql::types::EngineEventPayload;
use crate::state::AppState;

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Live engine events: confirmations, cancellations and renewal reminders.
    /// Narrow with `clubId` and/or `userId`; events lacking that field still pass.
    async fn engine_events(
        &self,
        ctx: &Context<'_>,
        club_id: Option<Uuid>,
        user_id: Option<Uuid>,
    ) -> Result<impl Stream<Item = EngineEventPayload>> {
        let state = ctx.data::<AppState>()?;
        let receiver = state.engine().events().subscribe();

        Ok(BroadcastStream::new(receiver).filter_map(move |event| match event {
            Ok(event) => {
                let payload = EngineEventPayload::from(event);
                payload.is_visible_to(club_id, user_id).then_some(payload)
            }
            Err(e) => {
                // Slow subscriber; skip what was dropped and carry on.
                warn!("engine event stream lagged: {}", e);
                None
            }
        }))
    }
}
