//! Booking & scheduling engine.
//!
//! Stateless over a [`BookingStore`]: every operation reads what it needs, decides, and
//! hands a single [`crate::store::SlotChange`] to the store. A lost optimistic lock is
//! retried with fresh data a bounded number of times before surfacing as
//! [`ConflictError::ConcurrentModification`].

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{ConflictError, EngineError, EngineResult, NotFoundError};
use crate::events::EventBus;
use crate::models::{Club, Slot};
use crate::retry::RetryPolicy;
use crate::store::{BookingStore, SlotChange};

pub mod availability;
pub mod economy;
pub mod ledger;
pub mod pricing;
pub mod proposals;
pub mod renewal;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testing;

pub use availability::AvailabilityQuery;
pub use economy::{CancellationOutcome, Settlement};
pub use ledger::{BookingReceipt, Confirmation, Payment};
pub use proposals::NewSlot;
pub use sweep::SweepReport;

#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    retry: RetryPolicy,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            events: EventBus::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn load_club(&self, id: Uuid) -> EngineResult<Club> {
        self.store
            .club(id)
            .await?
            .ok_or_else(|| NotFoundError::Club(id).into())
    }

    pub(crate) async fn load_slot(&self, id: Uuid) -> EngineResult<Slot> {
        self.store
            .slot(id)
            .await?
            .ok_or_else(|| NotFoundError::Slot(id).into())
    }

    pub(crate) async fn commit(&self, change: SlotChange) -> EngineResult<Slot> {
        self.store
            .commit(change)
            .await
            .map_err(EngineError::from_commit)
    }

    /// Re-runs `op` on optimistic-lock conflicts; once the budget is spent the caller gets
    /// a concurrent-modification error and must come back with fresh data.
    pub(crate) async fn with_retry<T, F, Fut>(&self, slot_id: Uuid, op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        match self.retry.retry_if(EngineError::is_retryable, op).await {
            Err(err) if err.is_retryable() => {
                warn!(%slot_id, error = %err, "giving up after repeated conflicts");
                Err(ConflictError::ConcurrentModification(slot_id).into())
            }
            other => other,
        }
    }
}
