use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::AppState;

/// Periodic maintenance of the booking engine: expires stale proposals, opens renewals
/// for finished recurring matches, sends renewal reminders and drops orphaned links.
pub struct SweeperService {
    state: AppState,
    interval: Interval,
    reminder_lead: chrono::Duration,
}

impl SweeperService {
    pub fn new(state: AppState, every: Duration, reminder_lead: chrono::Duration) -> Self {
        let mut interval = interval(every);
        // A slow pass must not be followed by a burst of catch-up passes.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            state,
            interval,
            reminder_lead,
        }
    }

    /// Start the background sweeper
    pub async fn run(&mut self) {
        info!("Starting booking sweeper");

        loop {
            self.interval.tick().await;
            let report = self.state.engine().run_sweep(self.reminder_lead).await;
            debug!(?report, "sweep tick");
        }
    }
}

/// Spawn the sweeper as a background task
pub fn spawn_sweeper_service(
    state: AppState,
    every: Duration,
    reminder_lead: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut service = SweeperService::new(state, every, reminder_lead);
        service.run().await;
    })
}
