use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};

use super::BookingEngine;

/// Counts from one pass of the periodic sweeper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_proposals: usize,
    pub renewals_opened: usize,
    pub reminders_sent: usize,
    pub links_removed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl BookingEngine {
    /// One idempotent maintenance pass. Each step runs even if an earlier one failed; a
    /// failing step is logged and counted as zero.
    pub async fn run_sweep(&self, reminder_lead: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        match self.expire_stale_proposals().await {
            Ok(expired) => report.expired_proposals = expired.len(),
            Err(e) => warn!(error = %e, "proposal expiry failed"),
        }
        match self.process_completed_matches().await {
            Ok(n) => report.renewals_opened = n,
            Err(e) => warn!(error = %e, "completion processing failed"),
        }
        match self.send_renewal_reminders(reminder_lead).await {
            Ok(n) => report.reminders_sent = n,
            Err(e) => warn!(error = %e, "renewal reminders failed"),
        }
        match self.sweep_renewal_links().await {
            Ok(n) => report.links_removed = n,
            Err(e) => warn!(error = %e, "renewal link cleanup failed"),
        }

        if !report.is_empty() {
            info!(?report, "sweep pass finished");
        }
        report
    }
}
