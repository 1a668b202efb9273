//! Interval trigger for scheduled runs.
//!
//! The timer is deliberately thin: it owns no pipeline logic, it only
//! fires `run_once` on a fixed period (first cycle immediately on
//! start) and keeps per-cycle statistics for the operator log. A fresh
//! API client is built every cycle so tokens never outlive a run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use uplink_api_client::ReportClient;
use uplink_core::{ApiConfig, UplinkError};

use crate::orchestrator::{RunOutcome, UploadOrchestrator};
use crate::source::DataSource;

/// Running totals across scheduled cycles.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl CycleStats {
    pub fn record(&mut self, outcome: &RunOutcome) {
        // A refused trigger is not a run.
        if matches!(outcome, RunOutcome::Busy) {
            return;
        }
        self.total += 1;
        self.last_run = Some(Utc::now());
        if outcome.succeeded() {
            self.succeeded += 1;
            self.last_success = self.last_run;
        } else {
            self.failed += 1;
            self.last_error = Some(outcome.message());
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "runs: {} total, {} succeeded, {} failed; last error: {}",
            self.total,
            self.succeeded,
            self.failed,
            self.last_error.as_deref().unwrap_or("none")
        )
    }
}

/// Run one cycle immediately, then one per `every`, indefinitely.
/// Returns only if the API client cannot be constructed at all.
pub async fn run_every(
    orchestrator: &UploadOrchestrator,
    api_config: &ApiConfig,
    source: &dyn DataSource,
    every: Duration,
) -> Result<(), UplinkError> {
    let mut stats = CycleStats::default();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut client = ReportClient::new(api_config)?;
        let outcome = orchestrator.run_once(&mut client, source, api_config).await;
        stats.record(&outcome);

        if outcome.succeeded() {
            info!("{}", stats.summary());
        } else {
            warn!(outcome = %outcome.message(), "{}", stats.summary());
        }
        info!(seconds = every.as_secs(), "next cycle scheduled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::FailedStage;

    fn failed() -> RunOutcome {
        RunOutcome::Failed {
            stage: FailedStage::Fetch,
            record_count: 0,
            message: "fetch: boom".to_string(),
            error_detail: None,
        }
    }

    #[test]
    fn test_stats_track_success_and_failure() {
        let mut stats = CycleStats::default();
        stats.record(&RunOutcome::Succeeded {
            record_count: 4,
            message: "uploaded 4 record(s)".to_string(),
        });
        stats.record(&failed());

        assert_eq!(stats.total, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert!(stats.last_success.is_some());
        assert_eq!(stats.last_error.as_deref(), Some("fetch: boom"));
        assert!(stats.summary().contains("2 total"));
    }

    #[test]
    fn test_busy_trigger_is_not_counted() {
        let mut stats = CycleStats::default();
        stats.record(&RunOutcome::Busy);
        assert_eq!(stats.total, 0);
        assert!(stats.last_run.is_none());
    }
}
