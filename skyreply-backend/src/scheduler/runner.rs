use crate::pipeline::{BatchReport, MentionPipeline, PipelineError};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{sleep, Duration};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cron expression (with seconds field) for batch runs
    pub schedule: String,
}

/// Fallback wait when the schedule has no upcoming fire time
const IDLE_POLL_SECS: u64 = 60;

/// Runs the mention pipeline on a cron schedule until shut down
pub struct ReplyScheduler {
    pipeline: Arc<MentionPipeline>,
    schedule: Schedule,
    config: SchedulerConfig,
}

impl ReplyScheduler {
    pub fn new(pipeline: Arc<MentionPipeline>, config: SchedulerConfig) -> Result<Self, String> {
        let schedule = Schedule::from_str(&config.schedule)
            .map_err(|e| format!("Invalid reply schedule '{}': {}", config.schedule, e))?;
        Ok(ReplyScheduler {
            pipeline,
            schedule,
            config,
        })
    }

    /// Start the scheduler background task
    pub async fn start(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        log::info!("Reply scheduler started (schedule: '{}')", self.config.schedule);

        loop {
            let wait = self.delay_until_next(Utc::now());

            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::info!("Reply scheduler received shutdown signal");
                    break;
                }
                _ = sleep(wait) => {
                    self.tick().await;
                }
            }
        }

        log::info!("Reply scheduler stopped");
    }

    /// Time to wait from `now` until the next scheduled fire
    fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        match self.schedule.after(&now).next() {
            Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
            None => {
                log::warn!("Reply schedule has no upcoming runs, idling");
                Duration::from_secs(IDLE_POLL_SECS)
            }
        }
    }

    /// Run one batch. The pipeline enforces its own deadline, so the batch is
    /// awaited to completion and in-flight replies are always acknowledged.
    pub async fn tick(&self) -> Option<BatchReport> {
        match self.pipeline.run_batch().await {
            Ok(report) => {
                if report.fetched > 0 {
                    log::info!(
                        "Scheduled batch: {} replied, {} failed, {} skipped",
                        report.replied,
                        report.failed,
                        report.skipped
                    );
                }
                Some(report)
            }
            Err(PipelineError::Busy) => {
                log::info!("Previous batch still running, skipping scheduled run");
                None
            }
            Err(e @ PipelineError::Auth { .. }) => {
                log::error!("Scheduled batch aborted: {}", e);
                None
            }
            Err(e) => {
                log::error!("Scheduled batch failed: {}", e);
                None
            }
        }
    }
}
