use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checker::AppointmentChecker;
use crate::config::AppConfig;
use crate::notify::NotificationFanout;

/// Sleep applied after a cycle dies with an uncategorized fault, instead of
/// the normal jittered delay.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(300);

/// Totals reported when the loop stops. Held in memory only; a restart
/// starts from zero.
#[derive(Debug, Clone, Default)]
pub struct SchedulerReport {
    pub checks_performed: u64,
}

/// Owns the process-level run loop: one check at a time, forever, with a
/// randomized cadence so the polling pattern is not a fixed signature.
pub struct PollingScheduler {
    checker: AppointmentChecker,
    fanout: NotificationFanout,
    config: Arc<AppConfig>,
}

impl PollingScheduler {
    pub fn new(
        checker: AppointmentChecker,
        fanout: NotificationFanout,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            checker,
            fanout,
            config,
        }
    }

    /// Uniformly random whole-second delay in `[min, max]` minutes.
    pub fn jittered_delay(min_minutes: u64, max_minutes: u64) -> Duration {
        let secs = rand::thread_rng().gen_range(min_minutes * 60..=max_minutes * 60);
        Duration::from_secs(secs)
    }

    /// Loops until the token is cancelled. A single cycle can fail however
    /// it likes; only cancellation ends the loop.
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerReport {
        let mut checks_performed: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            checks_performed += 1;
            info!(check = checks_performed, "starting availability check");

            let delay = match self.checker.run_check().await {
                Ok(result) => {
                    if result.success && result.appointments_found {
                        info!(message = %result.message, "appointments found!");
                        self.fanout
                            .notify_appointments_found(&result.appointments)
                            .await;
                    } else if result.success {
                        info!("check complete: no appointments available");
                    } else {
                        warn!(message = %result.message, "check failed, next cycle proceeds on schedule");
                    }
                    Self::jittered_delay(
                        self.config.schedule.check_interval_min,
                        self.config.schedule.check_interval_max,
                    )
                }
                Err(err) => {
                    error!(error = %err, "check cycle died unexpectedly, backing off");
                    self.fanout.notify_error(&err.to_string()).await;
                    ERROR_BACKOFF
                }
            };

            info!(secs = delay.as_secs(), "sleeping until next check");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(total_checks = checks_performed, "scheduler stopped");
        SchedulerReport { checks_performed }
    }
}
