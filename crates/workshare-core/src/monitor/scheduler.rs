//! Periodic monitoring loop
//!
//! Runs [`WorkshareMonitor::run_pass`] every interval, independent of the
//! event-driven conflict path. A pass that panics is logged and the loop
//! carries on at the next tick.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{TickReport, WorkshareMonitor};

pub struct MonitoringScheduler {
    monitor: Arc<WorkshareMonitor>,
    interval: Duration,
    task: parking_lot::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl MonitoringScheduler {
    pub fn new(monitor: Arc<WorkshareMonitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            task: parking_lot::Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Run one pass now, on the caller's thread.
    ///
    /// Returns `None` if the pass panicked.
    pub fn tick_now(&self) -> Option<TickReport> {
        run_guarded(|| self.monitor.run_pass(Utc::now()))
    }

    /// Spawn the periodic loop. Does nothing if it is already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            debug!("Monitoring scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let monitor = self.monitor.clone();
        let handle = tokio::spawn(monitor_loop(
            move || monitor.run_pass(Utc::now()),
            self.interval,
            cancel.clone(),
        ));
        *task = Some((cancel, handle));
        info!(interval = ?self.interval, "Monitoring scheduler started");
    }

    /// Cancel the loop and wait up to `grace` for it to finish.
    pub async fn stop(&self, grace: Duration) {
        let Some((cancel, handle)) = self.task.lock().take() else {
            return;
        };
        cancel.cancel();
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => info!("Monitoring scheduler stopped"),
            Ok(Err(e)) => warn!(error = ?e, "Monitoring loop ended abnormally"),
            Err(_) => warn!("Monitoring loop did not stop within grace period, abandoning"),
        }
    }
}

impl Drop for MonitoringScheduler {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.task.get_mut().as_ref() {
            cancel.cancel();
        }
    }
}

fn run_guarded(pass: impl FnOnce() -> TickReport) -> Option<TickReport> {
    match catch_unwind(AssertUnwindSafe(pass)) {
        Ok(report) => Some(report),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(%message, "Monitoring pass failed");
            None
        }
    }
}

async fn monitor_loop<F>(pass: F, period: Duration, cancel: CancellationToken)
where
    F: Fn() -> TickReport + Send + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(report) = run_guarded(&pass) {
                    debug!(
                        hotspots = report.hotspots.len(),
                        users = report.recommendations.len(),
                        announced = report.announced,
                        "Monitoring pass complete"
                    );
                }
            }
        }
    }
    debug!("Monitoring loop exited");
}
