//! Periodic consumption rate reporting.
//!
//! [`RateWindow`] holds the snapshot state and does the arithmetic;
//! [`RateReporter`] drives it from a tokio interval until stopped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::metrics::{ConsumerMetrics, MetricsSnapshot};
use crate::sink::ReportSink;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateReport {
    pub total_consumed: u64,
    pub total_entries: u64,
    pub messages_since_last: u64,
    pub entries_since_last: u64,
    /// Messages per second over the measured interval.
    pub rate: f64,
    /// Batch entries per message over the interval, 0 when nothing arrived.
    pub avg_entries: f64,
    pub elapsed_secs: f64,
}

/// Last observed totals and when they were observed.
#[derive(Debug, Clone)]
pub struct RateWindow {
    last: MetricsSnapshot,
    last_at: Instant,
}

impl RateWindow {
    pub fn new(started_at: Instant) -> Self {
        Self::with_baseline(MetricsSnapshot::default(), started_at)
    }

    pub fn with_baseline(baseline: MetricsSnapshot, at: Instant) -> Self {
        Self {
            last: baseline,
            last_at: at,
        }
    }

    /// Compute the report for `current` totals seen at `now` and make them the
    /// new baseline.
    pub fn observe(&mut self, current: MetricsSnapshot, now: Instant) -> RateReport {
        let elapsed = now.saturating_duration_since(self.last_at);
        let messages_since_last = current.consumed.saturating_sub(self.last.consumed);
        let entries_since_last = current.total_entries.saturating_sub(self.last.total_entries);

        let elapsed_secs = elapsed.as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            messages_since_last as f64 / elapsed_secs
        } else {
            0.0
        };
        let avg_entries = if messages_since_last > 0 {
            entries_since_last as f64 / messages_since_last as f64
        } else {
            0.0
        };

        self.last = current;
        self.last_at = now;

        RateReport {
            total_consumed: current.consumed,
            total_entries: current.total_entries,
            messages_since_last,
            entries_since_last,
            rate,
            avg_entries,
            elapsed_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ReporterState {
    Idle,
    Running,
    Stopped,
}

pub struct RateReporter {
    state: ReporterState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Default for RateReporter {
    fn default() -> Self {
        Self {
            state: ReporterState::Idle,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

impl RateReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReporterState {
        self.state
    }

    /// Start ticking every `interval`. Each tick sums the counters returned by
    /// `counters` and hands the resulting report to `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(
        &mut self,
        interval: Duration,
        counters: F,
        sink: Arc<dyn ReportSink>,
    ) -> Result<()>
    where
        F: Fn() -> Vec<Arc<ConsumerMetrics>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(Error::InvalidConfig(
                "report interval must be greater than zero".into(),
            ));
        }
        if self.state != ReporterState::Idle {
            return Err(Error::InvalidState("rate reporter can only be started once"));
        }

        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            let started_at = Instant::now();
            let mut ticker = time::interval_at(started_at + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut window = RateWindow::new(started_at);

            debug!(interval_ms = interval.as_millis() as u64, "rate reporter started");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let totals = MetricsSnapshot::sum(counters().iter().map(|m| m.snapshot()));
                        let report = window.observe(totals, Instant::now());
                        trace!(?report, "rate tick");
                        sink.emit(&report);
                    }
                }
            }
            debug!("rate reporter stopped");
        }));
        self.state = ReporterState::Running;
        Ok(())
    }

    /// Stop ticking and wait for the task to exit. A tick already in progress
    /// finishes first. Safe before the first tick and when already stopped.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("rate reporter task panicked");
                }
            }
        }
        self.state = ReporterState::Stopped;
    }
}

impl Drop for RateReporter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(consumed: u64, total_entries: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            consumed,
            total_entries,
        }
    }

    #[test]
    fn computes_rate_and_average_over_interval() {
        let t0 = Instant::now();
        let mut window = RateWindow::with_baseline(snap(100, 500), t0);

        let report = window.observe(snap(150, 800), t0 + Duration::from_secs(10));
        assert_eq!(report.messages_since_last, 50);
        assert_eq!(report.entries_since_last, 300);
        assert_eq!(report.rate, 5.0);
        assert_eq!(report.avg_entries, 6.0);
        assert_eq!(report.total_consumed, 150);
    }

    #[test]
    fn no_new_messages_reports_zero_average() {
        let t0 = Instant::now();
        let mut window = RateWindow::with_baseline(snap(10, 40), t0);

        // Entries without messages can show up through counter skew.
        let report = window.observe(snap(10, 45), t0 + Duration::from_secs(5));
        assert_eq!(report.rate, 0.0);
        assert_eq!(report.avg_entries, 0.0);
        assert!(!report.avg_entries.is_nan());
    }

    #[test]
    fn zero_elapsed_reports_zero_rate() {
        let t0 = Instant::now();
        let mut window = RateWindow::with_baseline(snap(0, 0), t0);

        let report = window.observe(snap(3, 9), t0);
        assert_eq!(report.rate, 0.0);
        assert_eq!(report.avg_entries, 3.0);
    }

    #[test]
    fn uses_measured_elapsed_time() {
        let t0 = Instant::now();
        let mut window = RateWindow::new(t0);

        window.observe(snap(10, 10), t0 + Duration::from_secs(1));
        let late = window.observe(snap(40, 40), t0 + Duration::from_millis(2500));
        assert_eq!(late.elapsed_secs, 1.5);
        assert_eq!(late.rate, 20.0);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let mut reporter = RateReporter::new();
        let err = reporter
            .start(Duration::ZERO, Vec::new, Arc::new(|_: &RateReport| {}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(reporter.state(), ReporterState::Idle);
    }

    #[tokio::test]
    async fn stop_before_start_is_harmless() {
        let mut reporter = RateReporter::new();
        reporter.stop().await;
        assert_eq!(reporter.state(), ReporterState::Stopped);
    }
}
