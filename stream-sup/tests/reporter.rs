use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stream_sup::Error;
use stream_sup::metrics::ConsumerMetrics;
use stream_sup::reporter::{RateReport, RateReporter, ReporterState};

fn collecting_sink() -> (Arc<Mutex<Vec<RateReport>>>, Arc<dyn Fn(&RateReport) + Send + Sync>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    (reports, Arc::new(move |r: &RateReport| sink.lock().push(r.clone())))
}

#[tokio::test(start_paused = true)]
async fn ticks_on_interval_with_measured_rate() {
    let metrics = Arc::new(ConsumerMetrics::new());
    let (reports, sink) = collecting_sink();
    let sink_fn = sink.clone();

    let mut reporter = RateReporter::new();
    let counters = metrics.clone();
    reporter
        .start(
            Duration::from_secs(10),
            move || vec![counters.clone()],
            Arc::new(move |r: &RateReport| sink_fn(r)),
        )
        .unwrap();
    assert_eq!(reporter.state(), ReporterState::Running);

    for _ in 0..100 {
        metrics.record_delivery(5);
    }
    tokio::time::sleep(Duration::from_secs(10) + Duration::from_millis(1)).await;

    for _ in 0..50 {
        metrics.record_delivery(6);
    }
    tokio::time::sleep(Duration::from_secs(10)).await;

    reporter.stop().await;
    assert_eq!(reporter.state(), ReporterState::Stopped);

    let reports = reports.lock();
    assert_eq!(reports.len(), 2);

    assert_eq!(reports[0].total_consumed, 100);
    assert_eq!(reports[0].rate, 10.0);
    assert_eq!(reports[0].avg_entries, 5.0);

    assert_eq!(reports[1].total_consumed, 150);
    assert_eq!(reports[1].messages_since_last, 50);
    assert_eq!(reports[1].rate, 5.0);
    assert_eq!(reports[1].avg_entries, 6.0);
}

#[tokio::test(start_paused = true)]
async fn empty_counter_set_reports_zeroes() {
    let (reports, sink) = collecting_sink();
    let mut reporter = RateReporter::new();
    reporter
        .start(
            Duration::from_secs(1),
            Vec::new,
            Arc::new(move |r: &RateReport| sink(r)),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    reporter.stop().await;

    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].total_consumed, 0);
    assert_eq!(reports[0].rate, 0.0);
    assert_eq!(reports[0].avg_entries, 0.0);
}

#[tokio::test(start_paused = true)]
async fn stop_before_first_tick_emits_nothing() {
    let (reports, sink) = collecting_sink();
    let mut reporter = RateReporter::new();
    reporter
        .start(
            Duration::from_secs(5),
            Vec::new,
            Arc::new(move |r: &RateReport| sink(r)),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    reporter.stop().await;
    // Stopping twice is fine as well.
    reporter.stop().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(reports.lock().is_empty());
}

#[tokio::test]
async fn cannot_restart_a_stopped_reporter() {
    let mut reporter = RateReporter::new();
    reporter.stop().await;

    let err = reporter
        .start(Duration::from_secs(1), Vec::new, Arc::new(|_: &RateReport| {}))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}
