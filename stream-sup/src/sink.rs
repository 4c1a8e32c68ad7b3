//! Destinations for rate reports.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::reporter::RateReport;

pub trait ReportSink: Send + Sync + 'static {
    fn emit(&self, report: &RateReport);
}

impl<F> ReportSink for F
where
    F: Fn(&RateReport) + Send + Sync + 'static,
{
    fn emit(&self, report: &RateReport) {
        self(report)
    }
}

/// Writes one human readable line per report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn emit(&self, report: &RateReport) {
        info!(
            total_consumed = report.total_consumed,
            rate = report.rate,
            avg_entries = report.avg_entries,
            "Total consumed: {}, Rate: {:.2} msg/s, Avg entries: {:.2}",
            report.total_consumed,
            report.rate,
            report.avg_entries
        );
    }
}

const CSV_HEADER: [&str; 7] = [
    "unix_ms",
    "total_consumed",
    "total_entries",
    "messages_since_last",
    "entries_since_last",
    "rate",
    "avg_entries",
];

/// Appends one CSV row per report.
pub struct CsvSink<W: Write + Send + 'static> {
    writer: Mutex<csv::Writer<W>>,
}

impl CsvSink<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> csv::Result<Self> {
        let path = path.as_ref();
        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::from_writer(file, needs_header)
    }
}

impl<W: Write + Send + 'static> CsvSink<W> {
    pub fn from_writer(writer: W, write_header: bool) -> csv::Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        if write_header {
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
        }
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().into_inner().ok()
    }

    fn write(&self, report: &RateReport) -> csv::Result<()> {
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let mut writer = self.writer.lock();
        writer.write_record([
            unix_ms.to_string(),
            report.total_consumed.to_string(),
            report.total_entries.to_string(),
            report.messages_since_last.to_string(),
            report.entries_since_last.to_string(),
            format!("{:.2}", report.rate),
            format!("{:.2}", report.avg_entries),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send + 'static> ReportSink for CsvSink<W> {
    fn emit(&self, report: &RateReport) {
        if let Err(e) = self.write(report) {
            warn!("failed to append rate report to csv: {}", e);
        }
    }
}

/// Forwards each report to every inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for FanoutSink {
    fn emit(&self, report: &RateReport) {
        for sink in &self.sinks {
            sink.emit(report);
        }
    }
}
