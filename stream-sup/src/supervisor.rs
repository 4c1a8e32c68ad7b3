//! Startup and shutdown sequencing for all stream consumers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::consumer::StreamConsumer;
use crate::error::{Error, Result};
use crate::registry::ConsumerRegistry;
use crate::reporter::{RateReporter, ReporterState};
use crate::sink::{FanoutSink, LogSink, ReportSink};
use crate::transport::Transport;

/// Outcome of [`Supervisor::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownSummary {
    /// Streams whose consumer closed cleanly, in registration order.
    pub closed: Vec<String>,
    pub failures: Vec<Error>,
}

impl ShutdownSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_streams(&self) -> Vec<&str> {
        self.failures.iter().filter_map(Error::stream).collect()
    }
}

pub struct Supervisor<T: Transport> {
    config: Arc<SupervisorConfig>,
    transport: Arc<T>,
    registry: Arc<ConsumerRegistry<T::Environment>>,
    reporter: RateReporter,
    sinks: FanoutSink,
    startup: Option<JoinHandle<()>>,
    startup_cancel: CancellationToken,
}

impl<T: Transport> Supervisor<T> {
    pub fn new(config: SupervisorConfig, transport: T) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            registry: Arc::new(ConsumerRegistry::new()),
            reporter: RateReporter::new(),
            sinks: FanoutSink::new(),
            startup: None,
            startup_cancel: CancellationToken::new(),
        }
    }

    /// Send rate reports to `sink`. Without any sink, reports go to the log.
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks = self.sinks.with(sink);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConsumerRegistry<T::Environment>> {
        &self.registry
    }

    pub fn reporter_state(&self) -> ReporterState {
        self.reporter.state()
    }

    /// Begin registering every configured stream and start rate reporting.
    ///
    /// Registration runs in the background; per-stream failures are logged and
    /// skipped. Only configuration problems are returned.
    pub fn start(&mut self) -> Result<()> {
        self.config.validate()?;
        if self.startup.is_some() {
            return Err(Error::InvalidState("supervisor already started"));
        }

        self.startup = Some(tokio::spawn(register_all(
            self.config.clone(),
            self.transport.clone(),
            self.registry.clone(),
            self.startup_cancel.clone(),
        )));

        let sink: Arc<dyn ReportSink> = if self.sinks.is_empty() {
            Arc::new(LogSink)
        } else {
            Arc::new(self.sinks.clone())
        };
        let registry = self.registry.clone();
        self.reporter
            .start(self.config.log_interval, move || registry.metrics(), sink)?;

        info!(
            streams = self.config.streams.len(),
            interval_secs = self.config.log_interval.as_secs_f64(),
            "supervisor started"
        );
        Ok(())
    }

    /// Wait until every configured stream has had its registration attempt.
    pub async fn wait_registered(&mut self) {
        if let Some(startup) = self.startup.take() {
            if let Err(e) = startup.await {
                error!("registration task failed: {}", e);
            }
        }
    }

    /// Stop reporting, let registration settle, then close every consumer.
    ///
    /// A failed or timed out close is recorded and the remaining consumers are
    /// still closed.
    pub async fn shutdown(mut self) -> ShutdownSummary {
        info!("shutting down");

        self.reporter.stop().await;

        // Registrations not yet attempted are skipped; one in flight finishes
        // and its consumer is closed below with the rest.
        self.startup_cancel.cancel();
        self.wait_registered().await;

        let mut summary = ShutdownSummary::default();
        for consumer in self.registry.drain() {
            let stream = consumer.stream().to_string();
            match close_bounded(consumer, self.config.close_timeout).await {
                Ok(()) => summary.closed.push(stream),
                Err(e) => {
                    error!("{}", e);
                    summary.failures.push(e);
                }
            }
        }

        info!(
            closed = summary.closed.len(),
            failed = summary.failures.len(),
            "stopped stream consumers"
        );
        summary
    }
}

/// Run `future` to completion on a fresh multi-thread runtime, then give
/// leftover blocking work at most `grace` before tearing the runtime down.
///
/// A consumer close that outlived its timeout keeps a blocking-pool thread
/// busy; dropping the runtime normally would wait for it.
pub fn block_on_bounded<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

async fn register_all<T: Transport>(
    config: Arc<SupervisorConfig>,
    transport: Arc<T>,
    registry: Arc<ConsumerRegistry<T::Environment>>,
    cancel: CancellationToken,
) {
    for stream in config.streams.iter() {
        if cancel.is_cancelled() {
            warn!("shutdown requested, skipping registration of {}", stream);
            continue;
        }

        let (stream_name, config_ref, transport_ref) =
            (stream.clone(), config.clone(), transport.clone());
        let attempt = tokio::task::spawn_blocking(move || {
            StreamConsumer::register(
                &stream_name,
                transport_ref.as_ref(),
                &config_ref.connection,
                &config_ref.consumer,
            )
        })
        .await;

        match attempt {
            Ok(Ok(consumer)) => {
                info!("started consumer for stream {}", stream);
                registry.insert(consumer);
            }
            Ok(Err(e)) => error!("{}", e),
            Err(e) => error!("registration of stream {} panicked: {}", stream, e),
        }
    }
}

async fn close_bounded<E>(consumer: StreamConsumer<E>, timeout: Duration) -> Result<()>
where
    E: crate::transport::Environment,
{
    let stream = consumer.stream().to_string();
    let closing = tokio::task::spawn_blocking(move || consumer.close());
    match tokio::time::timeout(timeout, closing).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(Error::Close {
            stream,
            source: format!("close panicked: {}", join).into(),
        }),
        Err(_) => Err(Error::CloseTimeout { stream, timeout }),
    }
}
