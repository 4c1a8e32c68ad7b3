use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use stream_sup::{
    Builder, Supervisor,
    cli::Cli,
    config::SupervisorConfig,
    logging,
    sink::{CsvSink, LogSink, ReportSink},
    supervisor::block_on_bounded,
    transport::{ZenohTransport, zstream::SessionMode},
};
use tracing::{debug, error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Time left to blocking work (timed out closes) once shutdown has returned.
const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    logging::init_logger(cli.json_logs, cli.debug);

    let mode = cli.mode;
    let config = cli.into_config();
    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e.into());
    }

    block_on_bounded(run(config, mode), TEARDOWN_GRACE)??;
    info!("Application stopped.");
    Ok(())
}

async fn run(config: SupervisorConfig, mode: SessionMode) -> Result<(), BoxError> {
    debug!(config = %serde_json::to_string(&config)?, "loaded configuration");

    let transport = ZenohTransport::builder().with_mode(mode).build()?;

    let mut supervisor = Supervisor::new(config.clone(), transport)
        .with_report_sink(Arc::new(LogSink));
    if let Some(path) = &config.report_csv {
        match CsvSink::create(path) {
            Ok(sink) => {
                let sink: Arc<dyn ReportSink> = Arc::new(sink);
                supervisor = supervisor.with_report_sink(sink);
            }
            Err(e) => warn!("not writing csv reports to {}: {}", path.display(), e),
        }
    }

    supervisor.start()?;
    info!("Application started. Press Ctrl+C to exit.");

    shutdown_signal().await;

    info!("Shutting down...");
    let summary = supervisor.shutdown().await;
    if !summary.is_clean() {
        warn!(failed = ?summary.failed_streams(), "some consumers did not close cleanly");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("received shutdown signal");
}
