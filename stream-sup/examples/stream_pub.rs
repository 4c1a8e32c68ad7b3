use std::time::Duration;

use clap::Parser;
use stream_sup::{
    Builder, Result,
    config::ConnectionConfig,
    transport::{Transport, ZenohTransport, zstream::SessionMode},
};

/// Publish batches onto one stream so a running supervisor has something to count.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = "stream1")]
    stream: String,

    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 5552)]
    port: u16,

    #[arg(long, default_value = "/")]
    vhost: String,

    /// Entries carried by every published chunk
    #[arg(long, default_value_t = 10)]
    entries: u32,

    #[arg(long, default_value = "100ms")]
    period: humantime::Duration,

    #[arg(long, default_value_t = SessionMode::Client)]
    mode: SessionMode,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let transport = ZenohTransport::builder().with_mode(args.mode).build()?;
    let env = transport.connect(&ConnectionConfig {
        host: args.host,
        port: args.port,
        vhost: args.vhost,
        ..Default::default()
    })?;
    let publisher = env.publisher(&args.stream)?;

    let period: Duration = args.period.into();
    for idx in 0u64.. {
        let payload = format!("batch-{idx}");
        let offset = publisher.publish_chunk(payload.as_bytes(), args.entries)?;
        println!("Publish chunk {offset} ({} entries) to {}", args.entries, args.stream);
        std::thread::sleep(period);
    }
    Ok(())
}
