//! Command line flags with environment variable fallbacks.
//!
//! A flag always wins. Without it the matching environment variable is used,
//! and a malformed environment value silently falls back to the built-in
//! default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{ArgAction, Parser, builder::BoolishValueParser};

use crate::config::{self, ConnectionConfig, ConsumerOptions, OffsetSpec, SupervisorConfig};
use crate::transport::zstream::SessionMode;

#[derive(Debug, Clone, Parser)]
#[command(name = "stream-sup")]
#[command(about = "Consume a set of streams and report the consumption rate")]
pub struct Cli {
    /// Comma-separated list of streams to consume from
    #[arg(long, default_value_t = env_or("RMQ_STREAMS", config::DEFAULT_STREAM.to_string()))]
    pub streams: String,

    /// Broker host
    #[arg(long, default_value_t = env_or("RMQ_HOST", config::DEFAULT_HOST.to_string()))]
    pub host: String,

    /// Broker virtual host
    #[arg(long, default_value_t = env_or("RMQ_VHOST", config::DEFAULT_VHOST.to_string()))]
    pub vhost: String,

    /// Broker stream port
    #[arg(long, default_value_t = env_or("RMQ_PORT", config::DEFAULT_PORT))]
    pub port: u16,

    #[arg(long, default_value_t = env_or("RMQ_USER", config::DEFAULT_USER.to_string()))]
    pub user: String,

    #[arg(long, default_value_t = env_or("RMQ_PASSWORD", config::DEFAULT_PASSWORD.to_string()), hide_default_value = true)]
    pub password: String,

    /// Max consumers per connection
    #[arg(long, default_value_t = env_or("RMQ_MAX_CONSUMERS", config::DEFAULT_MAX_CONSUMERS))]
    pub max_consumers: usize,

    /// RPC timeout, e.g. "10s" or "1m 30s"
    #[arg(long, default_value_t = env_or("RMQ_TIMEOUT", config::DEFAULT_RPC_TIMEOUT.into()))]
    pub timeout: humantime::Duration,

    /// Initial flow-control credits per consumer
    #[arg(long, default_value_t = env_or("RMQ_INITIAL_CREDITS", config::DEFAULT_INITIAL_CREDITS))]
    pub initial_credits: u16,

    /// Report interval in seconds
    #[arg(long, default_value_t = env_or("LOG_INTERVAL", config::DEFAULT_LOG_INTERVAL.as_secs()))]
    pub log_interval: u64,

    /// Validate chunk CRC32 before delivery
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new(),
          num_args = 0..=1, require_equals = true, default_missing_value = "true",
          default_value_t = env_bool("RMQ_CRC_CHECK", true))]
    pub crc_check: bool,

    /// Bounded wait for each consumer close at shutdown
    #[arg(long, default_value_t = env_or("RMQ_CLOSE_TIMEOUT", config::DEFAULT_CLOSE_TIMEOUT.into()))]
    pub close_timeout: humantime::Duration,

    /// Append every rate report to this CSV file
    #[arg(long, env = "REPORT_CSV")]
    pub report_csv: Option<PathBuf>,

    /// Output structured JSON logs
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new(),
          num_args = 0..=1, require_equals = true, default_missing_value = "true",
          default_value_t = env_bool("LOG_JSON", false))]
    pub json_logs: bool,

    /// Enable debug logging
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new(),
          num_args = 0..=1, require_equals = true, default_missing_value = "true",
          default_value_t = env_bool("LOG_DEBUG", false))]
    pub debug: bool,

    /// Zenoh session mode (client, peer or router)
    #[arg(long, default_value_t = env_or("ZENOH_MODE", SessionMode::Client))]
    pub mode: SessionMode,
}

impl Cli {
    pub fn into_config(self) -> SupervisorConfig {
        SupervisorConfig {
            streams: config::parse_stream_list(&self.streams),
            connection: ConnectionConfig {
                host: self.host,
                vhost: self.vhost,
                port: self.port,
                user: self.user,
                password: self.password,
                max_consumers: self.max_consumers,
                rpc_timeout: self.timeout.into(),
            },
            consumer: ConsumerOptions {
                offset: OffsetSpec::First,
                initial_credits: self.initial_credits,
                crc_check: self.crc_check,
            },
            log_interval: Duration::from_secs(self.log_interval),
            close_timeout: self.close_timeout.into(),
            report_csv: self.report_csv,
        }
    }
}

/// Parse `key` from the environment, falling back on absence or parse error.
pub fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

/// Boolean env lookup accepting 1/t/true/yes/on and 0/f/false/no/off.
pub fn env_bool(key: &str, fallback: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(fallback)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}
