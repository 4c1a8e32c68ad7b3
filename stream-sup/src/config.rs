//! Supervisor configuration
//!
//! Values are immutable once a [`SupervisorConfig`] has been validated.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_STREAM: &str = "stream1";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_VHOST: &str = "/";
pub const DEFAULT_PORT: u16 = 5552;
pub const DEFAULT_USER: &str = "guest";
pub const DEFAULT_PASSWORD: &str = "guest";
pub const DEFAULT_MAX_CONSUMERS: usize = 5;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INITIAL_CREDITS: u16 = 100;
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Broker connection parameters shared by every consumer.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub vhost: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub max_consumers: usize,
    pub rpc_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            vhost: DEFAULT_VHOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            max_consumers: DEFAULT_MAX_CONSUMERS,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

/// Where a consumer starts reading a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OffsetSpec {
    /// Earliest chunk still available.
    #[default]
    First,
    /// Skip every chunk whose offset is below the given one.
    Offset(u64),
}

impl OffsetSpec {
    pub fn admits(&self, chunk_offset: u64) -> bool {
        match self {
            OffsetSpec::First => true,
            OffsetSpec::Offset(start) => chunk_offset >= *start,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerOptions {
    pub offset: OffsetSpec,
    pub initial_credits: u16,
    pub crc_check: bool,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            offset: OffsetSpec::First,
            initial_credits: DEFAULT_INITIAL_CREDITS,
            crc_check: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorConfig {
    /// Streams to consume, in registration order. Duplicates are kept.
    pub streams: Vec<String>,
    pub connection: ConnectionConfig,
    pub consumer: ConsumerOptions,
    pub log_interval: Duration,
    pub close_timeout: Duration,
    pub report_csv: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            streams: vec![DEFAULT_STREAM.to_string()],
            connection: ConnectionConfig::default(),
            consumer: ConsumerOptions::default(),
            log_interval: DEFAULT_LOG_INTERVAL,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            report_csv: None,
        }
    }
}

impl SupervisorConfig {
    pub fn with_streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log_interval(mut self, interval: Duration) -> Self {
        self.log_interval = interval;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.streams.is_empty() {
            return Err(Error::InvalidConfig("no streams configured".into()));
        }
        if self.streams.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidConfig("stream names must not be empty".into()));
        }
        if self.log_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "log interval must be greater than zero".into(),
            ));
        }
        if self.connection.max_consumers == 0 {
            return Err(Error::InvalidConfig(
                "max consumers per connection must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Split a comma separated stream list, dropping blank names.
pub fn parse_stream_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_list_keeps_order_and_duplicates() {
        assert_eq!(
            parse_stream_list("orders, payments,orders,,  "),
            vec!["orders", "payments", "orders"]
        );
    }

    #[test]
    fn default_config_is_valid() {
        SupervisorConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = SupervisorConfig::default()
            .with_log_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn empty_stream_list_is_rejected() {
        let cfg = SupervisorConfig::default().with_streams(Vec::<String>::new());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn offset_spec_filters_chunks() {
        assert!(OffsetSpec::First.admits(0));
        assert!(!OffsetSpec::Offset(10).admits(9));
        assert!(OffsetSpec::Offset(10).admits(10));
    }
}
