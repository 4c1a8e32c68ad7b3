//! Seam between the supervisor and the message transport.
//!
//! The supervisor only needs to open an environment, register a consumer with
//! a delivery callback, and close that consumer again. Everything else
//! (credits, offsets, integrity checks, reconnects) belongs to the transport.

pub mod zstream;

use std::sync::Arc;

use crate::Result;
use crate::config::{ConnectionConfig, ConsumerOptions};

pub use zstream::{ZenohConsumer, ZenohEnvironment, ZenohTransport, ZenohTransportBuilder};

/// Metadata the transport hands to the callback with every delivery.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    stream: Arc<str>,
    chunk_offset: u64,
    entries_count: u32,
}

impl DeliveryContext {
    pub fn new(stream: Arc<str>, chunk_offset: u64, entries_count: u32) -> Self {
        Self {
            stream,
            chunk_offset,
            entries_count,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn chunk_offset(&self) -> u64 {
        self.chunk_offset
    }

    /// Number of logical entries carried by this delivery.
    pub fn entries_count(&self) -> u32 {
        self.entries_count
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub payload: &'a [u8],
}

pub type MessageHandler = Arc<dyn Fn(&DeliveryContext, &Message<'_>) + Send + Sync>;

pub trait Transport: Send + Sync + 'static {
    type Environment: Environment;

    /// Open a broker environment. May block up to the configured RPC timeout.
    fn connect(&self, connection: &ConnectionConfig) -> Result<Self::Environment>;
}

pub trait Environment: Send + Sync + 'static {
    type Consumer: TransportConsumer;

    fn create_consumer(
        &self,
        stream: &str,
        options: &ConsumerOptions,
        handler: MessageHandler,
    ) -> Result<Self::Consumer>;
}

pub trait TransportConsumer: Send + Sync + 'static {
    /// Stop deliveries and release the consumer. Bounding the wait is the
    /// transport's job.
    fn close(self) -> Result<()>;
}
